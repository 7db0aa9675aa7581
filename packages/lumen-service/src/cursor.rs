//! Opaque continuation tokens.
//!
//! A token is `base64url(envelope JSON) "." base64url(keyed BLAKE3 tag)`. The envelope carries a
//! digest of the filter scope it was issued for, so a token replayed against a different company,
//! task set, or event type is detected and iteration restarts instead of continuing someone
//! else's cursor.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use lumen_domain::EventType;

use crate::{Error, Result};

pub const TOKEN_VERSION: u8 = 1;

const KEY_CONTEXT: &str = "lumen cursor token v1";

/// Filter parameters a token is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CursorScope {
	operation: String,
	company: String,
	tasks: Vec<String>,
	event_type: Option<EventType>,
	fingerprint: String,
}
impl CursorScope {
	pub fn new(
		operation: impl Into<String>,
		company: impl Into<String>,
		tasks: &[String],
		event_type: Option<EventType>,
	) -> Self {
		let mut tasks = tasks.to_vec();

		tasks.sort();
		tasks.dedup();

		Self {
			operation: operation.into(),
			company: company.into(),
			tasks,
			event_type,
			fingerprint: String::new(),
		}
	}

	/// Binds any further request parameters that change the result set, such as sort order.
	pub fn with_fingerprint<T: Serialize>(mut self, params: &T) -> Self {
		self.fingerprint = serde_json::to_string(params).unwrap_or_default();

		self
	}

	pub fn digest(&self) -> String {
		let bytes = serde_json::to_vec(self).unwrap_or_default();

		blake3::hash(&bytes).to_hex().to_string()
	}
}

/// Decoded token contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
	pub v: u8,
	pub scope: String,
	/// Unix seconds.
	pub issued_at: i64,
	pub body: T,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
	#[error("token is malformed")]
	Malformed,
	#[error("token authentication failed")]
	Tampered,
	#[error("token version {0} is not supported")]
	UnsupportedVersion(u8),
	#[error("token was issued for a different scope")]
	ScopeMismatch,
	#[error("token is older than {ttl_seconds} seconds")]
	Expired { ttl_seconds: u64 },
}

/// Outcome of presenting an optional token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume<T> {
	Fresh,
	Continue(T),
	/// The token could not be honored and iteration starts over.
	Restart(DecodeError),
}
impl<T> Resume<T> {
	pub fn restarted(&self) -> bool {
		matches!(self, Self::Restart(_))
	}
}

pub struct CursorCodec {
	key: [u8; 32],
	ttl_seconds: u64,
}
impl CursorCodec {
	pub fn new(secret: &str, ttl_seconds: u64) -> Self {
		Self { key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()), ttl_seconds }
	}

	pub fn encode<T: Serialize>(&self, scope: &CursorScope, body: &T) -> Result<String> {
		self.encode_at(scope, body, OffsetDateTime::now_utc().unix_timestamp())
	}

	pub fn encode_at<T: Serialize>(
		&self,
		scope: &CursorScope,
		body: &T,
		issued_at: i64,
	) -> Result<String> {
		self.seal(&Envelope { v: TOKEN_VERSION, scope: scope.digest(), issued_at, body })
	}

	/// Serializes an envelope as is. Sealing a decoded envelope reproduces the original token.
	pub fn seal<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<String> {
		let payload = serde_json::to_vec(envelope)
			.map_err(|err| Error::Internal { message: format!("Failed to encode token: {err}") })?;
		let tag = blake3::keyed_hash(&self.key, &payload);

		Ok(format!(
			"{}.{}",
			URL_SAFE_NO_PAD.encode(&payload),
			URL_SAFE_NO_PAD.encode(tag.as_bytes())
		))
	}

	/// Authenticates and parses a token without checking scope or age.
	pub fn open<T: DeserializeOwned>(&self, token: &str) -> Result<Envelope<T>, DecodeError> {
		let (payload, tag) = token.split_once('.').ok_or(DecodeError::Malformed)?;
		let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| DecodeError::Malformed)?;
		let tag: [u8; 32] = URL_SAFE_NO_PAD
			.decode(tag)
			.map_err(|_| DecodeError::Malformed)?
			.try_into()
			.map_err(|_| DecodeError::Malformed)?;

		if blake3::keyed_hash(&self.key, &payload) != blake3::Hash::from_bytes(tag) {
			return Err(DecodeError::Tampered);
		}

		let envelope: Envelope<T> =
			serde_json::from_slice(&payload).map_err(|_| DecodeError::Malformed)?;

		if envelope.v != TOKEN_VERSION {
			return Err(DecodeError::UnsupportedVersion(envelope.v));
		}

		Ok(envelope)
	}

	pub fn decode<T: DeserializeOwned>(
		&self,
		token: &str,
		scope: &CursorScope,
	) -> Result<T, DecodeError> {
		self.decode_at(token, scope, OffsetDateTime::now_utc().unix_timestamp())
	}

	pub fn decode_at<T: DeserializeOwned>(
		&self,
		token: &str,
		scope: &CursorScope,
		now: i64,
	) -> Result<T, DecodeError> {
		let envelope = self.open::<T>(token)?;

		if envelope.scope != scope.digest() {
			return Err(DecodeError::ScopeMismatch);
		}

		let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);

		if now.saturating_sub(envelope.issued_at) > ttl {
			return Err(DecodeError::Expired { ttl_seconds: self.ttl_seconds });
		}

		Ok(envelope.body)
	}

	/// Never fails: absent tokens start fresh and unusable ones restart.
	pub fn resume<T>(&self, token: Option<&str>, scope: &CursorScope) -> Resume<T>
	where
		T: DeserializeOwned,
	{
		let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) else {
			return Resume::Fresh;
		};

		match self.decode(token, scope) {
			Ok(body) => Resume::Continue(body),
			Err(err) => {
				tracing::warn!(reason = %err, "Discarding continuation token and restarting.");

				Resume::Restart(err)
			},
		}
	}
}
