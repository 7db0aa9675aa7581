pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid reference: {message}")]
	InvalidReference { message: String },
	#[error("Invalid parameter: {message}")]
	InvalidParameter { message: String },
	#[error("Store unavailable during {operation} for task {task}: {message}")]
	StoreUnavailable { operation: &'static str, task: String, message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl Error {
	pub(crate) fn invalid_parameter(message: impl Into<String>) -> Self {
		Self::InvalidParameter { message: message.into() }
	}

	/// Maps an adapter failure, keeping the operation and task for diagnosis.
	pub(crate) fn from_store(
		operation: &'static str,
		task: &str,
		err: lumen_storage::Error,
	) -> Self {
		match err {
			lumen_storage::Error::Sqlx(inner) => Self::StoreUnavailable {
				operation,
				task: task.to_string(),
				message: inner.to_string(),
			},
			lumen_storage::Error::CursorExpired(message) =>
				Self::StoreUnavailable { operation, task: task.to_string(), message },
			lumen_storage::Error::InvalidArgument(message) => Self::InvalidParameter { message },
			lumen_storage::Error::Decode(message) => Self::Internal { message },
		}
	}
}
impl From<lumen_domain::log_format::LineFormatError> for Error {
	fn from(err: lumen_domain::log_format::LineFormatError) -> Self {
		Self::InvalidParameter { message: err.to_string() }
	}
}
