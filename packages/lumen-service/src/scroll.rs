//! Point-in-time batch iteration behind a continuation token.
//!
//! A missing token starts a fresh scroll. An `Active` token continues from the store cursor it
//! carries. Once the store reports no further events the token turns `Exhausted`, and presenting
//! it again yields an empty batch. Unusable tokens and cursors the store no longer retains restart
//! from the beginning and flag the batch as restarted.

use serde::{Deserialize, Serialize};

use lumen_domain::Event;
use lumen_storage::{
	Error as StoreError,
	store::{EventFilter, EventQuery, EventSort, StoreCursor},
};

use crate::{CursorScope, LumenService, Result, cursor::Resume};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ScrollState {
	Active { cursor: StoreCursor, returned: u64 },
	Exhausted { total: u64, returned: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollBatch {
	pub events: Vec<Event>,
	pub total: u64,
	pub next_token: String,
	pub restarted: bool,
}

/// One scroll step: what to fetch and how to bind the resulting token.
pub(crate) struct ScrollSpec<'a> {
	pub(crate) operation: &'static str,
	pub(crate) scope: &'a CursorScope,
	pub(crate) filter: EventFilter,
	pub(crate) sort: EventSort,
	pub(crate) size: usize,
}

impl LumenService {
	pub(crate) async fn scroll(
		&self,
		spec: ScrollSpec<'_>,
		token: Option<&str>,
	) -> Result<ScrollBatch> {
		let resume = self.codec().resume::<ScrollState>(token, spec.scope);
		let mut restarted = resume.restarted();
		let (cursor, returned) = match resume {
			Resume::Continue(ScrollState::Exhausted { total, returned }) => {
				let next_token =
					self.codec().encode(spec.scope, &ScrollState::Exhausted { total, returned })?;

				return Ok(ScrollBatch { events: Vec::new(), total, next_token, restarted });
			},
			Resume::Continue(ScrollState::Active { cursor, returned }) => (Some(cursor), returned),
			Resume::Fresh | Resume::Restart(_) => (None, 0),
		};
		let task = spec.filter.tasks.join(",");
		let mut query =
			EventQuery { filter: spec.filter, sort: spec.sort, size: spec.size, cursor };
		let mut returned = returned;
		let page = match self.timed(spec.operation, &task, self.store.query(&query)).await? {
			Ok(page) => page,
			Err(StoreError::CursorExpired(reason)) => {
				tracing::warn!(
					operation = spec.operation,
					task = %task,
					reason = %reason,
					"Scroll expired in store, restarting."
				);

				restarted = true;
				returned = 0;
				query.cursor = None;

				self.store_call(spec.operation, &task, self.store.query(&query)).await?
			},
			Err(err) => return Err(crate::Error::from_store(spec.operation, &task, err)),
		};

		returned += page.events.len() as u64;

		let state = match page.next {
			Some(cursor) => ScrollState::Active { cursor, returned },
			None => ScrollState::Exhausted { total: page.total, returned },
		};
		let next_token = self.codec().encode(spec.scope, &state)?;

		tracing::debug!(
			operation = spec.operation,
			task = %task,
			batch = page.events.len(),
			total = page.total,
			restarted,
			"Scrolled event batch."
		);

		Ok(ScrollBatch { events: page.events, total: page.total, next_token, restarted })
	}
}
