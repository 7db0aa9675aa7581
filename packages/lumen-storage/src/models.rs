use serde_json::Value;

use lumen_domain::{Event, EventPayload};

use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
pub struct EventRow {
	pub seq: i64,
	pub company: String,
	pub task: String,
	pub r#type: String,
	pub metric: String,
	pub variant: String,
	pub iter: i64,
	pub timestamp: i64,
	pub payload: Value,
}
impl EventRow {
	pub fn into_event(self) -> Result<Event> {
		let payload: EventPayload = serde_json::from_value(self.payload).map_err(|err| {
			Error::Decode(format!("seq {} of type {}: {err}", self.seq, self.r#type))
		})?;

		Ok(Event {
			company: self.company,
			task: self.task,
			metric: self.metric,
			variant: self.variant,
			iter: self.iter,
			timestamp: self.timestamp,
			payload,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct TaskRow {
	pub id: String,
	pub company: String,
	pub name: String,
	pub status: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SeriesRangeRow {
	pub task: String,
	pub metric: String,
	pub variant: String,
	pub min_x: i64,
	pub max_x: i64,
	pub samples: i64,
}
