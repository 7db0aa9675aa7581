//! The seam between the retrieval engine and the backing event index.

use std::{future::Future, pin::Pin};

use serde::{Deserialize, Serialize};

use lumen_domain::{Event, EventType, ScalarKey, SortOrder};

use crate::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Equality and range filters. `company` is always applied (the empty company holds public
/// tasks) and at least one task is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
	pub company: String,
	pub tasks: Vec<String>,
	pub event_type: Option<EventType>,
	pub metrics: Vec<String>,
	pub variants: Vec<String>,
	/// Inclusive.
	pub iter_min: Option<i64>,
	/// Inclusive.
	pub iter_max: Option<i64>,
	/// Exclusive.
	pub timestamp_after: Option<i64>,
	/// Exclusive.
	pub timestamp_before: Option<i64>,
	/// When non-empty, an event must belong to one of these series at or above its floor.
	pub series_floors: Vec<SeriesFloor>,
}
impl EventFilter {
	pub fn new(company: impl Into<String>, tasks: Vec<String>) -> Self {
		Self { company: company.into(), tasks, ..Default::default() }
	}

	pub fn with_type(mut self, event_type: EventType) -> Self {
		self.event_type = Some(event_type);

		self
	}

	pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
		self.metrics.push(metric.into());

		self
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variants.push(variant.into());

		self
	}

	pub fn with_series_floors(mut self, floors: Vec<SeriesFloor>) -> Self {
		self.series_floors = floors;

		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.tasks.is_empty() {
			return Err(Error::InvalidArgument("At least one task is required.".to_string()));
		}
		if self.tasks.iter().any(|task| task.trim().is_empty()) {
			return Err(Error::InvalidArgument("Task ids must not be empty.".to_string()));
		}

		Ok(())
	}

	/// Applies the filter to an in-memory event.
	pub fn matches(&self, event: &Event) -> bool {
		event.company == self.company
			&& self.tasks.iter().any(|task| task == &event.task)
			&& self.event_type.is_none_or(|event_type| event.event_type() == event_type)
			&& (self.metrics.is_empty() || self.metrics.iter().any(|m| m == &event.metric))
			&& (self.variants.is_empty() || self.variants.iter().any(|v| v == &event.variant))
			&& self.iter_min.is_none_or(|min| event.iter >= min)
			&& self.iter_max.is_none_or(|max| event.iter <= max)
			&& self.timestamp_after.is_none_or(|after| event.timestamp > after)
			&& self.timestamp_before.is_none_or(|before| event.timestamp < before)
			&& (self.series_floors.is_empty()
				|| self.series_floors.iter().any(|floor| floor.admits(event)))
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
	Iter,
	#[default]
	Timestamp,
}
impl SortField {
	pub fn column(self) -> &'static str {
		match self {
			Self::Iter => "iter",
			Self::Timestamp => "timestamp",
		}
	}

	pub fn value_of(self, event: &Event) -> i64 {
		match self {
			Self::Iter => event.iter,
			Self::Timestamp => event.timestamp,
		}
	}
}
impl From<ScalarKey> for SortField {
	fn from(key: ScalarKey) -> Self {
		if key.is_time() { Self::Timestamp } else { Self::Iter }
	}
}

/// Single-column sort. Ties are always broken by ingestion sequence in the same direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSort {
	pub field: SortField,
	pub order: SortOrder,
}
impl EventSort {
	pub fn new(field: SortField, order: SortOrder) -> Self {
		Self { field, order }
	}
}

/// Position of the last event handed out, in sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortPosition {
	pub value: i64,
	pub seq: i64,
}

/// Point-in-time continuation handle. Only events ingested at or before `snapshot` are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCursor {
	pub snapshot: i64,
	pub total: u64,
	pub after: Option<SortPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
	pub filter: EventFilter,
	pub sort: EventSort,
	pub size: usize,
	pub cursor: Option<StoreCursor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
	pub events: Vec<Event>,
	/// Count of all events matching the filter at the snapshot, across every page.
	pub total: u64,
	/// `None` once the store has no further events for this snapshot.
	pub next: Option<StoreCursor>,
}

/// Distinct iteration lookup, e.g. "the next 3 iterations after 40".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationQuery {
	pub filter: EventFilter,
	pub order: SortOrder,
	/// Exclusive bound in the direction of `order`.
	pub after: Option<i64>,
	pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
	pub task: String,
	pub metric: String,
	pub variant: String,
}

/// Lowest iteration kept for one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesFloor {
	pub series: SeriesKey,
	/// Inclusive.
	pub iter_min: i64,
}
impl SeriesFloor {
	pub fn admits(&self, event: &Event) -> bool {
		event.task == self.series.task
			&& event.metric == self.series.metric
			&& event.variant == self.series.variant
			&& event.iter >= self.iter_min
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRange {
	pub series: SeriesKey,
	pub min: i64,
	pub max: i64,
	pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
	pub id: String,
	pub company: String,
	pub name: String,
	pub status: String,
}

pub trait EventStore
where
	Self: Send + Sync,
{
	fn query<'a>(&'a self, query: &'a EventQuery) -> BoxFuture<'a, Result<EventPage>>;

	fn iterations<'a>(&'a self, query: &'a IterationQuery) -> BoxFuture<'a, Result<Vec<i64>>>;

	/// Distinct `(task, metric, variant)` combinations, sorted.
	fn series<'a>(&'a self, filter: &'a EventFilter) -> BoxFuture<'a, Result<Vec<SeriesKey>>>;

	/// Per-series axis range and sample count.
	fn series_ranges<'a>(
		&'a self,
		filter: &'a EventFilter,
		axis: SortField,
	) -> BoxFuture<'a, Result<Vec<SeriesRange>>>;
}

pub trait TaskCatalog
where
	Self: Send + Sync,
{
	/// Resolves the ids visible to `company`. Unknown ids are simply absent from the result.
	fn resolve<'a>(
		&'a self,
		company: &'a str,
		task_ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<TaskRecord>>>;
}
