//! In-process stand-ins for the event index and the task catalog.
//!
//! The event store keeps the same point-in-time semantics as the Postgres adapter: a fresh query
//! pins a snapshot, later pages only see events ingested at or before it, and continuation is
//! keyset based on `(sort value, seq)`.

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use lumen_domain::{Event, SortOrder};
use lumen_storage::{
	Error, Result,
	store::{
		BoxFuture, EventFilter, EventPage, EventQuery, EventStore, IterationQuery, SeriesKey,
		SeriesRange, SortField, SortPosition, StoreCursor, TaskCatalog, TaskRecord,
	},
};

#[derive(Default)]
struct Inner {
	/// `(seq, event)` in ingestion order.
	events: Vec<(i64, Event)>,
	/// Monotonic clock shared by ingestion and cursor expiry.
	clock: i64,
	/// Snapshots at or below this value are rejected as expired.
	expired_through: i64,
	unavailable: bool,
	delay: Option<Duration>,
}

#[derive(Default)]
pub struct MemoryEventStore {
	inner: Mutex<Inner>,
	calls: AtomicUsize,
}
impl MemoryEventStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
		let store = Self::new();

		store.insert_many(events);

		store
	}

	/// Appends an event and returns its ingestion sequence.
	pub fn insert(&self, event: Event) -> i64 {
		let mut inner = self.lock();

		inner.clock += 1;

		let seq = inner.clock;

		inner.events.push((seq, event));

		seq
	}

	pub fn insert_many(&self, events: impl IntoIterator<Item = Event>) {
		for event in events {
			self.insert(event);
		}
	}

	pub fn len(&self) -> usize {
		self.lock().events.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Invalidates every continuation issued so far, like a backend dropping its scroll contexts.
	pub fn expire_cursors(&self) {
		let mut inner = self.lock();

		inner.expired_through = inner.clock;
		inner.clock += 1;
	}

	/// While set, every call fails with a connectivity error.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.lock().unavailable = unavailable;
	}

	/// Delays every call, for exercising caller-side timeouts.
	pub fn set_delay(&self, delay: Option<Duration>) {
		self.lock().delay = delay;
	}

	/// Number of store calls served so far, failed ones included.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::Relaxed)
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}

	async fn enter(&self) -> Result<()> {
		self.calls.fetch_add(1, Ordering::Relaxed);

		let (unavailable, delay) = {
			let inner = self.lock();

			(inner.unavailable, inner.delay)
		};

		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		if unavailable {
			return Err(Error::Sqlx(sqlx::Error::PoolTimedOut));
		}

		Ok(())
	}

	fn query_now(&self, query: &EventQuery) -> Result<EventPage> {
		query.filter.validate()?;

		if query.size == 0 {
			return Err(Error::InvalidArgument("size must be greater than zero.".to_string()));
		}

		let inner = self.lock();
		let (snapshot, total, after) = match query.cursor {
			Some(cursor) => {
				if cursor.snapshot <= inner.expired_through {
					return Err(Error::CursorExpired(format!(
						"Snapshot {} is no longer retained.",
						cursor.snapshot
					)));
				}

				(cursor.snapshot, cursor.total, cursor.after)
			},
			None => {
				let total = inner
					.events
					.iter()
					.filter(|(_, event)| query.filter.matches(event))
					.count() as u64;

				(inner.clock, total, None)
			},
		};
		let field = query.sort.field;
		let order = query.sort.order;
		let mut rows = inner
			.events
			.iter()
			.filter(|(seq, event)| *seq <= snapshot && query.filter.matches(event))
			.map(|(seq, event)| (SortPosition { value: field.value_of(event), seq: *seq }, event))
			.filter(|(position, _)| after.is_none_or(|after| is_beyond(*position, after, order)))
			.collect::<Vec<_>>();

		rows.sort_by(|(a, _), (b, _)| {
			let ordering = (a.value, a.seq).cmp(&(b.value, b.seq));

			match order {
				SortOrder::Asc => ordering,
				SortOrder::Desc => ordering.reverse(),
			}
		});

		let has_more = rows.len() > query.size;

		rows.truncate(query.size);

		let next = match (has_more, rows.last()) {
			(true, Some((position, _))) =>
				Some(StoreCursor { snapshot, total, after: Some(*position) }),
			_ => None,
		};
		let events = rows.into_iter().map(|(_, event)| event.clone()).collect();

		Ok(EventPage { events, total, next })
	}

	fn iterations_now(&self, query: &IterationQuery) -> Result<Vec<i64>> {
		query.filter.validate()?;

		let inner = self.lock();
		let distinct = inner
			.events
			.iter()
			.filter(|(_, event)| query.filter.matches(event))
			.map(|(_, event)| event.iter)
			.filter(|iter| match (query.after, query.order) {
				(None, _) => true,
				(Some(after), SortOrder::Asc) => *iter > after,
				(Some(after), SortOrder::Desc) => *iter < after,
			})
			.collect::<BTreeSet<_>>();
		let iters = match query.order {
			SortOrder::Asc => distinct.into_iter().take(query.limit).collect(),
			SortOrder::Desc => distinct.into_iter().rev().take(query.limit).collect(),
		};

		Ok(iters)
	}

	fn series_now(&self, filter: &EventFilter) -> Result<Vec<SeriesKey>> {
		filter.validate()?;

		let inner = self.lock();
		let keys = inner
			.events
			.iter()
			.filter(|(_, event)| filter.matches(event))
			.map(|(_, event)| series_key(event))
			.collect::<BTreeSet<_>>();

		Ok(keys.into_iter().collect())
	}

	fn series_ranges_now(&self, filter: &EventFilter, axis: SortField) -> Result<Vec<SeriesRange>> {
		filter.validate()?;

		let inner = self.lock();
		let mut ranges: BTreeMap<SeriesKey, (i64, i64, u64)> = BTreeMap::new();

		for (_, event) in inner.events.iter().filter(|(_, event)| filter.matches(event)) {
			let x = axis.value_of(event);
			let entry = ranges.entry(series_key(event)).or_insert((x, x, 0));

			entry.0 = entry.0.min(x);
			entry.1 = entry.1.max(x);
			entry.2 += 1;
		}

		Ok(ranges
			.into_iter()
			.map(|(series, (min, max, count))| SeriesRange { series, min, max, count })
			.collect())
	}
}
impl EventStore for MemoryEventStore {
	fn query<'a>(&'a self, query: &'a EventQuery) -> BoxFuture<'a, Result<EventPage>> {
		Box::pin(async move {
			self.enter().await?;

			self.query_now(query)
		})
	}

	fn iterations<'a>(&'a self, query: &'a IterationQuery) -> BoxFuture<'a, Result<Vec<i64>>> {
		Box::pin(async move {
			self.enter().await?;

			self.iterations_now(query)
		})
	}

	fn series<'a>(&'a self, filter: &'a EventFilter) -> BoxFuture<'a, Result<Vec<SeriesKey>>> {
		Box::pin(async move {
			self.enter().await?;

			self.series_now(filter)
		})
	}

	fn series_ranges<'a>(
		&'a self,
		filter: &'a EventFilter,
		axis: SortField,
	) -> BoxFuture<'a, Result<Vec<SeriesRange>>> {
		Box::pin(async move {
			self.enter().await?;

			self.series_ranges_now(filter, axis)
		})
	}
}

#[derive(Default)]
pub struct MemoryTaskCatalog {
	tasks: Mutex<Vec<TaskRecord>>,
}
impl MemoryTaskCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a task. An empty `company` marks it public.
	pub fn insert(
		&self,
		id: impl Into<String>,
		company: impl Into<String>,
		name: impl Into<String>,
	) {
		let record = TaskRecord {
			id: id.into(),
			company: company.into(),
			name: name.into(),
			status: "completed".to_string(),
		};

		self.tasks.lock().unwrap_or_else(|err| err.into_inner()).push(record);
	}
}
impl TaskCatalog for MemoryTaskCatalog {
	fn resolve<'a>(
		&'a self,
		company: &'a str,
		task_ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<TaskRecord>>> {
		Box::pin(async move {
			let tasks = self.tasks.lock().unwrap_or_else(|err| err.into_inner());

			Ok(tasks
				.iter()
				.filter(|task| task_ids.contains(&task.id))
				.filter(|task| task.company == company || task.company.is_empty())
				.cloned()
				.collect())
		})
	}
}

fn is_beyond(position: SortPosition, after: SortPosition, order: SortOrder) -> bool {
	let key = (position.value, position.seq);
	let after = (after.value, after.seq);

	match order {
		SortOrder::Asc => key > after,
		SortOrder::Desc => key < after,
	}
}

fn series_key(event: &Event) -> SeriesKey {
	SeriesKey {
		task: event.task.clone(),
		metric: event.metric.clone(),
		variant: event.variant.clone(),
	}
}
