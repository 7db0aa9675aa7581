use sqlx::{Postgres, QueryBuilder};

use lumen_domain::{SortOrder, event::EventType};

use crate::{
	Result,
	db::Db,
	models::{EventRow, SeriesRangeRow},
	store::{
		BoxFuture, EventFilter, EventPage, EventQuery, EventStore, IterationQuery, SeriesKey,
		SeriesRange, SortField, SortPosition, StoreCursor,
	},
};

const EVENT_COLUMNS: &str = "seq, company, task, type, metric, variant, iter, timestamp, payload";

/// Postgres-backed event index.
///
/// Scrolling is point-in-time: the first page pins `max(seq)` as the snapshot and every later
/// page filters on it, continuing from the last `(sort column, seq)` pair instead of an offset.
///
/// The snapshot follows sequence allocation, not commit order. A writer that drew a lower `seq`
/// but commits after the first page can still surface on a later page without being counted in
/// the carried `total`. Ingestion that commits in `seq` order keeps scrolls exact.
pub struct PgEventStore {
	db: Db,
}
impl PgEventStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}

	async fn query_page(&self, query: &EventQuery) -> Result<EventPage> {
		query.filter.validate()?;

		let (snapshot, total) = match query.cursor {
			Some(cursor) => (cursor.snapshot, cursor.total),
			None => {
				let snapshot = self.current_snapshot().await?;
				let total = self.count(&query.filter, snapshot).await?;

				(snapshot, total)
			},
		};
		let sort = query.sort;
		let column = sort.field.column();
		let mut builder = QueryBuilder::<Postgres>::new(format!(
			"SELECT {EVENT_COLUMNS} FROM task_events WHERE seq <= "
		));

		builder.push_bind(snapshot);

		push_filter(&mut builder, &query.filter);

		if let Some(after) = query.cursor.and_then(|cursor| cursor.after) {
			let cmp = match sort.order {
				SortOrder::Asc => ">",
				SortOrder::Desc => "<",
			};

			builder.push(format!(" AND ({column}, seq) {cmp} ("));
			builder.push_bind(after.value);
			builder.push(", ");
			builder.push_bind(after.seq);
			builder.push(")");
		}

		let direction = sort.order.as_sql();

		builder.push(format!(" ORDER BY {column} {direction}, seq {direction} LIMIT "));
		// One extra row tells us whether another page exists.
		builder.push_bind(query.size as i64 + 1);

		let mut rows: Vec<EventRow> = builder.build_query_as().fetch_all(&self.db.pool).await?;
		let has_more = rows.len() > query.size;

		rows.truncate(query.size);

		let next = match rows.last() {
			Some(last) if has_more => Some(StoreCursor {
				snapshot,
				total,
				after: Some(SortPosition {
					value: match sort.field {
						SortField::Iter => last.iter,
						SortField::Timestamp => last.timestamp,
					},
					seq: last.seq,
				}),
			}),
			_ => None,
		};
		let events = rows.into_iter().map(EventRow::into_event).collect::<Result<Vec<_>>>()?;

		Ok(EventPage { events, total, next })
	}

	async fn current_snapshot(&self) -> Result<i64> {
		let snapshot: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM task_events")
			.fetch_one(&self.db.pool)
			.await?;

		Ok(snapshot)
	}

	async fn count(&self, filter: &EventFilter, snapshot: i64) -> Result<u64> {
		let mut builder =
			QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM task_events WHERE seq <= ");

		builder.push_bind(snapshot);

		push_filter(&mut builder, filter);

		let total: i64 = builder.build_query_scalar().fetch_one(&self.db.pool).await?;

		Ok(total.max(0) as u64)
	}

	async fn distinct_iterations(&self, query: &IterationQuery) -> Result<Vec<i64>> {
		query.filter.validate()?;

		let mut builder =
			QueryBuilder::<Postgres>::new("SELECT DISTINCT iter FROM task_events WHERE TRUE");

		push_filter(&mut builder, &query.filter);

		if let Some(after) = query.after {
			builder.push(match query.order {
				SortOrder::Asc => " AND iter > ",
				SortOrder::Desc => " AND iter < ",
			});
			builder.push_bind(after);
		}

		builder.push(format!(" ORDER BY iter {} LIMIT ", query.order.as_sql()));
		builder.push_bind(query.limit as i64);

		let iters: Vec<i64> = builder.build_query_scalar().fetch_all(&self.db.pool).await?;

		Ok(iters)
	}

	async fn distinct_series(&self, filter: &EventFilter) -> Result<Vec<SeriesKey>> {
		filter.validate()?;

		let mut builder = QueryBuilder::<Postgres>::new(
			"SELECT DISTINCT task, metric, variant FROM task_events WHERE TRUE",
		);

		push_filter(&mut builder, filter);

		builder.push(" ORDER BY task, metric, variant");

		let rows: Vec<(String, String, String)> =
			builder.build_query_as().fetch_all(&self.db.pool).await?;

		Ok(rows
			.into_iter()
			.map(|(task, metric, variant)| SeriesKey { task, metric, variant })
			.collect())
	}

	async fn ranges(&self, filter: &EventFilter, axis: SortField) -> Result<Vec<SeriesRange>> {
		filter.validate()?;

		let column = axis.column();
		let mut builder = QueryBuilder::<Postgres>::new(format!(
			"SELECT task, metric, variant, MIN({column}) AS min_x, MAX({column}) AS max_x, \
			 COUNT(*) AS samples FROM task_events WHERE TRUE"
		));

		push_filter(&mut builder, filter);

		builder.push(" GROUP BY task, metric, variant ORDER BY task, metric, variant");

		let rows: Vec<SeriesRangeRow> = builder.build_query_as().fetch_all(&self.db.pool).await?;

		Ok(rows
			.into_iter()
			.map(|row| SeriesRange {
				series: SeriesKey { task: row.task, metric: row.metric, variant: row.variant },
				min: row.min_x,
				max: row.max_x,
				count: row.samples.max(0) as u64,
			})
			.collect())
	}
}
impl EventStore for PgEventStore {
	fn query<'a>(&'a self, query: &'a EventQuery) -> BoxFuture<'a, Result<EventPage>> {
		Box::pin(self.query_page(query))
	}

	fn iterations<'a>(&'a self, query: &'a IterationQuery) -> BoxFuture<'a, Result<Vec<i64>>> {
		Box::pin(self.distinct_iterations(query))
	}

	fn series<'a>(&'a self, filter: &'a EventFilter) -> BoxFuture<'a, Result<Vec<SeriesKey>>> {
		Box::pin(self.distinct_series(filter))
	}

	fn series_ranges<'a>(
		&'a self,
		filter: &'a EventFilter,
		axis: SortField,
	) -> BoxFuture<'a, Result<Vec<SeriesRange>>> {
		Box::pin(self.ranges(filter, axis))
	}
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
	builder.push(" AND company = ");
	builder.push_bind(filter.company.clone());
	builder.push(" AND task = ANY(");
	builder.push_bind(filter.tasks.clone());
	builder.push(")");

	if let Some(event_type) = filter.event_type {
		builder.push(" AND type = ");
		builder.push_bind(EventType::as_str(event_type));
	}
	if !filter.metrics.is_empty() {
		builder.push(" AND metric = ANY(");
		builder.push_bind(filter.metrics.clone());
		builder.push(")");
	}
	if !filter.variants.is_empty() {
		builder.push(" AND variant = ANY(");
		builder.push_bind(filter.variants.clone());
		builder.push(")");
	}
	if let Some(min) = filter.iter_min {
		builder.push(" AND iter >= ");
		builder.push_bind(min);
	}
	if let Some(max) = filter.iter_max {
		builder.push(" AND iter <= ");
		builder.push_bind(max);
	}
	if let Some(after) = filter.timestamp_after {
		builder.push(" AND timestamp > ");
		builder.push_bind(after);
	}
	if let Some(before) = filter.timestamp_before {
		builder.push(" AND timestamp < ");
		builder.push_bind(before);
	}
	if !filter.series_floors.is_empty() {
		let floors = &filter.series_floors;

		builder.push(" AND EXISTS (SELECT 1 FROM UNNEST(");
		builder.push_bind(floors.iter().map(|f| f.series.task.clone()).collect::<Vec<_>>());
		builder.push(", ");
		builder.push_bind(floors.iter().map(|f| f.series.metric.clone()).collect::<Vec<_>>());
		builder.push(", ");
		builder.push_bind(floors.iter().map(|f| f.series.variant.clone()).collect::<Vec<_>>());
		builder.push(", ");
		builder.push_bind(floors.iter().map(|f| f.iter_min).collect::<Vec<_>>());
		builder.push(
			") AS bound(task, metric, variant, iter_min) \
			 WHERE bound.task = task_events.task AND bound.metric = task_events.metric \
			 AND bound.variant = task_events.variant AND task_events.iter >= bound.iter_min)",
		);
	}
}
