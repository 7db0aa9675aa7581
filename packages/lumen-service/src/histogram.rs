//! Scalar histograms. Raw samples are streamed from the store page by page into per-series
//! bucket accumulators, so memory stays bounded by the bucket count.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use lumen_domain::{
	EventType, ScalarKey, SortOrder,
	histogram::{self, AxisRange, BucketLayout, SeriesAccumulator},
};
use lumen_storage::store::{EventFilter, EventQuery, EventSort, SeriesRange, SortField};

use crate::{Error, LumenService, Result, event_company, require_task};

/// `metric -> variant -> points`.
pub type MetricSeries = BTreeMap<String, BTreeMap<String, Vec<HistogramPoint>>>;

type Accumulators = HashMap<String, HashMap<String, HashMap<String, SeriesAccumulator>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramRequest {
	pub task: String,
	#[serde(default)]
	pub samples: Option<i64>,
	#[serde(default)]
	pub key: ScalarKey,
	/// Restricts the histogram to these metrics when non-empty.
	#[serde(default)]
	pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareHistogramsRequest {
	pub tasks: Vec<String>,
	#[serde(default)]
	pub samples: Option<i64>,
	#[serde(default)]
	pub key: ScalarKey,
}

/// Bucket key: a raw number, or an RFC 3339 string for `iso_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValue {
	Number(i64),
	Time(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramPoint {
	pub x: AxisValue,
	pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramResponse {
	pub metrics: MetricSeries,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistogram {
	pub name: String,
	pub metrics: MetricSeries,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedTask {
	pub task: String,
	pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareHistogramsResponse {
	pub tasks: BTreeMap<String, TaskHistogram>,
	pub unresolved: Vec<UnresolvedTask>,
}

struct Aggregation<'a> {
	operation: &'static str,
	company: String,
	tasks: Vec<String>,
	metrics: &'a [String],
	samples: u32,
	key: ScalarKey,
	/// Series sharing `(metric, variant)` across tasks share one bucket layout.
	align: bool,
}

impl LumenService {
	pub async fn scalar_metrics_iter_histogram(
		&self,
		company: &str,
		req: HistogramRequest,
	) -> Result<HistogramResponse> {
		let samples = self.histogram_samples(req.samples);
		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let mut per_task = self
			.aggregate(Aggregation {
				operation: "scalar_metrics_iter_histogram",
				company: task.company.clone(),
				tasks: vec![task.id.clone()],
				metrics: &req.metrics,
				samples,
				key: req.key,
				align: false,
			})
			.await?;

		Ok(HistogramResponse { metrics: per_task.remove(&task.id).unwrap_or_default() })
	}

	/// Per-task histograms over a shared x domain. Unknown ids are reported next to the result
	/// instead of failing the request.
	pub async fn compare_scalar_histograms(
		&self,
		company: &str,
		req: CompareHistogramsRequest,
	) -> Result<CompareHistogramsResponse> {
		let limit = self.cfg.events.multi_task_histogram_limit as usize;

		if req.tasks.is_empty() || req.tasks.len() > limit {
			return Err(Error::invalid_parameter(format!(
				"Between 1 and {limit} tasks may be compared."
			)));
		}

		let samples = self.histogram_samples(req.samples);
		let (found, missing) = self.resolve_tasks_partial(company, &req.tasks).await?;
		let unresolved = missing
			.into_iter()
			.map(|task| UnresolvedTask { message: format!("Task {task:?} not found."), task })
			.collect::<Vec<_>>();

		if !unresolved.is_empty() {
			tracing::warn!(
				unresolved = ?unresolved.iter().map(|item| &item.task).collect::<Vec<_>>(),
				"Comparing histograms without unresolved tasks."
			);
		}
		if found.is_empty() {
			return Ok(CompareHistogramsResponse { tasks: BTreeMap::new(), unresolved });
		}

		let mut per_task = self
			.aggregate(Aggregation {
				operation: "compare_scalar_histograms",
				company: event_company(&found, company),
				tasks: found.iter().map(|task| task.id.clone()).collect(),
				metrics: &[],
				samples,
				key: req.key,
				align: true,
			})
			.await?;
		let tasks = found
			.into_iter()
			.map(|task| {
				let metrics = per_task.remove(&task.id).unwrap_or_default();

				(task.id, TaskHistogram { name: task.name, metrics })
			})
			.collect();

		Ok(CompareHistogramsResponse { tasks, unresolved })
	}

	fn histogram_samples(&self, requested: Option<i64>) -> u32 {
		let events = &self.cfg.events;

		histogram::clamp_samples(
			requested,
			events.default_histogram_samples,
			events.max_histogram_samples,
		)
	}

	async fn aggregate(&self, agg: Aggregation<'_>) -> Result<BTreeMap<String, MetricSeries>> {
		let joined = agg.tasks.join(",");
		let axis = SortField::from(agg.key);
		let mut filter = EventFilter::new(agg.company, agg.tasks).with_type(EventType::Scalar);

		filter.metrics = agg.metrics.to_vec();

		let ranges =
			self.store_call(agg.operation, &joined, self.store.series_ranges(&filter, axis)).await?;

		if ranges.is_empty() {
			return Ok(BTreeMap::new());
		}

		let mut accumulators = build_accumulators(&ranges, agg.samples, agg.align);
		let mut query = EventQuery {
			filter,
			sort: EventSort::new(axis, SortOrder::Asc),
			size: self.cfg.events.histogram_scan_batch as usize,
			cursor: None,
		};
		let mut scanned = 0_u64;

		loop {
			let page = self.store_call(agg.operation, &joined, self.store.query(&query)).await?;

			scanned += page.events.len() as u64;

			for event in &page.events {
				let Some(value) = event.scalar_value() else { continue };
				let Some(acc) = accumulators
					.get_mut(event.task.as_str())
					.and_then(|metrics| metrics.get_mut(event.metric.as_str()))
					.and_then(|variants| variants.get_mut(event.variant.as_str()))
				else {
					continue;
				};

				acc.push(agg.key.axis_value(event), value);
			}

			match page.next {
				Some(cursor) => query.cursor = Some(cursor),
				None => break,
			}
		}

		tracing::debug!(
			operation = agg.operation,
			task = %joined,
			series = ranges.len(),
			scanned,
			samples = agg.samples,
			"Aggregated scalar histogram."
		);

		Ok(finish(accumulators, agg.key))
	}
}

fn build_accumulators(ranges: &[SeriesRange], samples: u32, align: bool) -> Accumulators {
	let mut shared: HashMap<(&str, &str), AxisRange> = HashMap::new();

	if align {
		for range in ranges {
			let axis = AxisRange::new(range.min, range.max);

			shared
				.entry((range.series.metric.as_str(), range.series.variant.as_str()))
				.and_modify(|current| *current = current.union(axis))
				.or_insert(axis);
		}
	}

	let mut accumulators = Accumulators::new();

	for range in ranges {
		let series = &range.series;
		let axis = shared
			.get(&(series.metric.as_str(), series.variant.as_str()))
			.copied()
			.unwrap_or_else(|| AxisRange::new(range.min, range.max));

		accumulators
			.entry(series.task.clone())
			.or_default()
			.entry(series.metric.clone())
			.or_default()
			.insert(
				series.variant.clone(),
				SeriesAccumulator::new(BucketLayout::for_range(axis, samples)),
			);
	}

	accumulators
}

fn finish(accumulators: Accumulators, key: ScalarKey) -> BTreeMap<String, MetricSeries> {
	let mut out = BTreeMap::new();

	for (task, metrics) in accumulators {
		let mut series = MetricSeries::new();

		for (metric, variants) in metrics {
			for (variant, acc) in variants {
				if acc.is_empty() {
					continue;
				}

				let points = acc
					.finish()
					.into_iter()
					.map(|point| HistogramPoint { x: axis_value(point.x, key), y: point.y })
					.collect();

				series.entry(metric.clone()).or_insert_with(BTreeMap::new).insert(variant, points);
			}
		}

		out.insert(task, series);
	}

	out
}

fn axis_value(x: i64, key: ScalarKey) -> AxisValue {
	if key != ScalarKey::IsoTime {
		return AxisValue::Number(x);
	}

	OffsetDateTime::from_unix_timestamp_nanos(i128::from(x) * 1_000_000)
		.ok()
		.and_then(|time| time.format(&Rfc3339).ok())
		.map(AxisValue::Time)
		.unwrap_or(AxisValue::Number(x))
}
