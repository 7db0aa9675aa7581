use std::collections::BTreeMap;

use futures::future;
use serde::{Deserialize, Serialize};

use lumen_domain::{EventPayload, EventType, SortOrder};
use lumen_storage::store::{EventFilter, EventQuery, EventSort, SeriesKey, SortField};

use crate::{Error, LumenService, Result, event_company, require_task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetricsRequest {
	pub tasks: Vec<String>,
	#[serde(default)]
	pub event_type: Option<EventType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetrics {
	pub task: String,
	pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetricsResponse {
	pub metrics: Vec<TaskMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsAndVariantsRequest {
	pub task: String,
	pub event_type: EventType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsAndVariantsResponse {
	/// `metric -> sorted variants`.
	pub metrics: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHistogramRequest {
	pub task: String,
	pub metric: String,
	pub variant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHistogramResponse {
	pub iterations: Vec<i64>,
	pub vectors: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestScalarValuesRequest {
	pub task: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestVariant {
	pub name: String,
	pub value: f64,
	pub iter: i64,
	pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestMetric {
	pub name: String,
	pub variants: Vec<LatestVariant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestScalarValuesResponse {
	pub metrics: Vec<LatestMetric>,
	pub last_iter: i64,
	pub last_timestamp: i64,
	pub name: String,
	pub status: String,
}

impl LumenService {
	pub async fn get_task_metrics(
		&self,
		company: &str,
		req: TaskMetricsRequest,
	) -> Result<TaskMetricsResponse> {
		let tasks = self.resolve_tasks(company, &req.tasks).await?;
		let task_ids = tasks.iter().map(|task| task.id.clone()).collect::<Vec<_>>();
		let mut filter = EventFilter::new(event_company(&tasks, company), task_ids.clone());

		filter.event_type = req.event_type;

		let series = self
			.store_call("get_task_metrics", &task_ids.join(","), self.store.series(&filter))
			.await?;
		let metrics = task_ids
			.into_iter()
			.map(|task| {
				let mut metrics = series
					.iter()
					.filter(|key| key.task == task)
					.map(|key| key.metric.clone())
					.collect::<Vec<_>>();

				metrics.sort();
				metrics.dedup();

				TaskMetrics { task, metrics }
			})
			.collect();

		Ok(TaskMetricsResponse { metrics })
	}

	pub async fn get_metrics_and_variants(
		&self,
		company: &str,
		req: MetricsAndVariantsRequest,
	) -> Result<MetricsAndVariantsResponse> {
		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let filter =
			EventFilter::new(task.company.clone(), vec![task.id.clone()]).with_type(req.event_type);
		let series = self
			.store_call("get_metrics_and_variants", &task.id, self.store.series(&filter))
			.await?;
		let mut metrics: BTreeMap<String, Vec<String>> = BTreeMap::new();

		for key in series {
			metrics.entry(key.metric).or_default().push(key.variant);
		}
		for variants in metrics.values_mut() {
			variants.sort();
			variants.dedup();
		}

		Ok(MetricsAndVariantsResponse { metrics })
	}

	pub async fn vector_metrics_iter_histogram(
		&self,
		company: &str,
		req: VectorHistogramRequest,
	) -> Result<VectorHistogramResponse> {
		if req.metric.trim().is_empty() || req.variant.trim().is_empty() {
			return Err(Error::invalid_parameter("metric and variant are required."));
		}

		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let query = EventQuery {
			filter: EventFilter::new(task.company.clone(), vec![task.id.clone()])
				.with_type(EventType::Vector)
				.with_metric(req.metric.trim())
				.with_variant(req.variant.trim()),
			sort: EventSort::new(SortField::Iter, SortOrder::Asc),
			size: self.cfg.events.plots_fetch_size as usize,
			cursor: None,
		};
		let page = self
			.store_call("vector_metrics_iter_histogram", &task.id, self.store.query(&query))
			.await?;
		let mut iterations = Vec::with_capacity(page.events.len());
		let mut vectors = Vec::with_capacity(page.events.len());

		for event in page.events {
			if let EventPayload::Vector(vector) = event.payload {
				iterations.push(event.iter);
				vectors.push(vector.values);
			}
		}

		Ok(VectorHistogramResponse { iterations, vectors })
	}

	/// The newest scalar value of every series of a task, fetched concurrently per series.
	pub async fn get_task_latest_scalar_values(
		&self,
		company: &str,
		req: LatestScalarValuesRequest,
	) -> Result<LatestScalarValuesResponse> {
		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let filter = EventFilter::new(task.company.clone(), vec![task.id.clone()])
			.with_type(EventType::Scalar);
		let series = self
			.store_call("get_task_latest_scalar_values", &task.id, self.store.series(&filter))
			.await?;
		let latest =
			future::try_join_all(series.into_iter().map(|key| self.latest_value(&filter, key)))
				.await?;
		let mut metrics: BTreeMap<String, Vec<LatestVariant>> = BTreeMap::new();
		let mut last_iter = 0;
		let mut last_timestamp = 0;

		for (key, value) in latest.into_iter().filter_map(|(key, value)| value.map(|v| (key, v))) {
			last_iter = last_iter.max(value.iter);
			last_timestamp = last_timestamp.max(value.timestamp);

			metrics.entry(key.metric).or_default().push(value);
		}

		Ok(LatestScalarValuesResponse {
			metrics: metrics
				.into_iter()
				.map(|(name, variants)| LatestMetric { name, variants })
				.collect(),
			last_iter,
			last_timestamp,
			name: task.name,
			status: task.status,
		})
	}

	async fn latest_value(
		&self,
		filter: &EventFilter,
		key: SeriesKey,
	) -> Result<(SeriesKey, Option<LatestVariant>)> {
		let query = EventQuery {
			filter: filter
				.clone()
				.with_metric(key.metric.clone())
				.with_variant(key.variant.clone()),
			sort: EventSort::new(SortField::Iter, SortOrder::Desc),
			size: 1,
			cursor: None,
		};
		let page = self
			.store_call("get_task_latest_scalar_values", &key.task, self.store.query(&query))
			.await?;
		let value = page.events.into_iter().next().and_then(|event| {
			event.scalar_value().map(|value| LatestVariant {
				name: key.variant.clone(),
				value,
				iter: event.iter,
				timestamp: event.timestamp,
			})
		});

		Ok((key, value))
	}
}
