pub mod cursor;
pub mod debug_images;
pub mod events;
pub mod histogram;
pub mod logs;
pub mod metrics;
pub mod plots;
pub mod scroll;

mod error;

pub use cursor::{CursorCodec, CursorScope, DecodeError, Envelope, Resume};
pub use debug_images::{
	DebugImagesRequest, DebugImagesResponse, GroupCursor, IterationEvents, MetricEvents,
	NavigationState, TaskMetric,
};
pub use error::{Error, Result};
pub use events::{ScalarMetricDataRequest, TaskEventsRequest, TaskEventsResponse};
pub use histogram::{
	AxisValue, CompareHistogramsRequest, CompareHistogramsResponse, HistogramPoint,
	HistogramRequest, HistogramResponse, MetricSeries, TaskHistogram, UnresolvedTask,
};
pub use logs::{
	LogDownload, LogDownloadRequest, LogLineType, LogScrollFrom, ScrollTaskLogRequest,
	TaskLogRequest, TaskLogResponse,
};
pub use metrics::{
	LatestScalarValuesRequest, LatestScalarValuesResponse, LatestMetric, LatestVariant,
	MetricsAndVariantsRequest, MetricsAndVariantsResponse, TaskMetrics, TaskMetricsRequest,
	TaskMetricsResponse, VectorHistogramRequest, VectorHistogramResponse,
};
pub use plots::{
	FlatDebugImagesRequest, FlatDebugImagesResponse, PlotListing, TopPlotsRequest,
	TopPlotsResponse,
};
pub use scroll::{ScrollBatch, ScrollState};

use std::{collections::BTreeSet, future::Future, sync::Arc, time::Duration};

use lumen_config::Config;
use lumen_storage::store::{EventStore, TaskCatalog, TaskRecord};

/// The retrieval and aggregation engine. Handles are constructed once at startup and shared by
/// every request; no state is kept between calls beyond what travels in continuation tokens.
pub struct LumenService {
	pub cfg: Config,
	pub store: Arc<dyn EventStore>,
	pub tasks: Arc<dyn TaskCatalog>,
	codec: CursorCodec,
}
impl LumenService {
	pub fn new(cfg: Config, store: Arc<dyn EventStore>, tasks: Arc<dyn TaskCatalog>) -> Self {
		let codec = CursorCodec::new(&cfg.cursor.secret, cfg.cursor.ttl_seconds);

		Self { cfg, store, tasks, codec }
	}

	pub fn codec(&self) -> &CursorCodec {
		&self.codec
	}

	fn query_timeout(&self) -> Duration {
		Duration::from_millis(self.cfg.storage.postgres.query_timeout_ms)
	}

	/// Bounds a store round trip. Only the timeout is mapped here so callers can still react to
	/// adapter errors such as an expired cursor.
	pub(crate) async fn timed<T, F>(
		&self,
		operation: &'static str,
		task: &str,
		fut: F,
	) -> Result<lumen_storage::Result<T>>
	where
		F: Future<Output = lumen_storage::Result<T>>,
	{
		let timeout = self.query_timeout();

		match tokio::time::timeout(timeout, fut).await {
			Ok(result) => Ok(result),
			Err(_) => {
				tracing::warn!(
					operation,
					task,
					timeout_ms = timeout.as_millis() as u64,
					"Store call timed out."
				);

				Err(Error::StoreUnavailable {
					operation,
					task: task.to_string(),
					message: format!("Timed out after {} ms.", timeout.as_millis()),
				})
			},
		}
	}

	pub(crate) async fn store_call<T, F>(
		&self,
		operation: &'static str,
		task: &str,
		fut: F,
	) -> Result<T>
	where
		F: Future<Output = lumen_storage::Result<T>>,
	{
		self.timed(operation, task, fut)
			.await?
			.map_err(|err| Error::from_store(operation, task, err))
	}

	/// Resolves one task. An unknown id aborts the call.
	pub(crate) async fn resolve_task(&self, company: &str, task: &str) -> Result<TaskRecord> {
		let task = require_task(task)?;
		let ids = [task.to_string()];
		let mut found =
			self.store_call("resolve_task", task, self.tasks.resolve(company, &ids)).await?;

		match found.pop() {
			Some(record) => Ok(record),
			None => Err(Error::InvalidReference { message: format!("Task {task:?} not found.") }),
		}
	}

	/// Resolves a task set merged into one stream. Every unknown id is listed in the error.
	pub(crate) async fn resolve_tasks(
		&self,
		company: &str,
		task_ids: &[String],
	) -> Result<Vec<TaskRecord>> {
		let (found, missing) = self.resolve_tasks_partial(company, task_ids).await?;

		if !missing.is_empty() {
			return Err(Error::InvalidReference {
				message: format!("Tasks not found: {}.", missing.join(", ")),
			});
		}

		Ok(found)
	}

	/// Resolves a task set, returning the resolved records in request order and the unknown ids.
	pub(crate) async fn resolve_tasks_partial(
		&self,
		company: &str,
		task_ids: &[String],
	) -> Result<(Vec<TaskRecord>, Vec<String>)> {
		let ids = unique_task_ids(task_ids)?;
		let joined = ids.join(",");
		let records =
			self.store_call("resolve_tasks", &joined, self.tasks.resolve(company, &ids)).await?;
		let mut found = Vec::with_capacity(records.len());
		let mut missing = Vec::new();

		for id in &ids {
			match records.iter().find(|record| &record.id == id) {
				Some(record) => found.push(record.clone()),
				None => missing.push(id.clone()),
			}
		}

		let companies = found.iter().map(|record| record.company.as_str()).collect::<BTreeSet<_>>();

		if companies.len() > 1 {
			return Err(Error::invalid_parameter("only tasks from the same company are supported"));
		}

		Ok((found, missing))
	}

	/// Clamps a batch size into `[1, max_batch_size]`, substituting the default when absent.
	pub(crate) fn batch_size(&self, requested: Option<u32>) -> Result<usize> {
		let events = &self.cfg.events;

		match requested {
			None => Ok(events.default_batch_size as usize),
			Some(0) => Err(Error::invalid_parameter("batch_size must be greater than zero.")),
			Some(size) => Ok(size.min(events.max_batch_size) as usize),
		}
	}

	/// Validates an iteration count for the top-iteration listings.
	pub(crate) fn iteration_count(&self, requested: Option<u32>) -> Result<usize> {
		match requested {
			None => Ok(1),
			Some(0) => Err(Error::invalid_parameter("iters must be greater than zero.")),
			Some(iters) => Ok(iters.min(self.cfg.events.max_debug_image_iters) as usize),
		}
	}
}

pub(crate) fn require_task(task: &str) -> Result<&str> {
	let task = task.trim();

	if task.is_empty() {
		return Err(Error::invalid_parameter("task is required."));
	}

	Ok(task)
}

/// Trims and de-duplicates task ids, keeping first-seen order.
pub(crate) fn unique_task_ids(task_ids: &[String]) -> Result<Vec<String>> {
	let mut seen = BTreeSet::new();
	let mut ids = Vec::with_capacity(task_ids.len());

	for id in task_ids {
		let id = require_task(id)?;

		if seen.insert(id.to_string()) {
			ids.push(id.to_string());
		}
	}

	if ids.is_empty() {
		return Err(Error::invalid_parameter("At least one task is required."));
	}

	Ok(ids)
}

/// The company the events of a resolved task set live under. Public tasks live under the empty
/// company.
pub(crate) fn event_company(tasks: &[TaskRecord], fallback: &str) -> String {
	tasks.first().map(|task| task.company.clone()).unwrap_or_else(|| fallback.to_string())
}
