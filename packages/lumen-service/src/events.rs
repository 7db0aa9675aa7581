use serde::{Deserialize, Serialize};

use lumen_domain::{Event, EventType, SortOrder};
use lumen_storage::store::{EventFilter, EventSort, SortField};

use crate::{
	CursorScope, LumenService, Result, event_company, require_task,
	scroll::{ScrollBatch, ScrollSpec},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEventsRequest {
	pub tasks: Vec<String>,
	#[serde(default)]
	pub event_type: Option<EventType>,
	#[serde(default)]
	pub order_by: SortField,
	#[serde(default)]
	pub order: SortOrder,
	#[serde(default)]
	pub batch_size: Option<u32>,
	#[serde(default)]
	pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarMetricDataRequest {
	pub task: String,
	pub metric: String,
	#[serde(default)]
	pub batch_size: Option<u32>,
	#[serde(default)]
	pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEventsResponse {
	pub events: Vec<Event>,
	pub returned: usize,
	pub total: u64,
	pub scroll_id: String,
	/// Set when the supplied token could not be continued and iteration started over.
	#[serde(default)]
	pub restarted: bool,
}
impl From<ScrollBatch> for TaskEventsResponse {
	fn from(batch: ScrollBatch) -> Self {
		Self {
			returned: batch.events.len(),
			events: batch.events,
			total: batch.total,
			scroll_id: batch.next_token,
			restarted: batch.restarted,
		}
	}
}

impl LumenService {
	/// Events of one or more tasks merged into a single scroll.
	pub async fn get_task_events(
		&self,
		company: &str,
		req: TaskEventsRequest,
	) -> Result<TaskEventsResponse> {
		let size = self.batch_size(req.batch_size)?;
		let tasks = self.resolve_tasks(company, &req.tasks).await?;
		let task_ids = tasks.iter().map(|task| task.id.clone()).collect::<Vec<_>>();
		let company = event_company(&tasks, company);
		let sort = EventSort::new(req.order_by, req.order);
		let scope = CursorScope::new("get_task_events", &company, &task_ids, req.event_type)
			.with_fingerprint(&sort);
		let mut filter = EventFilter::new(company.clone(), task_ids);

		filter.event_type = req.event_type;

		let spec = ScrollSpec { operation: "get_task_events", scope: &scope, filter, sort, size };

		Ok(self.scroll(spec, req.scroll_id.as_deref()).await?.into())
	}

	/// Scalar events of a single metric, newest iteration first.
	pub async fn get_scalar_metric_data(
		&self,
		company: &str,
		req: ScalarMetricDataRequest,
	) -> Result<TaskEventsResponse> {
		let size = self.batch_size(req.batch_size)?;
		let metric = req.metric.trim();

		if metric.is_empty() {
			return Err(crate::Error::invalid_parameter("metric is required."));
		}

		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let task_ids = vec![task.id.clone()];
		let scope = CursorScope::new(
			"get_scalar_metric_data",
			&task.company,
			&task_ids,
			Some(EventType::Scalar),
		)
		.with_fingerprint(&metric);
		let filter = EventFilter::new(task.company.clone(), task_ids)
			.with_type(EventType::Scalar)
			.with_metric(metric);
		let spec = ScrollSpec {
			operation: "get_scalar_metric_data",
			scope: &scope,
			filter,
			sort: EventSort::new(SortField::Iter, SortOrder::Desc),
			size,
		};

		Ok(self.scroll(spec, req.scroll_id.as_deref()).await?.into())
	}
}
