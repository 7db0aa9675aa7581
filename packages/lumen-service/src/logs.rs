use serde::{Deserialize, Serialize};

use lumen_domain::{
	EventType, SortOrder,
	log_format::{self, LineFormat},
};
use lumen_storage::store::{EventFilter, EventQuery, EventSort, SortField};

use crate::{
	CursorScope, Error, LumenService, Result, TaskEventsResponse, require_task,
	scroll::ScrollSpec,
};

pub type TaskLogResponse = TaskEventsResponse;

/// Timestamp-navigated log listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogRequest {
	pub task: String,
	#[serde(default)]
	pub batch_size: Option<u32>,
	#[serde(default = "default_navigate_earlier")]
	pub navigate_earlier: bool,
	/// Exclusive bound; events strictly older (or newer) than this are returned.
	#[serde(default)]
	pub from_timestamp: Option<i64>,
	/// Output order. Defaults to the navigation direction.
	#[serde(default)]
	pub order: Option<SortOrder>,
	#[serde(default)]
	pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogScrollFrom {
	#[default]
	Head,
	Tail,
}

/// Legacy scroll listing starting from either end of the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollTaskLogRequest {
	pub task: String,
	#[serde(default)]
	pub order: Option<SortOrder>,
	#[serde(default)]
	pub from: LogScrollFrom,
	#[serde(default)]
	pub batch_size: Option<u32>,
	#[serde(default)]
	pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLineType {
	#[default]
	Json,
	Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDownloadRequest {
	pub task: String,
	#[serde(default)]
	pub line_type: LogLineType,
	#[serde(default)]
	pub line_format: Option<String>,
}

enum LineRenderer {
	Json,
	Text(LineFormat),
}

/// Pull-based download of a complete task log in ascending time order. Each call to
/// [`LogDownload::next_chunk`] fetches one store page and renders it.
pub struct LogDownload {
	task: String,
	query: EventQuery,
	renderer: LineRenderer,
	done: bool,
	lines: u64,
}
impl LogDownload {
	pub fn filename(&self) -> String {
		format!("task_{}.log", self.task)
	}

	pub async fn next_chunk(&mut self, service: &LumenService) -> Result<Option<String>> {
		if self.done {
			return Ok(None);
		}

		let page = service
			.store_call("download_task_log", &self.task, service.store.query(&self.query))
			.await?;

		match page.next {
			Some(cursor) => self.query.cursor = Some(cursor),
			None => self.done = true,
		}

		if page.events.is_empty() {
			self.done = true;

			tracing::debug!(task = %self.task, lines = self.lines, "Log download finished.");

			return Ok(None);
		}

		let mut chunk = String::new();

		for event in &page.events {
			match &self.renderer {
				LineRenderer::Json => chunk.push_str(&log_format::json_line(event).map_err(|err| {
					Error::Internal { message: format!("Failed to render log line: {err}") }
				})?),
				LineRenderer::Text(format) => chunk.push_str(&format.render(event)),
			}
		}

		self.lines += page.events.len() as u64;

		if self.done {
			tracing::debug!(task = %self.task, lines = self.lines, "Log download finished.");
		}

		Ok(Some(chunk))
	}

	/// Drains the download into one string.
	pub async fn collect(mut self, service: &LumenService) -> Result<String> {
		let mut out = String::new();

		while let Some(chunk) = self.next_chunk(service).await? {
			out.push_str(&chunk);
		}

		Ok(out)
	}
}

impl LumenService {
	pub async fn get_task_log(
		&self,
		company: &str,
		req: TaskLogRequest,
	) -> Result<TaskLogResponse> {
		let size = self.batch_size(req.batch_size)?;
		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let task_ids = vec![task.id.clone()];
		let scroll_order = if req.navigate_earlier { SortOrder::Desc } else { SortOrder::Asc };
		let scope = CursorScope::new("get_task_log", &task.company, &task_ids, Some(EventType::Log))
			.with_fingerprint(&(req.navigate_earlier, req.from_timestamp));
		let mut filter = EventFilter::new(task.company.clone(), task_ids).with_type(EventType::Log);

		if let Some(from) = req.from_timestamp {
			if req.navigate_earlier {
				filter.timestamp_before = Some(from);
			} else {
				filter.timestamp_after = Some(from);
			}
		}

		let spec = ScrollSpec {
			operation: "get_task_log",
			scope: &scope,
			filter,
			sort: EventSort::new(SortField::Timestamp, scroll_order),
			size,
		};
		let mut batch = self.scroll(spec, req.scroll_id.as_deref()).await?;

		if req.order.is_some_and(|order| order != scroll_order) {
			batch.events.reverse();
		}

		Ok(batch.into())
	}

	pub async fn scroll_task_log(
		&self,
		company: &str,
		req: ScrollTaskLogRequest,
	) -> Result<TaskLogResponse> {
		let size = self.batch_size(req.batch_size)?;
		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let task_ids = vec![task.id.clone()];
		let scroll_order = match req.from {
			LogScrollFrom::Head => SortOrder::Asc,
			LogScrollFrom::Tail => SortOrder::Desc,
		};
		let scope =
			CursorScope::new("scroll_task_log", &task.company, &task_ids, Some(EventType::Log))
				.with_fingerprint(&req.from);
		let spec = ScrollSpec {
			operation: "scroll_task_log",
			scope: &scope,
			filter: EventFilter::new(task.company.clone(), task_ids).with_type(EventType::Log),
			sort: EventSort::new(SortField::Timestamp, scroll_order),
			size,
		};
		let mut batch = self.scroll(spec, req.scroll_id.as_deref()).await?;

		if req.order.unwrap_or(SortOrder::Desc) != scroll_order {
			batch.events.reverse();
		}

		Ok(batch.into())
	}

	/// Validates the request and prepares a download. No store page is read until the first
	/// chunk is pulled.
	pub async fn download_task_log(
		&self,
		company: &str,
		req: LogDownloadRequest,
	) -> Result<LogDownload> {
		let renderer = match req.line_type {
			LogLineType::Json => LineRenderer::Json,
			LogLineType::Text => match req.line_format.as_deref() {
				None => LineRenderer::Text(LineFormat::default()),
				Some(format) if format.trim().is_empty() =>
					return Err(Error::invalid_parameter(
						"line_format is required for plain text lines.",
					)),
				Some(format) => LineRenderer::Text(LineFormat::parse(format)?),
			},
		};
		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let query = EventQuery {
			filter: EventFilter::new(task.company.clone(), vec![task.id.clone()])
				.with_type(EventType::Log),
			sort: EventSort::new(SortField::Timestamp, SortOrder::Asc),
			size: self.cfg.events.log_download_batch as usize,
			cursor: None,
		};

		Ok(LogDownload { task: task.id, query, renderer, done: false, lines: 0 })
	}
}

fn default_navigate_earlier() -> bool {
	true
}
