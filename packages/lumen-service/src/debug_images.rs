//! Iteration-wise navigation over debug images grouped by `(task, metric)`.
//!
//! Every group remembers the lowest and highest iteration handed out so far. Walking earlier
//! continues below the lowest, walking later continues above the highest, and a group that runs
//! out in one direction is flagged exhausted for that direction only. A fresh earlier walk starts
//! from the newest iteration, a fresh later walk from the oldest.

use std::collections::{BTreeMap, BTreeSet};

use futures::future;
use serde::{Deserialize, Serialize};

use lumen_domain::{Event, EventType, SortOrder};
use lumen_storage::store::{EventFilter, EventQuery, EventSort, IterationQuery, SortField};

use crate::{CursorScope, Error, LumenService, Result, cursor::Resume, event_company};

const OPERATION: &str = "debug_images";

/// A requested group. Without a metric every debug image metric of the task is included.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskMetric {
	pub task: String,
	#[serde(default)]
	pub metric: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugImagesRequest {
	pub metrics: Vec<TaskMetric>,
	#[serde(default)]
	pub iters: Option<u32>,
	#[serde(default = "default_navigate_earlier")]
	pub navigate_earlier: bool,
	#[serde(default)]
	pub refresh: bool,
	#[serde(default)]
	pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationEvents {
	pub iter: i64,
	pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvents {
	pub task: String,
	pub metric: String,
	pub iterations: Vec<IterationEvents>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugImagesResponse {
	pub metric_events: Vec<MetricEvents>,
	pub scroll_id: String,
	#[serde(default)]
	pub restarted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCursor {
	pub task: String,
	pub metric: String,
	pub min_iter: Option<i64>,
	pub max_iter: Option<i64>,
	#[serde(default)]
	pub earlier_exhausted: bool,
	#[serde(default)]
	pub later_exhausted: bool,
}
impl GroupCursor {
	fn new(task: String, metric: String) -> Self {
		Self { task, metric, ..Default::default() }
	}

	fn exhausted(&self, navigate_earlier: bool) -> bool {
		if navigate_earlier { self.earlier_exhausted } else { self.later_exhausted }
	}

	/// Exclusive bound for the next step in the given direction.
	fn bound(&self, navigate_earlier: bool) -> Option<i64> {
		if navigate_earlier { self.min_iter } else { self.max_iter }
	}

	fn advance(&mut self, iters: &[i64], navigate_earlier: bool, requested: usize) {
		if let (Some(lo), Some(hi)) = (iters.iter().min(), iters.iter().max()) {
			self.min_iter = Some(self.min_iter.map_or(*lo, |min| min.min(*lo)));
			self.max_iter = Some(self.max_iter.map_or(*hi, |max| max.max(*hi)));
		}
		if iters.len() < requested {
			if navigate_earlier {
				self.earlier_exhausted = true;
			} else {
				self.later_exhausted = true;
			}
		}
	}
}

/// Per-group cursors in response order, carried inside the continuation token. The direction
/// comes from each request, so one token can be walked both ways.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
	pub groups: Vec<GroupCursor>,
}
impl NavigationState {
	/// Rebuilds the group list from the groups present now. Known groups keep their cursors with
	/// exhaustion cleared, new groups are appended in enumeration order, vanished ones drop out.
	fn refresh(self, present: Vec<(String, String)>) -> Self {
		let mut known = self
			.groups
			.into_iter()
			.map(|group| ((group.task.clone(), group.metric.clone()), group))
			.collect::<BTreeMap<_, _>>();
		let groups = present
			.into_iter()
			.map(|(task, metric)| match known.remove(&(task.clone(), metric.clone())) {
				Some(group) =>
					GroupCursor { earlier_exhausted: false, later_exhausted: false, ..group },
				None => GroupCursor::new(task, metric),
			})
			.collect();

		Self { groups }
	}
}

struct GroupStep {
	cursor: GroupCursor,
	iterations: Vec<IterationEvents>,
}

impl LumenService {
	pub async fn get_debug_images(
		&self,
		company: &str,
		req: DebugImagesRequest,
	) -> Result<DebugImagesResponse> {
		if req.metrics.is_empty() {
			return Err(Error::invalid_parameter("At least one task metric is required."));
		}

		let iters = self.iteration_count(req.iters)?;
		let requested = normalize_requested(&req.metrics)?;
		let task_ids = requested
			.iter()
			.map(|item| item.task.clone())
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect::<Vec<_>>();
		let tasks = self.resolve_tasks(company, &task_ids).await?;
		let company = event_company(&tasks, company);
		let scope = CursorScope::new(OPERATION, &company, &task_ids, Some(EventType::DebugImage))
			.with_fingerprint(&requested);
		let resume = self.codec().resume::<NavigationState>(req.scroll_id.as_deref(), &scope);
		let restarted = resume.restarted();
		let state = match resume {
			Resume::Continue(state) if req.refresh => {
				let present = self.enumerate_groups(&company, &task_ids, &requested).await?;

				state.refresh(present)
			},
			Resume::Continue(state) => state,
			Resume::Fresh | Resume::Restart(_) => {
				let present = self.enumerate_groups(&company, &task_ids, &requested).await?;

				NavigationState::default().refresh(present)
			},
		};
		let navigate_earlier = req.navigate_earlier;
		let steps = future::try_join_all(
			state
				.groups
				.into_iter()
				.map(|group| self.step_group(&company, group, iters, navigate_earlier)),
		)
		.await?;
		let mut groups = Vec::with_capacity(steps.len());
		let mut metric_events = Vec::new();

		for step in steps {
			if !step.iterations.is_empty() {
				metric_events.push(MetricEvents {
					task: step.cursor.task.clone(),
					metric: step.cursor.metric.clone(),
					iterations: step.iterations,
				});
			}

			groups.push(step.cursor);
		}

		tracing::debug!(
			groups = groups.len(),
			returned = metric_events.len(),
			navigate_earlier,
			refresh = req.refresh,
			restarted,
			"Navigated debug images."
		);

		let scroll_id = self.codec().encode(&scope, &NavigationState { groups })?;

		Ok(DebugImagesResponse { metric_events, scroll_id, restarted })
	}

	/// Groups currently holding debug images, in request order with metrics sorted per task.
	async fn enumerate_groups(
		&self,
		company: &str,
		task_ids: &[String],
		requested: &[TaskMetric],
	) -> Result<Vec<(String, String)>> {
		let filter = EventFilter::new(company, task_ids.to_vec()).with_type(EventType::DebugImage);
		let series =
			self.store_call(OPERATION, &task_ids.join(","), self.store.series(&filter)).await?;
		let mut seen = BTreeSet::new();
		let mut groups = Vec::new();

		for item in requested {
			let mut metrics = series
				.iter()
				.filter(|key| key.task == item.task)
				.filter(|key| item.metric.as_ref().is_none_or(|metric| metric == &key.metric))
				.map(|key| key.metric.clone())
				.collect::<Vec<_>>();

			metrics.sort();
			metrics.dedup();

			for metric in metrics {
				if seen.insert((item.task.clone(), metric.clone())) {
					groups.push((item.task.clone(), metric));
				}
			}
		}

		Ok(groups)
	}

	async fn step_group(
		&self,
		company: &str,
		mut cursor: GroupCursor,
		iters: usize,
		navigate_earlier: bool,
	) -> Result<GroupStep> {
		if cursor.exhausted(navigate_earlier) {
			return Ok(GroupStep { cursor, iterations: Vec::new() });
		}

		let order = if navigate_earlier { SortOrder::Desc } else { SortOrder::Asc };
		let filter = EventFilter::new(company, vec![cursor.task.clone()])
			.with_type(EventType::DebugImage)
			.with_metric(cursor.metric.clone());
		let iteration_query = IterationQuery {
			filter: filter.clone(),
			order,
			after: cursor.bound(navigate_earlier),
			limit: iters,
		};
		let selected = self
			.store_call(OPERATION, &cursor.task, self.store.iterations(&iteration_query))
			.await?;

		cursor.advance(&selected, navigate_earlier, iters);

		let (Some(lo), Some(hi)) = (selected.iter().min(), selected.iter().max()) else {
			return Ok(GroupStep { cursor, iterations: Vec::new() });
		};
		let mut filter = filter;

		filter.iter_min = Some(*lo);
		filter.iter_max = Some(*hi);

		let mut query = EventQuery {
			filter,
			sort: EventSort::new(SortField::Iter, order),
			size: self.cfg.events.max_batch_size as usize,
			cursor: None,
		};
		let mut iterations: Vec<IterationEvents> = Vec::with_capacity(selected.len());

		loop {
			let page = self.store_call(OPERATION, &cursor.task, self.store.query(&query)).await?;

			for event in page.events {
				match iterations.last_mut() {
					Some(last) if last.iter == event.iter => last.events.push(event),
					_ => iterations.push(IterationEvents { iter: event.iter, events: vec![event] }),
				}
			}

			match page.next {
				Some(next) => query.cursor = Some(next),
				None => break,
			}
		}

		Ok(GroupStep { cursor, iterations })
	}
}

/// Trims the requested groups, drops duplicates, and treats an empty metric as "all metrics".
fn normalize_requested(metrics: &[TaskMetric]) -> Result<Vec<TaskMetric>> {
	let mut seen = BTreeSet::new();
	let mut out = Vec::with_capacity(metrics.len());

	for item in metrics {
		let task = crate::require_task(&item.task)?.to_string();
		let metric = item
			.metric
			.as_deref()
			.map(str::trim)
			.filter(|metric| !metric.is_empty())
			.map(str::to_string);
		let item = TaskMetric { task, metric };

		if seen.insert(item.clone()) {
			out.push(item);
		}
	}

	Ok(out)
}

fn default_navigate_earlier() -> bool {
	true
}
