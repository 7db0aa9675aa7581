use std::collections::HashMap;

use futures::future;
use serde::{Deserialize, Serialize};

use lumen_domain::{
	Event, EventType, SortOrder,
	top_iterations::{self, PerTaskTree},
};
use lumen_storage::store::{
	EventFilter, EventSort, IterationQuery, SeriesFloor, SeriesKey, SortField, TaskRecord,
};

use crate::{
	CursorScope, LumenService, Result, event_company, require_task,
	scroll::{ScrollBatch, ScrollSpec},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopPlotsRequest {
	pub tasks: Vec<String>,
	#[serde(default)]
	pub iters: Option<u32>,
	#[serde(default)]
	pub scroll_id: Option<String>,
}

/// Flat newest-first list for a single task, or the `metric -> variant -> task -> iter` tree
/// when several tasks are compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlotListing {
	Flat(Vec<Event>),
	Tree(PerTaskTree),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopPlotsResponse {
	pub plots: PlotListing,
	pub returned: usize,
	pub total: u64,
	pub scroll_id: String,
	#[serde(default)]
	pub restarted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatDebugImagesRequest {
	pub task: String,
	#[serde(default)]
	pub iters: Option<u32>,
	#[serde(default)]
	pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatDebugImagesResponse {
	pub images: Vec<Event>,
	pub returned: usize,
	pub total: u64,
	pub scroll_id: String,
	#[serde(default)]
	pub restarted: bool,
}

impl LumenService {
	/// Latest plots per series. Every `(task, metric, variant)` contributes its newest `iters`
	/// iterations, however far back they lie; pages hold up to `plots_fetch_size` events.
	pub async fn get_top_plots(
		&self,
		company: &str,
		req: TopPlotsRequest,
	) -> Result<TopPlotsResponse> {
		let iters = self.iteration_count(req.iters)?;
		let tasks = self.resolve_tasks(company, &req.tasks).await?;
		let batch = self
			.latest_iterations(
				"get_top_plots",
				company,
				&tasks,
				EventType::Plot,
				iters,
				req.scroll_id.as_deref(),
			)
			.await?;
		let plots = if tasks.len() == 1 {
			PlotListing::Flat(top_iterations::top_iterations_flat(batch.events, iters))
		} else {
			let names = tasks
				.iter()
				.map(|task| (task.id.clone(), task.name.clone()))
				.collect::<HashMap<_, _>>();
			let survivors = top_iterations::top_iterations_per_task(batch.events, iters);

			PlotListing::Tree(top_iterations::nest_per_task(survivors, &names))
		};
		let returned = match &plots {
			PlotListing::Flat(events) => events.len(),
			PlotListing::Tree(tree) => tree
				.values()
				.flat_map(|variants| variants.values())
				.flat_map(|tasks| tasks.values())
				.flat_map(|iterations| iterations.values())
				.map(|iteration| iteration.plots.len())
				.sum(),
		};

		Ok(TopPlotsResponse {
			plots,
			returned,
			total: batch.total,
			scroll_id: batch.next_token,
			restarted: batch.restarted,
		})
	}

	/// Debug images of one task without iteration navigation: the newest `iters` images per
	/// `(metric, variant)`.
	pub async fn get_debug_images_flat(
		&self,
		company: &str,
		req: FlatDebugImagesRequest,
	) -> Result<FlatDebugImagesResponse> {
		let iters = self.iteration_count(req.iters)?;
		let task = self.resolve_task(company, require_task(&req.task)?).await?;
		let batch = self
			.latest_iterations(
				"get_debug_images_flat",
				company,
				std::slice::from_ref(&task),
				EventType::DebugImage,
				iters,
				req.scroll_id.as_deref(),
			)
			.await?;
		let images = top_iterations::top_iterations_flat(batch.events, iters);

		Ok(FlatDebugImagesResponse {
			returned: images.len(),
			images,
			total: batch.total,
			scroll_id: batch.next_token,
			restarted: batch.restarted,
		})
	}

	/// Scrolls the events of the newest `iters` iterations of every series, newest first.
	async fn latest_iterations(
		&self,
		operation: &'static str,
		company: &str,
		tasks: &[TaskRecord],
		event_type: EventType,
		iters: usize,
		token: Option<&str>,
	) -> Result<ScrollBatch> {
		let task_ids = tasks.iter().map(|task| task.id.clone()).collect::<Vec<_>>();
		let company = event_company(tasks, company);
		let filter = EventFilter::new(company.clone(), task_ids.clone()).with_type(event_type);
		let series = self
			.store_call(operation, &task_ids.join(","), self.store.series(&filter))
			.await?;
		let floors = future::try_join_all(
			series.into_iter().map(|key| self.series_floor(operation, &filter, key, iters)),
		)
		.await?
		.into_iter()
		.flatten()
		.collect::<Vec<_>>();
		// A moved floor invalidates the token instead of shifting later pages.
		let scope = CursorScope::new(operation, &company, &task_ids, Some(event_type))
			.with_fingerprint(&(iters, &floors));
		let spec = ScrollSpec {
			operation,
			scope: &scope,
			filter: filter.with_series_floors(floors),
			sort: EventSort::new(SortField::Iter, SortOrder::Desc),
			size: self.cfg.events.plots_fetch_size as usize,
		};

		self.scroll(spec, token).await
	}

	async fn series_floor(
		&self,
		operation: &'static str,
		filter: &EventFilter,
		key: SeriesKey,
		iters: usize,
	) -> Result<Option<SeriesFloor>> {
		let query = IterationQuery {
			filter: EventFilter { tasks: vec![key.task.clone()], ..filter.clone() }
				.with_metric(key.metric.clone())
				.with_variant(key.variant.clone()),
			order: SortOrder::Desc,
			after: None,
			limit: iters,
		};
		let newest = self.store_call(operation, &key.task, self.store.iterations(&query)).await?;

		Ok(newest.last().map(|&iter_min| SeriesFloor { series: key, iter_min }))
	}
}
