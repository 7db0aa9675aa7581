//! Retention of the most recent iterations per logical series.

use std::{
	cmp::{Ordering, Reverse},
	collections::{BTreeMap, HashMap},
};

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// `metric -> variant -> task -> iter -> plots`.
pub type PerTaskTree =
	BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<i64, TaskIteration>>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIteration {
	/// Display name of the task, when known.
	pub name: Option<String>,
	pub plots: Vec<Event>,
}

/// Keeps, for every `(metric, variant, task)`, all events belonging to its `max_iters` highest
/// distinct iterations. The result is ordered by `(metric, variant, task)` ascending, then by
/// iteration descending; events sharing an iteration keep their input order.
pub fn top_iterations_per_task(events: Vec<Event>, max_iters: usize) -> Vec<Event> {
	if max_iters == 0 {
		return Vec::new();
	}

	let mut indexed: Vec<(usize, Event)> = events.into_iter().enumerate().collect();

	indexed.sort_by(|(left_idx, left), (right_idx, right)| {
		series_cmp(left, right)
			.then_with(|| Reverse(left.iter).cmp(&Reverse(right.iter)))
			.then_with(|| left_idx.cmp(right_idx))
	});

	let mut out = Vec::with_capacity(indexed.len());
	let mut current: Option<(String, String, String)> = None;
	let mut last_iter: Option<i64> = None;
	let mut distinct = 0_usize;

	for (_, event) in indexed {
		let same_series = current.as_ref().is_some_and(|(metric, variant, task)| {
			metric == &event.metric && variant == &event.variant && task == &event.task
		});

		if !same_series {
			current = Some((event.metric.clone(), event.variant.clone(), event.task.clone()));
			last_iter = None;
			distinct = 0;
		}
		if last_iter != Some(event.iter) {
			last_iter = Some(event.iter);
			distinct += 1;
		}
		if distinct <= max_iters {
			out.push(event);
		}
	}

	out
}

/// Nests events into `metric -> variant -> task -> iter`. Names are looked up by task id.
pub fn nest_per_task(events: Vec<Event>, names: &HashMap<String, String>) -> PerTaskTree {
	let mut tree = PerTaskTree::new();

	for event in events {
		let iteration = tree
			.entry(event.metric.clone())
			.or_default()
			.entry(event.variant.clone())
			.or_default()
			.entry(event.task.clone())
			.or_default()
			.entry(event.iter)
			.or_insert_with(|| TaskIteration {
				name: names.get(&event.task).cloned(),
				plots: Vec::new(),
			});

		iteration.plots.push(event);
	}

	tree
}

/// Keeps the first `max_iters` events seen for every `(metric, variant)` and returns the
/// survivors sorted by iteration descending. Input is expected to be sorted by iteration
/// descending already, so "first seen" means "most recent".
pub fn top_iterations_flat(events: Vec<Event>, max_iters: usize) -> Vec<Event> {
	let mut counts: HashMap<(String, String), usize> = HashMap::new();
	let mut out: Vec<Event> = Vec::new();

	for event in events {
		let count = counts.entry((event.metric.clone(), event.variant.clone())).or_insert(0);

		if *count < max_iters {
			*count += 1;

			out.push(event);
		}
	}

	out.sort_by_key(|event| Reverse(event.iter));

	out
}

fn series_cmp(left: &Event, right: &Event) -> Ordering {
	left.metric
		.cmp(&right.metric)
		.then_with(|| left.variant.cmp(&right.variant))
		.then_with(|| left.task.cmp(&right.task))
}
