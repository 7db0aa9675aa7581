use lumen_service::{Error, FlatDebugImagesRequest, PlotListing, TopPlotsRequest};

use super::{COMPANY, fixture, fixture_with, image, plot, test_config};

fn top_plots(tasks: &[&str], iters: u32) -> TopPlotsRequest {
	TopPlotsRequest {
		tasks: tasks.iter().map(|task| task.to_string()).collect(),
		iters: Some(iters),
		scroll_id: None,
	}
}

#[tokio::test]
async fn single_task_plots_are_a_flat_newest_first_list() {
	let fx = fixture();

	for iter in 0..5 {
		fx.store.insert(plot("t1", "confusion", "v1", iter));
		fx.store.insert(plot("t1", "confusion", "v2", iter));
	}

	let response = fx
		.service
		.get_top_plots(COMPANY, top_plots(&["t1"], 2))
		.await
		.expect("get_top_plots failed.");
	let PlotListing::Flat(plots) = response.plots else {
		panic!("Expected a flat listing.");
	};

	assert_eq!(plots.iter().map(|plot| plot.iter).collect::<Vec<_>>(), vec![4, 4, 3, 3]);
	assert_eq!(response.returned, 4);
	// Only the selected iterations count towards the scroll.
	assert_eq!(response.total, 4);
}

#[tokio::test]
async fn multi_task_plots_nest_by_metric_variant_task_and_iteration() {
	let fx = fixture();

	for iter in 0..5 {
		fx.store.insert(plot("t1", "confusion", "v1", iter));
		fx.store.insert(plot("t2", "confusion", "v1", iter * 10));
	}

	let response = fx
		.service
		.get_top_plots(COMPANY, top_plots(&["t1", "t2"], 2))
		.await
		.expect("get_top_plots failed.");
	let PlotListing::Tree(tree) = response.plots else {
		panic!("Expected a grouped listing.");
	};
	let tasks = &tree["confusion"]["v1"];

	assert_eq!(tasks["t1"].keys().copied().collect::<Vec<_>>(), vec![3, 4]);
	assert_eq!(tasks["t2"].keys().copied().collect::<Vec<_>>(), vec![30, 40]);
	assert_eq!(tasks["t1"][&4].name.as_deref(), Some("baseline"));
	assert_eq!(response.returned, 4);
}

#[tokio::test]
async fn multi_task_plots_list_every_unknown_task() {
	let fx = fixture();
	let err = fx
		.service
		.get_top_plots(COMPANY, top_plots(&["t1", "ghost", "phantom"], 1))
		.await
		.expect_err("Expected an invalid reference.");
	let Error::InvalidReference { message } = err else {
		panic!("Expected an invalid reference, got {err:?}.");
	};

	assert!(message.contains("ghost") && message.contains("phantom"));
}

#[tokio::test]
async fn flat_debug_images_keep_the_newest_per_series() {
	let fx = fixture();

	for iter in 0..6 {
		fx.store.insert(image("t1", "samples", "left", iter));
	}

	fx.store.insert(image("t1", "samples", "right", 2));

	let response = fx
		.service
		.get_debug_images_flat(
			COMPANY,
			FlatDebugImagesRequest { task: "t1".to_string(), iters: Some(3), scroll_id: None },
		)
		.await
		.expect("get_debug_images_flat failed.");

	let iters = response.images.iter().map(|image| image.iter).collect::<Vec<_>>();

	assert_eq!(iters, vec![5, 4, 3, 2]);
	assert_eq!(response.images.last().map(|image| image.variant.as_str()), Some("right"));
}

#[tokio::test]
async fn sparse_series_survive_next_to_dense_ones() {
	let mut cfg = test_config();

	cfg.events.plots_fetch_size = 50;

	let fx = fixture_with(cfg);

	fx.store.insert(plot("t1", "sparse", "v", 0));
	fx.store.insert(image("t1", "sparse", "v", 0));

	for iter in 1..=60 {
		fx.store.insert(plot("t1", "dense", "v", iter));
		fx.store.insert(image("t1", "dense", "v", iter));
	}

	let response = fx
		.service
		.get_top_plots(COMPANY, top_plots(&["t1"], 1))
		.await
		.expect("get_top_plots failed.");
	let PlotListing::Flat(plots) = response.plots else {
		panic!("Expected a flat listing.");
	};
	let series = plots.iter().map(|plot| (plot.metric.as_str(), plot.iter)).collect::<Vec<_>>();

	assert_eq!(series, vec![("dense", 60), ("sparse", 0)]);
	assert_eq!(response.total, 2);

	let response = fx
		.service
		.get_debug_images_flat(
			COMPANY,
			FlatDebugImagesRequest { task: "t1".to_string(), iters: Some(2), scroll_id: None },
		)
		.await
		.expect("get_debug_images_flat failed.");
	let series =
		response.images.iter().map(|image| (image.metric.as_str(), image.iter)).collect::<Vec<_>>();

	assert_eq!(series, vec![("dense", 60), ("dense", 59), ("sparse", 0)]);
}

#[tokio::test]
async fn new_iterations_mid_scroll_restart_the_plot_listing() {
	let mut cfg = test_config();

	cfg.events.plots_fetch_size = 1;

	let fx = fixture_with(cfg);

	for iter in 0..4 {
		fx.store.insert(plot("t1", "confusion", "v1", iter));
	}

	let first = fx
		.service
		.get_top_plots(COMPANY, top_plots(&["t1"], 2))
		.await
		.expect("get_top_plots failed.");

	assert_eq!(first.total, 2);
	assert!(!first.restarted);

	fx.store.insert(plot("t1", "confusion", "v1", 4));

	let second = fx
		.service
		.get_top_plots(
			COMPANY,
			TopPlotsRequest { scroll_id: Some(first.scroll_id), ..top_plots(&["t1"], 2) },
		)
		.await
		.expect("get_top_plots failed.");
	let PlotListing::Flat(plots) = second.plots else {
		panic!("Expected a flat listing.");
	};

	assert!(second.restarted);
	assert_eq!(plots.iter().map(|plot| plot.iter).collect::<Vec<_>>(), vec![4]);
}
