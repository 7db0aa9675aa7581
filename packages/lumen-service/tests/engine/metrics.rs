use lumen_domain::EventType;
use lumen_service::{
	LatestScalarValuesRequest, MetricsAndVariantsRequest, TaskMetricsRequest,
	VectorHistogramRequest,
};

use super::{COMPANY, fixture, image, scalar, vector};

#[tokio::test]
async fn task_metrics_are_listed_per_task_and_type() {
	let fx = fixture();

	fx.store.insert(scalar("t1", "loss", "train", 0, 1.0));
	fx.store.insert(scalar("t1", "acc", "train", 0, 1.0));
	fx.store.insert(image("t1", "samples", "left", 0));
	fx.store.insert(scalar("t2", "loss", "eval", 0, 1.0));

	let response = fx
		.service
		.get_task_metrics(
			COMPANY,
			TaskMetricsRequest {
				tasks: vec!["t1".to_string(), "t2".to_string()],
				event_type: Some(EventType::Scalar),
			},
		)
		.await
		.expect("get_task_metrics failed.");

	assert_eq!(response.metrics[0].task, "t1");
	assert_eq!(response.metrics[0].metrics, vec!["acc", "loss"]);
	assert_eq!(response.metrics[1].metrics, vec!["loss"]);
}

#[tokio::test]
async fn metrics_and_variants_are_sorted() {
	let fx = fixture();

	for variant in ["val", "train", "test"] {
		fx.store.insert(scalar("t1", "loss", variant, 0, 1.0));
	}

	let response = fx
		.service
		.get_metrics_and_variants(
			COMPANY,
			MetricsAndVariantsRequest { task: "t1".to_string(), event_type: EventType::Scalar },
		)
		.await
		.expect("get_metrics_and_variants failed.");

	assert_eq!(response.metrics["loss"], vec!["test", "train", "val"]);
}

#[tokio::test]
async fn vector_histogram_lists_vectors_by_iteration() {
	let fx = fixture();

	fx.store.insert(vector("t1", "weights", "layer1", 2, vec![0.5, 0.25]));
	fx.store.insert(vector("t1", "weights", "layer1", 1, vec![1.0]));
	fx.store.insert(vector("t1", "weights", "layer2", 1, vec![9.0]));

	let response = fx
		.service
		.vector_metrics_iter_histogram(
			COMPANY,
			VectorHistogramRequest {
				task: "t1".to_string(),
				metric: "weights".to_string(),
				variant: "layer1".to_string(),
			},
		)
		.await
		.expect("vector_metrics_iter_histogram failed.");

	assert_eq!(response.iterations, vec![1, 2]);
	assert_eq!(response.vectors, vec![vec![1.0], vec![0.5, 0.25]]);
}

#[tokio::test]
async fn latest_scalar_values_pick_the_highest_iteration_per_series() {
	let fx = fixture();

	fx.store
		.insert_many((0..5).map(|iter| scalar("t1", "loss", "train", iter, 10.0 - iter as f64)));
	fx.store.insert_many((0..8).map(|iter| scalar("t1", "loss", "eval", iter, iter as f64)));
	fx.store.insert(scalar("t1", "acc", "train", 3, 0.9));

	let response = fx
		.service
		.get_task_latest_scalar_values(
			COMPANY,
			LatestScalarValuesRequest { task: "t1".to_string() },
		)
		.await
		.expect("get_task_latest_scalar_values failed.");
	let loss = response
		.metrics
		.iter()
		.find(|metric| metric.name == "loss")
		.expect("loss is missing.");

	assert_eq!(response.metrics.len(), 2);
	assert_eq!(loss.variants.len(), 2);
	assert!(loss.variants.iter().any(|v| v.name == "train" && v.iter == 4 && v.value == 6.0));
	assert!(loss.variants.iter().any(|v| v.name == "eval" && v.iter == 7 && v.value == 7.0));
	assert_eq!(response.last_iter, 7);
	assert_eq!(response.name, "baseline");
}
