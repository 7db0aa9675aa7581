use lumen_domain::ScalarKey;
use lumen_service::{AxisValue, CompareHistogramsRequest, Error, HistogramPoint, HistogramRequest};

use super::{COMPANY, fixture, scalar};

fn numeric(points: &[HistogramPoint]) -> Vec<i64> {
	points
		.iter()
		.map(|point| match point.x {
			AxisValue::Number(x) => x,
			AxisValue::Time(_) => panic!("Expected a numeric axis."),
		})
		.collect()
}

fn histogram(task: &str, samples: Option<i64>, key: ScalarKey) -> HistogramRequest {
	HistogramRequest { task: task.to_string(), samples, key, metrics: Vec::new() }
}

#[tokio::test]
async fn three_metrics_of_ten_thousand_points_downsample_to_at_most_100() {
	let fx = fixture();

	for metric in ["loss", "accuracy", "lr"] {
		fx.store
			.insert_many((0..10_000).map(|iter| scalar("t1", metric, "train", iter, iter as f64)));
	}

	let response = fx
		.service
		.scalar_metrics_iter_histogram(COMPANY, histogram("t1", Some(100), ScalarKey::Iter))
		.await
		.expect("Histogram failed.");

	assert_eq!(response.metrics.len(), 3);

	for variants in response.metrics.values() {
		let points = &variants["train"];
		let xs = numeric(points);

		assert!(points.len() <= 100);
		assert!(xs.windows(2).all(|pair| pair[0] <= pair[1]));
		assert_eq!(xs[0], 0);
		assert!(*xs.last().expect("Series is empty.") > 9_000);
		assert_eq!(points[0].y, 49.5);
	}
}

#[tokio::test]
async fn sample_count_is_clamped_into_range() {
	let fx = fixture();

	fx.store.insert_many((0..50).map(|iter| scalar("t1", "loss", "train", iter, 2.0)));

	let single = fx
		.service
		.scalar_metrics_iter_histogram(COMPANY, histogram("t1", Some(0), ScalarKey::Iter))
		.await
		.expect("Histogram failed.");
	let huge = fx
		.service
		.scalar_metrics_iter_histogram(COMPANY, histogram("t1", Some(1_000_000), ScalarKey::Iter))
		.await
		.expect("Histogram failed.");

	assert_eq!(
		single.metrics["loss"]["train"],
		vec![HistogramPoint { x: AxisValue::Number(0), y: 2.0 }]
	);
	assert_eq!(huge.metrics["loss"]["train"].len(), 50);
}

#[tokio::test]
async fn iso_time_axis_yields_timestamps() {
	let fx = fixture();

	fx.store.insert_many((0..3).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));

	let response = fx
		.service
		.scalar_metrics_iter_histogram(COMPANY, histogram("t1", None, ScalarKey::IsoTime))
		.await
		.expect("Histogram failed.");

	assert_eq!(
		response.metrics["loss"]["train"][0].x,
		AxisValue::Time("2023-11-14T22:13:20Z".to_string())
	);
}

#[tokio::test]
async fn comparison_buckets_are_aligned_across_tasks() {
	let fx = fixture();

	fx.store.insert_many((0..=100).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));
	fx.store.insert_many((50..=300).map(|iter| scalar("t2", "loss", "train", iter, 2.0)));

	let response = fx
		.service
		.compare_scalar_histograms(
			COMPANY,
			CompareHistogramsRequest {
				tasks: vec!["t1".to_string(), "t2".to_string()],
				samples: Some(10),
				key: ScalarKey::Iter,
			},
		)
		.await
		.expect("Comparison failed.");
	let t1 = numeric(&response.tasks["t1"].metrics["loss"]["train"]);
	let t2 = numeric(&response.tasks["t2"].metrics["loss"]["train"]);

	// Union range [0, 300] in 10 samples gives width 31 anchored at 0.
	assert!(t1.iter().chain(&t2).all(|x| x % 31 == 0));
	assert_eq!(t1.first(), Some(&0));
	assert_eq!(t2.first(), Some(&31));
	assert_eq!(response.tasks["t2"].name, "wider");
	assert!(response.unresolved.is_empty());
}

#[tokio::test]
async fn comparison_reports_unknown_tasks_next_to_valid_ones() {
	let fx = fixture();

	fx.store.insert_many((0..10).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));

	let response = fx
		.service
		.compare_scalar_histograms(
			COMPANY,
			CompareHistogramsRequest {
				tasks: vec!["t1".to_string(), "ghost".to_string()],
				samples: None,
				key: ScalarKey::Iter,
			},
		)
		.await
		.expect("Comparison failed.");

	assert_eq!(response.tasks.len(), 1);
	assert_eq!(response.tasks["t1"].metrics["loss"]["train"].len(), 10);
	assert_eq!(response.unresolved.len(), 1);
	assert_eq!(response.unresolved[0].task, "ghost");
}

#[tokio::test]
async fn comparison_rejects_more_tasks_than_the_limit() {
	let fx = fixture();
	let err = fx
		.service
		.compare_scalar_histograms(
			COMPANY,
			CompareHistogramsRequest {
				tasks: (0..11).map(|n| format!("t{n}")).collect(),
				samples: None,
				key: ScalarKey::Iter,
			},
		)
		.await
		.expect_err("Expected the task limit to apply.");

	assert!(matches!(err, Error::InvalidParameter { .. }));
	assert_eq!(fx.store.calls(), 0);
}

#[tokio::test]
async fn unknown_single_task_is_an_invalid_reference() {
	let fx = fixture();
	let err = fx
		.service
		.scalar_metrics_iter_histogram(COMPANY, histogram("ghost", None, ScalarKey::Iter))
		.await
		.expect_err("Expected an invalid reference.");

	assert!(matches!(err, Error::InvalidReference { .. }));
}
