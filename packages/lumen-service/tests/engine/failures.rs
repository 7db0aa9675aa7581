use std::time::Duration;

use lumen_domain::SortOrder;
use lumen_service::{Error, TaskEventsRequest};
use lumen_storage::store::SortField;

use super::{COMPANY, fixture, fixture_with, scalar, test_config};

fn request() -> TaskEventsRequest {
	TaskEventsRequest {
		tasks: vec!["t1".to_string()],
		event_type: None,
		order_by: SortField::Timestamp,
		order: SortOrder::Asc,
		batch_size: None,
		scroll_id: None,
	}
}

#[tokio::test]
async fn empty_result_is_not_an_error() {
	let fx = fixture();
	let response =
		fx.service.get_task_events(COMPANY, request()).await.expect("get_task_events failed.");

	assert!(response.events.is_empty());
	assert_eq!(response.total, 0);
}

#[tokio::test]
async fn unavailable_store_is_reported_with_context() {
	let fx = fixture();

	fx.store.insert(scalar("t1", "loss", "train", 0, 1.0));
	fx.store.set_unavailable(true);

	let err = fx
		.service
		.get_task_events(COMPANY, request())
		.await
		.expect_err("Expected the store to be unavailable.");
	let Error::StoreUnavailable { operation, task, .. } = err else {
		panic!("Expected store unavailable, got {err:?}.");
	};

	assert_eq!(operation, "get_task_events");
	assert_eq!(task, "t1");
}

#[tokio::test]
async fn slow_store_calls_time_out_as_unavailable() {
	let mut cfg = test_config();

	cfg.storage.postgres.query_timeout_ms = 20;

	let fx = fixture_with(cfg);

	fx.store.set_delay(Some(Duration::from_millis(500)));

	let err = fx
		.service
		.get_task_events(COMPANY, request())
		.await
		.expect_err("Expected a timeout.");

	assert!(matches!(err, Error::StoreUnavailable { .. }), "err={err:?}");
}

#[tokio::test]
async fn zero_batch_size_is_rejected_before_any_store_call() {
	let fx = fixture();
	let err = fx
		.service
		.get_task_events(COMPANY, TaskEventsRequest { batch_size: Some(0), ..request() })
		.await
		.expect_err("Expected an invalid parameter.");

	assert!(matches!(err, Error::InvalidParameter { .. }));
	assert_eq!(fx.store.calls(), 0);
}

#[tokio::test]
async fn tasks_of_another_company_are_invisible() {
	let fx = fixture();

	fx.catalog.insert("foreign", "other", "not yours");

	let err = fx
		.service
		.get_task_events(
			COMPANY,
			TaskEventsRequest { tasks: vec!["foreign".to_string()], ..request() },
		)
		.await
		.expect_err("Expected an invalid reference.");

	assert!(matches!(err, Error::InvalidReference { .. }));
}

#[tokio::test]
async fn public_and_private_tasks_cannot_be_mixed() {
	let fx = fixture();

	fx.catalog.insert("demo", "", "public demo");

	let err = fx
		.service
		.get_task_events(
			COMPANY,
			TaskEventsRequest { tasks: vec!["t1".to_string(), "demo".to_string()], ..request() },
		)
		.await
		.expect_err("Expected mixed companies to be rejected.");

	assert!(matches!(
		err,
		Error::InvalidParameter { ref message } if message.contains("same company")
	));
}
