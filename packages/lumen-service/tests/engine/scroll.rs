use std::collections::BTreeSet;

use lumen_domain::{EventType, SortOrder};
use lumen_service::{
	CursorScope, Error, ScalarMetricDataRequest, ScrollState, TaskEventsRequest, TaskLogRequest,
};
use lumen_storage::store::{EventSort, SortField, SortPosition, StoreCursor};

use super::{COMPANY, fixture, log, scalar};

fn events_request(tasks: &[&str], batch_size: u32, scroll_id: Option<String>) -> TaskEventsRequest {
	TaskEventsRequest {
		tasks: tasks.iter().map(|task| task.to_string()).collect(),
		event_type: None,
		order_by: SortField::Iter,
		order: SortOrder::Asc,
		batch_size: Some(batch_size),
		scroll_id,
	}
}

#[tokio::test]
async fn log_listing_pages_500_500_200_then_empty() {
	let fx = fixture();

	fx.store.insert_many((0..1_200).map(|n| log("t1", n)));

	let mut scroll_id = None;
	let mut sizes = Vec::new();
	let mut seen = BTreeSet::new();

	for _ in 0..5 {
		let response = fx
			.service
			.get_task_log(
				COMPANY,
				TaskLogRequest {
					task: "t1".to_string(),
					batch_size: Some(500),
					navigate_earlier: false,
					from_timestamp: None,
					order: None,
					scroll_id: scroll_id.take(),
				},
			)
			.await
			.expect("get_task_log failed.");

		assert_eq!(response.total, 1_200);
		assert!(!response.restarted);

		sizes.push(response.returned);
		seen.extend(response.events.iter().map(|event| event.iter));
		scroll_id = Some(response.scroll_id);
	}

	assert_eq!(sizes, vec![500, 500, 200, 0, 0]);
	assert_eq!(seen.len(), 1_200);
}

#[tokio::test]
async fn scroll_returns_ceil_m_over_b_batches_in_sort_order() {
	let fx = fixture();

	fx.store.insert_many((0..23).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));

	let mut scroll_id = None;
	let mut batches = Vec::new();

	loop {
		let response = fx
			.service
			.get_task_events(COMPANY, events_request(&["t1"], 5, scroll_id.take()))
			.await
			.expect("get_task_events failed.");

		scroll_id = Some(response.scroll_id);

		if response.events.is_empty() {
			break;
		}

		batches.push(response.events.iter().map(|event| event.iter).collect::<Vec<_>>());
	}

	let flat = batches.concat();

	assert_eq!(batches.len(), 23_usize.div_ceil(5));
	assert_eq!(flat, (0..23).collect::<Vec<_>>());
}

#[tokio::test]
async fn events_ingested_mid_scroll_do_not_shift_pages() {
	let fx = fixture();

	fx.store.insert_many((0..10).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));

	let first = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, None))
		.await
		.expect("First page failed.");

	// Lands before the scroll position in sort order; an offset-based page would repeat iter 3.
	fx.store.insert(scalar("t1", "loss", "train", -1, 1.0));
	fx.store.insert(scalar("t1", "loss", "train", 100, 1.0));

	let second = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, Some(first.scroll_id)))
		.await
		.expect("Second page failed.");
	let third = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, Some(second.scroll_id)))
		.await
		.expect("Third page failed.");

	assert_eq!(second.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![4, 5, 6, 7]);
	assert_eq!(third.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![8, 9]);
	assert_eq!(third.total, 10);
}

#[tokio::test]
async fn merged_tasks_share_one_scroll() {
	let fx = fixture();

	fx.store.insert_many((0..3).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));
	fx.store.insert_many((0..3).map(|iter| scalar("t2", "loss", "train", iter, 2.0)));

	let mut request = events_request(&["t1", "t2"], 10, None);

	request.event_type = Some(EventType::Scalar);

	let response =
		fx.service.get_task_events(COMPANY, request).await.expect("get_task_events failed.");

	assert_eq!(response.returned, 6);
	assert_eq!(response.total, 6);
}

#[tokio::test]
async fn token_presented_for_another_task_restarts_iteration() {
	let fx = fixture();

	fx.store.insert_many((0..6).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));
	fx.store.insert_many((0..6).map(|iter| scalar("t2", "loss", "train", iter, 1.0)));

	let first = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, None))
		.await
		.expect("First page failed.");
	let replayed = fx
		.service
		.get_task_events(COMPANY, events_request(&["t2"], 4, Some(first.scroll_id)))
		.await
		.expect("Replayed page failed.");

	assert!(replayed.restarted);
	assert_eq!(replayed.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
	assert!(replayed.events.iter().all(|event| event.task == "t2"));
}

#[tokio::test]
async fn tampered_token_restarts_iteration() {
	let fx = fixture();

	fx.store.insert_many((0..6).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));

	let first = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, None))
		.await
		.expect("First page failed.");
	let mut tampered = first.scroll_id.clone();

	tampered.insert(3, 'x');

	let response = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, Some(tampered)))
		.await
		.expect("Tampered page failed.");

	assert!(response.restarted);
	assert_eq!(response.returned, 4);
	assert_eq!(response.events[0].iter, 0);
}

#[tokio::test]
async fn store_side_cursor_expiry_restarts_iteration() {
	let fx = fixture();

	fx.store.insert_many((0..6).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));

	let first = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, None))
		.await
		.expect("First page failed.");

	fx.store.expire_cursors();

	let response = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, Some(first.scroll_id)))
		.await
		.expect("Expired page failed.");

	assert!(response.restarted);
	assert_eq!(response.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn token_older_than_ttl_restarts_iteration() {
	let fx = fixture();

	fx.store.insert_many((0..6).map(|iter| scalar("t1", "loss", "train", iter, 1.0)));

	let scope = CursorScope::new("get_task_events", COMPANY, &["t1".to_string()], None)
		.with_fingerprint(&EventSort::new(SortField::Iter, SortOrder::Asc));
	let state = ScrollState::Active {
		cursor: StoreCursor {
			snapshot: 6,
			total: 6,
			after: Some(SortPosition { value: 3, seq: 4 }),
		},
		returned: 4,
	};
	let stale = fx.service.codec().encode_at(&scope, &state, 0).expect("Encode failed.");
	let fresh = fx.service.codec().encode(&scope, &state).expect("Encode failed.");
	let restarted = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, Some(stale)))
		.await
		.expect("Stale page failed.");
	let continued = fx
		.service
		.get_task_events(COMPANY, events_request(&["t1"], 4, Some(fresh)))
		.await
		.expect("Fresh page failed.");

	assert!(restarted.restarted);
	assert_eq!(restarted.events[0].iter, 0);
	assert!(!continued.restarted);
	assert_eq!(continued.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![4, 5]);
}

#[tokio::test]
async fn log_order_reverses_only_when_it_disagrees_with_navigation() {
	let fx = fixture();

	fx.store.insert_many((0..10).map(|n| log("t1", n)));

	let request = |order| TaskLogRequest {
		task: "t1".to_string(),
		batch_size: Some(3),
		navigate_earlier: true,
		from_timestamp: Some(1_700_000_000_000 + 8 * 1_000),
		order,
		scroll_id: None,
	};
	let newest_first =
		fx.service.get_task_log(COMPANY, request(None)).await.expect("get_task_log failed.");
	let oldest_first = fx
		.service
		.get_task_log(COMPANY, request(Some(SortOrder::Asc)))
		.await
		.expect("get_task_log failed.");

	assert_eq!(newest_first.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![7, 6, 5]);
	assert_eq!(oldest_first.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![5, 6, 7]);
	assert_eq!(newest_first.total, 8);
}

#[tokio::test]
async fn scalar_metric_data_scrolls_one_metric_newest_first() {
	let fx = fixture();

	for iter in 0..3 {
		fx.store.insert(scalar("t1", "loss", "train", iter, iter as f64));
		fx.store.insert(scalar("t1", "acc", "train", iter, 0.5));
	}

	let request = |scroll_id| ScalarMetricDataRequest {
		task: "t1".to_string(),
		metric: "loss".to_string(),
		batch_size: Some(2),
		scroll_id,
	};
	let first = fx
		.service
		.get_scalar_metric_data(COMPANY, request(None))
		.await
		.expect("get_scalar_metric_data failed.");

	assert_eq!(first.total, 3);
	assert_eq!(first.events.iter().map(|event| event.iter).collect::<Vec<_>>(), vec![2, 1]);
	assert!(first.events.iter().all(|event| event.metric == "loss"));

	let second = fx
		.service
		.get_scalar_metric_data(COMPANY, request(Some(first.scroll_id)))
		.await
		.expect("get_scalar_metric_data failed.");

	assert_eq!(second.events.iter().map(|event| event.iter).collect::<Vec<_>>(), vec![0]);

	let err = fx
		.service
		.get_scalar_metric_data(
			COMPANY,
			ScalarMetricDataRequest { metric: " ".to_string(), ..request(None) },
		)
		.await
		.expect_err("Blank metric must be rejected.");

	assert!(matches!(err, Error::InvalidParameter { .. }));
}
