use lumen_domain::SortOrder;
use lumen_service::{Error, LogDownloadRequest, LogLineType, LogScrollFrom, ScrollTaskLogRequest};

use super::{COMPANY, fixture, fixture_with, log, test_config};

fn download(line_type: LogLineType, line_format: Option<&str>) -> LogDownloadRequest {
	LogDownloadRequest {
		task: "t1".to_string(),
		line_type,
		line_format: line_format.map(str::to_string),
	}
}

#[tokio::test]
async fn json_download_streams_every_line_in_chunks() {
	let mut cfg = test_config();

	cfg.events.log_download_batch = 2;

	let fx = fixture_with(cfg);

	fx.store.insert_many((0..5).map(|n| log("t1", n)));

	let mut download = fx
		.service
		.download_task_log(COMPANY, download(LogLineType::Json, None))
		.await
		.expect("download_task_log failed.");
	let mut chunks = Vec::new();

	while let Some(chunk) = download.next_chunk(&fx.service).await.expect("Chunk failed.") {
		chunks.push(chunk);
	}

	let lines = chunks.concat().lines().map(str::to_string).collect::<Vec<_>>();
	let first: serde_json::Value = serde_json::from_str(&lines[0]).expect("Line is not JSON.");

	assert_eq!(chunks.len(), 3);
	assert_eq!(lines.len(), 5);
	assert_eq!(first["msg"], "line 0");
	assert_eq!(first["asctime"], 1_700_000_000_000_i64);
	assert!(first.get("task").is_none());
	assert_eq!(download.filename(), "task_t1.log");
}

#[tokio::test]
async fn text_download_uses_the_line_format() {
	let fx = fixture();

	fx.store.insert_many((0..2).map(|n| log("t1", n)));

	let text = fx
		.service
		.download_task_log(COMPANY, download(LogLineType::Text, Some("[{level}] {msg}")))
		.await
		.expect("download_task_log failed.")
		.collect(&fx.service)
		.await
		.expect("Download failed.");

	assert_eq!(text, "[info] line 0\n[info] line 1\n");
}

#[tokio::test]
async fn unknown_placeholders_are_rejected_before_reading_the_store() {
	let fx = fixture();

	fx.store.insert(log("t1", 0));

	let err = fx
		.service
		.download_task_log(COMPANY, download(LogLineType::Text, Some("{asctime} {host} {pid}")))
		.await
		.err()
		.expect("Expected an invalid line format.");
	let Error::InvalidParameter { message } = err else {
		panic!("Expected an invalid parameter, got {err:?}.");
	};

	assert!(message.contains("host") && message.contains("pid"));
	assert_eq!(fx.store.calls(), 0);
}

#[tokio::test]
async fn scroll_log_from_either_end_honours_the_output_order() {
	let fx = fixture();

	fx.store.insert_many((0..6).map(|n| log("t1", n)));

	let request = |from, order| ScrollTaskLogRequest {
		task: "t1".to_string(),
		order,
		from,
		batch_size: Some(3),
		scroll_id: None,
	};
	let head = fx
		.service
		.scroll_task_log(COMPANY, request(LogScrollFrom::Head, None))
		.await
		.expect("Head scroll failed.");
	let tail = fx
		.service
		.scroll_task_log(COMPANY, request(LogScrollFrom::Tail, Some(SortOrder::Asc)))
		.await
		.expect("Tail scroll failed.");

	assert_eq!(head.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![2, 1, 0]);
	assert_eq!(tail.events.iter().map(|e| e.iter).collect::<Vec<_>>(), vec![3, 4, 5]);
}
