use serde::Deserialize;

/// Hard ceiling on histogram samples accepted by any request.
pub const HISTOGRAM_SAMPLES_CEILING: u32 = 6_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub events: Events,
	pub cursor: Cursor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
	/// Upper bound for a single store round trip. Elapsed calls surface as unavailable.
	#[serde(default = "default_query_timeout_ms")]
	pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Events {
	#[serde(default = "default_batch_size")]
	pub default_batch_size: u32,
	#[serde(default = "default_max_batch_size")]
	pub max_batch_size: u32,
	#[serde(default = "default_histogram_samples")]
	pub default_histogram_samples: u32,
	#[serde(default = "default_histogram_samples")]
	pub max_histogram_samples: u32,
	/// Page size used while streaming raw scalar samples into histogram buckets.
	#[serde(default = "default_histogram_scan_batch")]
	pub histogram_scan_batch: u32,
	#[serde(default = "default_multi_task_histogram_limit")]
	pub multi_task_histogram_limit: u32,
	/// Number of most recent events considered by plot and flat debug image listings.
	#[serde(default = "default_plots_fetch_size")]
	pub plots_fetch_size: u32,
	#[serde(default = "default_log_download_batch")]
	pub log_download_batch: u32,
	#[serde(default = "default_max_debug_image_iters")]
	pub max_debug_image_iters: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cursor {
	pub secret: String,
	#[serde(default = "default_cursor_ttl_seconds")]
	pub ttl_seconds: u64,
}

impl Default for Events {
	fn default() -> Self {
		Self {
			default_batch_size: default_batch_size(),
			max_batch_size: default_max_batch_size(),
			default_histogram_samples: default_histogram_samples(),
			max_histogram_samples: default_histogram_samples(),
			histogram_scan_batch: default_histogram_scan_batch(),
			multi_task_histogram_limit: default_multi_task_histogram_limit(),
			plots_fetch_size: default_plots_fetch_size(),
			log_download_batch: default_log_download_batch(),
			max_debug_image_iters: default_max_debug_image_iters(),
		}
	}
}

fn default_query_timeout_ms() -> u64 {
	10_000
}

fn default_batch_size() -> u32 {
	500
}

fn default_max_batch_size() -> u32 {
	10_000
}

fn default_histogram_samples() -> u32 {
	HISTOGRAM_SAMPLES_CEILING
}

fn default_histogram_scan_batch() -> u32 {
	5_000
}

fn default_multi_task_histogram_limit() -> u32 {
	10
}

fn default_plots_fetch_size() -> u32 {
	10_000
}

fn default_log_download_batch() -> u32 {
	1_000
}

fn default_max_debug_image_iters() -> u32 {
	100
}

fn default_cursor_ttl_seconds() -> u64 {
	86_400
}
