mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Cursor, Events, HISTOGRAM_SAMPLES_CEILING, Postgres, Service, Storage};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.postgres.query_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.query_timeout_ms must be greater than zero.".to_string(),
		});
	}

	let events = &cfg.events;

	for (label, value) in [
		("events.default_batch_size", events.default_batch_size),
		("events.max_batch_size", events.max_batch_size),
		("events.histogram_scan_batch", events.histogram_scan_batch),
		("events.multi_task_histogram_limit", events.multi_task_histogram_limit),
		("events.plots_fetch_size", events.plots_fetch_size),
		("events.log_download_batch", events.log_download_batch),
		("events.max_debug_image_iters", events.max_debug_image_iters),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if events.default_batch_size > events.max_batch_size {
		return Err(Error::Validation {
			message: "events.default_batch_size must not exceed events.max_batch_size."
				.to_string(),
		});
	}

	for (label, value) in [
		("events.default_histogram_samples", events.default_histogram_samples),
		("events.max_histogram_samples", events.max_histogram_samples),
	] {
		if !(1..=HISTOGRAM_SAMPLES_CEILING).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 1-{HISTOGRAM_SAMPLES_CEILING}."),
			});
		}
	}

	if events.default_histogram_samples > events.max_histogram_samples {
		return Err(Error::Validation {
			message:
				"events.default_histogram_samples must not exceed events.max_histogram_samples."
					.to_string(),
		});
	}
	if cfg.cursor.secret.trim().is_empty() {
		return Err(Error::Validation { message: "cursor.secret must be non-empty.".to_string() });
	}
	if cfg.cursor.ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "cursor.ttl_seconds must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}

	cfg.service.http_bind = cfg.service.http_bind.trim().to_string();
}
