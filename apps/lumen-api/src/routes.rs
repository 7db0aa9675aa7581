use std::{collections::HashMap, fmt, str::FromStr};

use axum::{
	Json, Router,
	body::Body,
	extract::{Path, State, rejection::JsonRejection},
	http::{HeaderMap, StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use futures::stream;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use lumen_domain::EventType;
use lumen_service::{
	Error as ServiceError, LogDownloadRequest, MetricsAndVariantsRequest, TopPlotsRequest,
};

use crate::state::AppState;

pub const COMPANY_HEADER: &str = "x-lumen-company";

/// Every routable endpoint with the first API version serving it.
pub static ROUTES: &[(&str, ApiVersion, Handler)] = &[
	("events.get_task_events", ApiVersion::new(1, 0), Handler::TaskEvents),
	("events.get_scalar_metric_data", ApiVersion::new(1, 0), Handler::ScalarMetricData),
	("events.get_task_log", ApiVersion::new(1, 7), Handler::ScrollTaskLog),
	("events.get_task_log", ApiVersion::new(2, 9), Handler::TaskLog),
	("events.download_task_log", ApiVersion::new(1, 0), Handler::DownloadTaskLog),
	("events.debug_images", ApiVersion::new(1, 8), Handler::FlatDebugImages),
	("events.debug_images", ApiVersion::new(2, 7), Handler::DebugImages),
	("events.scalar_metrics_iter_histogram", ApiVersion::new(1, 0), Handler::ScalarHistogram),
	(
		"events.multi_task_scalar_metrics_iter_histogram",
		ApiVersion::new(1, 0),
		Handler::CompareScalarHistograms,
	),
	("events.get_task_plots", ApiVersion::new(1, 0), Handler::TaskPlots),
	("events.get_multi_task_plots", ApiVersion::new(1, 0), Handler::MultiTaskPlots),
	("events.get_task_metrics", ApiVersion::new(1, 0), Handler::TaskMetrics),
	(
		"events.get_scalar_metrics_and_variants",
		ApiVersion::new(1, 0),
		Handler::ScalarMetricsAndVariants,
	),
	(
		"events.get_vector_metrics_and_variants",
		ApiVersion::new(1, 0),
		Handler::VectorMetricsAndVariants,
	),
	("events.vector_metrics_iter_histogram", ApiVersion::new(1, 0), Handler::VectorHistogram),
	(
		"events.get_task_latest_scalar_values",
		ApiVersion::new(1, 0),
		Handler::LatestScalarValues,
	),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
	pub major: u16,
	pub minor: u16,
}
impl ApiVersion {
	pub const fn new(major: u16, minor: u16) -> Self {
		Self { major, minor }
	}
}
impl fmt::Display for ApiVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}
impl FromStr for ApiVersion {
	type Err = ApiError;

	/// Accepts `v2.9`, `2.9` and `2` (minor 0).
	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		let invalid = || {
			json_error(
				StatusCode::BAD_REQUEST,
				"invalid_version",
				format!("Invalid API version {raw:?}."),
				None,
			)
		};
		let trimmed = raw.strip_prefix('v').unwrap_or(raw);
		let (major, minor) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
		let major = major.parse().map_err(|_| invalid())?;
		let minor = minor.parse().map_err(|_| invalid())?;

		Ok(Self { major, minor })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
	TaskEvents,
	ScalarMetricData,
	ScrollTaskLog,
	TaskLog,
	DownloadTaskLog,
	FlatDebugImages,
	DebugImages,
	ScalarHistogram,
	CompareScalarHistograms,
	TaskPlots,
	MultiTaskPlots,
	TaskMetrics,
	ScalarMetricsAndVariants,
	VectorMetricsAndVariants,
	VectorHistogram,
	LatestScalarValues,
}

/// Endpoint name to handlers ordered by ascending minimum version.
#[derive(Debug, Default)]
pub struct RouteTable {
	routes: HashMap<&'static str, Vec<(ApiVersion, Handler)>>,
}
impl RouteTable {
	pub fn new(entries: &[(&'static str, ApiVersion, Handler)]) -> Self {
		let mut routes: HashMap<&'static str, Vec<(ApiVersion, Handler)>> = HashMap::new();

		for (endpoint, min_version, handler) in entries {
			routes.entry(*endpoint).or_default().push((*min_version, *handler));
		}
		for versions in routes.values_mut() {
			versions.sort_by_key(|(version, _)| *version);
		}

		Self { routes }
	}

	pub fn standard() -> Self {
		Self::new(ROUTES)
	}

	/// The handler with the greatest minimum version not above `version`.
	pub fn resolve(&self, endpoint: &str, version: ApiVersion) -> Option<Handler> {
		self.routes.get(endpoint)?.iter().rev().find(|(min, _)| *min <= version).map(|(_, h)| *h)
	}
}

#[derive(Debug, Deserialize)]
struct TaskPlotsBody {
	task: String,
	#[serde(default)]
	iters: Option<u32>,
	#[serde(default)]
	scroll_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskBody {
	task: String,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/{version}/{endpoint}", post(dispatch))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn dispatch(
	State(state): State<AppState>,
	Path((version, endpoint)): Path<(String, String)>,
	headers: HeaderMap,
	payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
	let version = version.parse::<ApiVersion>()?;
	let Some(handler) = state.routes.resolve(&endpoint, version) else {
		return Err(json_error(
			StatusCode::NOT_FOUND,
			"unknown_endpoint",
			format!("Endpoint {endpoint} is not available in version {version}."),
			None,
		));
	};
	let company = company(&headers)?;
	let Json(body) = payload.map_err(|err| {
		json_error(StatusCode::BAD_REQUEST, "invalid_request", err.body_text(), None)
	})?;

	tracing::debug!(%endpoint, %version, ?handler, "Dispatching request.");

	handle(&state, handler, &company, body).await
}

async fn handle(
	state: &AppState,
	handler: Handler,
	company: &str,
	body: Value,
) -> Result<Response, ApiError> {
	let service = &state.service;

	match handler {
		Handler::TaskEvents => reply(service.get_task_events(company, parse(body)?).await),
		Handler::ScalarMetricData =>
			reply(service.get_scalar_metric_data(company, parse(body)?).await),
		Handler::ScrollTaskLog => reply(service.scroll_task_log(company, parse(body)?).await),
		Handler::TaskLog => reply(service.get_task_log(company, parse(body)?).await),
		Handler::DownloadTaskLog => download_task_log(state, company, parse(body)?).await,
		Handler::FlatDebugImages =>
			reply(service.get_debug_images_flat(company, parse(body)?).await),
		Handler::DebugImages => reply(service.get_debug_images(company, parse(body)?).await),
		Handler::ScalarHistogram =>
			reply(service.scalar_metrics_iter_histogram(company, parse(body)?).await),
		Handler::CompareScalarHistograms =>
			reply(service.compare_scalar_histograms(company, parse(body)?).await),
		Handler::TaskPlots => {
			let body: TaskPlotsBody = parse(body)?;
			let req = TopPlotsRequest {
				tasks: vec![body.task],
				iters: body.iters,
				scroll_id: body.scroll_id,
			};

			reply(service.get_top_plots(company, req).await)
		},
		Handler::MultiTaskPlots => reply(service.get_top_plots(company, parse(body)?).await),
		Handler::TaskMetrics => reply(service.get_task_metrics(company, parse(body)?).await),
		Handler::ScalarMetricsAndVariants => {
			let body: TaskBody = parse(body)?;
			let req = MetricsAndVariantsRequest { task: body.task, event_type: EventType::Scalar };

			reply(service.get_metrics_and_variants(company, req).await)
		},
		Handler::VectorMetricsAndVariants => {
			let body: TaskBody = parse(body)?;
			let req = MetricsAndVariantsRequest { task: body.task, event_type: EventType::Vector };

			reply(service.get_metrics_and_variants(company, req).await)
		},
		Handler::VectorHistogram =>
			reply(service.vector_metrics_iter_histogram(company, parse(body)?).await),
		Handler::LatestScalarValues =>
			reply(service.get_task_latest_scalar_values(company, parse(body)?).await),
	}
}

fn parse<T>(body: Value) -> Result<T, ApiError>
where
	T: DeserializeOwned,
{
	serde_json::from_value(body).map_err(|err| {
		json_error(StatusCode::BAD_REQUEST, "invalid_request", err.to_string(), None)
	})
}

fn reply<T>(result: lumen_service::Result<T>) -> Result<Response, ApiError>
where
	T: Serialize,
{
	Ok(Json(result?).into_response())
}

/// Streams the log one store page per body chunk. Errors after the first chunk abort the body.
async fn download_task_log(
	state: &AppState,
	company: &str,
	req: LogDownloadRequest,
) -> Result<Response, ApiError> {
	let download = state.service.download_task_log(company, req).await?;
	let disposition = format!("attachment; filename=\"{}\"", download.filename());
	let service = state.service.clone();
	let chunks = stream::try_unfold((service, download), |(service, mut download)| async move {
		let chunk = download.next_chunk(&service).await.inspect_err(|err| {
			tracing::error!(error = %err, "Log download aborted.");
		})?;

		Ok::<_, ServiceError>(chunk.map(|chunk| (chunk, (service, download))))
	});

	Ok((
		[
			(header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
			(header::CONTENT_DISPOSITION, disposition),
		],
		Body::from_stream(chunks),
	)
		.into_response())
}

fn company(headers: &HeaderMap) -> Result<String, ApiError> {
	headers
		.get(COMPANY_HEADER)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.map(str::to_string)
		.ok_or_else(|| {
			json_error(
				StatusCode::BAD_REQUEST,
				"missing_company",
				format!("The {COMPANY_HEADER} header is required."),
				Some(vec![COMPANY_HEADER.to_string()]),
			)
		})
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidReference { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_reference", message, None),
			ServiceError::InvalidParameter { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_parameter", message, None),
			unavailable @ ServiceError::StoreUnavailable { .. } => {
				let message = unavailable.to_string();

				tracing::error!(%message, "Event store unavailable.");

				json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", message, None)
			},
			ServiceError::Internal { message } => {
				tracing::error!(%message, "Internal error.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message, None)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
