use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// An immutable experiment event. The payload carries the type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub company: String,
	pub task: String,
	pub metric: String,
	pub variant: String,
	pub iter: i64,
	/// Milliseconds since the Unix epoch.
	pub timestamp: i64,
	#[serde(flatten)]
	pub payload: EventPayload,
}
impl Event {
	pub fn event_type(&self) -> EventType {
		self.payload.event_type()
	}

	pub fn scalar_value(&self) -> Option<f64> {
		match &self.payload {
			EventPayload::Scalar(scalar) => Some(scalar.value),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
	#[serde(rename = "log")]
	Log(LogPayload),
	#[serde(rename = "training_stats_scalar", alias = "scalar")]
	Scalar(ScalarPayload),
	#[serde(rename = "plot")]
	Plot(PlotPayload),
	#[serde(rename = "training_debug_image", alias = "debug_image")]
	DebugImage(DebugImagePayload),
	#[serde(rename = "training_stats_vector", alias = "vector")]
	Vector(VectorPayload),
}
impl EventPayload {
	pub fn event_type(&self) -> EventType {
		match self {
			Self::Log(_) => EventType::Log,
			Self::Scalar(_) => EventType::Scalar,
			Self::Plot(_) => EventType::Plot,
			Self::DebugImage(_) => EventType::DebugImage,
			Self::Vector(_) => EventType::Vector,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
	pub level: String,
	#[serde(default)]
	pub worker: Option<String>,
	pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarPayload {
	pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotPayload {
	pub plot_str: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugImagePayload {
	#[serde(default)]
	pub key: Option<String>,
	pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
	pub values: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
	#[serde(rename = "log")]
	Log,
	#[serde(rename = "training_stats_scalar", alias = "scalar")]
	Scalar,
	#[serde(rename = "plot")]
	Plot,
	#[serde(rename = "training_debug_image", alias = "debug_image")]
	DebugImage,
	#[serde(rename = "training_stats_vector", alias = "vector")]
	Vector,
}
impl EventType {
	/// Name used on the wire and in the store.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Log => "log",
			Self::Scalar => "training_stats_scalar",
			Self::Plot => "plot",
			Self::DebugImage => "training_debug_image",
			Self::Vector => "training_stats_vector",
		}
	}
}
impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for EventType {
	type Err = String;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		match value {
			"log" => Ok(Self::Log),
			"training_stats_scalar" | "scalar" => Ok(Self::Scalar),
			"plot" => Ok(Self::Plot),
			"training_debug_image" | "debug_image" => Ok(Self::DebugImage),
			"training_stats_vector" | "vector" => Ok(Self::Vector),
			other => Err(format!("Unknown event type {other:?}.")),
		}
	}
}

/// X-axis semantic of a scalar histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKey {
	#[default]
	Iter,
	Timestamp,
	IsoTime,
}
impl ScalarKey {
	pub fn axis_value(self, event: &Event) -> i64 {
		match self {
			Self::Iter => event.iter,
			Self::Timestamp | Self::IsoTime => event.timestamp,
		}
	}

	pub fn is_time(self) -> bool {
		!matches!(self, Self::Iter)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
	#[default]
	Asc,
	Desc,
}
impl SortOrder {
	pub fn as_sql(self) -> &'static str {
		match self {
			Self::Asc => "ASC",
			Self::Desc => "DESC",
		}
	}
}
