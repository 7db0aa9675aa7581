use std::collections::BTreeSet;

use crate::event::{Event, EventPayload};

pub const DEFAULT_LINE_FORMAT: &str = "{asctime} {worker} {level} {msg}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogField {
	Asctime,
	Timestamp,
	Level,
	Worker,
	Msg,
}
impl LogField {
	fn parse(name: &str) -> Option<Self> {
		match name {
			"asctime" => Some(Self::Asctime),
			"timestamp" => Some(Self::Timestamp),
			"level" => Some(Self::Level),
			"worker" => Some(Self::Worker),
			"msg" => Some(Self::Msg),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineFormatError {
	#[error("Invalid line format: {message}")]
	Malformed { message: String },
	#[error("Undefined placeholders in line format: {}.", .placeholders.join(", "))]
	UnknownPlaceholders { placeholders: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
	Literal(String),
	Field(LogField),
}

/// A validated `{placeholder}` line template. `{{` and `}}` escape literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormat {
	segments: Vec<Segment>,
}
impl LineFormat {
	/// Parses `format`, collecting every unknown placeholder before failing. The rendered line
	/// always ends with exactly one newline.
	pub fn parse(format: &str) -> Result<Self, LineFormatError> {
		let format = format.trim_end_matches('\n');
		let mut segments = Vec::new();
		let mut unknown = BTreeSet::new();
		let mut literal = String::new();
		let mut chars = format.chars().peekable();

		while let Some(ch) = chars.next() {
			match ch {
				'{' if chars.peek() == Some(&'{') => {
					chars.next();
					literal.push('{');
				},
				'}' if chars.peek() == Some(&'}') => {
					chars.next();
					literal.push('}');
				},
				'}' => {
					return Err(LineFormatError::Malformed {
						message: "single '}' encountered".to_string(),
					});
				},
				'{' => {
					let mut name = String::new();
					let mut closed = false;

					for inner in chars.by_ref() {
						if inner == '}' {
							closed = true;

							break;
						}

						name.push(inner);
					}

					if !closed {
						return Err(LineFormatError::Malformed {
							message: "single '{' encountered".to_string(),
						});
					}

					let name = name.trim();

					if name.is_empty() {
						return Err(LineFormatError::Malformed {
							message: "positional placeholders are not supported".to_string(),
						});
					}
					if name.contains(['{', ':', '!', '.', '[']) {
						return Err(LineFormatError::Malformed {
							message: format!("unsupported placeholder {name:?}"),
						});
					}
					if !literal.is_empty() {
						segments.push(Segment::Literal(std::mem::take(&mut literal)));
					}

					match LogField::parse(name) {
						Some(field) => segments.push(Segment::Field(field)),
						None => {
							unknown.insert(name.to_string());
						},
					}
				},
				other => literal.push(other),
			}
		}

		if !unknown.is_empty() {
			return Err(LineFormatError::UnknownPlaceholders {
				placeholders: unknown.into_iter().collect(),
			});
		}

		literal.push('\n');
		segments.push(Segment::Literal(literal));

		Ok(Self { segments })
	}

	pub fn render(&self, event: &Event) -> String {
		let mut out = String::new();

		for segment in &self.segments {
			match segment {
				Segment::Literal(text) => out.push_str(text),
				Segment::Field(field) => out.push_str(&field_value(event, *field)),
			}
		}

		out
	}
}
impl Default for LineFormat {
	fn default() -> Self {
		Self::parse(DEFAULT_LINE_FORMAT).unwrap_or(Self { segments: Vec::new() })
	}
}

/// Renders an event as one JSON line, without `type` and `task` and with `timestamp` exposed as
/// `asctime`.
pub fn json_line(event: &Event) -> serde_json::Result<String> {
	let mut value = serde_json::to_value(event)?;

	if let Some(object) = value.as_object_mut() {
		object.remove("type");
		object.remove("task");

		if let Some(timestamp) = object.remove("timestamp") {
			object.insert("asctime".to_string(), timestamp);
		}
	}

	let mut line = serde_json::to_string(&value)?;

	line.push('\n');

	Ok(line)
}

fn field_value(event: &Event, field: LogField) -> String {
	let log = match &event.payload {
		EventPayload::Log(log) => Some(log),
		_ => None,
	};

	match field {
		LogField::Asctime | LogField::Timestamp => event.timestamp.to_string(),
		LogField::Level => log.map(|log| log.level.clone()).unwrap_or_default(),
		LogField::Worker => log.and_then(|log| log.worker.clone()).unwrap_or_default(),
		LogField::Msg => log.map(|log| log.msg.clone()).unwrap_or_default(),
	}
}
