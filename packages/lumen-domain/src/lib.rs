pub mod event;
pub mod histogram;
pub mod log_format;
pub mod top_iterations;

pub use event::{
	DebugImagePayload, Event, EventPayload, EventType, LogPayload, PlotPayload, ScalarKey,
	ScalarPayload, SortOrder, VectorPayload,
};
