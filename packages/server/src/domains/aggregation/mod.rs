//! Aggregation domain - live statistics over a session's results.

pub mod pipeline;
pub mod result_set;
pub mod view;

pub use pipeline::AggregationPipeline;
pub use result_set::ResultSet;
pub use view::{AggregateView, LiveSnapshot, RECENT_LIMIT};
