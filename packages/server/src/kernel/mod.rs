//! Kernel module - storage, change feed and shared dependencies.

pub mod change_feed;
pub mod deps;
pub mod marker_store;
pub mod memory_store;
pub mod pg_store;
pub mod stream_hub;
pub mod traits;

pub use change_feed::{results_topic, FeedEvent, ResultSubscription};
pub use deps::ServerDeps;
pub use marker_store::{marker_key, FileMarkerStore, MemoryMarkerStore};
pub use memory_store::{MemoryStore, StoreOp};
pub use pg_store::{PgStore, RESULT_INSERTED_CHANNEL};
pub use stream_hub::StreamHub;
pub use traits::*;
