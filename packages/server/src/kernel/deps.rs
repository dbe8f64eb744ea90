//! Server dependencies (using traits for testability)
//!
//! The store is the only collaborator shared between routes, host and
//! participants. It is passed explicitly rather than held as a global.

use std::sync::Arc;
use url::Url;

use crate::kernel::{BaseExperimentStore, FeedEvent, StreamHub};

#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseExperimentStore>,
    /// Hub the store publishes result inserts on; SSE routes read from it
    /// through the store's subscriptions.
    pub stream_hub: StreamHub<FeedEvent>,
    /// Base of participant join links.
    pub public_base_url: Url,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BaseExperimentStore>,
        stream_hub: StreamHub<FeedEvent>,
        public_base_url: Url,
    ) -> Self {
        Self {
            store,
            stream_hub,
            public_base_url,
        }
    }
}
