// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Session lifecycle, ingestion and aggregation rules live in the domains and
// talk to storage through these seams.
//
// Naming convention: Base* for trait names (e.g., BaseExperimentStore)

use anyhow::Result;
use async_trait::async_trait;

use super::change_feed::ResultSubscription;
use crate::common::SessionId;
use crate::domains::results::{NewTossResult, TossResult};
use crate::domains::sessions::Session;

// =============================================================================
// Experiment Store Trait (Infrastructure - durable store + change feed)
// =============================================================================

/// The durable store shared by the host and every participant.
///
/// It is the only arbiter of creation order. Nothing here enforces one
/// result per participant; that is the ingestion protocol's job.
#[async_trait]
pub trait BaseExperimentStore: Send + Sync {
    /// Insert a new open session (server-assigned id and timestamp)
    async fn create_session(&self) -> Result<Session>;

    /// Set `is_open = false`. `None` when the id matches no session.
    async fn close_session(&self, id: SessionId) -> Result<Option<Session>>;

    /// Point lookup. `None` when the id matches no session.
    async fn find_session(&self, id: SessionId) -> Result<Option<Session>>;

    /// All results for a session, newest first
    async fn list_results(&self, session_id: SessionId) -> Result<Vec<TossResult>>;

    /// Persist a submission and return the stored row
    async fn insert_result(&self, new: NewTossResult) -> Result<TossResult>;

    /// Push feed of results inserted after this call returns
    async fn subscribe_to_new_results(&self, session_id: SessionId) -> Result<ResultSubscription>;

    /// Cheap liveness probe for health checks
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Idempotence Marker Trait (Infrastructure - device-local flags)
// =============================================================================

/// Per-device record of "already submitted to this session".
///
/// Advisory only: another device, or a wiped profile, can submit again.
#[async_trait]
pub trait BaseMarkerStore: Send + Sync {
    async fn has_submitted(&self, session_id: SessionId) -> Result<bool>;

    async fn mark_submitted(&self, session_id: SessionId) -> Result<()>;
}
