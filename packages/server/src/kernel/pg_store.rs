//! Postgres-backed experiment store.
//!
//! Rows live in the `sessions` and `results` tables. An insert trigger on
//! `results` sends `pg_notify('result_inserted', {id, session_id})`; a
//! background task listens on that channel, loads the row and republishes it
//! on the in-process `StreamHub`, so every process connected to the same
//! database sees every insert.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::change_feed::{results_topic, FeedEvent, ResultSubscription};
use super::stream_hub::StreamHub;
use super::traits::BaseExperimentStore;
use crate::common::{ResultId, SessionId};
use crate::domains::results::{NewTossResult, TossResult};
use crate::domains::sessions::Session;

/// Notification channel written by the `results` insert trigger.
pub const RESULT_INSERTED_CHANNEL: &str = "result_inserted";

#[derive(Debug, Deserialize)]
struct ResultInsertedPayload {
    id: ResultId,
    session_id: SessionId,
}

pub struct PgStore {
    pool: PgPool,
    hub: StreamHub<FeedEvent>,
    listener: JoinHandle<()>,
}

impl PgStore {
    /// Connect the notification listener and start forwarding inserts.
    pub async fn connect(pool: PgPool, hub: StreamHub<FeedEvent>) -> Result<Self> {
        let mut listener = PgListener::connect_with(&pool)
            .await
            .context("Failed to open notification listener")?;
        listener
            .listen(RESULT_INSERTED_CHANNEL)
            .await
            .context("Failed to LISTEN on result channel")?;
        info!(channel = RESULT_INSERTED_CHANNEL, "Listening for result inserts");

        let task = tokio::spawn(forward_notifications(listener, pool.clone(), hub.clone()));

        Ok(Self {
            pool,
            hub,
            listener: task,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Listener loop: notification -> row -> hub topic.
///
/// `try_recv` yields `Ok(None)` after the connection dropped and was
/// re-established; anything sent in between is gone, so observers are told
/// to resync.
async fn forward_notifications(mut listener: PgListener, pool: PgPool, hub: StreamHub<FeedEvent>) {
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                let payload: ResultInsertedPayload =
                    match serde_json::from_str(notification.payload()) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, payload = notification.payload(), "Unreadable result notification");
                            continue;
                        }
                    };

                match TossResult::find_by_id(payload.id, &pool).await {
                    Ok(Some(result)) => {
                        let delivered = hub
                            .publish(
                                &results_topic(payload.session_id),
                                FeedEvent::ResultInserted { result },
                            )
                            .await;
                        debug!(
                            result_id = %payload.id,
                            session_id = %payload.session_id,
                            delivered,
                            "Forwarded result insert"
                        );
                    }
                    Ok(None) => {
                        warn!(result_id = %payload.id, "Notified result not found");
                    }
                    Err(e) => {
                        warn!(error = %e, result_id = %payload.id, "Failed to load notified result");
                        hub.publish(&results_topic(payload.session_id), FeedEvent::Resync)
                            .await;
                    }
                }
            }
            Ok(None) => {
                warn!("Notification connection lost; asking observers to resync");
                hub.publish_all(FeedEvent::Resync).await;
            }
            Err(e) => {
                error!(error = %e, "Notification listener failed");
                hub.publish_all(FeedEvent::Resync).await;
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

#[async_trait]
impl BaseExperimentStore for PgStore {
    async fn create_session(&self) -> Result<Session> {
        Session::create(&self.pool).await
    }

    async fn close_session(&self, id: SessionId) -> Result<Option<Session>> {
        Session::close(id, &self.pool).await
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>> {
        Session::find_by_id(id, &self.pool).await
    }

    async fn list_results(&self, session_id: SessionId) -> Result<Vec<TossResult>> {
        TossResult::find_by_session(session_id, &self.pool).await
    }

    async fn insert_result(&self, new: NewTossResult) -> Result<TossResult> {
        new.validate()?;
        TossResult::create(&new, &self.pool).await
    }

    async fn subscribe_to_new_results(&self, session_id: SessionId) -> Result<ResultSubscription> {
        Ok(ResultSubscription::open(&self.hub, session_id).await)
    }

    async fn health_check(&self) -> Result<()> {
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await
        .context("Query timeout (>5s)")??;
        Ok(())
    }
}
