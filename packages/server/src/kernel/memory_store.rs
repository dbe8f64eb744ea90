// MemoryStore - in-process experiment store
//
// Backs the `memory` store backend and every test that does not need
// Postgres. Inserts are published on the same StreamHub topics the Postgres
// bridge uses, so observers cannot tell the two apart.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, Semaphore};
use tracing::debug;

use super::change_feed::{results_topic, FeedEvent, ResultSubscription};
use super::stream_hub::StreamHub;
use super::traits::BaseExperimentStore;
use crate::common::{ResultId, SessionId};
use crate::domains::results::{NewTossResult, TossResult};
use crate::domains::sessions::Session;

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateSession,
    CloseSession,
    FindSession,
    ListResults,
    InsertResult,
    Subscribe,
}

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    /// Insertion order; listing walks it backwards.
    results: RwLock<Vec<TossResult>>,
    hub: StreamHub<FeedEvent>,
    failures: Mutex<HashSet<StoreOp>>,
    list_gate: Mutex<Option<Arc<Semaphore>>>,
    insert_attempts: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self) -> &StreamHub<FeedEvent> {
        &self.hub
    }

    /// Make the next call of `op` fail with a transient error.
    pub fn fail_next(&self, op: StoreOp) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op);
    }

    /// Hold every `list_results` call until `release_listing` is called once
    /// per pending call.
    pub fn gate_listing(&self) {
        *self.list_gate.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Arc::new(Semaphore::new(0)));
    }

    /// Let one held (or future) `list_results` call through.
    pub fn release_listing(&self) {
        if let Some(gate) = self
            .list_gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            gate.add_permits(1);
        }
    }

    /// Push an already stored result onto the feed again, as an
    /// at-least-once transport may.
    pub async fn redeliver(&self, result: &TossResult) {
        self.hub
            .publish(
                &results_topic(result.session_id),
                FeedEvent::ResultInserted {
                    result: result.clone(),
                },
            )
            .await;
    }

    /// Store a row without publishing it, as when a notification is lost.
    pub async fn insert_unannounced(&self, new: NewTossResult) -> Result<TossResult> {
        new.validate()?;
        let result = new.into_result(ResultId::new(), Utc::now());
        self.results.write().await.push(result.clone());
        Ok(result)
    }

    /// Ask every observer to reload, as after a dropped notification link.
    pub async fn broadcast_resync(&self) {
        self.hub.publish_all(FeedEvent::Resync).await;
    }

    /// Number of `insert_result` calls, including failed ones.
    pub fn insert_attempts(&self) -> usize {
        *self.insert_attempts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn result_count(&self, session_id: SessionId) -> usize {
        self.results
            .read()
            .await
            .iter()
            .filter(|r| r.session_id == session_id)
            .count()
    }

    fn check_failure(&self, op: StoreOp) -> Result<()> {
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&op);
        if injected {
            return Err(anyhow!("injected transient failure on {:?}", op));
        }
        Ok(())
    }
}

#[async_trait]
impl BaseExperimentStore for MemoryStore {
    async fn create_session(&self) -> Result<Session> {
        self.check_failure(StoreOp::CreateSession)?;
        let session = Session {
            id: SessionId::new(),
            is_open: true,
            created_at: Utc::now(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        debug!(session_id = %session.id, "Created session in memory");
        Ok(session)
    }

    async fn close_session(&self, id: SessionId) -> Result<Option<Session>> {
        self.check_failure(StoreOp::CloseSession)?;
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(&id).map(|session| {
            session.is_open = false;
            session.clone()
        }))
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>> {
        self.check_failure(StoreOp::FindSession)?;
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn list_results(&self, session_id: SessionId) -> Result<Vec<TossResult>> {
        self.check_failure(StoreOp::ListResults)?;

        let gate = self
            .list_gate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }

        Ok(self
            .results
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_result(&self, new: NewTossResult) -> Result<TossResult> {
        *self
            .insert_attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner()) += 1;
        self.check_failure(StoreOp::InsertResult)?;
        new.validate()?;

        if !self.sessions.read().await.contains_key(&new.session_id) {
            return Err(anyhow!("session {} does not exist", new.session_id));
        }

        let result = new.into_result(ResultId::new(), Utc::now());
        self.results.write().await.push(result.clone());
        debug!(session_id = %result.session_id, result_id = %result.id, "Stored result in memory");

        self.hub
            .publish(
                &results_topic(result.session_id),
                FeedEvent::ResultInserted {
                    result: result.clone(),
                },
            )
            .await;
        Ok(result)
    }

    async fn subscribe_to_new_results(&self, session_id: SessionId) -> Result<ResultSubscription> {
        self.check_failure(StoreOp::Subscribe)?;
        Ok(ResultSubscription::open(&self.hub, session_id).await)
    }
}
