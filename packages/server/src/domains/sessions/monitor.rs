//! Participant-side view of a session's lifecycle.
//!
//! Every check starts in `Loading` and settles in `Ready`, `Closed` or
//! `Missing`. Checks can overlap when the token changes while a lookup is in
//! flight; each check carries a generation number and only the newest one
//! may settle the state.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::common::SessionId;
use crate::domains::sessions::Session;
use crate::kernel::BaseExperimentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Ready,
    Closed,
    Missing,
}

/// Why a check ended in `Missing`. A failed lookup is worth retrying; a
/// token that resolves to nothing means the link itself is bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    NoToken,
    LookupFailed,
    NotFound,
}

impl MissingReason {
    pub fn message(self) -> &'static str {
        match self {
            MissingReason::NoToken => "Missing session id. Use the join link from the host.",
            MissingReason::LookupFailed => "Could not verify the session. Please try again later.",
            MissingReason::NotFound => "Session not found.",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, MissingReason::LookupFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: Option<SessionId>,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<MissingReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SessionView {
    fn loading(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            state: SessionState::Loading,
            reason: None,
            message: None,
        }
    }

    fn missing(session_id: Option<SessionId>, reason: MissingReason) -> Self {
        Self {
            session_id,
            state: SessionState::Missing,
            reason: Some(reason),
            message: Some(reason.message().to_string()),
        }
    }

    /// Classify the outcome of a lookup for `session_id`.
    pub fn from_lookup(session_id: SessionId, lookup: &anyhow::Result<Option<Session>>) -> Self {
        match lookup {
            Err(_) => Self::missing(Some(session_id), MissingReason::LookupFailed),
            Ok(None) => Self::missing(Some(session_id), MissingReason::NotFound),
            Ok(Some(session)) => Self {
                session_id: Some(session_id),
                state: if session.is_open {
                    SessionState::Ready
                } else {
                    SessionState::Closed
                },
                reason: None,
                message: None,
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }
}

/// Proof that a check was started; settling requires the newest ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTicket {
    generation: u64,
    session_id: Option<SessionId>,
}

impl CheckTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }
}

struct MonitorState {
    generation: u64,
    view: SessionView,
}

/// Session check state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionMonitor {
    store: Arc<dyn BaseExperimentStore>,
    state: Arc<Mutex<MonitorState>>,
    updates: watch::Sender<SessionView>,
}

impl SessionMonitor {
    pub fn new(store: Arc<dyn BaseExperimentStore>) -> Self {
        let initial = SessionView::loading(None);
        let (updates, _) = watch::channel(initial.clone());
        Self {
            store,
            state: Arc::new(Mutex::new(MonitorState {
                generation: 0,
                view: initial,
            })),
            updates,
        }
    }

    pub fn current(&self) -> SessionView {
        self.lock().view.clone()
    }

    /// Receives every settled or loading view.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.updates.subscribe()
    }

    /// Start a check for `token`: bump the generation and enter `Loading`.
    ///
    /// A token that is absent or does not parse settles immediately as
    /// `Missing`, and the returned ticket has nothing left to resolve.
    pub fn begin(&self, token: Option<&str>) -> (CheckTicket, SessionView) {
        let mut state = self.lock();
        state.generation += 1;
        let generation = state.generation;

        let view = match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => SessionView::missing(None, MissingReason::NoToken),
            Some(raw) => match SessionId::parse(raw) {
                Ok(id) => SessionView::loading(Some(id)),
                Err(_) => SessionView::missing(None, MissingReason::NotFound),
            },
        };

        let ticket = CheckTicket {
            generation,
            session_id: match view.state {
                SessionState::Loading => view.session_id,
                _ => None,
            },
        };
        state.view = view.clone();
        drop(state);

        self.updates.send_replace(view.clone());
        (ticket, view)
    }

    /// Settle a check. Returns `false` and changes nothing when a newer
    /// check has started since `ticket` was issued.
    pub fn resolve(&self, ticket: CheckTicket, lookup: &anyhow::Result<Option<Session>>) -> bool {
        let Some(session_id) = ticket.session_id else {
            return false;
        };

        let mut state = self.lock();
        if state.generation != ticket.generation {
            debug!(
                session_id = %session_id,
                generation = ticket.generation,
                current = state.generation,
                "Discarding stale session check"
            );
            return false;
        }

        let view = SessionView::from_lookup(session_id, lookup);
        if let Err(e) = lookup {
            warn!(session_id = %session_id, error = %e, "Session lookup failed");
        }
        state.view = view.clone();
        drop(state);

        self.updates.send_replace(view);
        true
    }

    /// Run a full check against the store and return the view afterwards.
    ///
    /// If another check superseded this one while the lookup was in flight,
    /// the newer check's view is returned.
    pub async fn check(&self, token: Option<&str>) -> SessionView {
        let (ticket, view) = self.begin(token);
        let Some(session_id) = ticket.session_id else {
            return view;
        };

        let lookup = self.store.find_session(session_id).await;
        self.resolve(ticket, &lookup);
        self.current()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{MemoryStore, StoreOp};

    fn monitor() -> (Arc<MemoryStore>, SessionMonitor) {
        let store = Arc::new(MemoryStore::new());
        let monitor = SessionMonitor::new(store.clone());
        (store, monitor)
    }

    #[tokio::test]
    async fn no_token_is_missing() {
        let (_, monitor) = monitor();
        let view = monitor.check(None).await;
        assert_eq!(view.state, SessionState::Missing);
        assert_eq!(view.reason, Some(MissingReason::NoToken));

        let view = monitor.check(Some("   ")).await;
        assert_eq!(view.reason, Some(MissingReason::NoToken));
    }

    #[tokio::test]
    async fn malformed_token_is_not_found() {
        let (_, monitor) = monitor();
        let view = monitor.check(Some("definitely-not-a-uuid")).await;
        assert_eq!(view.state, SessionState::Missing);
        assert_eq!(view.reason, Some(MissingReason::NotFound));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (_, monitor) = monitor();
        let view = monitor.check(Some(&SessionId::new().to_string())).await;
        assert_eq!(view.reason, Some(MissingReason::NotFound));
        assert_eq!(view.message.as_deref(), Some("Session not found."));
    }

    #[tokio::test]
    async fn lookup_failure_is_retryable_missing() {
        let (store, monitor) = monitor();
        let session = store.create_session().await.unwrap();
        store.fail_next(StoreOp::FindSession);

        let view = monitor.check(Some(&session.id.to_string())).await;
        assert_eq!(view.state, SessionState::Missing);
        assert!(view.reason.unwrap().is_retryable());

        // retry succeeds
        let view = monitor.check(Some(&session.id.to_string())).await;
        assert_eq!(view.state, SessionState::Ready);
    }

    #[tokio::test]
    async fn open_then_closed() {
        let (store, monitor) = monitor();
        let session = store.create_session().await.unwrap();
        let token = session.id.to_string();

        assert_eq!(monitor.check(Some(&token)).await.state, SessionState::Ready);

        store.close_session(session.id).await.unwrap();
        assert_eq!(monitor.check(Some(&token)).await.state, SessionState::Closed);
    }

    #[tokio::test]
    async fn stale_resolution_is_discarded() {
        let (store, monitor) = monitor();
        let old = store.create_session().await.unwrap();
        let new = store.create_session().await.unwrap();
        store.close_session(old.id).await.unwrap();

        let (old_ticket, _) = monitor.begin(Some(&old.id.to_string()));
        let (new_ticket, view) = monitor.begin(Some(&new.id.to_string()));
        assert_eq!(view.state, SessionState::Loading);

        // newer check settles first, older response arrives late
        let new_lookup = store.find_session(new.id).await;
        assert!(monitor.resolve(new_ticket, &new_lookup));
        let old_lookup = store.find_session(old.id).await;
        assert!(!monitor.resolve(old_ticket, &old_lookup));

        let view = monitor.current();
        assert_eq!(view.session_id, Some(new.id));
        assert_eq!(view.state, SessionState::Ready);
    }

    #[tokio::test]
    async fn stale_response_cannot_overwrite_loading() {
        let (store, monitor) = monitor();
        let a = store.create_session().await.unwrap();
        let b = store.create_session().await.unwrap();

        let (a_ticket, _) = monitor.begin(Some(&a.id.to_string()));
        monitor.begin(Some(&b.id.to_string()));

        let lookup = store.find_session(a.id).await;
        assert!(!monitor.resolve(a_ticket, &lookup));
        assert_eq!(monitor.current().state, SessionState::Loading);
        assert_eq!(monitor.current().session_id, Some(b.id));
    }

    #[tokio::test]
    async fn subscribers_see_settled_view() {
        let (store, monitor) = monitor();
        let session = store.create_session().await.unwrap();
        let mut rx = monitor.subscribe();

        monitor.check(Some(&session.id.to_string())).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().state, SessionState::Ready);
    }
}
