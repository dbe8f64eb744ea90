//! Participant submission flow.
//!
//! A participant joins a session by token, flips until the sequence is
//! complete, and submits once. At-most-once is advisory: a device-local
//! marker is checked before any store write and set only after the store
//! confirmed the insert. The server does not enforce it.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::common::{SessionId, FLIP_TARGET};
use crate::domains::results::trials::{Coin, FairCoin, Flip, TrialSequence};
use crate::domains::results::{NewTossResult, TossResult, ValidationError};
use crate::domains::sessions::{SessionMonitor, SessionState, SessionView};
use crate::kernel::{BaseExperimentStore, BaseMarkerStore};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Session is not accepting results ({0:?}).")]
    NotReady(SessionState),

    #[error("You have already submitted a result for this session.")]
    AlreadySubmitted,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Could not check earlier submissions. Please try again.")]
    MarkerUnavailable(#[source] anyhow::Error),

    #[error("Could not submit your result. Please try again.")]
    Persist(#[source] anyhow::Error),
}

impl SubmitError {
    /// Whether the same call may succeed later without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitError::MarkerUnavailable(_) | SubmitError::Persist(_)
        )
    }
}

/// Snapshot of a participant's progress, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialProgress {
    pub count: usize,
    pub target: usize,
    pub last: Option<Flip>,
    pub heads: usize,
    pub tails: usize,
    pub submitted: bool,
    /// The marker was already present when the session was joined.
    pub already_marked: bool,
    pub can_interact: bool,
}

pub struct Participant {
    monitor: SessionMonitor,
    store: Arc<dyn BaseExperimentStore>,
    markers: Arc<dyn BaseMarkerStore>,
    coin: Box<dyn Coin>,
    trials: TrialSequence,
    submitted: bool,
    already_marked: bool,
}

impl Participant {
    /// Check `token` against the store and load this device's marker for it.
    pub async fn join(
        store: Arc<dyn BaseExperimentStore>,
        markers: Arc<dyn BaseMarkerStore>,
        token: Option<&str>,
    ) -> Self {
        let mut participant = Self {
            monitor: SessionMonitor::new(store.clone()),
            store,
            markers,
            coin: Box::new(FairCoin::from_entropy()),
            trials: TrialSequence::new(),
            submitted: false,
            already_marked: false,
        };
        participant.switch_session(token).await;
        participant
    }

    /// Replace the trial generator.
    pub fn with_coin(mut self, coin: Box<dyn Coin>) -> Self {
        self.coin = coin;
        self
    }

    pub fn session(&self) -> SessionView {
        self.monitor.current()
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn can_interact(&self) -> bool {
        self.monitor.current().is_ready() && !self.submitted
    }

    /// Re-run the session check for a new token. The in-progress sequence
    /// belongs to the old session and is discarded.
    pub async fn switch_session(&mut self, token: Option<&str>) -> SessionView {
        self.trials.reset();
        self.submitted = false;
        self.already_marked = false;

        let view = self.monitor.check(token).await;
        if let Some(session_id) = view.session_id {
            self.reload_marker(session_id).await;
        }
        view
    }

    /// Flip once. `None` when the session is not ready, the result is
    /// already submitted, or the sequence is full.
    pub fn flip(&mut self) -> Option<Flip> {
        if !self.can_interact() {
            return None;
        }
        self.trials.flip_with(self.coin.as_mut())
    }

    pub fn reset(&mut self) {
        if self.can_interact() {
            self.trials.reset();
        }
    }

    pub fn progress(&self) -> TrialProgress {
        TrialProgress {
            count: self.trials.len(),
            target: FLIP_TARGET,
            last: self.trials.last(),
            heads: self.trials.heads(),
            tails: self.trials.tails(),
            submitted: self.submitted,
            already_marked: self.already_marked,
            can_interact: self.can_interact(),
        }
    }

    /// Submit the completed sequence under `label`.
    ///
    /// Nothing reaches the store unless the session is ready, no marker is
    /// present, the label is non-blank and the sequence is complete. A
    /// failed insert leaves the marker unset so the call can be retried.
    pub async fn submit(&mut self, label: &str) -> Result<TossResult, SubmitError> {
        let view = self.monitor.current();
        let session_id = match (view.state, view.session_id) {
            (SessionState::Ready, Some(id)) => id,
            (state, _) => return Err(SubmitError::NotReady(state)),
        };

        if self.submitted
            || self
                .markers
                .has_submitted(session_id)
                .await
                .map_err(SubmitError::MarkerUnavailable)?
        {
            self.submitted = true;
            return Err(SubmitError::AlreadySubmitted);
        }

        let submission = NewTossResult::from_trials(session_id, label, &self.trials)?;

        let stored = self.store.insert_result(submission).await.map_err(|e| {
            warn!(session_id = %session_id, error = %e, "Result insert failed");
            SubmitError::Persist(e)
        })?;
        info!(session_id = %session_id, result_id = %stored.id, heads = stored.heads, "Result submitted");

        self.submitted = true;
        self.trials.reset();
        if let Err(e) = self.markers.mark_submitted(session_id).await {
            // the row exists; a retry would duplicate it
            warn!(session_id = %session_id, error = %e, "Failed to persist submission marker");
        }

        Ok(stored)
    }

    async fn reload_marker(&mut self, session_id: SessionId) {
        match self.markers.has_submitted(session_id).await {
            Ok(marked) => {
                self.already_marked = marked;
                self.submitted = marked;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Could not read submission marker");
            }
        }
    }
}
