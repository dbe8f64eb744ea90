//! Host-side session lifecycle: open, close, and the join link.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::common::SessionId;
use crate::domains::sessions::Session;
use crate::kernel::BaseExperimentStore;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("The current session is still open; close it before opening another.")]
    AlreadyOpen,

    #[error("No session has been opened yet.")]
    NoSession,

    #[error("Session {0} no longer exists.")]
    NotFound(SessionId),

    #[error("Could not open a session. Please try again.")]
    OpenFailed(#[source] anyhow::Error),

    #[error("Could not close the session. Please try again.")]
    CloseFailed(#[source] anyhow::Error),
}

/// What the presentation layer encodes as a link or QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinLink {
    pub token: SessionId,
    pub url: String,
}

impl JoinLink {
    /// `{base}/join?session={id}` plus `&lang=` when a language is given.
    pub fn build(base: &Url, token: SessionId, lang: Option<&str>) -> Self {
        let mut url = base.clone();
        let path = format!("{}/join", url.path().trim_end_matches('/'));
        url.set_path(&path);
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("session", &token.to_string());
            if let Some(lang) = lang.map(str::trim).filter(|l| !l.is_empty()) {
                query.append_pair("lang", lang);
            }
        }
        Self {
            token,
            url: url.into(),
        }
    }
}

/// The host's handle on the session it is running.
pub struct SessionHost {
    store: Arc<dyn BaseExperimentStore>,
    base_url: Url,
    current: Option<Session>,
}

impl SessionHost {
    pub fn new(store: Arc<dyn BaseExperimentStore>, base_url: Url) -> Self {
        Self {
            store,
            base_url,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Create a new open session and make it current.
    pub async fn open_session(&mut self) -> Result<&Session, HostError> {
        if self.current.as_ref().is_some_and(|s| s.is_open) {
            return Err(HostError::AlreadyOpen);
        }

        let session = self.store.create_session().await.map_err(|e| {
            error!(error = %e, "Failed to open session");
            HostError::OpenFailed(e)
        })?;
        info!(session_id = %session.id, "Opened session");

        Ok(&*self.current.insert(session))
    }

    /// Close the current session and keep the updated record.
    pub async fn close_session(&mut self) -> Result<&Session, HostError> {
        let id = self.current.as_ref().ok_or(HostError::NoSession)?.id;

        let updated = self.store.close_session(id).await.map_err(|e| {
            error!(session_id = %id, error = %e, "Failed to close session");
            HostError::CloseFailed(e)
        })?;
        let session = updated.ok_or(HostError::NotFound(id))?;
        info!(session_id = %id, "Closed session");

        Ok(&*self.current.insert(session))
    }

    pub fn join_link(&self, lang: Option<&str>) -> Option<JoinLink> {
        self.current
            .as_ref()
            .map(|s| JoinLink::build(&self.base_url, s.id, lang))
    }
}
