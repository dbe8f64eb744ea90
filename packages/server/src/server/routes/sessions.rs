use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::SessionId;
use crate::domains::sessions::{JoinLink, Session, SessionMonitor, SessionView};
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateSessionQuery {
    /// Language hint carried on the join link.
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session: Session,
    pub join_link: JoinLink,
}

/// Malformed ids are reported like unknown ones.
pub(crate) fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::parse(raw).map_err(|_| ApiError::session_not_found())
}

/// Load a session or answer 404.
pub(crate) async fn load_session(state: &AppState, id: SessionId) -> Result<Session, ApiError> {
    state
        .deps
        .store
        .find_session(id)
        .await
        .map_err(|e| {
            ApiError::store("Could not verify the session. Please try again later.", e)
        })?
        .ok_or_else(ApiError::session_not_found)
}

/// POST /api/sessions
pub async fn create_session_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<CreateSessionQuery>,
) -> Result<(StatusCode, Json<CreatedSession>), ApiError> {
    let session = state
        .deps
        .store
        .create_session()
        .await
        .map_err(|e| ApiError::store("Could not open a session. Please try again.", e))?;
    info!(session_id = %session.id, "Session opened over HTTP");

    let join_link = JoinLink::build(
        &state.deps.public_base_url,
        session.id,
        query.lang.as_deref(),
    );
    Ok((StatusCode::CREATED, Json(CreatedSession { session, join_link })))
}

/// GET /api/sessions/:id
///
/// Answers with the participant's session check. Every settled state is a
/// 200; unknown ids and failed lookups come back as `missing` with a reason.
pub async fn get_session_handler(
    Extension(state): Extension<AppState>,
    Path(token): Path<String>,
) -> Json<SessionView> {
    let monitor = SessionMonitor::new(state.deps.store.clone());
    Json(monitor.check(Some(&token)).await)
}

/// POST /api/sessions/:id/close
///
/// Closing is one-way; closing a closed session returns it unchanged.
pub async fn close_session_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state
        .deps
        .store
        .close_session(id)
        .await
        .map_err(|e| ApiError::store("Could not close the session. Please try again.", e))?
        .ok_or_else(ApiError::session_not_found)?;
    info!(session_id = %id, "Session closed over HTTP");
    Ok(Json(session))
}
