use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::domains::aggregation::AggregateView;
use crate::domains::results::{NewTossResult, TossResult, ValidationError};
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::routes::sessions::{load_session, parse_session_id};

#[derive(Debug, Deserialize)]
pub struct SubmitResultRequest {
    pub participant_label: Option<String>,
    pub heads: i32,
    pub tails: i32,
    pub sequence: String,
}

/// GET /api/sessions/:id/results - newest first
pub async fn list_results_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TossResult>>, ApiError> {
    let id = parse_session_id(&id)?;
    load_session(&state, id).await?;
    let results = state
        .deps
        .store
        .list_results(id)
        .await
        .map_err(|e| ApiError::store("Could not load results. Please try again.", e))?;
    Ok(Json(results))
}

/// POST /api/sessions/:id/results
///
/// The server checks shape and session state only. It does not know who
/// the participant is, so repeat submissions are not detected here.
pub async fn submit_result_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SubmitResultRequest>,
) -> Result<(StatusCode, Json<TossResult>), ApiError> {
    let id = parse_session_id(&id)?;

    let label = body
        .participant_label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(ValidationError::MissingLabel)?;
    let submission = NewTossResult {
        session_id: id,
        participant_label: Some(label.to_string()),
        heads: body.heads,
        tails: body.tails,
        sequence: body.sequence,
    };
    submission.validate()?;

    let session = load_session(&state, id).await?;
    if !session.is_open {
        return Err(ApiError::Conflict(
            "Session is closed and no longer accepts results.".to_string(),
        ));
    }

    let stored = state
        .deps
        .store
        .insert_result(submission)
        .await
        .map_err(|e| ApiError::store("Could not submit your result. Please try again.", e))?;
    info!(session_id = %id, result_id = %stored.id, "Result submitted over HTTP");

    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/sessions/:id/aggregate
pub async fn aggregate_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AggregateView>, ApiError> {
    let id = parse_session_id(&id)?;
    load_session(&state, id).await?;
    let results = state
        .deps
        .store
        .list_results(id)
        .await
        .map_err(|e| ApiError::store("Could not load results. Please try again.", e))?;
    Ok(Json(AggregateView::from_results(Some(id), &results)))
}
