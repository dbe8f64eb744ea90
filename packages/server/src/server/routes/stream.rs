//! SSE streaming endpoint.
//!
//! GET /api/streams/sessions/:id
//!
//! Each connection runs its own aggregation pipeline for the session and
//! forwards every snapshot as a `snapshot` event. The session id is the
//! only credential. The pipeline stops when the client disconnects.

use std::convert::Infallible;

use axum::{
    extract::{Extension, Path},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::domains::aggregation::AggregationPipeline;
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::routes::sessions::{load_session, parse_session_id};

pub async fn session_stream_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = parse_session_id(&id)?;
    load_session(&state, id).await?;

    let pipeline = AggregationPipeline::spawn(state.deps.store.clone());
    pipeline.activate(Some(id));
    debug!(session_id = %id, "Opened session stream");

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    // The first value is the idle snapshot from before activation.
    let snapshots = WatchStream::new(pipeline.subscribe())
        .filter(move |snapshot| {
            let relevant = snapshot.session_id() == Some(id);
            async move { relevant }
        })
        .filter_map(move |snapshot| {
            // keep the pipeline alive for as long as the stream is polled
            let _pipeline = &pipeline;
            let event = Event::default().event("snapshot").json_data(&snapshot).ok();
            async move { event.map(Ok) }
        });

    Ok(Sse::new(connected.chain(snapshots)).keep_alive(KeepAlive::default()))
}
