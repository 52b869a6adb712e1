use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError,
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Public SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream clock, roster and team events to displays.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_public(&state);
    info!("new public SSE connection");
    let initial = sse_service::initial_events(&state, "public", None).await;
    sse_service::to_sse_stream(initial, receiver, StreamKind::Public)
}

#[utoipa::path(
    get,
    path = "/sse/control",
    tag = "sse",
    responses(
        (status = 200, description = "Control SSE stream; the first events carry the control token", content_type = "text/event-stream", body = String),
        (status = 401, description = "Another control stream is already connected")
    )
)]
/// Stream events to the single staff client and hand it the control token.
pub async fn control_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, token) = sse_service::subscribe_control(&state).await?;
    info!("new control SSE connection");
    sse_service::broadcast_public_info(&state, "control surface connected");
    let initial = sse_service::initial_events(&state, "control", Some(&token)).await;
    Ok(sse_service::to_sse_stream(
        initial,
        receiver,
        StreamKind::Control(state),
    ))
}

pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .route("/sse/control", get(control_stream))
}
