use axum::Router;

use crate::state::SharedState;

pub mod control;
pub mod display;
pub mod docs;
pub mod health;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(display::router())
        .merge(control::router(state.clone()))
        .merge(docs::router());

    api_router.with_state(state)
}
