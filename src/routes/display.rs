use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::{display::DisplayStateResponse, game::GameStateResponse, team::RosterResponse},
    error::AppError,
    services::{display_sync, queue_service, timer_service},
    state::SharedState,
};

/// Read-only endpoints backing the public display.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/display", get(display_state))
        .route("/teams", get(list_teams))
        .route("/game-state", get(game_state))
}

#[utoipa::path(
    get,
    path = "/display",
    tag = "display",
    responses((status = 200, description = "What the display shows", body = DisplayStateResponse))
)]
/// Return the display mirror: queue order, pair on the field, streak and clock.
pub async fn display_state(State(state): State<SharedState>) -> Json<DisplayStateResponse> {
    Json(display_sync::display_state(&state).into())
}

#[utoipa::path(
    get,
    path = "/teams",
    tag = "display",
    responses(
        (status = 200, description = "Teams ordered by position", body = RosterResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn list_teams(State(state): State<SharedState>) -> Result<Json<RosterResponse>, AppError> {
    let teams = queue_service::list_teams(&state).await?;
    Ok(Json(teams.into_iter().collect()))
}

#[utoipa::path(
    get,
    path = "/game-state",
    tag = "display",
    responses(
        (status = 200, description = "Persisted clock", body = GameStateResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Return the clock as persisted, for views that poll.
pub async fn game_state(
    State(state): State<SharedState>,
) -> Result<Json<GameStateResponse>, AppError> {
    let clock = timer_service::stored_clock(&state).await?;
    Ok(Json(clock.into()))
}
