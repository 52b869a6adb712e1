use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::{
        game::{GameStateResponse, OutcomeRequest},
        team::{CreateTeamRequest, RemoveTeamRequest, RosterResponse, TeamSummary},
    },
    error::AppError,
    services::{queue_service, timer_service},
    state::SharedState,
};

const CONTROL_TOKEN_HEADER: &str = "x-control-token";

/// Staff commands. Every route requires the token handed out on `/sse/control`.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/control/game/start", post(start_game))
        .route("/control/game/end", post(end_game))
        .route("/control/outcome", post(record_outcome))
        .route("/control/outcome/retry", post(retry_outcome))
        .route("/control/teams", post(create_team).delete(remove_team))
        .route_layer(middleware::from_fn_with_state(state, require_control_token))
}

#[utoipa::path(
    post,
    path = "/control/game/start",
    tag = "control",
    params(("X-Control-Token" = String, Header, description = "Token issued by the /sse/control stream")),
    responses(
        (status = 200, description = "Clock after the start; unchanged if a game was already running", body = GameStateResponse),
        (status = 503, description = "Clock could not be persisted")
    )
)]
/// Start the countdown for a new game.
pub async fn start_game(
    State(state): State<SharedState>,
) -> Result<Json<GameStateResponse>, AppError> {
    let clock = timer_service::start(&state).await?;
    Ok(Json(clock.into()))
}

#[utoipa::path(
    post,
    path = "/control/game/end",
    tag = "control",
    params(("X-Control-Token" = String, Header, description = "Token issued by the /sse/control stream")),
    responses(
        (status = 200, description = "Game ended; timer reset to the full duration", body = GameStateResponse),
        (status = 503, description = "Clock could not be persisted")
    )
)]
/// Stop the current game before the countdown ends.
pub async fn end_game(
    State(state): State<SharedState>,
) -> Result<Json<GameStateResponse>, AppError> {
    let clock = timer_service::end(&state).await?;
    Ok(Json(clock.into()))
}

#[utoipa::path(
    post,
    path = "/control/outcome",
    tag = "control",
    params(("X-Control-Token" = String, Header, description = "Token issued by the /sse/control stream")),
    request_body = OutcomeRequest,
    responses(
        (status = 200, description = "Queue after rotation", body = RosterResponse),
        (status = 400, description = "Winner missing or not playing"),
        (status = 404, description = "Winner not registered"),
        (status = 409, description = "Fewer than two teams, or a commit awaits retry"),
        (status = 503, description = "Some writes failed; retry the commit")
    )
)]
/// Record the result of the game that just finished and rotate the queue.
pub async fn record_outcome(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<OutcomeRequest>>,
) -> Result<Json<RosterResponse>, AppError> {
    let outcome = payload
        .outcome()
        .ok_or_else(|| AppError::BadRequest("winner_id is required for a win".into()))?;
    let teams = queue_service::record_outcome(&state, outcome).await?;
    Ok(Json(teams.into_iter().collect()))
}

#[utoipa::path(
    post,
    path = "/control/outcome/retry",
    tag = "control",
    params(("X-Control-Token" = String, Header, description = "Token issued by the /sse/control stream")),
    responses(
        (status = 200, description = "Pending commit applied", body = RosterResponse),
        (status = 409, description = "Nothing to retry"),
        (status = 503, description = "Some writes failed again")
    )
)]
/// Re-apply a roster commit that partially failed.
pub async fn retry_outcome(
    State(state): State<SharedState>,
) -> Result<Json<RosterResponse>, AppError> {
    let teams = queue_service::retry_commit(&state).await?;
    Ok(Json(teams.into_iter().collect()))
}

#[utoipa::path(
    post,
    path = "/control/teams",
    tag = "control",
    params(("X-Control-Token" = String, Header, description = "Token issued by the /sse/control stream")),
    request_body = CreateTeamRequest,
    responses(
        (status = 201, description = "Team registered at the back of the queue", body = TeamSummary),
        (status = 400, description = "Invalid name or password"),
        (status = 409, description = "Name already taken")
    )
)]
/// Register a team.
pub async fn create_team(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateTeamRequest>>,
) -> Result<(StatusCode, Json<TeamSummary>), AppError> {
    let team = queue_service::add_team(&state, payload.name, payload.password).await?;
    Ok((StatusCode::CREATED, Json(team.into())))
}

#[utoipa::path(
    delete,
    path = "/control/teams",
    tag = "control",
    params(("X-Control-Token" = String, Header, description = "Token issued by the /sse/control stream")),
    request_body = RemoveTeamRequest,
    responses(
        (status = 200, description = "Team removed", body = TeamSummary),
        (status = 400, description = "Name or credentials missing"),
        (status = 401, description = "Wrong password or master key"),
        (status = 404, description = "Team not found")
    )
)]
/// Remove a team with its password or the master key.
pub async fn remove_team(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<RemoveTeamRequest>>,
) -> Result<Json<TeamSummary>, AppError> {
    let team =
        queue_service::remove_team(&state, payload.name, payload.password, payload.master_key)
            .await?;
    Ok(Json(team.into()))
}

async fn require_control_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(CONTROL_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing control token header `X-Control-Token`".into())
        })?;

    let expected = state.control_token().lock().await.clone();

    match expected {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid control token".into())),
        None => Err(AppError::Unauthorized(
            "no control stream is connected".into(),
        )),
    }
}
