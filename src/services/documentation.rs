use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the pickup queue backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::control_stream,
        crate::routes::display::display_state,
        crate::routes::display::list_teams,
        crate::routes::display::game_state,
        crate::routes::control::start_game,
        crate::routes::control::end_game,
        crate::routes::control::record_outcome,
        crate::routes::control::retry_outcome,
        crate::routes::control::create_team,
        crate::routes::control::remove_team,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::display::DisplayStateResponse,
            crate::dto::display::SelectedPair,
            crate::dto::game::GameStateResponse,
            crate::dto::game::ClockPhaseDto,
            crate::dto::game::OutcomeRequest,
            crate::dto::game::OutcomeKind,
            crate::dto::team::TeamSummary,
            crate::dto::team::RosterResponse,
            crate::dto::team::CreateTeamRequest,
            crate::dto::team::RemoveTeamRequest,
            crate::dto::sse::Handshake,
            crate::dto::sse::ControlHandshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::RosterEvent,
            crate::dto::sse::TeamCreatedEvent,
            crate::dto::sse::TeamDeletedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "display", description = "Read-only views for public displays"),
        (name = "control", description = "Staff commands, gated by the control token"),
    )
)]
pub struct ApiDoc;
