use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::team::TeamSummary;

/// Named SSE frame, already serialized, fanned out to every subscriber.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    pub name: &'static str,
    pub data: String,
}

impl ServerEvent {
    pub fn text(name: &'static str, data: impl Into<String>) -> Self {
        Self {
            name,
            data: data.into(),
        }
    }

    pub fn json<T: Serialize>(name: &'static str, payload: &T) -> serde_json::Result<Self> {
        serde_json::to_string(payload).map(|data| Self { name, data })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First event sent to an SSE client when it connects.
pub struct Handshake {
    /// `public` or `control`.
    pub stream: String,
    pub message: String,
    /// Whether the backend is running without a storage backend.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Token the control client must send back in the `X-Control-Token` header.
pub struct ControlHandshake {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after every committed roster change.
pub struct RosterEvent {
    pub teams: Vec<TeamSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamCreatedEvent {
    pub team: TeamSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamDeletedEvent {
    pub team_id: Uuid,
    pub name: String,
}
