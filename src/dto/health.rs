use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Whether a roster commit is waiting to be retried.
    pub pending_commit: bool,
}

impl HealthResponse {
    pub fn ok(pending_commit: bool) -> Self {
        Self {
            status: "ok".to_string(),
            pending_commit,
        }
    }

    pub fn degraded(pending_commit: bool) -> Self {
        Self {
            status: "degraded".to_string(),
            pending_commit,
        }
    }
}
