use tracing::warn;

use crate::{
    dto::health::HealthResponse,
    services::queue_service,
    state::SharedState,
};

/// Report whether storage is reachable and whether a roster commit awaits retry.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let pending_commit = queue_service::has_pending_commit(state).await;
    if state.is_degraded().await {
        HealthResponse::degraded(pending_commit)
    } else {
        HealthResponse::ok(pending_commit)
    }
}
