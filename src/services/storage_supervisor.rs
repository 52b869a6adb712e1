use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{storage::StorageError, store::Storage},
    services::{sse_events, timer_service},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, install it, and keep checking its health.
///
/// The shared state stays in degraded mode while no healthy store is available.
/// Each fresh connection reloads the persisted clock.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn Storage>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                if let Err(err) = timer_service::restore(&state).await {
                    warn!(error = %err, "could not restore the persisted game clock");
                }

                watch_health(&state, store.as_ref()).await;
                state.clear_store().await;
            }
            Err(err) => warn!(error = %err, "storage connection attempt failed"),
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll the store until it fails and cannot be reconnected in place.
async fn watch_health(state: &SharedState, store: &dyn Storage) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if reconnect(state, store).await {
            state.update_degraded(false).await;
            sleep(HEALTH_POLL_INTERVAL).await;
        } else {
            warn!("exhausted storage reconnect attempts; staying in degraded mode");
            return;
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn Storage) -> bool {
    let mut backoff = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

/// Forward degraded mode changes to SSE subscribers.
pub async fn broadcast_degraded_changes(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    while watcher.changed().await.is_ok() {
        let degraded = *watcher.borrow_and_update();
        sse_events::broadcast_system_status(&state, degraded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            models::GameStatePatch,
            store::{GameStateStore, memory::MemoryStore},
        },
        state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn installing_a_store_restores_the_clock() {
        let state = AppState::new();
        let store = MemoryStore::new();
        store
            .set_game_state(GameStatePatch {
                timer: Some(0),
                active: Some(false),
                ended: Some(true),
            })
            .await
            .unwrap();

        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store = store.clone();
            async move { Ok(Arc::new(store) as Arc<dyn Storage>) }
        }));
        sleep(Duration::from_millis(100)).await;

        assert!(!state.is_degraded().await);
        assert!(state.clock().await.ended);
        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connections_stay_degraded() {
        let state = AppState::new();
        let supervisor = tokio::spawn(run(state.clone(), || async {
            Err(StorageError::unavailable(
                "no database".into(),
                std::io::Error::other("refused"),
            ))
        }));
        sleep(Duration::from_secs(3)).await;

        assert!(state.is_degraded().await);
        supervisor.abort();
    }
}
