use tokio::{
    sync::oneshot,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};

use crate::{
    dao::models::{GameStateEntity, GameStatePatch},
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState, TickerHandle, Transition,
        clock::{ClockEvent, ClockPhase, GameClock},
        display::SyncMessage,
        transitions::run_transition_with_broadcast,
    },
};

/// Clock held by this process.
pub async fn current_clock(state: &SharedState) -> GameClock {
    state.clock().await
}

/// Clock as persisted in the store, the value polling views reconcile against.
/// A store that never saw a game reads as idle at the configured duration.
pub async fn stored_clock(state: &SharedState) -> Result<GameClock, ServiceError> {
    let store = state.require_store().await?;
    let stored = store.get_game_state().await?;
    Ok(stored.map_or_else(|| GameClock::idle(state.config().game_duration_secs), Into::into))
}

/// Start a game. Starting while a game runs changes nothing.
pub async fn start(state: &SharedState) -> Result<GameClock, ServiceError> {
    let mut ticker = state.ticker().lock().await;

    match run_transition_with_broadcast(state, ClockEvent::Start, |target| {
        persist(state.clone(), target)
    })
    .await?
    {
        Transition::Applied { clock, .. } => {
            if let Some(previous) = ticker.take() {
                previous.stop().await;
            }
            *ticker = Some(spawn_ticker(state.clone()));
            info!(timer = clock.timer, "game started");
            Ok(clock)
        }
        Transition::Unchanged(clock) => {
            debug!("start ignored; game already running");
            Ok(clock)
        }
    }
}

/// Stop the game and reset the timer to the full duration.
pub async fn end(state: &SharedState) -> Result<GameClock, ServiceError> {
    let mut ticker = state.ticker().lock().await;
    if let Some(handle) = ticker.take() {
        handle.stop().await;
    }

    let result = run_transition_with_broadcast(state, ClockEvent::ManualEnd, |target| {
        persist(state.clone(), target)
    })
    .await;

    match result {
        Ok(transition) => {
            info!("game ended manually");
            Ok(match transition {
                Transition::Applied { clock, .. } | Transition::Unchanged(clock) => clock,
            })
        }
        Err(err) => {
            // The game keeps running when the end could not be persisted.
            if state.clock().await.phase() == ClockPhase::Running {
                *ticker = Some(spawn_ticker(state.clone()));
            }
            Err(err)
        }
    }
}

/// Load the persisted clock into memory, resuming the countdown if it was running.
pub async fn restore(state: &SharedState) -> Result<GameClock, ServiceError> {
    let clock = stored_clock(state).await?;

    let mut ticker = state.ticker().lock().await;
    if let Some(handle) = ticker.take() {
        handle.stop().await;
    }

    state.restore_clock(clock).await;
    state.publish_sync(SyncMessage::Clock(clock));
    sse_events::broadcast_clock(state, &clock);

    if clock.phase() == ClockPhase::Running {
        info!(timer = clock.timer, "resuming running game clock");
        *ticker = Some(spawn_ticker(state.clone()));
    }

    Ok(clock)
}

/// Stop the countdown task, if any.
pub async fn shutdown(state: &SharedState) {
    if let Some(handle) = state.ticker().lock().await.take() {
        handle.stop().await;
    }
}

async fn tick(state: &SharedState) -> Result<Transition<()>, ServiceError> {
    run_transition_with_broadcast(state, ClockEvent::Tick, |target| {
        persist(state.clone(), target)
    })
    .await
}

async fn persist(state: SharedState, target: GameClock) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let patch = GameStatePatch::from(GameStateEntity::from(target));
    store.set_game_state(patch).await?;
    Ok(())
}

/// Spawn the countdown. Each tick is persisted before the next one is awaited;
/// the stop signal is only observed between ticks.
fn spawn_ticker(state: SharedState) -> TickerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let period = state.config().tick_interval;

    let task = tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = interval.tick() => {}
            }

            match tick(&state).await {
                Ok(Transition::Applied { clock, .. }) if clock.phase() == ClockPhase::Expired => {
                    info!("game clock expired");
                    break;
                }
                Ok(_) => {}
                Err(ServiceError::InvalidState(reason)) => {
                    debug!(%reason, "clock no longer running; ticker exits");
                    break;
                }
                Err(err) => warn!(error = %err, "clock tick failed; retrying on next tick"),
            }
        }
    });

    TickerHandle::new(stop_tx, task)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::store::{GameStateStore, testing::FlakyStore},
        state::AppState,
    };

    async fn setup(duration: u32) -> (SharedState, FlakyStore) {
        let state = AppState::with_config(AppConfig {
            game_duration_secs: duration,
            ..AppConfig::default()
        });
        let store = FlakyStore::default();
        state.set_store(Arc::new(store.clone())).await;
        (state, store)
    }

    fn expired() -> GameClock {
        GameClock {
            timer: 0,
            active: false,
            ended: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_counts_down_to_expiry_and_stops() {
        let (state, store) = setup(3).await;

        let clock = start(&state).await.unwrap();
        assert_eq!(clock.timer, 3);
        assert!(clock.active);

        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(current_clock(&state).await.timer, 2);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(current_clock(&state).await, expired());
        assert_eq!(
            GameClock::from(store.get_game_state().await.unwrap().unwrap()),
            expired()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_end_stops_the_countdown() {
        let (state, _) = setup(10).await;
        start(&state).await.unwrap();
        sleep(Duration::from_millis(2_500)).await;

        let clock = end(&state).await.unwrap();
        assert_eq!(
            clock,
            GameClock {
                timer: 10,
                active: false,
                ended: true
            }
        );

        sleep(Duration::from_secs(5)).await;
        assert_eq!(current_clock(&state).await, clock);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_changes_nothing() {
        let (state, store) = setup(10).await;
        start(&state).await.unwrap();
        sleep(Duration::from_millis(1_500)).await;
        let writes = store.writes();

        let clock = start(&state).await.unwrap();

        assert_eq!(clock.timer, 9);
        assert_eq!(store.writes(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_expiry_reloads_duration() {
        let (state, _) = setup(2).await;
        start(&state).await.unwrap();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(current_clock(&state).await, expired());

        let clock = start(&state).await.unwrap();
        assert_eq!(
            clock,
            GameClock {
                timer: 2,
                active: true,
                ended: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_leaves_clock_idle() {
        let (state, store) = setup(10).await;
        store.fail_game_state(true);

        let err = start(&state).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));

        sleep(Duration::from_secs(3)).await;
        assert_eq!(current_clock(&state).await, GameClock::idle(10));
        assert!(state.ticker().lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_end_keeps_the_game_running() {
        let (state, store) = setup(10).await;
        start(&state).await.unwrap();

        store.fail_game_state(true);
        assert!(end(&state).await.is_err());
        assert_eq!(current_clock(&state).await.phase(), ClockPhase::Running);

        store.fail_game_state(false);
        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(current_clock(&state).await.timer, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_resumes_a_running_clock() {
        let (state, store) = setup(420).await;
        store
            .set_game_state(GameStatePatch {
                timer: Some(2),
                active: Some(true),
                ended: Some(false),
            })
            .await
            .unwrap();

        let clock = restore(&state).await.unwrap();
        assert_eq!(clock.timer, 2);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(current_clock(&state).await, expired());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_store_restores_the_configured_duration() {
        let (state, _) = setup(90).await;

        let clock = restore(&state).await.unwrap();

        assert_eq!(clock, GameClock::idle(90));
        assert_eq!(current_clock(&state).await, GameClock::idle(90));
        assert_eq!(stored_clock(&state).await.unwrap(), GameClock::idle(90));
    }

    #[tokio::test(start_paused = true)]
    async fn every_transition_is_pushed_to_mirrors() {
        let (state, _) = setup(5).await;
        let mut sync = state.subscribe_sync();

        start(&state).await.unwrap();
        assert_eq!(
            sync.recv().await.unwrap(),
            SyncMessage::Clock(GameClock {
                timer: 5,
                active: true,
                ended: false
            })
        );

        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(
            sync.recv().await.unwrap(),
            SyncMessage::Clock(GameClock {
                timer: 4,
                active: true,
                ended: false
            })
        );

        shutdown(&state).await;
    }
}
