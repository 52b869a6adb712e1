use tokio::{
    sync::broadcast::error::RecvError,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};

use crate::state::{
    SharedState,
    clock::GameClock,
    display::{DisplayState, SyncMessage},
    queue::Team,
};

/// What the public display shows right now.
pub fn display_state(state: &SharedState) -> DisplayState {
    state.display().borrow().view()
}

/// Spawn the display mirror loop.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(run(state))
}

/// Follow pushes from the sync channel and reconcile against the store on a
/// fixed cadence. Whatever arrives last overwrites the cache.
pub async fn run(state: SharedState) {
    let mut sync = state.subscribe_sync();
    let mut poll = interval(state.config().display_poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = sync.recv() => match message {
                Ok(message) => apply(&state, message),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "display mirror lagged; polling store");
                    poll_once(&state).await;
                }
                Err(RecvError::Closed) => break,
            },
            _ = poll.tick() => poll_once(&state).await,
        }
    }
}

/// Read clock and roster from the store into the mirror.
pub async fn poll_once(state: &SharedState) {
    let Some(store) = state.store().await else {
        return;
    };

    let idle = GameClock::idle(state.config().game_duration_secs);
    match store.get_game_state().await {
        Ok(stored) => apply(
            state,
            SyncMessage::Clock(stored.map_or(idle, GameClock::from)),
        ),
        Err(err) => warn!(error = %err, "display poll could not read the game state"),
    }

    match store.list_teams().await {
        Ok(teams) => apply(
            state,
            SyncMessage::Roster(teams.into_iter().map(Team::from).collect()),
        ),
        Err(err) => warn!(error = %err, "display poll could not read the roster"),
    }
}

fn apply(state: &SharedState, message: SyncMessage) {
    state.display().send_modify(|cache| cache.apply(message));
}
