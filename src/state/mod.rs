pub mod clock;
pub mod display;
pub mod queue;
mod sse;
pub mod transitions;

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, MutexGuard, RwLock, broadcast, oneshot, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::store::Storage,
    error::ServiceError,
    state::{
        clock::{ClockEvent, ClockStateMachine, GameClock, Plan},
        display::{DisplayCache, SyncMessage},
        queue::CommitBatch,
    },
};

pub use self::clock::{AbortError, ApplyError, PlanError, PlanId, Snapshot};
pub use self::sse::SseHub;
use self::sse::SseState;

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);
const SYNC_CHANNEL_CAPACITY: usize = 64;

/// Result of a clock transition run through [`AppState::run_transition`].
#[derive(Debug)]
pub enum Transition<T> {
    /// The transition was persisted and applied.
    Applied {
        /// Value produced by the persistence work.
        value: T,
        /// Clock after the transition.
        clock: GameClock,
    },
    /// The event did not change the clock; nothing was written.
    Unchanged(GameClock),
}

/// Running countdown task and the signal that stops it between two ticks.
pub struct TickerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub fn new(stop: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self { stop, task }
    }

    /// Ask the ticker to stop and wait until its current tick, if any, is finished.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "ticker task ended abnormally");
        }
    }
}

/// Central application state: storage handle, clock machine, broadcast hubs and display mirror.
pub struct AppState {
    config: AppConfig,
    store: RwLock<Option<Arc<dyn Storage>>>,
    sse: SseState,
    sync: broadcast::Sender<SyncMessage>,
    display: watch::Sender<DisplayCache>,
    clock: RwLock<ClockStateMachine>,
    ticker: Mutex<Option<TickerHandle>>,
    pending_commit: Mutex<Option<CommitBatch>>,
    degraded: watch::Sender<bool>,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] with the default configuration.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new() -> SharedState {
        Self::with_config(AppConfig::default())
    }

    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn with_config(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (sync_tx, _sync_rx) = broadcast::channel(SYNC_CHANNEL_CAPACITY);
        let (display_tx, _display_rx) = watch::channel(DisplayCache::default());

        Arc::new(Self {
            clock: RwLock::new(ClockStateMachine::new(config.game_duration_secs)),
            config,
            store: RwLock::new(None),
            sse: SseState::new(16, 16),
            sync: sync_tx,
            display: display_tx,
            ticker: Mutex::new(None),
            pending_commit: Mutex::new(None),
            degraded: degraded_tx,
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }

    /// Settings loaded at startup.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn Storage>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn Storage>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn Storage>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Hub feeding `/sse/public`.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Hub feeding `/sse/control`.
    pub fn control_sse(&self) -> &SseHub {
        self.sse.control().hub()
    }

    /// Token guard that ensures a single control SSE subscriber at a time.
    pub fn control_token(&self) -> &Mutex<Option<String>> {
        self.sse.control().token()
    }

    /// Push a state change to every display mirror.
    pub fn publish_sync(&self, message: SyncMessage) {
        let _ = self.sync.send(message);
    }

    /// Receive clock and roster changes pushed by this process.
    pub fn subscribe_sync(&self) -> broadcast::Receiver<SyncMessage> {
        self.sync.subscribe()
    }

    /// Display mirror cache.
    pub fn display(&self) -> &watch::Sender<DisplayCache> {
        &self.display
    }

    /// Slot holding the running ticker; lock it to start or stop the countdown.
    pub fn ticker(&self) -> &Mutex<Option<TickerHandle>> {
        &self.ticker
    }

    /// Roster commit gate. Holding the guard serializes roster commands; the
    /// value is the batch left behind by a partially failed commit.
    pub async fn lock_roster(&self) -> MutexGuard<'_, Option<CommitBatch>> {
        self.pending_commit.lock().await
    }

    /// Clock held in memory.
    pub async fn clock(&self) -> GameClock {
        self.clock.read().await.clock()
    }

    /// Clock, version, and pending target of the transition machine.
    pub async fn snapshot(&self) -> Snapshot {
        let sm = self.clock.read().await;
        sm.snapshot()
    }

    /// Replace the in-memory clock with a persisted value.
    pub async fn restore_clock(&self, clock: GameClock) {
        let _gate = self.transition_gate.lock().await;
        self.clock.write().await.restore(clock);
    }

    async fn plan_transition(&self, event: ClockEvent) -> Result<Plan, PlanError> {
        let mut sm = self.clock.write().await;
        sm.plan(event)
    }

    async fn apply_planned_transition(&self, plan_id: PlanId) -> Result<GameClock, ApplyError> {
        let mut sm = self.clock.write().await;
        sm.apply(plan_id)
    }

    async fn abort_transition(&self, plan_id: PlanId) -> Result<(), AbortError> {
        let mut sm = self.clock.write().await;
        sm.abort(plan_id)
    }

    /// Plan `event`, run `work` with the target clock, then apply or abort.
    ///
    /// Transitions are serialized. A no-op plan is aborted without running
    /// `work`. A failing or timed-out `work` aborts the plan and leaves the
    /// clock untouched.
    pub async fn run_transition<F, Fut, T>(
        &self,
        event: ClockEvent,
        work: F,
    ) -> Result<Transition<T>, ServiceError>
    where
        F: FnOnce(GameClock) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.transition_gate.lock().await;
        let plan = self.plan_transition(event).await?;

        if plan.is_noop() {
            self.abort_transition(plan.id).await?;
            drop(gate);
            return Ok(Transition::Unchanged(plan.from));
        }

        let plan_id = plan.id;
        let work_future = work(plan.to);
        let outcome = if let Some(limit) = self.transition_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    if let Err(abort_err) = self.abort_transition(plan_id).await {
                        warn!(
                            event = ?event,
                            plan_id = %plan_id,
                            error = ?abort_err,
                            "failed to abort transition after timeout"
                        );
                    }
                    drop(gate);
                    return Err(ServiceError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(value) => {
                let clock = self.apply_planned_transition(plan_id).await?;
                drop(gate);
                Ok(Transition::Applied { value, clock })
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transition(plan_id).await {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                drop(gate);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::storage::StorageError;

    #[tokio::test]
    async fn failed_work_leaves_clock_unchanged() {
        let state = AppState::new();
        let result = state
            .run_transition(ClockEvent::Start, |_| async {
                Err::<(), _>(ServiceError::Unavailable(StorageError::unavailable(
                    "write failed".into(),
                    std::io::Error::other("boom"),
                )))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
        assert_eq!(state.clock().await, GameClock::default());
        assert_eq!(state.snapshot().await.pending, None);
    }

    #[tokio::test]
    async fn noop_transition_skips_work() {
        let state = AppState::new();
        state
            .restore_clock(GameClock {
                timer: 100,
                active: true,
                ended: false,
            })
            .await;

        let result = state
            .run_transition(ClockEvent::Start, |_| async {
                Err::<(), _>(ServiceError::Timeout)
            })
            .await
            .unwrap();

        let Transition::Unchanged(clock) = result else {
            panic!("expected an unchanged clock");
        };
        assert_eq!(clock.timer, 100);
    }

    #[tokio::test]
    async fn applied_transition_hands_target_to_work() {
        let state = AppState::new();
        let result = state
            .run_transition(ClockEvent::ManualEnd, |target| async move { Ok(target) })
            .await
            .unwrap();

        match result {
            Transition::Applied { value, clock } => {
                assert_eq!(value, clock);
                assert!(clock.ended);
            }
            Transition::Unchanged(_) => panic!("expected an applied transition"),
        }
    }

    #[tokio::test]
    async fn degraded_flag_follows_store_installation() {
        let state = AppState::new();
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_store(Arc::new(crate::dao::store::memory::MemoryStore::default()))
            .await;
        assert!(!state.is_degraded().await);

        state.clear_store().await;
        assert!(state.is_degraded().await);
    }
}
