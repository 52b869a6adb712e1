use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::GameStateEntity;

/// Length of a game when nothing else is configured.
pub const DEFAULT_GAME_SECONDS: u32 = 420;

/// Countdown triple persisted in the game state store and pushed to every view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameClock {
    /// Remaining seconds.
    pub timer: u32,
    /// Whether the countdown is running.
    pub active: bool,
    /// Whether the game ended (expired or stopped manually).
    pub ended: bool,
}

impl GameClock {
    /// Idle clock loaded with a full game duration.
    pub fn idle(duration: u32) -> Self {
        Self {
            timer: duration,
            active: false,
            ended: false,
        }
    }

    /// Derive the high-level phase from the raw flags.
    pub fn phase(&self) -> ClockPhase {
        if self.active {
            ClockPhase::Running
        } else if self.ended {
            ClockPhase::Expired
        } else {
            ClockPhase::Idle
        }
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::idle(DEFAULT_GAME_SECONDS)
    }
}

impl From<GameStateEntity> for GameClock {
    fn from(value: GameStateEntity) -> Self {
        Self {
            timer: value.timer,
            active: value.active,
            ended: value.ended,
        }
    }
}

impl From<GameClock> for GameStateEntity {
    fn from(value: GameClock) -> Self {
        Self {
            timer: value.timer,
            active: value.active,
            ended: value.ended,
        }
    }
}

/// Phases of the match clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    /// Waiting for the next game to start.
    Idle,
    /// Counting down once per tick.
    Running,
    /// Reached zero or was stopped by staff.
    Expired,
}

/// Events that can be applied to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Staff starts a game.
    Start,
    /// One tick of the cadence elapsed.
    Tick,
    /// Staff stops the game before the countdown ends.
    ManualEnd,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Phase the clock was in when the event was received.
    pub from: ClockPhase,
    /// The rejected event.
    pub event: ClockEvent,
}

/// Errors that can occur when planning a clock transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned clock transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Clock changed since the plan was created.
    ClockMismatch {
        /// Clock when the plan was created.
        expected: GameClock,
        /// Current clock.
        actual: GameClock,
    },
    /// Machine version changed since the plan was created.
    VersionMismatch {
        /// Version expected after applying.
        expected: usize,
        /// Version that applying would produce now.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned clock transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned clock transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Clock before the transition.
    pub from: GameClock,
    /// Clock after the transition.
    pub to: GameClock,
    /// Event that triggered this transition.
    pub event: ClockEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
}

impl Plan {
    /// Whether applying the plan would leave the clock untouched.
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Snapshot of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current clock.
    pub clock: GameClock,
    /// Incremented on each applied transition.
    pub version: usize,
    /// Target clock of the pending plan, if any.
    pub pending: Option<GameClock>,
}

/// Plan/apply/abort state machine driving the match countdown.
///
/// Callers plan a transition, persist its target clock, then apply it. A failed
/// write aborts the plan so the in-memory clock never runs ahead of the store.
#[derive(Debug, Clone)]
pub struct ClockStateMachine {
    clock: GameClock,
    duration: u32,
    version: usize,
    pending: Option<Plan>,
}

impl Default for ClockStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_GAME_SECONDS)
    }
}

impl ClockStateMachine {
    /// Create an idle machine for games lasting `duration` seconds.
    pub fn new(duration: u32) -> Self {
        Self {
            clock: GameClock::idle(duration),
            duration,
            version: 0,
            pending: None,
        }
    }

    /// Current clock.
    pub fn clock(&self) -> GameClock {
        self.clock
    }

    /// Current phase.
    pub fn phase(&self) -> ClockPhase {
        self.clock.phase()
    }

    /// Configured game duration in seconds.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Create a snapshot of the current machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            clock: self.clock,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Replace the clock with a persisted value, dropping any pending plan.
    pub fn restore(&mut self, clock: GameClock) {
        self.clock = clock;
        self.version += 1;
        self.pending = None;
    }

    /// Validate an event against the current phase and reserve the transition.
    pub fn plan(&mut self, event: ClockEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.clock,
            to: next,
            event,
            version_next: self.version + 1,
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply the pending plan and return the new clock.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<GameClock, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.clock != plan.from {
            return Err(ApplyError::ClockMismatch {
                expected: plan.from,
                actual: self.clock,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.clock = plan.to;
        self.version = plan.version_next;

        Ok(self.clock)
    }

    /// Drop the pending plan without touching the clock.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: ClockEvent) -> Result<GameClock, InvalidTransition> {
        let next = match (self.clock.phase(), event) {
            // Restarting a running game is ignored.
            (ClockPhase::Running, ClockEvent::Start) => self.clock,
            (ClockPhase::Idle | ClockPhase::Expired, ClockEvent::Start) => GameClock {
                timer: self.duration,
                active: true,
                ended: false,
            },
            (ClockPhase::Running, ClockEvent::Tick) => {
                let timer = self.clock.timer.saturating_sub(1);
                GameClock {
                    timer,
                    active: timer > 0,
                    ended: timer == 0,
                }
            }
            (_, ClockEvent::ManualEnd) => GameClock {
                timer: self.duration,
                active: false,
                ended: true,
            },
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut ClockStateMachine, event: ClockEvent) -> GameClock {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_idle_with_full_duration() {
        let sm = ClockStateMachine::default();
        assert_eq!(sm.phase(), ClockPhase::Idle);
        assert_eq!(sm.clock(), GameClock::idle(420));
    }

    #[test]
    fn start_from_expired_reloads_the_full_duration() {
        let mut sm = ClockStateMachine::default();
        sm.restore(GameClock {
            timer: 0,
            active: false,
            ended: true,
        });

        assert_eq!(
            apply(&mut sm, ClockEvent::Start),
            GameClock {
                timer: 420,
                active: true,
                ended: false
            }
        );
    }

    #[test]
    fn full_countdown_expires_at_zero() {
        let mut sm = ClockStateMachine::default();
        apply(&mut sm, ClockEvent::Start);

        for _ in 0..419 {
            assert_eq!(apply(&mut sm, ClockEvent::Tick).phase(), ClockPhase::Running);
        }

        assert_eq!(
            apply(&mut sm, ClockEvent::Tick),
            GameClock {
                timer: 0,
                active: false,
                ended: true
            }
        );
    }

    #[test]
    fn five_second_clock_counts_down() {
        let mut sm = ClockStateMachine::default();
        sm.restore(GameClock {
            timer: 5,
            active: true,
            ended: false,
        });

        assert_eq!(
            apply(&mut sm, ClockEvent::Tick),
            GameClock {
                timer: 4,
                active: true,
                ended: false
            }
        );
        for _ in 0..3 {
            apply(&mut sm, ClockEvent::Tick);
        }
        assert_eq!(
            apply(&mut sm, ClockEvent::Tick),
            GameClock {
                timer: 0,
                active: false,
                ended: true
            }
        );
    }

    #[test]
    fn manual_end_resets_timer_and_stops() {
        let mut sm = ClockStateMachine::new(60);
        apply(&mut sm, ClockEvent::Start);
        apply(&mut sm, ClockEvent::Tick);

        assert_eq!(
            apply(&mut sm, ClockEvent::ManualEnd),
            GameClock {
                timer: 60,
                active: false,
                ended: true
            }
        );
    }

    #[test]
    fn second_start_is_a_noop_plan() {
        let mut sm = ClockStateMachine::default();
        let once = apply(&mut sm, ClockEvent::Start);
        apply(&mut sm, ClockEvent::Tick);
        let before = sm.clock();

        let plan = sm.plan(ClockEvent::Start).unwrap();
        assert!(plan.is_noop());
        sm.abort(plan.id).unwrap();

        assert_eq!(sm.clock(), before);
        assert_eq!(once.phase(), sm.phase());
    }

    #[test]
    fn tick_outside_running_is_rejected() {
        let mut sm = ClockStateMachine::default();
        let err = sm.plan(ClockEvent::Tick).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidTransition(InvalidTransition {
                from: ClockPhase::Idle,
                event: ClockEvent::Tick,
            })
        );
    }

    #[test]
    fn pending_plan_blocks_new_plans() {
        let mut sm = ClockStateMachine::default();
        let plan = sm.plan(ClockEvent::Start).unwrap();
        assert_eq!(
            sm.plan(ClockEvent::ManualEnd).unwrap_err(),
            PlanError::AlreadyPending
        );
        assert_eq!(sm.snapshot().pending, Some(plan.to));
    }

    #[test]
    fn abort_leaves_clock_unchanged() {
        let mut sm = ClockStateMachine::default();
        let plan = sm.plan(ClockEvent::Start).unwrap();
        sm.abort(plan.id).unwrap();

        assert!(sm.pending.is_none());
        assert_eq!(sm.clock(), GameClock::default());
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn apply_with_foreign_id_keeps_plan_pending() {
        let mut sm = ClockStateMachine::default();
        let plan = sm.plan(ClockEvent::Start).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();

        assert!(matches!(err, ApplyError::IdMismatch { expected, .. } if expected == plan.id));
        assert!(sm.pending.is_some());
    }
}
