use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::state::{
    clock::{ClockPhase, GameClock},
    queue::Outcome,
};

/// Phase of the match clock as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClockPhaseDto {
    Idle,
    Running,
    Expired,
}

impl From<ClockPhase> for ClockPhaseDto {
    fn from(phase: ClockPhase) -> Self {
        match phase {
            ClockPhase::Idle => Self::Idle,
            ClockPhase::Running => Self::Running,
            ClockPhase::Expired => Self::Expired,
        }
    }
}

/// Countdown triple plus its derived phase.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameStateResponse {
    /// Remaining seconds.
    pub timer: u32,
    pub active: bool,
    pub ended: bool,
    pub phase: ClockPhaseDto,
}

impl From<GameClock> for GameStateResponse {
    fn from(clock: GameClock) -> Self {
        Self {
            timer: clock.timer,
            active: clock.active,
            ended: clock.ended,
            phase: clock.phase().into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Win,
    Draw,
}

/// Result of the game that just finished.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_outcome"))]
pub struct OutcomeRequest {
    pub kind: OutcomeKind,
    /// Required for `win`; ignored for `draw`.
    #[serde(default)]
    pub winner_id: Option<Uuid>,
}

fn validate_outcome(request: &OutcomeRequest) -> Result<(), ValidationError> {
    match (request.kind, request.winner_id) {
        (OutcomeKind::Win, None) => {
            let mut err = ValidationError::new("missing_winner");
            err.message = Some("winner_id is required for a win".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

impl OutcomeRequest {
    /// Convert into the queue engine outcome. Call after validation.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.kind {
            OutcomeKind::Win => self.winner_id.map(|winner| Outcome::Win { winner }),
            OutcomeKind::Draw => Some(Outcome::Draw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_without_winner_is_invalid() {
        let request: OutcomeRequest = serde_json::from_str(r#"{"kind":"win"}"#).unwrap();
        assert!(request.validate().is_err());
        assert_eq!(request.outcome(), None);
    }

    #[test]
    fn draw_ignores_winner() {
        let request: OutcomeRequest =
            serde_json::from_str(r#"{"kind":"draw","winner_id":"00000000-0000-0000-0000-000000000000"}"#)
                .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.outcome(), Some(Outcome::Draw));
    }

    #[test]
    fn phase_is_derived_from_flags() {
        let response = GameStateResponse::from(GameClock {
            timer: 0,
            active: false,
            ended: true,
        });
        assert_eq!(response.phase, ClockPhaseDto::Expired);
    }
}
