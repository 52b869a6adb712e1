use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::clock::DEFAULT_GAME_SECONDS;

/// Representation of a team stored in persistence and shared across layers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    pub id: Uuid,
    /// Display name chosen for the team (unique, case-insensitive).
    pub name: String,
    /// Short credential required to remove the team.
    pub password: String,
    /// 1-based rank in the queue.
    pub position: u32,
    /// Consecutive wins while holding position 1.
    pub streak: u32,
    /// Registration timestamp.
    pub created_at: SystemTime,
}

impl TeamEntity {
    /// Lowercased name used for case-insensitive lookups and uniqueness.
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

/// Normalise a team name for case-insensitive comparisons.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Singleton match clock record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStateEntity {
    /// Remaining seconds.
    pub timer: u32,
    /// Whether the countdown is running.
    pub active: bool,
    /// Whether the game has ended (expired or stopped manually).
    pub ended: bool,
}

impl Default for GameStateEntity {
    fn default() -> Self {
        Self {
            timer: DEFAULT_GAME_SECONDS,
            active: false,
            ended: false,
        }
    }
}

/// Partial update of the game state record; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameStatePatch {
    pub timer: Option<u32>,
    pub active: Option<bool>,
    pub ended: Option<bool>,
}

impl GameStatePatch {
    /// Apply the patch on top of an existing record.
    pub fn apply_to(&self, mut current: GameStateEntity) -> GameStateEntity {
        if let Some(timer) = self.timer {
            current.timer = timer;
        }
        if let Some(active) = self.active {
            current.active = active;
        }
        if let Some(ended) = self.ended {
            current.ended = ended;
        }
        current
    }
}

impl From<GameStateEntity> for GameStatePatch {
    fn from(value: GameStateEntity) -> Self {
        Self {
            timer: Some(value.timer),
            active: Some(value.active),
            ended: Some(value.ended),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_only_overwrites_present_fields() {
        let base = GameStateEntity {
            timer: 100,
            active: true,
            ended: false,
        };
        let patched = GameStatePatch {
            timer: Some(99),
            ..Default::default()
        }
        .apply_to(base);

        assert_eq!(
            patched,
            GameStateEntity {
                timer: 99,
                active: true,
                ended: false
            }
        );
    }

    #[test]
    fn name_key_ignores_case_and_padding() {
        assert_eq!(name_key("  Ballers "), "ballers");
    }
}
