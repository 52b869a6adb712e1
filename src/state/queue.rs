//! Queue rotation and streak rules.
//!
//! Everything here is pure: a [`Roster`] goes in, a [`Rotation`] comes out, and
//! the caller decides how to persist it. Positions 1 and 2 are the teams on the
//! field; everyone else waits in line.

use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::TeamEntity;

/// Team as seen by the queue engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// 1-based rank.
    pub position: u32,
    /// Consecutive wins while holding position 1.
    pub streak: u32,
}

impl From<TeamEntity> for Team {
    fn from(entity: TeamEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            position: entity.position,
            streak: entity.streak,
        }
    }
}

/// Result reported for the game that just finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// One of the two playing teams won.
    Win {
        /// Identifier of the winning team.
        winner: Uuid,
    },
    /// Neither team won.
    Draw,
}

/// How streaks change as part of a rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreakChange {
    /// The holder of position 1 won again.
    Extend {
        /// Name of the champion.
        team: String,
        /// New streak value.
        streak: u32,
    },
    /// The challenger beat the champion: every streak is cleared and the winner starts at 1.
    Upset {
        /// Name of the new champion.
        team: String,
    },
    /// Every streak goes back to 0.
    ResetAll,
}

/// Absolute position target for one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionChange {
    /// Team to move.
    pub id: Uuid,
    /// New 1-based position.
    pub position: u32,
}

/// Rejected outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A game needs two teams.
    #[error("at least two teams are required, {count} registered")]
    NotEnoughTeams {
        /// Number of registered teams.
        count: usize,
    },
    /// The winner is not registered.
    #[error("team {0} is not registered")]
    UnknownTeam(Uuid),
    /// The winner is waiting in line and cannot have played.
    #[error("team `{name}` is at position {position} and is not playing")]
    NotPlaying {
        /// Name of the named winner.
        name: String,
        /// Its current position.
        position: u32,
    },
}

/// Registered teams ordered by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    teams: Vec<Team>,
}

impl Roster {
    /// Build a roster from stored teams, ordering them by their stored position.
    pub fn new(mut teams: Vec<Team>) -> Self {
        teams.sort_by_key(|team| team.position);
        Self { teams }
    }

    /// Teams in queue order.
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Number of registered teams.
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    /// Whether no team is registered.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Moves needed so that positions read `1..=N` in the current order.
    ///
    /// Used after a removal leaves a gap.
    pub fn renumber(&self) -> Vec<PositionChange> {
        self.teams
            .iter()
            .zip(1u32..)
            .filter(|(team, position)| team.position != *position)
            .map(|(team, position)| PositionChange {
                id: team.id,
                position,
            })
            .collect()
    }

    /// Compute the queue after a game ends.
    pub fn apply_outcome(&self, outcome: Outcome) -> Result<Rotation, QueueError> {
        if self.teams.len() < 2 {
            return Err(QueueError::NotEnoughTeams {
                count: self.teams.len(),
            });
        }

        let mut order = self.teams.clone();

        let streak = match outcome {
            Outcome::Win { winner } => {
                let index = order
                    .iter()
                    .position(|team| team.id == winner)
                    .ok_or(QueueError::UnknownTeam(winner))?;

                match index {
                    0 => {
                        let loser = order.remove(1);
                        order.push(loser);
                        order[0].streak += 1;
                        StreakChange::Extend {
                            team: order[0].name.clone(),
                            streak: order[0].streak,
                        }
                    }
                    1 => {
                        let champion = order.remove(0);
                        order.push(champion);
                        for team in &mut order {
                            team.streak = 0;
                        }
                        order[0].streak = 1;
                        StreakChange::Upset {
                            team: order[0].name.clone(),
                        }
                    }
                    _ => {
                        return Err(QueueError::NotPlaying {
                            name: order[index].name.clone(),
                            position: index as u32 + 1,
                        });
                    }
                }
            }
            Outcome::Draw => {
                let first = order.remove(0);
                let second = order.remove(0);
                order.push(second);
                order.push(first);
                for team in &mut order {
                    team.streak = 0;
                }
                StreakChange::ResetAll
            }
        };

        for (team, position) in order.iter_mut().zip(1u32..) {
            team.position = position;
        }

        Ok(Rotation {
            teams: order,
            streak,
        })
    }
}

/// Queue produced by an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    /// New order with renumbered positions and updated streaks.
    pub teams: Vec<Team>,
    /// Streak update to persist.
    pub streak: StreakChange,
}

impl Rotation {
    /// Teams whose position differs from `before`, with their absolute target.
    pub fn position_changes(&self, before: &Roster) -> Vec<PositionChange> {
        self.teams
            .iter()
            .filter(|team| {
                before
                    .teams
                    .iter()
                    .find(|previous| previous.id == team.id)
                    .is_none_or(|previous| previous.position != team.position)
            })
            .map(|team| PositionChange {
                id: team.id,
                position: team.position,
            })
            .collect()
    }

    /// Writes needed to persist this rotation on top of `before`.
    pub fn commit_batch(&self, before: &Roster) -> CommitBatch {
        let (reset_all, streak) = match &self.streak {
            StreakChange::Extend { team, streak } => (false, Some((team.clone(), *streak))),
            StreakChange::Upset { team } => (true, Some((team.clone(), 1))),
            StreakChange::ResetAll => (true, None),
        };

        CommitBatch {
            reset_all,
            streak,
            positions: self.position_changes(before),
            roster: Roster {
                teams: self.teams.clone(),
            },
        }
    }
}

/// Absolute writes persisting one rotation.
///
/// Every value is a target, never a delta, so a batch can be replayed after a
/// partial failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    /// Clear every streak before anything else.
    pub reset_all: bool,
    /// Streak value for one team, by name.
    pub streak: Option<(String, u32)>,
    /// Position targets for moved teams.
    pub positions: Vec<PositionChange>,
    /// Roster once the batch is persisted.
    pub roster: Roster,
}

impl CommitBatch {
    /// Number of individual store writes.
    pub fn write_count(&self) -> usize {
        usize::from(self.reset_all) + usize::from(self.streak.is_some()) + self.positions.len()
    }
}
