use crate::state::{clock::GameClock, queue::Team};

/// Message pushed by the control side to every display mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// The clock changed.
    Clock(GameClock),
    /// The roster was committed.
    Roster(Vec<Team>),
}

/// Last values received by the display mirror, from either a push or a poll.
///
/// There is no sequence number: whichever value arrives last wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayCache {
    /// Last clock received.
    pub clock: Option<GameClock>,
    /// Last roster received, in queue order.
    pub roster: Option<Vec<Team>>,
}

impl DisplayCache {
    /// Overwrite the cached value carried by `message`.
    pub fn apply(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::Clock(clock) => self.clock = Some(clock),
            SyncMessage::Roster(mut teams) => {
                teams.sort_by_key(|team| team.position);
                self.roster = Some(teams);
            }
        }
    }

    /// Derive what the public display shows.
    pub fn view(&self) -> DisplayState {
        let clock = self.clock.unwrap_or_default();
        let teams = self.roster.as_deref().unwrap_or_default();

        let selected_pair = match teams {
            [first, second, ..] => Some((first.name.clone(), second.name.clone())),
            _ => None,
        };

        DisplayState {
            order: teams.iter().map(|team| team.name.clone()).collect(),
            streak: teams.first().map(|team| team.streak).unwrap_or(0),
            waiting: self.clock.is_none() || selected_pair.is_none(),
            selected_pair,
            clock,
        }
    }
}

/// Everything the public display renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    /// Team names in queue order.
    pub order: Vec<String>,
    /// Names of the two teams on the field.
    pub selected_pair: Option<(String, String)>,
    /// Streak of the team at position 1.
    pub streak: u32,
    /// Clock triple.
    pub clock: GameClock,
    /// No data yet, or not enough teams to play.
    pub waiting: bool,
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn team(name: &str, position: u32, streak: u32) -> Team {
        Team {
            id: Uuid::new_v4(),
            name: name.into(),
            position,
            streak,
        }
    }

    #[test]
    fn empty_cache_is_waiting() {
        let view = DisplayCache::default().view();
        assert!(view.waiting);
        assert!(view.order.is_empty());
        assert_eq!(view.clock, GameClock::default());
    }

    #[test]
    fn last_message_wins() {
        let mut cache = DisplayCache::default();
        cache.apply(SyncMessage::Clock(GameClock {
            timer: 10,
            active: true,
            ended: false,
        }));
        cache.apply(SyncMessage::Clock(GameClock {
            timer: 12,
            active: true,
            ended: false,
        }));

        assert_eq!(cache.view().clock.timer, 12);
    }

    #[test]
    fn view_exposes_pair_and_champion_streak() {
        let mut cache = DisplayCache::default();
        cache.apply(SyncMessage::Clock(GameClock::default()));
        cache.apply(SyncMessage::Roster(vec![
            team("Gamma", 3, 0),
            team("Alpha", 1, 2),
            team("Beta", 2, 0),
        ]));

        let view = cache.view();
        assert!(!view.waiting);
        assert_eq!(view.order, ["Alpha", "Beta", "Gamma"]);
        assert_eq!(
            view.selected_pair,
            Some(("Alpha".to_string(), "Beta".to_string()))
        );
        assert_eq!(view.streak, 2);
    }

    #[test]
    fn single_team_keeps_display_waiting() {
        let mut cache = DisplayCache::default();
        cache.apply(SyncMessage::Clock(GameClock::default()));
        cache.apply(SyncMessage::Roster(vec![team("Solo", 1, 0)]));

        assert!(cache.view().waiting);
    }
}
