use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        game::GameStateResponse,
        sse::{RosterEvent, ServerEvent, SystemStatus, TeamCreatedEvent, TeamDeletedEvent},
        team::TeamSummary,
    },
    state::{SharedState, clock::GameClock, queue::Team},
};

const EVENT_CLOCK: &str = "clock";
const EVENT_ROSTER: &str = "roster";
const EVENT_TEAM_CREATED: &str = "team.created";
const EVENT_TEAM_DELETED: &str = "team.deleted";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast the clock triple to both streams.
pub fn broadcast_clock(state: &SharedState, clock: &GameClock) {
    send_to_all(state, EVENT_CLOCK, &GameStateResponse::from(*clock));
}

/// Broadcast the committed queue order to both streams.
pub fn broadcast_roster(state: &SharedState, teams: &[Team]) {
    let payload = RosterEvent {
        teams: teams.iter().cloned().map(TeamSummary::from).collect(),
    };
    send_to_all(state, EVENT_ROSTER, &payload);
}

pub fn broadcast_team_created(state: &SharedState, team: TeamSummary) {
    send_to_all(state, EVENT_TEAM_CREATED, &TeamCreatedEvent { team });
}

pub fn broadcast_team_deleted(state: &SharedState, team_id: Uuid, name: String) {
    send_to_all(state, EVENT_TEAM_DELETED, &TeamDeletedEvent { team_id, name });
}

/// Broadcast a degraded mode change.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_to_all(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

/// Serialize once, then hand the frame to the public and control hubs.
fn send_to_all(state: &SharedState, name: &'static str, payload: &impl Serialize) {
    match ServerEvent::json(name, payload) {
        Ok(event) => {
            state.control_sse().broadcast(event.clone());
            state.public_sse().broadcast(event);
        }
        Err(err) => warn!(event = name, error = %err, "failed to serialize SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[tokio::test]
    async fn clock_reaches_both_streams() {
        let state = AppState::new();
        let mut public = state.public_sse().subscribe();
        let mut control = state.control_sse().subscribe();

        broadcast_clock(&state, &GameClock::default());

        let public_event = public.recv().await.unwrap();
        assert_eq!(public_event.name, "clock");
        let payload: serde_json::Value = serde_json::from_str(&public_event.data).unwrap();
        assert_eq!(payload["timer"], 420);
        assert_eq!(payload["phase"], "idle");

        assert_eq!(control.recv().await.unwrap().name, "clock");
    }
}
