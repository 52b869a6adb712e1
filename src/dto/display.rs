use serde::Serialize;
use utoipa::ToSchema;

use crate::{dto::game::GameStateResponse, state::display::DisplayState};

/// The two teams currently on the field.
#[derive(Debug, Serialize, ToSchema)]
pub struct SelectedPair {
    /// Team at position 1.
    pub champion: String,
    /// Team at position 2.
    pub challenger: String,
}

/// Everything the public display renders.
#[derive(Debug, Serialize, ToSchema)]
pub struct DisplayStateResponse {
    /// Team names in queue order.
    pub order: Vec<String>,
    pub selected_pair: Option<SelectedPair>,
    /// Streak of the team at position 1.
    pub streak: u32,
    pub clock: GameStateResponse,
    /// True until data arrived and at least two teams are registered.
    pub waiting: bool,
}

impl From<DisplayState> for DisplayStateResponse {
    fn from(view: DisplayState) -> Self {
        Self {
            order: view.order,
            selected_pair: view
                .selected_pair
                .map(|(champion, challenger)| SelectedPair {
                    champion,
                    challenger,
                }),
            streak: view.streak,
            clock: view.clock.into(),
            waiting: view.waiting,
        }
    }
}
