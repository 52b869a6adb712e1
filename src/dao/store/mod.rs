#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;
#[cfg(test)]
pub mod testing;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{GameStateEntity, GameStatePatch, TeamEntity};
use crate::dao::storage::StorageResult;

/// Durable ordered list of registered teams.
pub trait RosterStore: Send + Sync {
    /// All teams ordered by ascending position.
    fn list_teams(&self) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>>;
    /// Insert a new team, failing with `DuplicateName` on a case-insensitive collision.
    fn create_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<TeamEntity>>;
    /// Case-insensitive lookup by display name.
    fn find_team_by_name(&self, name: String)
    -> BoxFuture<'static, StorageResult<Option<TeamEntity>>>;
    /// Remove a team, returning whether a document was deleted.
    fn delete_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    fn update_team_position(&self, id: Uuid, position: u32) -> BoxFuture<'static, StorageResult<()>>;
    fn update_team_streak(&self, name: String, streak: u32) -> BoxFuture<'static, StorageResult<()>>;
    fn reset_all_streaks(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Durable singleton game clock record.
pub trait GameStateStore: Send + Sync {
    /// Persisted record, or `None` when no game state was ever written.
    fn get_game_state(&self) -> BoxFuture<'static, StorageResult<Option<GameStateEntity>>>;
    fn set_game_state(&self, patch: GameStatePatch) -> BoxFuture<'static, StorageResult<()>>;
}

/// Full storage backend installed into the shared state.
pub trait Storage: RosterStore + GameStateStore {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
