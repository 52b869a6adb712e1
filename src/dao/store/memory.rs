//! Process-local storage backend used when no database is configured and in tests.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{GameStateEntity, GameStatePatch, TeamEntity, name_key},
    storage::{StorageError, StorageResult},
    store::{GameStateStore, RosterStore, Storage},
};

/// In-memory store backed by concurrent maps. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    teams: DashMap<Uuid, TeamEntity>,
    /// Lowercased team name to id, doubles as the uniqueness index.
    names: DashMap<String, Uuid>,
    game_state: RwLock<Option<GameStateEntity>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_teams(&self) -> Vec<TeamEntity> {
        let mut teams: Vec<TeamEntity> = self
            .inner
            .teams
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        teams.sort_by_key(|team| team.position);
        teams
    }

    fn insert_team(&self, team: TeamEntity) -> StorageResult<TeamEntity> {
        match self.inner.names.entry(team.name_key()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateName { name: team.name }),
            Entry::Vacant(slot) => {
                slot.insert(team.id);
                self.inner.teams.insert(team.id, team.clone());
                Ok(team)
            }
        }
    }

    fn find_by_name(&self, name: &str) -> Option<TeamEntity> {
        let id = *self.inner.names.get(&name_key(name))?;
        self.inner.teams.get(&id).map(|entry| entry.value().clone())
    }

    fn remove_team(&self, id: Uuid) -> bool {
        match self.inner.teams.remove(&id) {
            Some((_, team)) => {
                self.inner.names.remove(&team.name_key());
                true
            }
            None => false,
        }
    }
}

impl RosterStore for MemoryStore {
    fn list_teams(&self) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.sorted_teams()) })
    }

    fn create_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<TeamEntity>> {
        let store = self.clone();
        Box::pin(async move { store.insert_team(team) })
    }

    fn find_team_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.find_by_name(&name)) })
    }

    fn delete_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.remove_team(id)) })
    }

    fn update_team_position(&self, id: Uuid, position: u32) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some(mut team) = store.inner.teams.get_mut(&id) {
                team.position = position;
            }
            Ok(())
        })
    }

    fn update_team_streak(&self, name: String, streak: u32) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(id) = store.inner.names.get(&name_key(&name)).map(|id| *id) else {
                return Ok(());
            };
            if let Some(mut team) = store.inner.teams.get_mut(&id) {
                team.streak = streak;
            }
            Ok(())
        })
    }

    fn reset_all_streaks(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for mut team in store.inner.teams.iter_mut() {
                team.streak = 0;
            }
            Ok(())
        })
    }
}

impl GameStateStore for MemoryStore {
    fn get_game_state(&self) -> BoxFuture<'static, StorageResult<Option<GameStateEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(*store.inner.game_state.read().await) })
    }

    fn set_game_state(&self, patch: GameStatePatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.inner.game_state.write().await;
            let current = guard.unwrap_or_default();
            *guard = Some(patch.apply_to(current));
            Ok(())
        })
    }
}

impl Storage for MemoryStore {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn team(name: &str, position: u32) -> TeamEntity {
        TeamEntity {
            id: Uuid::new_v4(),
            name: name.into(),
            password: "1234".into(),
            position,
            streak: 0,
            created_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_case_insensitively() {
        let store = MemoryStore::new();
        store.create_team(team("Hoopers", 1)).await.unwrap();

        let err = store.create_team(team("hOOPERS", 2)).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateName { .. }));
        assert_eq!(store.list_teams().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn teams_are_listed_by_position() {
        let store = MemoryStore::new();
        let c = store.create_team(team("C", 3)).await.unwrap();
        store.create_team(team("A", 1)).await.unwrap();
        store.create_team(team("B", 2)).await.unwrap();
        store.update_team_position(c.id, 0).await.unwrap();

        let names: Vec<_> = store
            .list_teams()
            .await
            .unwrap()
            .into_iter()
            .map(|team| team.name)
            .collect();
        assert_eq!(names, ["C", "A", "B"]);
    }

    #[tokio::test]
    async fn deleting_frees_the_name() {
        let store = MemoryStore::new();
        let created = store.create_team(team("Dunk", 1)).await.unwrap();

        assert!(store.delete_team(created.id).await.unwrap());
        assert!(!store.delete_team(created.id).await.unwrap());
        assert!(store.find_team_by_name("dunk".into()).await.unwrap().is_none());
        store.create_team(team("DUNK", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn game_state_is_absent_until_written() {
        let store = MemoryStore::new();
        assert_eq!(store.get_game_state().await.unwrap(), None);

        store
            .set_game_state(GameStatePatch {
                active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        let state = store.get_game_state().await.unwrap().unwrap();
        assert!(state.active);
        assert_eq!(state.timer, GameStateEntity::default().timer);
    }
}
