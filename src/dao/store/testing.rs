//! Store wrapper with switchable write failures, for service tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{GameStateEntity, GameStatePatch, TeamEntity},
    storage::{StorageError, StorageResult},
    store::{GameStateStore, RosterStore, Storage, memory::MemoryStore},
};

#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Faults {
    positions: AtomicBool,
    game_state: AtomicBool,
    lists_after_delete: AtomicBool,
    deleted: AtomicBool,
    writes: AtomicUsize,
}

fn injected() -> StorageError {
    StorageError::unavailable("injected failure".into(), io::Error::other("injected"))
}

impl FlakyStore {
    pub fn fail_positions(&self, fail: bool) {
        self.faults.positions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_game_state(&self, fail: bool) {
        self.faults.game_state.store(fail, Ordering::SeqCst);
    }

    /// While set, roster reads fail once any team has been deleted. Clearing it
    /// also forgets past deletes.
    pub fn fail_lists_after_delete(&self, fail: bool) {
        self.faults.lists_after_delete.store(fail, Ordering::SeqCst);
        if !fail {
            self.faults.deleted.store(false, Ordering::SeqCst);
        }
    }

    /// Successful roster and game state writes so far.
    pub fn writes(&self) -> usize {
        self.faults.writes.load(Ordering::SeqCst)
    }

    fn count<T>(&self, future: BoxFuture<'static, StorageResult<T>>) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
    {
        let faults = self.faults.clone();
        Box::pin(async move {
            let value = future.await?;
            faults.writes.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }
}

impl RosterStore for FlakyStore {
    fn list_teams(&self) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
        if self.faults.lists_after_delete.load(Ordering::SeqCst)
            && self.faults.deleted.load(Ordering::SeqCst)
        {
            return Box::pin(async { Err(injected()) });
        }
        self.inner.list_teams()
    }

    fn create_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<TeamEntity>> {
        self.count(self.inner.create_team(team))
    }

    fn find_team_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        self.inner.find_team_by_name(name)
    }

    fn delete_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let faults = self.faults.clone();
        let delete = self.count(self.inner.delete_team(id));
        Box::pin(async move {
            let deleted = delete.await?;
            faults.deleted.store(true, Ordering::SeqCst);
            Ok(deleted)
        })
    }

    fn update_team_position(&self, id: Uuid, position: u32) -> BoxFuture<'static, StorageResult<()>> {
        if self.faults.positions.load(Ordering::SeqCst) {
            return Box::pin(async { Err(injected()) });
        }
        self.count(self.inner.update_team_position(id, position))
    }

    fn update_team_streak(&self, name: String, streak: u32) -> BoxFuture<'static, StorageResult<()>> {
        self.count(self.inner.update_team_streak(name, streak))
    }

    fn reset_all_streaks(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.count(self.inner.reset_all_streaks())
    }
}

impl GameStateStore for FlakyStore {
    fn get_game_state(&self) -> BoxFuture<'static, StorageResult<Option<GameStateEntity>>> {
        self.inner.get_game_state()
    }

    fn set_game_state(&self, patch: GameStatePatch) -> BoxFuture<'static, StorageResult<()>> {
        if self.faults.game_state.load(Ordering::SeqCst) {
            return Box::pin(async { Err(injected()) });
        }
        self.count(self.inner.set_game_state(patch))
    }
}

impl Storage for FlakyStore {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}
