use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::{CONNECT_PINGS, RECONNECT_PINGS, open_database},
    error::{MongoDaoError, MongoResult},
    models::{
        GAME_STATE_DOC_ID, MongoGameStateDocument, MongoTeamDocument, doc_id, game_state_update,
    },
};
use crate::dao::{
    models::{GameStateEntity, GameStatePatch, TeamEntity, name_key},
    storage::{StorageError, StorageResult},
    store::{GameStateStore, RosterStore, Storage},
};

const TEAM_COLLECTION_NAME: &str = "teams";
const GAME_STATE_COLLECTION_NAME: &str = "game_state";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = open_database(&self.config, RECONNECT_PINGS).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = open_database(&config, CONNECT_PINGS).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.team_collection().await;

        let name_index = mongodb::IndexModel::builder()
            .keys(doc! {"name_key": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("team_name_key_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        collection
            .create_index(name_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TEAM_COLLECTION_NAME,
                index: "name_key",
                source,
            })?;

        let position_index = mongodb::IndexModel::builder()
            .keys(doc! {"position": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("team_position_idx".to_owned()))
                    .build(),
            )
            .build();
        collection
            .create_index(position_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TEAM_COLLECTION_NAME,
                index: "position",
                source,
            })?;

        Ok(())
    }

    async fn team_collection(&self) -> Collection<MongoTeamDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoTeamDocument>(TEAM_COLLECTION_NAME)
    }

    async fn game_state_collection(&self) -> Collection<MongoGameStateDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoGameStateDocument>(GAME_STATE_COLLECTION_NAME)
    }

    async fn list_teams(&self) -> MongoResult<Vec<TeamEntity>> {
        let collection = self.team_collection().await;
        let documents: Vec<MongoTeamDocument> = collection
            .find(doc! {})
            .sort(doc! {"position": 1})
            .await
            .map_err(|source| MongoDaoError::ListTeams { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListTeams { source })?;

        documents.into_iter().map(TeamEntity::try_from).collect()
    }

    async fn create_team(&self, team: TeamEntity) -> StorageResult<TeamEntity> {
        let collection = self.team_collection().await;
        let document: MongoTeamDocument = team.clone().into();

        match collection.insert_one(&document).await {
            Ok(_) => Ok(team),
            Err(err) if is_duplicate_key(&err) => Err(StorageError::DuplicateName { name: team.name }),
            Err(source) => Err(MongoDaoError::InsertTeam {
                name: team.name,
                source,
            }
            .into()),
        }
    }

    async fn find_team_by_name(&self, name: String) -> MongoResult<Option<TeamEntity>> {
        let collection = self.team_collection().await;
        let document = collection
            .find_one(doc! {"name_key": name_key(&name)})
            .await
            .map_err(|source| MongoDaoError::FindTeam { name, source })?;

        document.map(TeamEntity::try_from).transpose()
    }

    async fn delete_team(&self, id: Uuid) -> MongoResult<bool> {
        let collection = self.team_collection().await;
        let result = collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteTeam { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn update_team_position(&self, id: Uuid, position: u32) -> MongoResult<()> {
        let collection = self.team_collection().await;
        collection
            .update_one(
                doc_id(id),
                doc! {"$set": {"position": i64::from(position)}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateTeam { id, source })?;
        Ok(())
    }

    async fn update_team_streak(&self, name: String, streak: u32) -> MongoResult<()> {
        let collection = self.team_collection().await;
        collection
            .update_one(
                doc! {"name_key": name_key(&name)},
                doc! {"$set": {"streak": i64::from(streak)}},
            )
            .await
            .map_err(|source| MongoDaoError::UpdateStreak { name, source })?;
        Ok(())
    }

    async fn reset_all_streaks(&self) -> MongoResult<()> {
        let collection = self.team_collection().await;
        collection
            .update_many(doc! {}, doc! {"$set": {"streak": 0_i64}})
            .await
            .map_err(|source| MongoDaoError::ResetStreaks { source })?;
        Ok(())
    }

    async fn get_game_state(&self) -> MongoResult<Option<GameStateEntity>> {
        let collection = self.game_state_collection().await;
        let document = collection
            .find_one(doc! {"_id": GAME_STATE_DOC_ID})
            .await
            .map_err(|source| MongoDaoError::LoadGameState { source })?;

        Ok(document.map(Into::into))
    }

    async fn set_game_state(&self, patch: GameStatePatch) -> MongoResult<()> {
        let collection = self.game_state_collection().await;
        collection
            .update_one(doc! {"_id": GAME_STATE_DOC_ID}, game_state_update(&patch))
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveGameState { source })?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl RosterStore for MongoStore {
    fn list_teams(&self) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_teams().await.map_err(Into::into) })
    }

    fn create_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<TeamEntity>> {
        let store = self.clone();
        Box::pin(async move { store.create_team(team).await })
    }

    fn find_team_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_team_by_name(name).await.map_err(Into::into) })
    }

    fn delete_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_team(id).await.map_err(Into::into) })
    }

    fn update_team_position(&self, id: Uuid, position: u32) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_team_position(id, position)
                .await
                .map_err(Into::into)
        })
    }

    fn update_team_streak(&self, name: String, streak: u32) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_team_streak(name, streak)
                .await
                .map_err(Into::into)
        })
    }

    fn reset_all_streaks(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.reset_all_streaks().await.map_err(Into::into) })
    }
}

impl GameStateStore for MongoStore {
    fn get_game_state(&self) -> BoxFuture<'static, StorageResult<Option<GameStateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.get_game_state().await.map_err(Into::into) })
    }

    fn set_game_state(&self, patch: GameStatePatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.set_game_state(patch).await.map_err(Into::into) })
    }
}

impl Storage for MongoStore {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
