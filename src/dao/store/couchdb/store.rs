use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::dao::{
    models::{GameStateEntity, GameStatePatch, TeamEntity, name_key},
    storage::{StorageError, StorageResult},
    store::{GameStateStore, RosterStore, Storage},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchOp, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, BulkDocsRow, CouchGameStateDocument, CouchTeamDocument,
        END_SUFFIX, GAME_STATE_DOC_ID, RevisionOnly, TEAM_PREFIX, team_doc_id,
    },
};

const ALL_DOCS: &str = "_all_docs";
const BULK_DOCS: &str = "_bulk_docs";

/// Roster and clock documents kept in a single CouchDB database.
///
/// Teams live under `team::<uuid>`, the clock under one fixed id. Every write
/// carries the revision it read, so a concurrent writer surfaces as
/// [`CouchDaoError::Conflict`].
#[derive(Clone)]
pub struct CouchStore {
    client: Client,
    database_url: Arc<str>,
    credentials: Option<Arc<(String, String)>>,
}

impl CouchStore {
    /// Build the client and create the database when it does not exist yet.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder().build().map_err(CouchDaoError::Client)?;
        let database_url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.database
        );

        let store = Self {
            client,
            database_url: Arc::from(database_url),
            credentials: config.credentials.map(Arc::new),
        };
        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.as_deref() {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    fn database(&self, method: Method) -> RequestBuilder {
        self.authorize(self.client.request(method, self.database_url.as_ref()))
    }

    fn document(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.database_url, path);
        self.authorize(self.client.request(method, url))
    }

    async fn send(op: CouchOp, target: &str, request: RequestBuilder) -> CouchResult<Response> {
        request
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                op,
                target: target.to_string(),
                source,
            })
    }

    fn unexpected(op: CouchOp, target: &str, status: StatusCode) -> CouchDaoError {
        if status == StatusCode::CONFLICT {
            CouchDaoError::Conflict {
                doc_id: target.to_string(),
            }
        } else {
            CouchDaoError::Status {
                op,
                target: target.to_string(),
                status,
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(
        op: CouchOp,
        target: &str,
        response: Response,
    ) -> CouchResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|source| CouchDaoError::Decode {
                op,
                target: target.to_string(),
                source,
            })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let target = self.database_url.to_string();
        let response = Self::send(
            CouchOp::OpenDatabase,
            &target,
            self.database(Method::GET),
        )
        .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let created = Self::send(
                    CouchOp::CreateDatabase,
                    &target,
                    self.database(Method::PUT),
                )
                .await?;
                // 412 means another instance created it first.
                match created.status() {
                    status if status.is_success() => Ok(()),
                    StatusCode::PRECONDITION_FAILED => Ok(()),
                    status => Err(Self::unexpected(CouchOp::CreateDatabase, &target, status)),
                }
            }
            status => Err(Self::unexpected(CouchOp::OpenDatabase, &target, status)),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, doc_id: &str) -> CouchResult<Option<T>> {
        let op = CouchOp::ReadDocument;
        let response = Self::send(op, doc_id, self.document(Method::GET, doc_id)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Self::read_json(op, doc_id, response).await.map(Some),
            status => Err(Self::unexpected(op, doc_id, status)),
        }
    }

    async fn save<T: Serialize + ?Sized>(&self, doc_id: &str, document: &T) -> CouchResult<()> {
        let op = CouchOp::WriteDocument;
        let response =
            Self::send(op, doc_id, self.document(Method::PUT, doc_id).json(document)).await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(Self::unexpected(op, doc_id, status)),
        }
    }

    async fn remove(&self, doc_id: &str) -> CouchResult<bool> {
        let Some(RevisionOnly { rev }) = self.fetch::<RevisionOnly>(doc_id).await? else {
            return Ok(false);
        };

        let op = CouchOp::DeleteDocument;
        let request = self.document(Method::DELETE, doc_id).query(&[("rev", rev)]);
        let response = Self::send(op, doc_id, request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(Self::unexpected(op, doc_id, status)),
        }
    }

    /// Every team document, read through `_all_docs` over the team id range.
    async fn teams(&self) -> CouchResult<Vec<CouchTeamDocument>> {
        let op = CouchOp::ListTeams;
        let range = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{TEAM_PREFIX}\"")),
            ("endkey", format!("\"{TEAM_PREFIX}{END_SUFFIX}\"")),
        ];
        let response =
            Self::send(op, ALL_DOCS, self.document(Method::GET, ALL_DOCS).query(&range)).await?;
        if !response.status().is_success() {
            return Err(Self::unexpected(op, ALL_DOCS, response.status()));
        }

        let listing: AllDocsResponse = Self::read_json(op, ALL_DOCS, response).await?;
        listing
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|value| {
                serde_json::from_value(value).map_err(|source| CouchDaoError::Malformed {
                    target: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn team_named(&self, name: &str) -> CouchResult<Option<CouchTeamDocument>> {
        let key = name_key(name);
        let teams = self.teams().await?;
        Ok(teams.into_iter().find(|doc| doc.team.name_key == key))
    }

    /// Write several team documents in one request. CouchDB answers per row, so
    /// the first rejected row is reported.
    async fn save_all(&self, docs: &[CouchTeamDocument]) -> CouchResult<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let op = CouchOp::BulkWrite;
        let request = self
            .document(Method::POST, BULK_DOCS)
            .json(&BulkDocsRequest { docs });
        let response = Self::send(op, BULK_DOCS, request).await?;
        if !response.status().is_success() {
            return Err(Self::unexpected(op, BULK_DOCS, response.status()));
        }

        let rows: Vec<BulkDocsRow> = Self::read_json(op, BULK_DOCS, response).await?;
        match rows.into_iter().find(|row| row.error.is_some()) {
            Some(rejected) => Err(CouchDaoError::Conflict {
                doc_id: rejected.id,
            }),
            None => Ok(()),
        }
    }

    async fn modify_team<F>(&self, id: Uuid, change: F) -> CouchResult<()>
    where
        F: FnOnce(&mut CouchTeamDocument),
    {
        let doc_id = team_doc_id(id);
        match self.fetch::<CouchTeamDocument>(&doc_id).await? {
            Some(mut doc) => {
                change(&mut doc);
                self.save(&doc_id, &doc).await
            }
            None => Ok(()),
        }
    }

    async fn game_state_document(&self) -> CouchResult<Option<CouchGameStateDocument>> {
        self.fetch(GAME_STATE_DOC_ID).await
    }
}

impl RosterStore for CouchStore {
    fn list_teams(&self) -> BoxFuture<'static, StorageResult<Vec<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut roster = store
                .teams()
                .await?
                .into_iter()
                .map(TeamEntity::try_from)
                .collect::<CouchResult<Vec<_>>>()?;
            roster.sort_by_key(|team| team.position);
            Ok(roster)
        })
    }

    fn create_team(&self, team: TeamEntity) -> BoxFuture<'static, StorageResult<TeamEntity>> {
        let store = self.clone();
        Box::pin(async move {
            // No unique secondary index here, so two racing inserts can both pass.
            if store.team_named(&team.name).await?.is_some() {
                return Err(StorageError::DuplicateName { name: team.name });
            }

            let doc = CouchTeamDocument::from(team.clone());
            store.save(&doc.id, &doc).await?;
            Ok(team)
        })
    }

    fn find_team_by_name(
        &self,
        name: String,
    ) -> BoxFuture<'static, StorageResult<Option<TeamEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            match store.team_named(&name).await? {
                Some(doc) => Ok(Some(TeamEntity::try_from(doc)?)),
                None => Ok(None),
            }
        })
    }

    fn delete_team(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.remove(&team_doc_id(id)).await?) })
    }

    fn update_team_position(&self, id: Uuid, position: u32) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .modify_team(id, |doc| doc.team.position = position)
                .await?;
            Ok(())
        })
    }

    fn update_team_streak(&self, name: String, streak: u32) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if let Some(mut doc) = store.team_named(&name).await? {
                doc.team.streak = streak;
                store.save(&doc.id, &doc).await?;
            }
            Ok(())
        })
    }

    fn reset_all_streaks(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut changed = store.teams().await?;
            changed.retain(|doc| doc.team.streak != 0);
            for doc in &mut changed {
                doc.team.streak = 0;
            }
            store.save_all(&changed).await?;
            Ok(())
        })
    }
}

impl GameStateStore for CouchStore {
    fn get_game_state(&self) -> BoxFuture<'static, StorageResult<Option<GameStateEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let stored = store.game_state_document().await?;
            Ok(stored.map(|doc| doc.state))
        })
    }

    fn set_game_state(&self, patch: GameStatePatch) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let (current, rev) = match store.game_state_document().await? {
                Some(doc) => (doc.state, doc.rev),
                None => (GameStateEntity::default(), None),
            };
            let next = CouchGameStateDocument::new(patch.apply_to(current), rev);
            store.save(GAME_STATE_DOC_ID, &next).await?;
            Ok(())
        })
    }
}

impl Storage for CouchStore {
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let target = store.database_url.to_string();
            let op = CouchOp::OpenDatabase;
            let response = Self::send(op, &target, store.database(Method::GET)).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(Self::unexpected(op, &target, response.status()).into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.ensure_database().await?) })
    }
}
