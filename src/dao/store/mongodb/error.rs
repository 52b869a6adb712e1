use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to list teams")]
    ListTeams {
        #[source]
        source: MongoError,
    },
    #[error("failed to insert team `{name}`")]
    InsertTeam {
        name: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to look up team `{name}`")]
    FindTeam {
        name: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update team `{id}`")]
    UpdateTeam {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to update streak of team `{name}`")]
    UpdateStreak {
        name: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to reset team streaks")]
    ResetStreaks {
        #[source]
        source: MongoError,
    },
    #[error("failed to delete team `{id}`")]
    DeleteTeam {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game state")]
    LoadGameState {
        #[source]
        source: MongoError,
    },
    #[error("failed to save game state")]
    SaveGameState {
        #[source]
        source: MongoError,
    },
    #[error("stored team document `{doc_id}` has an invalid id")]
    InvalidDocId { doc_id: String },
}
