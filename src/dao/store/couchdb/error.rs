use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// What the roster backend was doing when CouchDB failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouchOp {
    OpenDatabase,
    CreateDatabase,
    ReadDocument,
    WriteDocument,
    DeleteDocument,
    ListTeams,
    BulkWrite,
}

impl std::fmt::Display for CouchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CouchOp::OpenDatabase => "open database",
            CouchOp::CreateDatabase => "create database",
            CouchOp::ReadDocument => "read document",
            CouchOp::WriteDocument => "write document",
            CouchOp::DeleteDocument => "delete document",
            CouchOp::ListTeams => "list teams",
            CouchOp::BulkWrite => "bulk write",
        })
    }
}

#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("could not build the CouchDB HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("CouchDB {op} on `{target}` could not be sent")]
    Transport {
        op: CouchOp,
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB {op} on `{target}` answered {status}")]
    Status {
        op: CouchOp,
        target: String,
        status: StatusCode,
    },
    #[error("CouchDB {op} on `{target}` returned an unreadable body")]
    Decode {
        op: CouchOp,
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("document `{target}` does not match the roster schema")]
    Malformed {
        target: String,
        #[source]
        source: serde_json::Error,
    },
    /// Another writer updated the document since it was read.
    #[error("revision conflict on `{doc_id}`")]
    Conflict { doc_id: String },
    #[error("document id `{doc_id}` is not a team id: {reason}")]
    InvalidDocId {
        doc_id: String,
        reason: &'static str,
    },
}
