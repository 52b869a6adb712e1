use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::CouchDaoError;
use crate::dao::models::{GameStateEntity, TeamEntity};

pub const TEAM_PREFIX: &str = "team::";
pub const GAME_STATE_DOC_ID: &str = "game_state::current";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Response row of `_bulk_docs`; failed rows carry an `error`.
#[derive(Debug, Deserialize)]
pub struct BulkDocsRow {
    pub id: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest<'a, T> {
    pub docs: &'a [T],
}

/// Subset of a document needed to issue a delete.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchTeamDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub team: TeamBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamBody {
    pub name: String,
    pub name_key: String,
    pub password: String,
    pub position: u32,
    pub streak: u32,
    pub created_at: SystemTime,
}

impl From<TeamEntity> for CouchTeamDocument {
    fn from(team: TeamEntity) -> Self {
        Self {
            id: team_doc_id(team.id),
            rev: None,
            team: TeamBody {
                name_key: team.name_key(),
                name: team.name,
                password: team.password,
                position: team.position,
                streak: team.streak,
                created_at: team.created_at,
            },
        }
    }
}

impl TryFrom<CouchTeamDocument> for TeamEntity {
    type Error = CouchDaoError;

    fn try_from(doc: CouchTeamDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: extract_uuid(&doc.id)?,
            name: doc.team.name,
            password: doc.team.password,
            position: doc.team.position,
            streak: doc.team.streak,
            created_at: doc.team.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchGameStateDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub state: GameStateEntity,
}

impl CouchGameStateDocument {
    pub fn new(state: GameStateEntity, rev: Option<String>) -> Self {
        Self {
            id: GAME_STATE_DOC_ID.to_string(),
            rev,
            state,
        }
    }
}

pub fn team_doc_id(id: Uuid) -> String {
    format!("{}{}", TEAM_PREFIX, id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let id = doc_id
        .strip_prefix(TEAM_PREFIX)
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            reason: "missing team prefix",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        reason: "invalid UUID",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_ids_round_through_document_ids() {
        let id = Uuid::new_v4();
        assert_eq!(extract_uuid(&team_doc_id(id)).unwrap(), id);
    }

    #[test]
    fn foreign_document_ids_are_rejected() {
        let err = extract_uuid("game_state::current").unwrap_err();
        assert!(matches!(
            err,
            CouchDaoError::InvalidDocId {
                reason: "missing team prefix",
                ..
            }
        ));
    }
}
