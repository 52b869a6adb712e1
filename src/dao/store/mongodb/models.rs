use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{GameStateEntity, GameStatePatch, TeamEntity};

/// Identifier of the singleton game state document.
pub const GAME_STATE_DOC_ID: &str = "current";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Lowercased name backing the unique index.
    pub name_key: String,
    pub password: String,
    pub position: i64,
    pub streak: i64,
    pub created_at: DateTime,
}

impl From<TeamEntity> for MongoTeamDocument {
    fn from(value: TeamEntity) -> Self {
        Self {
            id: value.id.to_string(),
            name_key: value.name_key(),
            name: value.name,
            password: value.password,
            position: i64::from(value.position),
            streak: i64::from(value.streak),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoTeamDocument> for TeamEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTeamDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|_| MongoDaoError::InvalidDocId { doc_id: value.id })?;
        Ok(Self {
            id,
            name: value.name,
            password: value.password,
            position: clamp_u32(value.position),
            streak: clamp_u32(value.streak),
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameStateDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub timer: i64,
    pub active: bool,
    pub ended: bool,
}

impl From<MongoGameStateDocument> for GameStateEntity {
    fn from(value: MongoGameStateDocument) -> Self {
        Self {
            timer: clamp_u32(value.timer),
            active: value.active,
            ended: value.ended,
        }
    }
}

/// Split a patch into the `$set` fields and the `$setOnInsert` defaults for an upsert.
pub fn game_state_update(patch: &GameStatePatch) -> Document {
    let defaults = GameStateEntity::default();
    let mut set = Document::new();
    let mut on_insert = Document::new();

    match patch.timer {
        Some(timer) => set.insert("timer", i64::from(timer)),
        None => on_insert.insert("timer", i64::from(defaults.timer)),
    };
    match patch.active {
        Some(active) => set.insert("active", active),
        None => on_insert.insert("active", defaults.active),
    };
    match patch.ended {
        Some(ended) => set.insert("ended", ended),
        None => on_insert.insert("ended", defaults.ended),
    };

    let mut update = Document::new();
    if !set.is_empty() {
        update.insert("$set", set);
    }
    if !on_insert.is_empty() {
        update.insert("$setOnInsert", on_insert);
    }
    update
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_patch_keeps_defaults_for_inserts() {
        let update = game_state_update(&GameStatePatch {
            timer: Some(12),
            ..Default::default()
        });

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_i64("timer").unwrap(), 12);
        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert!(!on_insert.get_bool("active").unwrap());
        assert!(!on_insert.get_bool("ended").unwrap());
    }

    #[test]
    fn negative_counters_are_clamped() {
        assert_eq!(clamp_u32(-3), 0);
        assert_eq!(clamp_u32(7), 7);
    }
}
