use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    dao::models::TeamEntity,
    dto::{format_system_time, validation::validate_team_name},
    state::queue::Team,
};

/// Payload registering a new team at the back of the queue.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateTeamRequest {
    /// Display name, 1 to 12 characters, unique regardless of case.
    #[validate(custom(function = "validate_team_name"))]
    pub name: String,
    /// Short password needed to remove the team later.
    #[validate(length(min = 1, max = 4))]
    pub password: String,
}

/// Payload removing a team, authorised by its password or by the master key.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_removal_credentials"))]
pub struct RemoveTeamRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub master_key: Option<String>,
}

fn validate_removal_credentials(request: &RemoveTeamRequest) -> Result<(), ValidationError> {
    let provided = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
    if provided(&request.password) || provided(&request.master_key) {
        Ok(())
    } else {
        let mut err = ValidationError::new("missing_credentials");
        err.message = Some("Either password or master_key is required".into());
        Err(err)
    }
}

/// Public projection of a team. The password never leaves the backend.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamSummary {
    pub id: Uuid,
    pub name: String,
    pub position: u32,
    pub streak: u32,
    /// RFC 3339 registration time, when known.
    pub created_at: Option<String>,
}

impl From<TeamEntity> for TeamSummary {
    fn from(team: TeamEntity) -> Self {
        Self {
            id: team.id,
            name: team.name,
            position: team.position,
            streak: team.streak,
            created_at: Some(format_system_time(team.created_at)),
        }
    }
}

impl From<Team> for TeamSummary {
    fn from(team: Team) -> Self {
        Self {
            id: team.id,
            name: team.name,
            position: team.position,
            streak: team.streak,
            created_at: None,
        }
    }
}

/// Teams ordered by position.
#[derive(Debug, Serialize, ToSchema)]
pub struct RosterResponse {
    pub teams: Vec<TeamSummary>,
}

impl<T> FromIterator<T> for RosterResponse
where
    T: Into<TeamSummary>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            teams: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn removal(password: Option<&str>, master_key: Option<&str>) -> RemoveTeamRequest {
        RemoveTeamRequest {
            name: "Ballers".into(),
            password: password.map(Into::into),
            master_key: master_key.map(Into::into),
        }
    }

    #[test]
    fn removal_needs_one_credential() {
        assert!(removal(Some("1234"), None).validate().is_ok());
        assert!(removal(None, Some("boss")).validate().is_ok());
        assert!(removal(None, None).validate().is_err());
        assert!(removal(Some(""), None).validate().is_err());
    }

    #[test]
    fn create_request_checks_password_length() {
        let request = CreateTeamRequest {
            name: "Ballers".into(),
            password: "12345".into(),
        };
        assert!(request.validate().is_err());

        let request = CreateTeamRequest {
            name: "Ballers".into(),
            password: "1234".into(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn summaries_hide_unknown_timestamps() {
        let summary = TeamSummary::from(Team {
            id: Uuid::nil(),
            name: "A".into(),
            position: 1,
            streak: 0,
        });
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("created_at").is_none());
        assert!(json.get("password").is_none());
    }
}
