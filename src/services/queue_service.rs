use std::{sync::Arc, time::SystemTime};

use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{TeamEntity, name_key},
        storage::StorageError,
        store::Storage,
    },
    dto::team::TeamSummary,
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        display::SyncMessage,
        queue::{CommitBatch, Outcome, Roster, Team},
    },
};

/// All registered teams ordered by position.
pub async fn list_teams(state: &SharedState) -> Result<Vec<TeamEntity>, ServiceError> {
    let store = state.require_store().await?;
    Ok(store.list_teams().await?)
}

/// Register a team at the back of the queue.
pub async fn add_team(
    state: &SharedState,
    name: String,
    password: String,
) -> Result<TeamEntity, ServiceError> {
    let name = name.trim().to_string();
    if name.is_empty() || password.is_empty() {
        return Err(ServiceError::InvalidInput(
            "team name and password are required".into(),
        ));
    }

    let pending = state.lock_roster().await;
    if pending.is_some() {
        return Err(ServiceError::InvalidState(
            "a previous roster commit failed; retry it before adding teams".into(),
        ));
    }
    let store = state.require_store().await?;

    let mut teams = store.list_teams().await?;
    let key = name_key(&name);
    if teams.iter().any(|team| team.name_key() == key) {
        return Err(ServiceError::Duplicate(format!(
            "team `{name}` already exists"
        )));
    }

    let position = teams
        .iter()
        .map(|team| team.position)
        .max()
        .unwrap_or(0)
        .max(teams.len() as u32)
        + 1;

    let team = store
        .create_team(TeamEntity {
            id: Uuid::new_v4(),
            name,
            password,
            position,
            streak: 0,
            created_at: SystemTime::now(),
        })
        .await?;

    info!(team = %team.name, position, "team registered");
    teams.push(team.clone());
    sse_events::broadcast_team_created(state, TeamSummary::from(team.clone()));
    publish_roster(state, teams.into_iter().map(Team::from).collect());

    Ok(team)
}

/// Remove a team, authorised by its own password or by the master credential.
/// Remaining teams are renumbered densely. The renumbering is planned from the
/// roster read before the delete, so nothing after the delete can fail without
/// leaving a pending commit.
pub async fn remove_team(
    state: &SharedState,
    name: String,
    password: Option<String>,
    master_key: Option<String>,
) -> Result<TeamEntity, ServiceError> {
    let password = password.filter(|value| !value.is_empty());
    let master_key = master_key.filter(|value| !value.is_empty());

    if name.trim().is_empty() {
        return Err(ServiceError::InvalidInput("team name is required".into()));
    }
    if password.is_none() && master_key.is_none() {
        return Err(ServiceError::InvalidInput(
            "either password or master_key is required".into(),
        ));
    }

    let mut pending = state.lock_roster().await;
    if pending.is_some() {
        return Err(ServiceError::InvalidState(
            "a previous roster commit failed; retry it before removing teams".into(),
        ));
    }
    let store = state.require_store().await?;

    let team = store
        .find_team_by_name(name.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("team `{}` not found", name.trim())))?;

    let by_master = master_key
        .as_deref()
        .is_some_and(|key| state.config().is_master_key(key));
    let by_password = password.as_deref() == Some(team.password.as_str());
    if !by_master && !by_password {
        return Err(ServiceError::Unauthorized(format!(
            "wrong credentials for team `{}`",
            team.name
        )));
    }

    let remaining = Roster::new(
        store
            .list_teams()
            .await?
            .into_iter()
            .filter(|entry| entry.id != team.id)
            .map(Team::from)
            .collect(),
    );

    if !store.delete_team(team.id).await? {
        return Err(ServiceError::NotFound(format!(
            "team `{}` not found",
            team.name
        )));
    }
    info!(team = %team.name, by_master, "team removed");
    sse_events::broadcast_team_deleted(state, team.id, team.name.clone());

    let positions = remaining.renumber();
    let roster = Roster::new(
        remaining
            .teams()
            .iter()
            .cloned()
            .zip(1u32..)
            .map(|(team, position)| Team { position, ..team })
            .collect(),
    );

    // A gap left behind is fixed by retrying like any other partial commit.
    let batch = CommitBatch {
        reset_all: false,
        streak: None,
        positions,
        roster,
    };
    commit(state, &store, &mut pending, batch).await?;

    Ok(team)
}

/// Apply a game outcome to the queue and persist the rotation.
///
/// Rejected with a conflict while an earlier commit awaits retry.
pub async fn record_outcome(
    state: &SharedState,
    outcome: Outcome,
) -> Result<Vec<Team>, ServiceError> {
    let mut pending = state.lock_roster().await;
    if pending.is_some() {
        return Err(ServiceError::InvalidState(
            "a previous roster commit failed; retry it before recording a new outcome".into(),
        ));
    }

    let store = state.require_store().await?;
    let before = Roster::new(store.list_teams().await?.into_iter().map(Team::from).collect());
    let rotation = before.apply_outcome(outcome)?;
    let batch = rotation.commit_batch(&before);

    info!(?outcome, streak = ?rotation.streak, writes = batch.write_count(), "recording outcome");
    commit(state, &store, &mut pending, batch).await
}

/// Re-apply the batch left behind by a partially failed commit.
pub async fn retry_commit(state: &SharedState) -> Result<Vec<Team>, ServiceError> {
    let mut pending = state.lock_roster().await;
    let batch = pending
        .take()
        .ok_or_else(|| ServiceError::InvalidState("no roster commit is pending".into()))?;

    let store = match state.require_store().await {
        Ok(store) => store,
        Err(err) => {
            *pending = Some(batch);
            return Err(err);
        }
    };

    info!(writes = batch.write_count(), "retrying roster commit");
    commit(state, &store, &mut pending, batch).await
}

/// Whether a partially failed commit awaits retry.
pub async fn has_pending_commit(state: &SharedState) -> bool {
    state.lock_roster().await.is_some()
}

async fn commit(
    state: &SharedState,
    store: &Arc<dyn Storage>,
    pending: &mut Option<CommitBatch>,
    batch: CommitBatch,
) -> Result<Vec<Team>, ServiceError> {
    let failures = apply_batch(store, &batch).await;

    if !failures.is_empty() {
        let total = batch.write_count();
        for err in &failures {
            warn!(error = %err, "roster write failed");
        }
        warn!(
            failed = failures.len(),
            total, "roster commit incomplete; keeping it for retry"
        );
        *pending = Some(batch);
        return Err(ServiceError::PartialCommit {
            failed: failures.len(),
            total,
        });
    }

    let teams = batch.roster.teams().to_vec();
    publish_roster(state, teams.clone());
    Ok(teams)
}

/// Run every write of the batch, returning the failures.
async fn apply_batch(store: &Arc<dyn Storage>, batch: &CommitBatch) -> Vec<StorageError> {
    let mut failures = Vec::new();

    // The bulk reset must land before the single streak that follows it.
    if batch.reset_all {
        if let Err(err) = store.reset_all_streaks().await {
            failures.push(err);
        }
    }

    if let Some((name, streak)) = &batch.streak {
        if let Err(err) = store.update_team_streak(name.clone(), *streak).await {
            failures.push(err);
        }
    }

    let moves = batch
        .positions
        .iter()
        .map(|change| store.update_team_position(change.id, change.position));
    failures.extend(join_all(moves).await.into_iter().filter_map(Result::err));

    failures
}

fn publish_roster(state: &SharedState, teams: Vec<Team>) {
    sse_events::broadcast_roster(state, &teams);
    state.publish_sync(SyncMessage::Roster(teams));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::store::testing::FlakyStore,
        state::AppState,
    };

    async fn setup(names: &[&str]) -> (SharedState, FlakyStore) {
        let state = AppState::with_config(AppConfig {
            master_key: Some("boss".into()),
            ..AppConfig::default()
        });
        let store = FlakyStore::default();
        state.set_store(Arc::new(store.clone())).await;
        for name in names {
            add_team(&state, name.to_string(), "pw".into()).await.unwrap();
        }
        (state, store)
    }

    async fn order(state: &SharedState) -> Vec<(String, u32, u32)> {
        list_teams(state)
            .await
            .unwrap()
            .into_iter()
            .map(|team| (team.name, team.position, team.streak))
            .collect()
    }

    async fn id_of(state: &SharedState, name: &str) -> Uuid {
        list_teams(state)
            .await
            .unwrap()
            .into_iter()
            .find(|team| team.name == name)
            .map(|team| team.id)
            .unwrap()
    }

    #[tokio::test]
    async fn teams_are_appended_in_registration_order() {
        let (state, _) = setup(&["A", "B", "C"]).await;
        assert_eq!(
            order(&state).await,
            vec![("A".into(), 1, 0), ("B".into(), 2, 0), ("C".into(), 3, 0)]
        );
    }

    #[tokio::test]
    async fn duplicate_names_conflict_case_insensitively() {
        let (state, _) = setup(&["Ballers"]).await;
        let err = add_team(&state, " ballers ".into(), "pw".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate(_)));
    }

    #[tokio::test]
    async fn outcomes_are_persisted_and_pushed() {
        let (state, _) = setup(&["A", "B", "C"]).await;
        let mut sync = state.subscribe_sync();

        let winner = id_of(&state, "B").await;
        record_outcome(&state, Outcome::Win { winner }).await.unwrap();

        assert_eq!(
            order(&state).await,
            vec![("B".into(), 1, 1), ("C".into(), 2, 0), ("A".into(), 3, 0)]
        );
        match sync.recv().await.unwrap() {
            SyncMessage::Roster(teams) => assert_eq!(teams[0].name, "B"),
            other => panic!("unexpected sync message {other:?}"),
        }
    }

    #[tokio::test]
    async fn champion_keeps_extending_its_streak() {
        let (state, _) = setup(&["A", "B", "C"]).await;
        let champion = id_of(&state, "A").await;

        for _ in 0..3 {
            record_outcome(&state, Outcome::Win { winner: champion })
                .await
                .unwrap();
        }

        let teams = order(&state).await;
        assert_eq!(teams[0], ("A".into(), 1, 3));
    }

    #[tokio::test]
    async fn draw_with_four_teams() {
        let (state, _) = setup(&["A", "B", "C", "D"]).await;
        record_outcome(&state, Outcome::Draw).await.unwrap();

        let names: Vec<String> = order(&state).await.into_iter().map(|t| t.0).collect();
        assert_eq!(names, ["C", "D", "B", "A"]);
    }

    #[tokio::test]
    async fn single_team_outcome_writes_nothing() {
        let (state, store) = setup(&["A"]).await;
        let writes = store.writes();

        let err = record_outcome(&state, Outcome::Draw).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(store.writes(), writes);
    }

    #[tokio::test]
    async fn partial_failure_is_kept_and_retried() {
        let (state, store) = setup(&["A", "B", "C"]).await;
        store.fail_positions(true);

        let err = record_outcome(&state, Outcome::Draw).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PartialCommit { failed: 2, total: 3 }
        ));
        assert!(has_pending_commit(&state).await);

        let blocked = record_outcome(&state, Outcome::Draw).await.unwrap_err();
        assert!(matches!(blocked, ServiceError::InvalidState(_)));

        store.fail_positions(false);
        retry_commit(&state).await.unwrap();

        assert!(!has_pending_commit(&state).await);
        let names: Vec<String> = order(&state).await.into_iter().map(|t| t.0).collect();
        assert_eq!(names, ["C", "B", "A"]);
    }

    #[tokio::test]
    async fn retry_without_pending_commit_conflicts() {
        let (state, _) = setup(&["A", "B"]).await;
        assert!(matches!(
            retry_commit(&state).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn removal_renumbers_positions() {
        let (state, _) = setup(&["A", "B", "C"]).await;
        remove_team(&state, "b".into(), Some("pw".into()), None)
            .await
            .unwrap();

        assert_eq!(
            order(&state).await,
            vec![("A".into(), 1, 0), ("C".into(), 2, 0)]
        );
    }

    #[tokio::test]
    async fn removal_checks_credentials() {
        let (state, _) = setup(&["A", "B"]).await;

        let err = remove_team(&state, "A".into(), Some("nope".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = remove_team(&state, "A".into(), None, Some("guess".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let err = remove_team(&state, "A".into(), None, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = remove_team(&state, "Z".into(), Some("pw".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        remove_team(&state, "A".into(), None, Some("boss".into()))
            .await
            .unwrap();
        assert_eq!(order(&state).await, vec![("B".into(), 1, 0)]);
    }

    #[tokio::test]
    async fn registration_waits_for_a_pending_renumber() {
        let (state, store) = setup(&["A", "B", "C"]).await;
        store.fail_positions(true);

        let err = remove_team(&state, "B".into(), Some("pw".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PartialCommit { failed: 1, total: 1 }
        ));

        let blocked = add_team(&state, "D".into(), "pw".into()).await.unwrap_err();
        assert!(matches!(blocked, ServiceError::InvalidState(_)));

        store.fail_positions(false);
        retry_commit(&state).await.unwrap();
        add_team(&state, "D".into(), "pw".into()).await.unwrap();

        assert_eq!(
            order(&state).await,
            vec![("A".into(), 1, 0), ("C".into(), 2, 0), ("D".into(), 3, 0)]
        );
    }

    #[tokio::test]
    async fn removal_does_not_read_the_roster_after_deleting() {
        let (state, store) = setup(&["A", "B", "C"]).await;
        store.fail_lists_after_delete(true);

        remove_team(&state, "B".into(), Some("pw".into()), None)
            .await
            .unwrap();

        store.fail_lists_after_delete(false);
        assert!(!has_pending_commit(&state).await);
        assert_eq!(
            order(&state).await,
            vec![("A".into(), 1, 0), ("C".into(), 2, 0)]
        );
    }

    #[tokio::test]
    async fn failures_after_a_delete_leave_a_retryable_commit() {
        let (state, store) = setup(&["A", "B", "C"]).await;
        store.fail_lists_after_delete(true);
        store.fail_positions(true);

        let err = remove_team(&state, "B".into(), Some("pw".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PartialCommit { .. }));
        assert!(has_pending_commit(&state).await);

        store.fail_lists_after_delete(false);
        store.fail_positions(false);
        retry_commit(&state).await.unwrap();

        assert_eq!(
            order(&state).await,
            vec![("A".into(), 1, 0), ("C".into(), 2, 0)]
        );
    }

    #[tokio::test]
    async fn degraded_mode_rejects_commands() {
        let state = AppState::new();
        assert!(matches!(
            add_team(&state, "A".into(), "pw".into()).await,
            Err(ServiceError::Degraded)
        ));
    }
}
