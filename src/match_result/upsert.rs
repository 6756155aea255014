use std::sync::Arc;
use strum_macros::Display;
use tracing::{debug, info, instrument, warn};

use super::{
    match_data::{merge, MatchData},
    models::{MatchResultModel, NewMatchResult},
    normalizer::MatchCommand,
    repository::{InsertMatchResult, MatchResultRepository},
};
use crate::shared::AppError;

/// Terminal state of an upsert for one external match id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum UpsertState {
    /// First submission of this match id, a new row was stored
    Inserted,
    /// A row already existed and was merged with the submission
    Merged,
    /// The store reported a conflict but the row could not be found or inserted again
    Unpersisted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub state: UpsertState,
    pub match_result: MatchResultModel,
}

impl UpsertOutcome {
    fn new(state: UpsertState, match_result: MatchResultModel) -> Self {
        Self {
            state,
            match_result,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.state != UpsertState::Unpersisted
    }
}

/// Idempotent insert-or-merge of match results keyed by external match id.
///
/// The store's uniqueness guarantee on `match_id` is the only synchronization
/// relied upon: a conflicting insert is resolved by re-reading and merging.
pub struct MatchUpsertResolver {
    repository: Arc<dyn MatchResultRepository + Send + Sync>,
}

impl MatchUpsertResolver {
    pub fn new(repository: Arc<dyn MatchResultRepository + Send + Sync>) -> Self {
        Self { repository }
    }

    /// Stores `match_data` for the command's match id.
    ///
    /// Lookup failures before the insert are tolerated; every other store
    /// failure is returned to the caller.
    #[instrument(skip(self, command, match_data), fields(match_id = %command.match_id))]
    pub async fn upsert(
        &self,
        command: &MatchCommand,
        match_data: &MatchData,
    ) -> Result<UpsertOutcome, AppError> {
        let existing = match self.repository.get_by_external_id(&command.match_id).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(error = %err, "Match result lookup failed, attempting insert");
                None
            }
        };

        if let Some(existing) = existing {
            let merged = self.merge_into(existing, command, match_data).await?;
            return Ok(UpsertOutcome::new(UpsertState::Merged, merged));
        }

        let new_match = new_match_result(command, match_data);
        match self.repository.add(&new_match).await? {
            InsertMatchResult::Inserted(row) => {
                info!(id = row.id, "Match result inserted");
                Ok(UpsertOutcome::new(UpsertState::Inserted, row))
            }
            InsertMatchResult::AlreadyExists => {
                debug!("Insert raced with another submission, resolving conflict");
                self.resolve_conflict(command, match_data, new_match).await
            }
        }
    }

    /// Re-reads after a conflicting insert. If the row is still missing the
    /// insert is retried once; a second miss returns the local row unpersisted.
    async fn resolve_conflict(
        &self,
        command: &MatchCommand,
        match_data: &MatchData,
        new_match: NewMatchResult,
    ) -> Result<UpsertOutcome, AppError> {
        if let Some(existing) = self.repository.get_by_external_id(&command.match_id).await? {
            let merged = self.merge_into(existing, command, match_data).await?;
            return Ok(UpsertOutcome::new(UpsertState::Merged, merged));
        }

        warn!("Match result conflicted on insert but was not found, retrying insert once");
        match self.repository.add(&new_match).await? {
            InsertMatchResult::Inserted(row) => {
                info!(id = row.id, "Match result inserted on retry");
                Ok(UpsertOutcome::new(UpsertState::Inserted, row))
            }
            InsertMatchResult::AlreadyExists => {
                match self.repository.get_by_external_id(&command.match_id).await? {
                    Some(existing) => {
                        let merged = self.merge_into(existing, command, match_data).await?;
                        Ok(UpsertOutcome::new(UpsertState::Merged, merged))
                    }
                    None => {
                        warn!("Match result still unresolved after retry, returning it unpersisted");
                        Ok(UpsertOutcome::new(
                            UpsertState::Unpersisted,
                            new_match.with_id(0),
                        ))
                    }
                }
            }
        }
    }

    async fn merge_into(
        &self,
        existing: MatchResultModel,
        command: &MatchCommand,
        incoming: &MatchData,
    ) -> Result<MatchResultModel, AppError> {
        let updated = merged_row(existing, command, incoming);
        self.repository.update(&updated).await?;
        info!(id = updated.id, total_players = updated.total_players, "Match result merged");
        Ok(updated)
    }
}

fn new_match_result(command: &MatchCommand, match_data: &MatchData) -> NewMatchResult {
    NewMatchResult {
        match_id: command.match_id.clone(),
        result: command.result,
        scene: command.scene.clone(),
        start_utc: command.start_utc,
        end_utc: command.end_utc,
        total_players: command.total_players,
        user_id: command.user_id,
        match_data_json: match_data.to_json_string(),
    }
}

/// Applies a duplicate submission to a stored row. Only values the client
/// actually sent may move the row's columns; defaults filled in by the
/// normalizer never override stored data.
fn merged_row(
    existing: MatchResultModel,
    command: &MatchCommand,
    incoming: &MatchData,
) -> MatchResultModel {
    let stored = MatchData::from_json_str(&existing.match_data_json);
    let merged = merge(&stored, incoming);

    let mut updated = existing;
    updated.total_players = updated.total_players.max(command.total_players);
    if let Some(start) = incoming.start_utc {
        updated.start_utc = updated.start_utc.min(start);
    }
    if let Some(end) = incoming.end_utc {
        updated.end_utc = updated.end_utc.max(end);
    }
    if incoming.result.is_some() {
        updated.result = command.result;
    }
    if incoming.scene.is_some() {
        updated.scene = command.scene.clone();
    }
    if updated.user_id.is_none() {
        updated.user_id = command.user_id;
    }
    updated.match_data_json = merged.to_json_string();
    updated
}
