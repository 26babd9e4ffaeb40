use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{
    info,
    warn,
};

use crate::{
    config::UserConfig,
    core::{
        backoff::{
            backoff,
            MAX_ATTEMPTS,
        },
        WortbotError,
    },
    flashcard::{
        note_type_fields,
        NotePayload,
    },
};

pub mod api;

#[cfg(test)]
mod sync_tests;

use api::ApiClient;

/// States of one insert-and-sync run, in order. A failure is reported with
/// the state it happened in, so "nothing was added" and "cards were added
/// but sync failed" stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Disconnected,
    Authenticated,
    DeckReady,
    NotesInserted,
    Synced,
}

impl SyncPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SyncPhase::Disconnected => "disconnected",
            SyncPhase::Authenticated => "authenticated",
            SyncPhase::DeckReady => "deck-ready",
            SyncPhase::NotesInserted => "notes-inserted",
            SyncPhase::Synced => "synced",
        }
    }
}

/// One authenticated conversation with the collection server. Owned by a
/// single insert-and-sync run, never shared between concurrent operations.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    pub username: String,
    pub deck_id: Option<u64>,
    pub note_type_id: Option<u64>,
    pub sync_cursor: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub sync_cursor: i64,
}

#[derive(Debug, Error)]
#[error("sync failed while {}: {source} ({inserted} notes already inserted)", .phase.name())]
pub struct SyncFailure {
    pub phase: SyncPhase,
    /// Notes created before the failure. Needed for the user-facing
    /// partial-success message; retrying after a partial insert would
    /// duplicate these.
    pub inserted: usize,
    pub duplicates: usize,
    #[source]
    pub source: WortbotError,
}

impl SyncFailure {
    fn at(phase: SyncPhase, source: WortbotError) -> Self {
        Self { phase, inserted: 0, duplicates: 0, source }
    }
}

pub struct SyncClient {
    api: ApiClient,
}

impl SyncClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, WortbotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WortbotError::Custom(format!("HTTP client build failed: {e}")))?;
        Ok(Self { api: ApiClient::new(client, server_url) })
    }

    /// Authenticate and open a session. Unreachable-server failures are
    /// retried with backoff; bad credentials are not.
    pub async fn connect(&self, username: &str, password: &str) -> Result<Session, WortbotError> {
        let mut last_err = WortbotError::UnreachableServer("no attempt made".to_string());

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                sleep(backoff(attempt - 1)).await;
            }

            match self.api.login(username, password).await {
                Ok(token) => {
                    info!(username, "authenticated with collection server");
                    return Ok(Session {
                        token,
                        username: username.to_string(),
                        deck_id: None,
                        note_type_id: None,
                        sync_cursor: None,
                    });
                }
                Err(err @ WortbotError::UnreachableServer(_)) => {
                    warn!(username, attempt, %err, "collection server unreachable");
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err)
    }

    /// Look the deck up by name, creating it when absent. Two calls with the
    /// same name yield the same id.
    pub async fn ensure_deck(
        &self,
        session: &mut Session,
        deck_name: &str,
    ) -> Result<u64, WortbotError> {
        let decks = self.api.deck_names_and_ids(&session.token).await?;
        let deck_id = match decks.get(deck_name) {
            Some(id) => *id,
            None => {
                info!(deck_name, "deck absent, creating");
                self.api.create_deck(&session.token, deck_name).await?
            }
        };

        session.deck_id = Some(deck_id);
        Ok(deck_id)
    }

    /// Verify a note type with exactly the expected fields, creating it when
    /// absent. A same-named type with different fields is an error, not a
    /// silent coercion.
    pub async fn ensure_note_type(
        &self,
        session: &mut Session,
        note_type_name: &str,
        field_names: &[String],
    ) -> Result<u64, WortbotError> {
        let models = self.api.model_names_and_ids(&session.token).await?;
        let note_type_id = match models.get(note_type_name) {
            Some(id) => {
                let found = self.api.model_field_names(&session.token, note_type_name).await?;
                if found != field_names {
                    return Err(WortbotError::SchemaMismatch {
                        note_type: note_type_name.to_string(),
                        expected: field_names.to_vec(),
                        found,
                    });
                }
                *id
            }
            None => {
                info!(note_type_name, "note type absent, creating");
                self.api.create_model(&session.token, note_type_name, field_names).await?
            }
        };

        session.note_type_id = Some(note_type_id);
        Ok(note_type_id)
    }

    /// Insert each payload. A per-item duplicate rejection is collected and
    /// the batch continues; any other failure aborts with the count of notes
    /// created so far.
    pub async fn insert_notes(
        &self,
        session: &Session,
        deck_id: u64,
        notes: &[NotePayload],
        allow_duplicates: bool,
    ) -> Result<SyncReport, SyncFailure> {
        let mut inserted = 0;
        let mut duplicates = 0;

        for note in notes {
            match self.api.add_note(&session.token, deck_id, note, allow_duplicates).await {
                Ok(_) => inserted += 1,
                Err(WortbotError::DuplicateNote) => {
                    warn!(deck_id, "note rejected as duplicate, continuing batch");
                    duplicates += 1;
                }
                Err(err) => {
                    return Err(SyncFailure {
                        phase: SyncPhase::DeckReady,
                        inserted,
                        duplicates,
                        source: err,
                    });
                }
            }
        }

        Ok(SyncReport { inserted, duplicates, sync_cursor: 0 })
    }

    pub async fn sync(&self, session: &mut Session) -> Result<api::SyncResult, WortbotError> {
        let result = self.api.sync(&session.token).await?;
        session.sync_cursor = Some(result.usn);
        Ok(result)
    }

    /// Drive the full state sequence for one confirmation. Any step's error
    /// ends the run as failed, carrying the failing state and how many notes
    /// had already been created.
    pub async fn insert_and_sync(
        &self,
        user: &UserConfig,
        notes: &[NotePayload],
    ) -> Result<SyncReport, SyncFailure> {
        let mut session = self
            .connect(&user.username, &user.password)
            .await
            .map_err(|e| SyncFailure::at(SyncPhase::Disconnected, e))?;

        let deck_id = self
            .ensure_deck(&mut session, &user.deck)
            .await
            .map_err(|e| SyncFailure::at(SyncPhase::Authenticated, e))?;

        self.ensure_note_type(&mut session, &user.note_type, &note_type_fields())
            .await
            .map_err(|e| SyncFailure::at(SyncPhase::DeckReady, e))?;

        let mut report =
            self.insert_notes(&session, deck_id, notes, user.allow_duplicates).await?;

        let sync_result = self.sync(&mut session).await.map_err(|e| SyncFailure {
            phase: SyncPhase::NotesInserted,
            inserted: report.inserted,
            duplicates: report.duplicates,
            source: e,
        })?;

        report.sync_cursor = sync_result.usn;
        info!(
            username = user.username,
            inserted = report.inserted,
            duplicates = report.duplicates,
            usn = sync_result.usn,
            "collection synced"
        );
        Ok(report)
    }
}
