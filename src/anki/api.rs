use std::collections::HashMap;

use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    core::WortbotError,
    flashcard::NotePayload,
};

pub const PROTOCOL_VERSION: u32 = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// "none" when the server had nothing further to reconcile.
    pub required: String,
    /// Server-side update sequence number after the sync.
    pub usn: i64,
}

/// Low-level wire calls against the collection server: one action-POST per
/// operation, `{"result", "error"}` envelope back. Classification of error
/// strings into the crate taxonomy happens here, next to the protocol.
pub struct ApiClient {
    client: Client,
    server_url: String,
}

impl ApiClient {
    pub fn new(client: Client, server_url: &str) -> Self {
        Self { client, server_url: server_url.trim_end_matches('/').to_string() }
    }

    async fn make_request<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        session: Option<&str>,
        params: Option<serde_json::Value>,
    ) -> Result<ApiResponse<T>, WortbotError> {
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), serde_json::Value::String(action.to_string()));
        body.insert("version".to_string(), serde_json::Value::Number(PROTOCOL_VERSION.into()));

        if let Some(session) = session {
            body.insert("session".to_string(), serde_json::Value::String(session.to_string()));
        }

        if let Some(params) = params {
            body.insert("params".to_string(), params);
        }

        let response = self
            .client
            .post(&self.server_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WortbotError::UnreachableServer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WortbotError::UnreachableServer(format!(
                "HTTP {} from {}",
                response.status(),
                self.server_url
            )));
        }

        response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| WortbotError::UnreachableServer(format!("invalid envelope: {e}")))
    }

    fn expect_result<T>(response: ApiResponse<T>, action: &str) -> Result<T, WortbotError> {
        match (response.result, response.error) {
            (_, Some(error)) => {
                Err(WortbotError::Custom(format!("server error on {action}: {error}")))
            }
            (Some(result), None) => Ok(result),
            (None, None) => {
                Err(WortbotError::Custom(format!("empty result on {action}")))
            }
        }
    }

    /// Exchange credentials for a session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, WortbotError> {
        let params = serde_json::json!({ "username": username, "password": password });
        let response: ApiResponse<String> = self.make_request("login", None, Some(params)).await?;

        match (response.result, response.error) {
            (_, Some(error)) => Err(WortbotError::Authentication(error)),
            (Some(token), None) => Ok(token),
            (None, None) => {
                Err(WortbotError::Authentication("server returned no session token".to_string()))
            }
        }
    }

    pub async fn deck_names_and_ids(
        &self,
        session: &str,
    ) -> Result<HashMap<String, u64>, WortbotError> {
        let response = self.make_request("deckNamesAndIds", Some(session), None).await?;
        Self::expect_result(response, "deckNamesAndIds")
    }

    pub async fn create_deck(&self, session: &str, deck: &str) -> Result<u64, WortbotError> {
        let params = serde_json::json!({ "deck": deck });
        let response = self.make_request("createDeck", Some(session), Some(params)).await?;
        Self::expect_result(response, "createDeck")
    }

    pub async fn model_names_and_ids(
        &self,
        session: &str,
    ) -> Result<HashMap<String, u64>, WortbotError> {
        let response = self.make_request("modelNamesAndIds", Some(session), None).await?;
        Self::expect_result(response, "modelNamesAndIds")
    }

    pub async fn model_field_names(
        &self,
        session: &str,
        model_name: &str,
    ) -> Result<Vec<String>, WortbotError> {
        let params = serde_json::json!({ "modelName": model_name });
        let response = self.make_request("modelFieldNames", Some(session), Some(params)).await?;
        Self::expect_result(response, "modelFieldNames")
    }

    pub async fn create_model(
        &self,
        session: &str,
        model_name: &str,
        in_order_fields: &[String],
    ) -> Result<u64, WortbotError> {
        let params = serde_json::json!({
            "modelName": model_name,
            "inOrderFields": in_order_fields,
        });
        let response = self.make_request("createModel", Some(session), Some(params)).await?;
        Self::expect_result(response, "createModel")
    }

    /// Insert one note. A server-side uniqueness rejection comes back as
    /// `DuplicateNote` so the caller can keep going with the rest of the
    /// batch.
    pub async fn add_note(
        &self,
        session: &str,
        deck_id: u64,
        note: &NotePayload,
        allow_duplicate: bool,
    ) -> Result<u64, WortbotError> {
        let params = serde_json::json!({
            "note": {
                "deckName": note.deck_name,
                "deckId": deck_id,
                "modelName": note.note_type_name,
                "fields": note.fields,
                "tags": note.tags,
                "options": { "allowDuplicate": allow_duplicate },
            }
        });
        let response: ApiResponse<u64> =
            self.make_request("addNote", Some(session), Some(params)).await?;

        match (response.result, response.error) {
            (_, Some(error)) if error.to_lowercase().contains("duplicate") => {
                Err(WortbotError::DuplicateNote)
            }
            (_, Some(error)) => {
                Err(WortbotError::Custom(format!("server error on addNote: {error}")))
            }
            (Some(note_id), None) => Ok(note_id),
            (None, None) => Err(WortbotError::Custom("empty result on addNote".to_string())),
        }
    }

    /// Trigger the server's reconciliation step. A state that needs a full
    /// resync is surfaced, never auto-resolved.
    pub async fn sync(&self, session: &str) -> Result<SyncResult, WortbotError> {
        let response: ApiResponse<SyncResult> =
            self.make_request("sync", Some(session), None).await?;

        match (response.result, response.error) {
            (_, Some(error)) if is_conflict(&error) => Err(WortbotError::SyncConflict(error)),
            (_, Some(error)) => {
                Err(WortbotError::Custom(format!("server error on sync: {error}")))
            }
            (Some(result), None) => Ok(result),
            (None, None) => Err(WortbotError::Custom("empty result on sync".to_string())),
        }
    }
}

fn is_conflict(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("full sync") || lower.contains("conflict")
}
