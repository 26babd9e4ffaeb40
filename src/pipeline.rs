use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use thiserror::Error;
use tracing::info;

use crate::{
    anki::{
        SyncClient,
        SyncFailure,
        SyncReport,
    },
    config::{
        Config,
        UserConfig,
    },
    core::WortbotError,
    flashcard::{
        build_notes,
        Directions,
    },
    pending::PendingStore,
    translator::{
        Translation,
        Translator,
    },
};

const PENDING_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("pending translation expired or unknown")]
    Expired,

    #[error("a sync for this user is already in flight")]
    Busy,

    #[error(transparent)]
    Sync(#[from] SyncFailure),

    #[error(transparent)]
    Other(#[from] WortbotError),
}

#[derive(Debug)]
pub struct ConfirmReport {
    pub headword: String,
    pub report: SyncReport,
}

/// The translation-to-flashcard pipeline, independent of any transport. Two
/// entry points share one pending store; everything else is per-operation.
pub struct Pipeline {
    translator: Translator,
    pending: PendingStore,
    request_timeout: Duration,
    sync_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self, WortbotError> {
        Ok(Self {
            translator: Translator::new(config)?,
            pending: PendingStore::new(
                Duration::from_secs(config.pending_ttl_secs),
                PENDING_CAPACITY,
            ),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            sync_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Inbound text: translate and hold the result pending under
    /// (conversation, message). A failed translation leaves no pending
    /// entry behind.
    pub async fn on_translation_requested(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<Translation, WortbotError> {
        let translation = self.translator.translate(text).await?;
        self.pending.put((chat_id, message_id), translation.clone());
        Ok(translation)
    }

    /// Button confirmation: consume the pending entry, assemble notes and
    /// run one exclusive insert-and-sync for this user. The per-user lock is
    /// checked before the destructive read so a `Busy` rejection leaves the
    /// entry confirmable.
    pub async fn on_confirmation_received(
        &self,
        chat_id: i64,
        message_id: i64,
        user: &UserConfig,
    ) -> Result<ConfirmReport, ConfirmError> {
        let lock = self.user_lock(chat_id);
        let _guard = lock.try_lock_owned().map_err(|_| ConfirmError::Busy)?;

        let translation =
            self.pending.take((chat_id, message_id)).ok_or(ConfirmError::Expired)?;

        let notes =
            build_notes(&translation, &user.deck, &user.note_type, Directions::from(user))?;

        let client = SyncClient::new(&user.sync_server, self.request_timeout)
            .map_err(ConfirmError::Other)?;
        let report = client.insert_and_sync(user, &notes).await?;

        info!(
            chat_id,
            headword = translation.headword,
            inserted = report.inserted,
            "confirmation completed"
        );
        Ok(ConfirmReport { headword: translation.headword, report })
    }

    /// Age-bound sweep, driven from the poll loop.
    pub fn evict_expired(&self) -> usize {
        self.pending.evict_expired()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn user_lock(&self, chat_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.sync_locks.lock().expect("sync lock map poisoned");
        locks.entry(chat_id).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use wiremock::{
        matchers::{
            body_partial_json,
            method,
            path,
        },
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn config(oracle: &MockServer, collection: &MockServer) -> Config {
        let mut users = StdHashMap::new();
        users.insert(
            42,
            UserConfig {
                sync_server: collection.uri(),
                username: "lena".to_string(),
                password: "hunter2".to_string(),
                deck: "German".to_string(),
                note_type: "Basic".to_string(),
                allow_duplicates: false,
                forward_cards: true,
                reverse_cards: true,
            },
        );

        Config {
            telegram_bot_token: "123:abc".to_string(),
            openai_api_key: "sk-test".to_string(),
            openai_model: "gpt-test".to_string(),
            openai_base_url: oracle.uri(),
            source_language: "German".to_string(),
            target_language: "Ukrainian".to_string(),
            request_timeout_secs: 5,
            pending_ttl_secs: 300,
            users,
        }
    }

    async fn mount_oracle(server: &MockServer, content: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": content.to_string() } }
                ]
            })))
            .mount(server)
            .await;
    }

    async fn mount_collection_action(
        server: &MockServer,
        action: &str,
        result: serde_json::Value,
    ) {
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "action": action })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": result,
                "error": null,
            })))
            .mount(server)
            .await;
    }

    async fn mount_happy_collection(server: &MockServer) {
        mount_collection_action(server, "login", serde_json::json!("tok-1")).await;
        mount_collection_action(server, "deckNamesAndIds", serde_json::json!({ "German": 5 }))
            .await;
        mount_collection_action(server, "modelNamesAndIds", serde_json::json!({ "Basic": 3 }))
            .await;
        mount_collection_action(server, "modelFieldNames", serde_json::json!(["Front", "Back"]))
            .await;
        mount_collection_action(server, "addNote", serde_json::json!(1001)).await;
        mount_collection_action(
            server,
            "sync",
            serde_json::json!({ "required": "none", "usn": 7 }),
        )
        .await;
    }

    fn hund_doc() -> serde_json::Value {
        serde_json::json!({
            "headword": "Hund",
            "grammar": { "kind": "noun", "article": "der", "plural": "Hunde" },
            "senses": [{
                "word_class": "noun",
                "hint": "animal",
                "translations": ["собака"],
                "example_source": "Der Hund bellt.",
                "example_target": "Собака гавкає."
            }]
        })
    }

    #[tokio::test]
    async fn word_to_synced_cards_round_trip() {
        let oracle = MockServer::start().await;
        let collection = MockServer::start().await;
        mount_oracle(&oracle, hund_doc()).await;
        mount_happy_collection(&collection).await;

        let config = config(&oracle, &collection);
        let pipeline = Pipeline::new(&config).unwrap();
        let user = config.user(42).unwrap();

        let translation =
            pipeline.on_translation_requested(42, 10, "Hund").await.unwrap();
        assert_eq!(translation.headword, "Hund");
        assert_eq!(pipeline.pending_len(), 1);

        let confirm = pipeline.on_confirmation_received(42, 10, user).await.unwrap();
        assert_eq!(confirm.headword, "Hund");
        // One sense, forward + reverse.
        assert_eq!(confirm.report.inserted, 2);
        assert_eq!(confirm.report.sync_cursor, 7);
        assert_eq!(pipeline.pending_len(), 0);
    }

    #[tokio::test]
    async fn second_confirmation_finds_nothing() {
        let oracle = MockServer::start().await;
        let collection = MockServer::start().await;
        mount_oracle(&oracle, hund_doc()).await;
        mount_happy_collection(&collection).await;

        let config = config(&oracle, &collection);
        let pipeline = Pipeline::new(&config).unwrap();
        let user = config.user(42).unwrap();

        pipeline.on_translation_requested(42, 10, "Hund").await.unwrap();
        pipeline.on_confirmation_received(42, 10, user).await.unwrap();

        let err = pipeline.on_confirmation_received(42, 10, user).await.unwrap_err();
        assert!(matches!(err, ConfirmError::Expired));
    }

    #[tokio::test]
    async fn malformed_oracle_response_leaves_no_pending_entry() {
        let oracle = MockServer::start().await;
        let collection = MockServer::start().await;
        mount_oracle(
            &oracle,
            serde_json::json!({ "headword": "Hund", "grammar": null, "senses": [] }),
        )
        .await;

        let config = config(&oracle, &collection);
        let pipeline = Pipeline::new(&config).unwrap();

        let err = pipeline.on_translation_requested(42, 10, "Hund").await.unwrap_err();
        assert!(matches!(err, WortbotError::MalformedResponse(_)));
        assert_eq!(pipeline.pending_len(), 0);
    }

    #[tokio::test]
    async fn concurrent_confirmation_for_same_user_is_rejected_busy() {
        let oracle = MockServer::start().await;
        let collection = MockServer::start().await;
        mount_oracle(&oracle, hund_doc()).await;
        mount_happy_collection(&collection).await;

        let config = config(&oracle, &collection);
        let pipeline = Pipeline::new(&config).unwrap();
        let user = config.user(42).unwrap();

        pipeline.on_translation_requested(42, 10, "Hund").await.unwrap();

        let lock = pipeline.user_lock(42);
        let guard = lock.try_lock_owned().unwrap();

        let err = pipeline.on_confirmation_received(42, 10, user).await.unwrap_err();
        assert!(matches!(err, ConfirmError::Busy));

        // Busy left the entry pending; releasing the lock makes it
        // confirmable again.
        drop(guard);
        let confirm = pipeline.on_confirmation_received(42, 10, user).await.unwrap();
        assert_eq!(confirm.report.inserted, 2);
    }

    #[tokio::test]
    async fn blank_request_makes_no_oracle_call() {
        let oracle = MockServer::start().await;
        let collection = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&oracle)
            .await;

        let config = config(&oracle, &collection);
        let pipeline = Pipeline::new(&config).unwrap();

        let err = pipeline.on_translation_requested(42, 10, "   ").await.unwrap_err();
        assert!(matches!(err, WortbotError::InvalidInput(_)));
    }
}
