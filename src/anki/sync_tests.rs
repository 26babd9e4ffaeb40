use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    time::Duration,
};

use wiremock::{
    matchers::{
        body_partial_json,
        method,
    },
    Mock,
    MockServer,
    ResponseTemplate,
};

use super::{
    SyncClient,
    SyncPhase,
};
use crate::{
    config::UserConfig,
    core::WortbotError,
    flashcard::{
        build_notes,
        Directions,
        NotePayload,
        FRONT_FIELD,
    },
    translator::{
        Sense,
        Translation,
    },
};

async fn mount_action(server: &MockServer, action: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "action": action })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": result,
            "error": null,
        })))
        .mount(server)
        .await;
}

async fn mount_action_error(server: &MockServer, action: &str, error: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "action": action })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": null,
            "error": error,
        })))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> SyncClient {
    SyncClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn user(server: &MockServer) -> UserConfig {
    UserConfig {
        sync_server: server.uri(),
        username: "lena".to_string(),
        password: "hunter2".to_string(),
        deck: "German".to_string(),
        note_type: "Basic".to_string(),
        allow_duplicates: false,
        forward_cards: true,
        reverse_cards: true,
    }
}

fn payload(front: &str) -> NotePayload {
    let mut fields = BTreeMap::new();
    fields.insert(FRONT_FIELD.to_string(), front.to_string());
    fields.insert("Back".to_string(), format!("back of {front}"));
    NotePayload {
        deck_name: "German".to_string(),
        note_type_name: "Basic".to_string(),
        fields,
        tags: BTreeSet::from(["wortbot".to_string()]),
    }
}

fn hund_translation() -> Translation {
    Translation {
        request: "Hund".to_string(),
        headword: "Hund".to_string(),
        grammar: None,
        senses: vec![Sense {
            word_class: "noun".to_string(),
            hint: "animal".to_string(),
            translations: vec!["собака".to_string()],
            example_source: "Der Hund bellt.".to_string(),
            example_target: "Собака гавкає.".to_string(),
        }],
    }
}

#[tokio::test]
async fn connect_rejects_bad_credentials_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "action": "login" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": null,
            "error": "invalid credentials",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).connect("lena", "wrong").await.unwrap_err();
    assert!(matches!(err, WortbotError::Authentication(_)));
}

#[tokio::test]
async fn connect_retries_past_a_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;

    let session = client(&server).connect("lena", "hunter2").await.unwrap();
    assert_eq!(session.username, "lena");
    assert!(session.deck_id.is_none());
}

#[tokio::test]
async fn ensure_deck_reuses_existing_deck() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    mount_action(&server, "deckNamesAndIds", serde_json::json!({ "German": 5 })).await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "action": "createDeck" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server);
    let mut session = client.connect("lena", "hunter2").await.unwrap();

    let first = client.ensure_deck(&mut session, "German").await.unwrap();
    let second = client.ensure_deck(&mut session, "German").await.unwrap();
    assert_eq!(first, 5);
    assert_eq!(second, 5);
    assert_eq!(session.deck_id, Some(5));
}

#[tokio::test]
async fn ensure_deck_creates_missing_deck() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    mount_action(&server, "deckNamesAndIds", serde_json::json!({})).await;
    mount_action(&server, "createDeck", serde_json::json!(9)).await;

    let client = client(&server);
    let mut session = client.connect("lena", "hunter2").await.unwrap();
    let deck_id = client.ensure_deck(&mut session, "German").await.unwrap();
    assert_eq!(deck_id, 9);
}

#[tokio::test]
async fn ensure_note_type_rejects_incompatible_fields() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    mount_action(&server, "modelNamesAndIds", serde_json::json!({ "Basic": 3 })).await;
    mount_action(&server, "modelFieldNames", serde_json::json!(["Front", "Extra"])).await;

    let client = client(&server);
    let mut session = client.connect("lena", "hunter2").await.unwrap();
    let err = client
        .ensure_note_type(
            &mut session,
            "Basic",
            &["Front".to_string(), "Back".to_string()],
        )
        .await
        .unwrap_err();

    match err {
        WortbotError::SchemaMismatch { note_type, found, .. } => {
            assert_eq!(note_type, "Basic");
            assert_eq!(found, vec!["Front".to_string(), "Extra".to_string()]);
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn ensure_note_type_creates_missing_type() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    mount_action(&server, "modelNamesAndIds", serde_json::json!({})).await;
    mount_action(&server, "createModel", serde_json::json!(7)).await;

    let client = client(&server);
    let mut session = client.connect("lena", "hunter2").await.unwrap();
    let note_type_id = client
        .ensure_note_type(
            &mut session,
            "Basic",
            &["Front".to_string(), "Back".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(note_type_id, 7);
    assert_eq!(session.note_type_id, Some(7));
}

#[tokio::test]
async fn duplicate_rejection_does_not_abort_the_batch() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "action": "addNote",
            "params": { "note": { "fields": { "Front": "w3" } } },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": null,
            "error": "cannot add note: it is a duplicate",
        })))
        .mount(&server)
        .await;
    mount_action(&server, "addNote", serde_json::json!(1001)).await;

    let client = client(&server);
    let session = client.connect("lena", "hunter2").await.unwrap();
    let notes = vec![payload("w1"), payload("w2"), payload("w3"), payload("w4")];

    let report = client.insert_notes(&session, 5, &notes, false).await.unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(report.duplicates, 1);
}

#[tokio::test]
async fn hard_insert_failure_aborts_with_partial_count() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "action": "addNote",
            "params": { "note": { "fields": { "Front": "w3" } } },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": null,
            "error": "collection database is locked",
        })))
        .mount(&server)
        .await;
    mount_action(&server, "addNote", serde_json::json!(1001)).await;

    let client = client(&server);
    let session = client.connect("lena", "hunter2").await.unwrap();
    let notes = vec![payload("w1"), payload("w2"), payload("w3"), payload("w4")];

    let failure = client.insert_notes(&session, 5, &notes, false).await.unwrap_err();
    assert_eq!(failure.phase, SyncPhase::DeckReady);
    assert_eq!(failure.inserted, 2);
}

#[tokio::test]
async fn insert_and_sync_reaches_synced_state() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    mount_action(&server, "deckNamesAndIds", serde_json::json!({ "German": 5 })).await;
    mount_action(&server, "modelNamesAndIds", serde_json::json!({ "Basic": 3 })).await;
    mount_action(&server, "modelFieldNames", serde_json::json!(["Front", "Back"])).await;
    mount_action(&server, "addNote", serde_json::json!(1001)).await;
    mount_action(&server, "sync", serde_json::json!({ "required": "none", "usn": 42 })).await;

    let server_user = user(&server);
    let notes =
        build_notes(&hund_translation(), "German", "Basic", Directions::both()).unwrap();
    assert_eq!(notes.len(), 2);

    let report = client(&server).insert_and_sync(&server_user, &notes).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.sync_cursor, 42);
}

#[tokio::test]
async fn sync_conflict_is_surfaced_with_inserted_count() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    mount_action(&server, "deckNamesAndIds", serde_json::json!({ "German": 5 })).await;
    mount_action(&server, "modelNamesAndIds", serde_json::json!({ "Basic": 3 })).await;
    mount_action(&server, "modelFieldNames", serde_json::json!(["Front", "Back"])).await;
    mount_action(&server, "addNote", serde_json::json!(1001)).await;
    mount_action_error(&server, "sync", "remote changed, full sync required").await;

    let server_user = user(&server);
    let notes =
        build_notes(&hund_translation(), "German", "Basic", Directions::both()).unwrap();

    let failure = client(&server).insert_and_sync(&server_user, &notes).await.unwrap_err();
    assert_eq!(failure.phase, SyncPhase::NotesInserted);
    assert_eq!(failure.inserted, 2);
    assert!(matches!(failure.source, WortbotError::SyncConflict(_)));
}

#[tokio::test]
async fn note_type_failure_reports_deck_ready_phase() {
    let server = MockServer::start().await;
    mount_action(&server, "login", serde_json::json!("tok-1")).await;
    mount_action(&server, "deckNamesAndIds", serde_json::json!({ "German": 5 })).await;
    mount_action(&server, "modelNamesAndIds", serde_json::json!({ "Basic": 3 })).await;
    mount_action(&server, "modelFieldNames", serde_json::json!(["Front", "Extra"])).await;

    let server_user = user(&server);
    let notes =
        build_notes(&hund_translation(), "German", "Basic", Directions::both()).unwrap();

    let failure = client(&server).insert_and_sync(&server_user, &notes).await.unwrap_err();
    assert_eq!(failure.phase, SyncPhase::DeckReady);
    assert_eq!(failure.inserted, 0);
    assert!(matches!(failure.source, WortbotError::SchemaMismatch { .. }));
}

#[tokio::test]
async fn connect_failure_reports_disconnected_phase() {
    let server = MockServer::start().await;
    mount_action_error(&server, "login", "invalid credentials").await;

    let server_user = user(&server);
    let notes =
        build_notes(&hund_translation(), "German", "Basic", Directions::both()).unwrap();

    let failure = client(&server).insert_and_sync(&server_user, &notes).await.unwrap_err();
    assert_eq!(failure.phase, SyncPhase::Disconnected);
    assert_eq!(failure.inserted, 0);
    assert!(matches!(failure.source, WortbotError::Authentication(_)));
}
