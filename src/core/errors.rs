use thiserror::Error;

#[derive(Error, Debug)]
pub enum WortbotError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("translation provider rate limited")]
    RateLimited,

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("could not authenticate with collection server: {0}")]
    Authentication(String),

    #[error("collection server unreachable: {0}")]
    UnreachableServer(String),

    #[error("note type '{note_type}' exists with incompatible fields (expected {expected:?}, found {found:?})")]
    SchemaMismatch { note_type: String, expected: Vec<String>, found: Vec<String> },

    #[error("collection sync conflict, full resync required: {0}")]
    SyncConflict(String),

    #[error("note rejected as duplicate")]
    DuplicateNote,

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("WortbotError: {0}")]
    Custom(String),
}

impl From<std::io::Error> for WortbotError {
    fn from(error: std::io::Error) -> Self {
        WortbotError::Io(Box::new(error))
    }
}
