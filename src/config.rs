use std::{
    collections::HashMap,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::core::WortbotError;

const ENV_CONFIG_PATH: &str = "WORTBOT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub sync_server: String,
    pub username: String,
    pub password: String,
    pub deck: String,
    #[serde(default = "default_note_type")]
    pub note_type: String,
    // Whether the collection server should accept notes whose fields match an
    // existing note. Server-side policy, forwarded per request.
    #[serde(default)]
    pub allow_duplicates: bool,
    #[serde(default = "default_true")]
    pub forward_cards: bool,
    #[serde(default = "default_true")]
    pub reverse_cards: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram_bot_token: String,
    pub openai_api_key: String,
    pub openai_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    pub source_language: String,
    pub target_language: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    pub users: HashMap<i64, UserConfig>,
}

impl Config {
    pub fn user(&self, chat_id: i64) -> Option<&UserConfig> {
        self.users.get(&chat_id)
    }
}

fn default_note_type() -> String {
    "Basic".to_string()
}

fn default_true() -> bool {
    true
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_pending_ttl_secs() -> u64 {
    86400
}

pub fn config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_config(path: &Path) -> Result<Config, WortbotError> {
    let raw = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&raw)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_with_defaults() {
        let raw = r#"{
            "telegram_bot_token": "123:abc",
            "openai_api_key": "sk-test",
            "openai_model": "gpt-4o-mini",
            "source_language": "German",
            "target_language": "Ukrainian",
            "users": {
                "42": {
                    "sync_server": "http://localhost:8765",
                    "username": "lena",
                    "password": "hunter2",
                    "deck": "German"
                }
            }
        }"#;

        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.openai_base_url, "https://api.openai.com");
        assert_eq!(config.pending_ttl_secs, 86400);

        let user = config.user(42).expect("user 42 configured");
        assert_eq!(user.note_type, "Basic");
        assert!(user.forward_cards && user.reverse_cards);
        assert!(!user.allow_duplicates);
        assert!(config.user(7).is_none());
    }

    #[test]
    fn missing_config_file_surfaces_io_error() {
        let err = load_config(Path::new("/no/such/wortbot-config.json")).unwrap_err();
        assert!(matches!(err, WortbotError::Io(_)));
    }
}
