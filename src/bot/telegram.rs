use std::time::Duration;

use reqwest::Client;
use serde::{
    Deserialize,
    Serialize,
};

use crate::core::WortbotError;

// Client timeout must sit above the long-poll window.
const HTTP_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<Sender>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: Sender,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    pub fn row(mut self, text: &str, callback_data: &str) -> Self {
        self.inline_keyboard.push(vec![InlineKeyboardButton {
            text: text.to_string(),
            callback_data: callback_data.to_string(),
        }]);
        self
    }
}

/// Bot API transport: long-poll updates in, messages and keyboards out.
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, WortbotError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| WortbotError::Custom(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", base_url.trim_end_matches('/')),
        })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: serde_json::Value,
    ) -> Result<T, WortbotError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response: TelegramResponse<T> = self
            .client
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(|e| WortbotError::Custom(format!("telegram {endpoint} failed: {e}")))?
            .json()
            .await
            .map_err(|e| WortbotError::Custom(format!("telegram {endpoint} decode failed: {e}")))?;

        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(WortbotError::Custom(format!(
                "telegram {endpoint} error: {}",
                response.description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, WortbotError> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", params).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, WortbotError> {
        let mut params = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = reply_markup {
            params["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendMessage", params).await
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<bool, WortbotError> {
        let params = serde_json::json!({ "callback_query_id": callback_id });
        self.call("answerCallbackQuery", params).await
    }
}
