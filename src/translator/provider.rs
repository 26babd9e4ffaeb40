use std::time::Duration;

use reqwest::{
    Client,
    StatusCode,
};
use serde::Deserialize;
use tokio::time::sleep;

use crate::core::{
    backoff::{
        backoff,
        MAX_ATTEMPTS,
    },
    WortbotError,
};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Thin chat-completions transport. Knows nothing about translations, only
/// about getting one message content string back or classifying the failure.
pub struct Provider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl Provider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, WortbotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WortbotError::Custom(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// One completion round trip with bounded retries. Retries cover
    /// transport failures, throttling and server errors; a well-formed HTTP
    /// response with a broken body is returned to the caller as
    /// `MalformedResponse` without another attempt.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, WortbotError> {
        let url = format!("{}{}", self.base_url, COMPLETIONS_PATH);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.3,
            "response_format": { "type": "json_object" }
        });

        let mut last_err = WortbotError::ProviderUnavailable("no attempt made".to_string());

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                sleep(backoff(attempt - 1)).await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_err = WortbotError::ProviderUnavailable(e.to_string());
                    continue;
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_err = WortbotError::ProviderUnavailable(e.to_string());
                    continue;
                }
            };

            if status == StatusCode::TOO_MANY_REQUESTS {
                last_err = WortbotError::RateLimited;
                continue;
            }

            if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
                last_err =
                    WortbotError::ProviderUnavailable(extract_error_message(status, &text));
                continue;
            }

            if !status.is_success() {
                // Client errors (bad key, bad request) won't improve on retry.
                return Err(WortbotError::ProviderUnavailable(extract_error_message(
                    status, &text,
                )));
            }

            let parsed: ChatCompletionResponse = serde_json::from_str(&text)
                .map_err(|e| WortbotError::MalformedResponse(format!("completion body: {e}")))?;

            return parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| {
                    WortbotError::MalformedResponse("completion has no choices".to_string())
                });
        }

        Err(last_err)
    }
}

fn extract_error_message(status: StatusCode, body_text: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body_text) {
        if let Some(msg) =
            v.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str())
        {
            return format!("HTTP {}: {}", status.as_u16(), msg);
        }
    }

    let trimmed = body_text.trim();
    let snippet = if trimmed.chars().count() > 200 {
        let cut: String = trimmed.chars().take(200).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    };
    format!("HTTP {}: {}", status.as_u16(), snippet)
}
