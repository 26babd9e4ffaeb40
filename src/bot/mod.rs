use std::{
    sync::{
        Arc,
        OnceLock,
    },
    time::Duration,
};

use regex::Regex;
use tokio::time::sleep;
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::{
    config::Config,
    core::WortbotError,
    pipeline::Pipeline,
};

pub mod format;
pub mod telegram;

use telegram::{
    CallbackQuery,
    InlineKeyboardMarkup,
    Message,
    TelegramClient,
    Update,
};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;
const MAX_REQUEST_SPACES: usize = 4;
// 64 (Telegram callback-data limit) minus "retry:".
const MAX_REQUEST_BYTES: usize = 58;
const CALLBACK_ADD: &str = "add";
const CALLBACK_RETRY: &str = "retry";

/// Update dispatch around the pipeline: authorization, slash commands,
/// request limits, and mapping outcomes to chat messages. One spawned task
/// per inbound event so no conversation blocks another.
#[derive(Clone)]
pub struct Bot {
    telegram: Arc<TelegramClient>,
    pipeline: Arc<Pipeline>,
    config: Arc<Config>,
}

impl Bot {
    pub fn new(config: Config) -> Result<Self, WortbotError> {
        let telegram = TelegramClient::new(TELEGRAM_API_URL, &config.telegram_bot_token)?;
        let pipeline = Pipeline::new(&config)?;

        Ok(Self {
            telegram: Arc::new(telegram),
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        })
    }

    pub async fn run(self) -> Result<(), WortbotError> {
        info!(users = self.config.users.len(), "starting telegram long-poll loop");
        let mut offset = 0_i64;

        loop {
            let updates = match self.telegram.get_updates(offset, POLL_TIMEOUT_SECS).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(%err, "getUpdates failed, backing off");
                    sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let bot = self.clone();
                tokio::spawn(async move { bot.handle_update(update).await });
            }

            let evicted = self.pipeline.evict_expired();
            if evicted > 0 {
                debug!(evicted, "swept stale pending translations");
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
    }

    async fn handle_message(&self, message: Message) {
        let chat_id = message.chat.id;
        if self.config.user(chat_id).is_none() {
            warn!(chat_id, "message from unauthorized chat, ignoring");
            return;
        }

        let Some(text) = message.text else { return };

        if let Some(command) = text.strip_prefix('/') {
            let reply =
                if command == "start" { "Yeah sure let's go 🫠" } else { "Sorry what? 🫠" };
            self.send(chat_id, reply, None).await;
            return;
        }

        if !is_reasonable_request(&text) {
            self.send(chat_id, format::rejected_request_text(), None).await;
            return;
        }

        self.translate_and_reply(chat_id, message.message_id, &text).await;
    }

    async fn translate_and_reply(&self, chat_id: i64, trigger_id: i64, text: &str) {
        match self.pipeline.on_translation_requested(chat_id, trigger_id, text).await {
            Ok(translation) => {
                let deck = self
                    .config
                    .user(chat_id)
                    .map(|user| user.deck.clone())
                    .unwrap_or_default();
                let markup = InlineKeyboardMarkup::default()
                    .row(
                        &format!("Add cards to Anki deck \"{deck}\""),
                        &format!("{CALLBACK_ADD}:{trigger_id}"),
                    )
                    .row(
                        "Retry translation",
                        &format!("{CALLBACK_RETRY}:{}", translation.request),
                    );

                let md = format::translation_to_md(&translation, &self.config.source_language);
                self.send(chat_id, &md, Some(&markup)).await;
            }
            Err(err) => {
                error!(chat_id, %err, "translation failed");
                self.send(chat_id, &format::provider_error_text(&err), None).await;
            }
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        let Some(message) = callback.message else { return };
        let chat_id = message.chat.id;
        let Some(user) = self.config.user(chat_id) else {
            warn!(chat_id, "callback from unauthorized chat, ignoring");
            return;
        };

        if let Err(err) = self.telegram.answer_callback_query(&callback.id).await {
            warn!(chat_id, %err, "answerCallbackQuery failed");
        }

        let Some((command, arg)) = callback.data.as_deref().and_then(parse_callback_data)
        else {
            warn!(chat_id, data = ?callback.data, "malformed callback data");
            return;
        };

        match command {
            CALLBACK_RETRY => self.translate_and_reply(chat_id, message.message_id, arg).await,
            CALLBACK_ADD => {
                let Ok(trigger_id) = arg.parse::<i64>() else {
                    warn!(chat_id, arg, "callback argument is not a message id");
                    return;
                };

                match self.pipeline.on_confirmation_received(chat_id, trigger_id, user).await {
                    Ok(confirm) => {
                        self.send(
                            chat_id,
                            &format::confirm_success_text(&confirm.headword, &confirm.report),
                            None,
                        )
                        .await;
                    }
                    Err(err) => {
                        // Full detail to the operator log; the user gets one
                        // line per failure class.
                        error!(chat_id, %err, "confirmation failed");
                        self.send(chat_id, &format::confirm_error_text(&err), None).await;
                    }
                }
            }
            _ => warn!(chat_id, command, "unknown callback command"),
        }
    }

    async fn send(&self, chat_id: i64, text: &str, markup: Option<&InlineKeyboardMarkup>) {
        if let Err(err) = self.telegram.send_message(chat_id, text, markup).await {
            error!(chat_id, %err, "sendMessage failed");
        }
    }
}

fn parse_callback_data(data: &str) -> Option<(&str, &str)> {
    let (command, arg) = data.split_once(':')?;
    if command.is_empty() || arg.is_empty() {
        return None;
    }
    Some((command, arg))
}

/// A word or short phrase, small enough to fit back into callback data.
fn is_reasonable_request(text: &str) -> bool {
    static ALLOWED: OnceLock<Regex> = OnceLock::new();
    let allowed = ALLOWED.get_or_init(|| Regex::new(r"^[\p{L}\p{N} '\-]+$").unwrap());

    text.chars().filter(|c| *c == ' ').count() <= MAX_REQUEST_SPACES
        && text.len() <= MAX_REQUEST_BYTES
        && allowed.is_match(text)
}
