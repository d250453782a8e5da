//! Telegram Bot API client: long polling plus the handful of methods the
//! conversation needs.

use crate::flow::{Command, Event};
use crate::platform::{ChatId, ChatPlatform, Keyboard, MessageId, PlatformError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct TelegramSendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<TelegramReplyMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct TelegramEditMessage<'a> {
    chat_id: ChatId,
    message_id: MessageId,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<TelegramReplyMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct TelegramReplyMarkup<'a> {
    inline_keyboard: Vec<Vec<TelegramInlineButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct TelegramInlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

impl<'a> TelegramReplyMarkup<'a> {
    fn from_keyboard(keyboard: &'a Keyboard) -> Self {
        Self {
            inline_keyboard: keyboard
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| TelegramInlineButton {
                            text: &b.label,
                            callback_data: &b.data,
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TelegramAnswerCallback<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TelegramGetFile<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TelegramGetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self, PlatformError> {
        // The HTTP timeout must outlast a long poll.
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            poll_timeout,
        })
    }

    async fn send_telegram_request<T: Serialize, R: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: &T,
    ) -> Result<R, PlatformError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await?
            .json::<TelegramResponse<R>>()
            .await?;

        if !response.ok {
            let error_msg = response
                .description
                .unwrap_or_else(|| "Unknown Telegram API error".to_string());
            tracing::error!(method, error = %error_msg, "Telegram API error");
            return Err(PlatformError::Api(error_msg));
        }
        response.result.ok_or(PlatformError::MissingResult(method))
    }

    /// Long-poll for updates with `update_id >= offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, PlatformError> {
        let payload = TelegramGetUpdates {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: ["message", "callback_query"],
        };
        self.send_telegram_request("getUpdates", &payload).await
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        let payload = TelegramSendMessage {
            chat_id: chat,
            text,
            parse_mode: "HTML",
            reply_markup: keyboard.map(TelegramReplyMarkup::from_keyboard),
        };
        self.send_telegram_request::<_, serde_json::Value>("sendMessage", &payload)
            .await?;
        tracing::debug!(chat, "Telegram message sent");
        Ok(())
    }

    async fn edit_message(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError> {
        let payload = TelegramEditMessage {
            chat_id: chat,
            message_id: message,
            text,
            parse_mode: "HTML",
            reply_markup: keyboard.map(TelegramReplyMarkup::from_keyboard),
        };
        self.send_telegram_request::<_, serde_json::Value>("editMessageText", &payload)
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), PlatformError> {
        let payload = TelegramAnswerCallback {
            callback_query_id: callback_id,
        };
        self.send_telegram_request::<_, bool>("answerCallbackQuery", &payload)
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, PlatformError> {
        let file: TelegramFile = self
            .send_telegram_request("getFile", &TelegramGetFile { file_id })
            .await?;
        let path = file.file_path.ok_or(PlatformError::MissingResult("getFile"))?;
        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, path);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tracing::debug!(file_id, bytes = bytes.len(), "Telegram file downloaded");
        Ok(bytes.to_vec())
    }
}

impl Update {
    /// Translate into a conversation event. Updates the bot does not act on
    /// (edited messages, channel posts, senderless messages) yield `None`.
    pub fn into_event(self) -> Option<Event> {
        if let Some(query) = self.callback_query {
            let message = query.message?;
            return Some(Event::Callback {
                callback_id: query.id,
                chat: message.chat.id,
                message: message.message_id,
                user: query.from.id,
                data: query.data.unwrap_or_default(),
            });
        }

        let message = self.message?;
        let from = message.from?;
        let chat = message.chat.id;

        let largest = message.photo.and_then(|sizes| {
            sizes
                .into_iter()
                .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
        });
        if let Some(photo) = largest {
            return Some(Event::Photo {
                chat,
                user: from.id,
                file_id: photo.file_id,
            });
        }

        match message.text.as_deref().and_then(parse_command) {
            Some(command) => Some(Event::Command {
                chat,
                user: from.id,
                first_name: from.first_name,
                command,
            }),
            None => Some(Event::Other { chat, user: from.id }),
        }
    }
}

/// `/start`, `/start@SomeBot` and `/start payload` all parse as `Start`.
fn parse_command(text: &str) -> Option<Command> {
    let word = text.split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or_default();
    match name.to_ascii_lowercase().as_str() {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "cancel" => Some(Command::Cancel),
        _ => None,
    }
}
