//! Chat transport seam. The conversation logic talks to this trait; the
//! Telegram client implements it and tests substitute a recorder.

use async_trait::async_trait;
use thiserror::Error;

pub type ChatId = i64;
pub type MessageId = i64;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Telegram API error: {0}")]
    Api(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0} response carried no result")]
    MissingResult(&'static str),
}

/// Inline button: label shown to the user, data echoed back on tap.
#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: &str, data: &str) -> Self {
        Self {
            label: label.to_string(),
            data: data.to_string(),
        }
    }
}

/// Rows of inline buttons.
pub type Keyboard = Vec<Vec<Button>>;

/// Outgoing side of a chat platform. Message text is HTML.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError>;

    async fn edit_message(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), PlatformError>;

    /// Acknowledge a button tap so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), PlatformError>;

    /// Fetch the bytes of an uploaded file.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, PlatformError>;
}
