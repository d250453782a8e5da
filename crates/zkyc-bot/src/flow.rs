//! Conversation state machine.
//!
//! ```text
//! idle --face_recognition--> waiting_for_first_face --photo--> waiting_for_second_face --photo--> idle
//! idle --full_kyc--> waiting_for_id_card --photo--> waiting_for_selfie --photo--> idle
//! idle --extract_text--> waiting_for_document --photo--> idle
//! any waiting state --/cancel--> idle
//! ```
//!
//! The first image of a two-step flow lives in a scratch location owned by
//! the user's session; replacing or taking the session releases it.

use crate::messages;
use crate::platform::{ChatId, ChatPlatform, MessageId, PlatformError};
use chrono::Local;
use std::sync::Arc;
use zkyc_core::session::PendingImage;
use zkyc_core::{
    ConversationState, Orchestrator, OrchestratorError, ScratchLocation, Session, SessionStore,
    TextExtraction, TextExtractor, Upload, UserId,
};

/// Telegram photos are always re-encoded as JPEG.
const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// Outer error: the chat transport failed. Inner error: the step failed and
/// the user must be told.
type Step = Result<Result<(), OrchestratorError>, PlatformError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
}

/// Incoming chat event, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command {
        chat: ChatId,
        user: UserId,
        first_name: String,
        command: Command,
    },
    Callback {
        callback_id: String,
        chat: ChatId,
        message: MessageId,
        user: UserId,
        data: String,
    },
    Photo {
        chat: ChatId,
        user: UserId,
        file_id: String,
    },
    /// Any other message (text, stickers, documents).
    Other { chat: ChatId, user: UserId },
}

pub struct Conversation {
    platform: Arc<dyn ChatPlatform>,
    sessions: Arc<dyn SessionStore>,
    orchestrator: Arc<Orchestrator>,
}

impl Conversation {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        sessions: Arc<dyn SessionStore>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            platform,
            sessions,
            orchestrator,
        }
    }

    /// Handle one event. Errors are transport failures only; analyzer
    /// failures are reported to the user and reset the conversation.
    pub async fn handle(&self, event: Event) -> Result<(), PlatformError> {
        match event {
            Event::Command {
                chat,
                user,
                first_name,
                command,
            } => self.on_command(chat, user, &first_name, command).await,
            Event::Callback {
                callback_id,
                chat,
                message,
                user,
                data,
            } => {
                self.platform.answer_callback(&callback_id).await?;
                self.on_callback(chat, message, user, &data).await
            }
            Event::Photo {
                chat,
                user,
                file_id,
            } => self.on_photo(chat, user, &file_id).await,
            Event::Other { chat, user } => {
                if self.sessions.state(user).is_waiting() {
                    self.platform
                        .send_message(chat, messages::SEND_A_PHOTO, None)
                        .await?;
                }
                Ok(())
            }
        }
    }

    async fn on_command(
        &self,
        chat: ChatId,
        user: UserId,
        first_name: &str,
        command: Command,
    ) -> Result<(), PlatformError> {
        tracing::info!(user, ?command, "command received");
        match command {
            Command::Start => {
                let keyboard = messages::menu_keyboard();
                self.platform
                    .send_message(chat, &messages::welcome(first_name), Some(&keyboard))
                    .await
            }
            Command::Help => {
                self.platform
                    .send_message(chat, messages::HELP_COMMAND, None)
                    .await
            }
            Command::Cancel => {
                self.reset(user);
                self.platform
                    .send_message(chat, messages::CANCELLED, None)
                    .await
            }
        }
    }

    async fn on_callback(
        &self,
        chat: ChatId,
        message: MessageId,
        user: UserId,
        data: &str,
    ) -> Result<(), PlatformError> {
        let (state, text) = match data {
            messages::EXTRACT_TEXT => {
                (ConversationState::WaitingForDocument, messages::EXTRACT_MODE)
            }
            messages::FACE_RECOGNITION => {
                (ConversationState::WaitingForFirstFace, messages::FACE_MODE)
            }
            messages::FULL_KYC => (ConversationState::WaitingForIdCard, messages::KYC_MODE),
            messages::HELP => {
                let keyboard = messages::back_keyboard();
                return self
                    .platform
                    .edit_message(chat, message, messages::HELP_MENU, Some(&keyboard))
                    .await;
            }
            messages::BACK_TO_MENU => {
                let keyboard = messages::menu_keyboard();
                return self
                    .platform
                    .edit_message(chat, message, messages::MENU, Some(&keyboard))
                    .await;
            }
            other => {
                tracing::debug!(user, data = other, "unknown callback ignored");
                return Ok(());
            }
        };

        tracing::info!(user, state = state.as_str(), "flow started");
        if let Some(previous) = self.sessions.put(user, Session::waiting(state)) {
            release_session(previous);
        }
        self.platform.edit_message(chat, message, text, None).await
    }

    async fn on_photo(&self, chat: ChatId, user: UserId, file_id: &str) -> Result<(), PlatformError> {
        let state = self.sessions.state(user);
        if !state.is_waiting() {
            return self
                .platform
                .send_message(chat, messages::PHOTO_WITHOUT_FLOW, None)
                .await;
        }

        let bytes = match self.platform.download_file(file_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(user, error = %e, "photo download failed");
                self.reset(user);
                return self
                    .platform
                    .send_message(chat, &failure_message(state, &e.to_string()), None)
                    .await;
            }
        };
        let upload = Upload::new(
            bytes,
            PHOTO_CONTENT_TYPE,
            format!("photo_{user}_{}.jpg", Local::now().timestamp_millis()),
        );
        tracing::debug!(
            user,
            state = state.as_str(),
            bytes = upload.bytes.len(),
            "photo received"
        );

        let outcome = match state {
            ConversationState::WaitingForFirstFace => {
                self.hold_first_image(chat, user, &upload, ConversationState::WaitingForSecondFace)
                    .await
            }
            ConversationState::WaitingForIdCard => {
                self.hold_first_image(chat, user, &upload, ConversationState::WaitingForSelfie)
                    .await
            }
            ConversationState::WaitingForDocument => {
                self.extract_document(chat, user, &upload).await
            }
            ConversationState::WaitingForSecondFace => {
                self.compare_faces(chat, user, &upload).await
            }
            ConversationState::WaitingForSelfie => self.verify_kyc(chat, user, &upload).await,
            ConversationState::Idle => Ok(Ok(())),
        };

        match outcome? {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(user, state = state.as_str(), error = %e, "flow step failed");
                self.reset(user);
                self.platform
                    .send_message(chat, &failure_message(state, &e.to_string()), None)
                    .await
            }
        }
    }

    /// Store the first image of a two-step flow and advance to `next`.
    async fn hold_first_image(
        &self,
        chat: ChatId,
        user: UserId,
        upload: &Upload,
        next: ConversationState,
    ) -> Step {
        let mut scratch = match self.orchestrator.scratch().await {
            Ok(scratch) => scratch,
            Err(e) => return Ok(Err(e)),
        };
        let image = match self.orchestrator.ingest(&mut scratch, "first", upload).await {
            Ok(image) => image,
            Err(e) => return Ok(Err(e)),
        };
        let pending = PendingImage { scratch, image };
        if let Some(previous) = self.sessions.put(user, Session::with_pending(next, pending)) {
            release_session(previous);
        }

        let text = match next {
            ConversationState::WaitingForSelfie => messages::ID_CARD_RECEIVED,
            _ => messages::FIRST_FACE_RECEIVED,
        };
        self.platform.send_message(chat, text, None).await?;
        Ok(Ok(()))
    }

    async fn extract_document(&self, chat: ChatId, user: UserId, upload: &Upload) -> Step {
        self.reset(user);
        self.platform
            .send_message(chat, messages::ANALYZING_DOCUMENT, None)
            .await?;

        let mut scratch = match self.orchestrator.scratch().await {
            Ok(scratch) => scratch,
            Err(e) => return Ok(Err(e)),
        };
        let result = match self.orchestrator.ingest(&mut scratch, "document", upload).await {
            Ok(image) => {
                self.orchestrator
                    .extract_text_ai(&image.path, Some(messages::DOCUMENT_PROMPT))
                    .await
            }
            Err(e) => Err(e),
        };
        release(scratch);

        match result {
            Ok(extraction) => {
                self.platform
                    .send_message(chat, &messages::document_result(&extraction), None)
                    .await?;
                Ok(Ok(()))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    async fn compare_faces(&self, chat: ChatId, user: UserId, upload: &Upload) -> Step {
        let Some(mut pending) = self.take_pending(user) else {
            return Ok(Err(lost_first_image()));
        };
        self.platform
            .send_message(chat, messages::COMPARING_FACES, None)
            .await?;

        let result = match self
            .orchestrator
            .ingest(&mut pending.scratch, "second", upload)
            .await
        {
            Ok(second) => {
                self.orchestrator
                    .compare_faces(&pending.image.path, &second.path)
                    .await
            }
            Err(e) => Err(e),
        };
        release(pending.scratch);

        match result {
            Ok(face) => {
                self.platform
                    .send_message(chat, &messages::face_result(&face), None)
                    .await?;
                Ok(Ok(()))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    async fn verify_kyc(&self, chat: ChatId, user: UserId, upload: &Upload) -> Step {
        let Some(mut pending) = self.take_pending(user) else {
            return Ok(Err(lost_first_image()));
        };
        self.platform
            .send_message(chat, messages::VERIFYING_KYC, None)
            .await?;

        let result = match self
            .orchestrator
            .ingest(&mut pending.scratch, "selfie", upload)
            .await
        {
            Ok(selfie) => {
                self.orchestrator
                    .run_combined_verification(&pending.image, &selfie, TextExtractor::Ai)
                    .await
            }
            Err(e) => Err(e),
        };
        release(pending.scratch);

        match result {
            Ok(verification) => {
                let extracted = match &verification.extraction {
                    TextExtraction::Ai(ai) => ai.text.as_str(),
                    TextExtraction::Ocr(ocr) => ocr.text.as_str(),
                };
                let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
                let report = messages::kyc_report(&verification, &timestamp, extracted);
                self.platform.send_message(chat, &report, None).await?;
                Ok(Ok(()))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    fn take_pending(&self, user: UserId) -> Option<PendingImage> {
        self.sessions.take(user).and_then(|s| s.pending)
    }

    /// Back to idle, releasing anything the session held.
    fn reset(&self, user: UserId) {
        if let Some(session) = self.sessions.take(user) {
            release_session(session);
        }
    }
}

fn failure_message(state: ConversationState, detail: &str) -> String {
    match state {
        ConversationState::WaitingForFirstFace | ConversationState::WaitingForSecondFace => {
            messages::face_failed(detail)
        }
        ConversationState::WaitingForIdCard | ConversationState::WaitingForSelfie => {
            messages::kyc_failed(detail)
        }
        _ => messages::document_failed(detail),
    }
}

fn lost_first_image() -> OrchestratorError {
    OrchestratorError::invalid_input("the first photo is no longer available, please start over")
}

fn release_session(session: Session) {
    if let Some(pending) = session.pending {
        release(pending.scratch);
    }
}

fn release(scratch: ScratchLocation) {
    if let Err(e) = scratch.release() {
        tracing::warn!(error = %e, "scratch cleanup failed");
    }
}
