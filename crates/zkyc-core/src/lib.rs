//! zkyc-core: upload orchestration for KYC image checks.
//!
//! Every request materializes its uploads in a private scratch location,
//! calls the external analyzers (face comparator, OCR engine, vision model)
//! strictly in sequence, and releases the scratch location on every exit
//! path. Analyzers are reached through the traits in [`analyzer`].

pub mod analyzer;
pub mod error;
pub mod orchestrator;
pub mod records;
pub mod scratch;
pub mod session;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use analyzer::{AnalyzerError, FaceComparator, OcrEngine, VisionHealth, VisionModel};
pub use error::OrchestratorError;
pub use orchestrator::{CombinedVerification, Orchestrator, OrchestratorSettings};
pub use records::{RecordStore, VerificationRecord};
pub use scratch::{CleanupError, ScratchLocation};
pub use session::{ConversationState, MemorySessionStore, Session, SessionStore, UserId};
pub use types::{
    AiExtraction, FaceComparison, OcrExtraction, OcrFragment, ScratchFile, TextExtraction,
    TextExtractor, Upload,
};
