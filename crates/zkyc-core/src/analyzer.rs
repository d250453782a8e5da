//! Seams to the external analyzers. Implementations live in `zkyc-analyzers`;
//! tests substitute fakes.

use crate::types::{FaceComparison, OcrFragment};
use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("upstream returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Failed(String),
}

impl AnalyzerError {
    /// Upstream HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Compares the faces in two image files.
#[async_trait]
pub trait FaceComparator: Send + Sync {
    /// Implementations must run with face-detection enforcement disabled:
    /// uncertain localization is not a failure.
    async fn compare(&self, img1: &Path, img2: &Path) -> Result<FaceComparison, AnalyzerError>;
}

/// Reads text fragments from decoded pixels.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Fragments in the engine's own order, unfiltered.
    async fn read_text(&self, image: &DynamicImage) -> Result<Vec<OcrFragment>, AnalyzerError>;
}

/// Prompts a hosted vision-language model with one image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, image_base64: &str) -> Result<String, AnalyzerError>;

    /// Reachability and model-availability snapshot. Never fails; an
    /// unreachable runtime is reported in the snapshot.
    async fn health(&self) -> VisionHealth;
}

/// Snapshot returned by `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VisionHealth {
    pub status: &'static str,
    #[serde(rename = "ollama_available")]
    pub runtime_available: bool,
    #[serde(rename = "qwen_model_available", skip_serializing_if = "Option::is_none")]
    pub model_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VisionHealth {
    pub fn healthy(model_available: bool, available_models: Vec<String>) -> Self {
        Self {
            status: "healthy",
            runtime_available: true,
            model_available: Some(model_available),
            available_models: Some(available_models),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy",
            runtime_available: false,
            model_available: None,
            available_models: None,
            error: Some(error.into()),
        }
    }
}
