//! zkyc-analyzers: HTTP clients for the external analyzers.
//!
//! - [`DeepFaceClient`]: face comparison via the DeepFace REST API
//! - [`EasyOcrClient`]: text detection via an EasyOCR sidecar
//! - [`OllamaClient`]: vision-model prompting via Ollama

pub mod config;
pub mod deepface;
pub mod easyocr;
mod http;
pub mod ollama;

pub use config::AnalyzerConfig;
pub use deepface::DeepFaceClient;
pub use easyocr::EasyOcrClient;
pub use ollama::OllamaClient;

use std::sync::Arc;
use std::time::Duration;
use zkyc_core::{AnalyzerError, FaceComparator, OcrEngine, VisionModel};

/// The three analyzers, ready to hand to an `Orchestrator`.
pub struct Analyzers {
    pub faces: Arc<dyn FaceComparator>,
    pub ocr: Arc<dyn OcrEngine>,
    pub vision: Arc<dyn VisionModel>,
}

impl Analyzers {
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let analyzer_timeout = Duration::from_secs(config.analyzer_timeout_secs);
        let faces = DeepFaceClient::new(
            &config.face_url,
            config.face_model.clone(),
            config.face_detector.clone(),
            analyzer_timeout,
        )?;
        let ocr = EasyOcrClient::new(&config.ocr_url, analyzer_timeout)?;
        let vision = OllamaClient::new(
            &config.ollama_url,
            &config.vision_model,
            Duration::from_secs(config.vision_timeout_secs),
        )?;
        Ok(Self {
            faces: Arc::new(faces),
            ocr: Arc::new(ocr),
            vision: Arc::new(vision),
        })
    }
}
