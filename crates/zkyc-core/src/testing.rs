//! Fake analyzers and image fixtures shared by tests across the workspace.

use crate::analyzer::{AnalyzerError, FaceComparator, OcrEngine, VisionHealth, VisionModel};
use crate::types::{FaceComparison, OcrFragment, Upload};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn face_result(verified: bool, distance: f64, threshold: f64) -> FaceComparison {
    FaceComparison {
        verified,
        distance,
        threshold,
        model: "VGG-Face".into(),
        detector_backend: "opencv".into(),
        similarity_metric: "cosine".into(),
        facial_areas: serde_json::json!({
            "img1": {"x": 10, "y": 12, "w": 80, "h": 80},
            "img2": {"x": 4, "y": 9, "w": 75, "h": 78},
        }),
    }
}

pub fn fragment(text: &str, confidence: f64) -> OcrFragment {
    OcrFragment {
        text: text.into(),
        confidence,
        bbox: [[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [0.0, 5.0]],
    }
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10])));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    buf.into_inner()
}

pub fn png_upload(filename: &str) -> Upload {
    Upload::new(png_bytes(), "image/png", filename)
}

pub struct FakeFaceComparator {
    outcome: Result<FaceComparison, AnalyzerError>,
    calls: AtomicUsize,
    missing_input: AtomicBool,
}

impl FakeFaceComparator {
    pub fn returning(result: FaceComparison) -> Self {
        Self::with(Ok(result))
    }

    pub fn failing(err: AnalyzerError) -> Self {
        Self::with(Err(err))
    }

    fn with(outcome: Result<FaceComparison, AnalyzerError>) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            missing_input: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether both input files existed on every call.
    pub fn inputs_present(&self) -> bool {
        !self.missing_input.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceComparator for FakeFaceComparator {
    async fn compare(&self, img1: &Path, img2: &Path) -> Result<FaceComparison, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !img1.is_file() || !img2.is_file() {
            self.missing_input.store(true, Ordering::SeqCst);
        }
        self.outcome.clone()
    }
}

pub struct FakeOcrEngine {
    outcome: Result<Vec<OcrFragment>, AnalyzerError>,
    calls: AtomicUsize,
}

impl FakeOcrEngine {
    pub fn returning(fragments: Vec<OcrFragment>) -> Self {
        Self {
            outcome: Ok(fragments),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: AnalyzerError) -> Self {
        Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for FakeOcrEngine {
    async fn read_text(&self, _image: &DynamicImage) -> Result<Vec<OcrFragment>, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

pub struct FakeVisionModel {
    outcome: Result<String, AnalyzerError>,
    health: VisionHealth,
    prompts: Mutex<Vec<String>>,
}

impl FakeVisionModel {
    pub const MODEL: &'static str = "qwen2.5vl:3b";

    pub fn returning(text: &str) -> Self {
        Self {
            outcome: Ok(text.into()),
            health: VisionHealth::healthy(true, vec![Self::MODEL.into()]),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: AnalyzerError) -> Self {
        Self {
            outcome: Err(err),
            health: VisionHealth::unhealthy("connection refused"),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl VisionModel for FakeVisionModel {
    fn model_name(&self) -> &str {
        Self::MODEL
    }

    async fn generate(&self, prompt: &str, image_base64: &str) -> Result<String, AnalyzerError> {
        if image_base64.is_empty() {
            return Err(AnalyzerError::Failed("empty image".into()));
        }
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        self.outcome.clone()
    }

    async fn health(&self) -> VisionHealth {
        self.health.clone()
    }
}
