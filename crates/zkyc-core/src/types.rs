use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Declared content types accepted for uploaded images.
pub const ACCEPTED_IMAGE_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/bmp",
];

/// Whether a declared content type is one of [`ACCEPTED_IMAGE_TYPES`].
///
/// Matching ignores case and any `;`-separated parameters. The declared
/// type is trusted; no magic-byte sniffing happens here.
pub fn is_accepted_image_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_IMAGE_TYPES.contains(&essence.as_str())
}

/// An uploaded image as received from a caller. Owned by one request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

impl Upload {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            filename: filename.into(),
        }
    }
}

/// An upload materialized inside a scratch location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchFile {
    pub path: PathBuf,
    /// Filename as declared by the caller, kept for reporting.
    pub original_name: String,
}

/// Face comparator output, passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceComparison {
    pub verified: bool,
    pub distance: f64,
    pub threshold: f64,
    pub model: String,
    pub detector_backend: String,
    pub similarity_metric: String,
    #[serde(default)]
    pub facial_areas: serde_json::Value,
}

impl FaceComparison {
    /// `1 - distance`, for display.
    ///
    /// This is not a probability and is not calibrated against the
    /// threshold; the match decision is `verified`.
    pub fn confidence(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Quadrilateral in pixel coordinates, four `[x, y]` corner points.
pub type Quad = [[f64; 2]; 4];

/// One text fragment reported by the OCR engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrFragment {
    pub text: String,
    pub confidence: f64,
    pub bbox: Quad,
}

/// OCR fragments that survived confidence filtering, in analyzer order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OcrExtraction {
    /// Surviving fragment texts joined by single spaces.
    pub text: String,
    pub fragments: Vec<OcrFragment>,
}

impl OcrExtraction {
    pub fn text_blocks(&self) -> usize {
        self.fragments.len()
    }

    pub fn individual_texts(&self) -> Vec<String> {
        self.fragments.iter().map(|f| f.text.clone()).collect()
    }
}

/// Free-text answer from the vision-language model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AiExtraction {
    pub text: String,
    pub model: String,
    pub prompt: String,
}

/// Which analyzer produces the text half of a combined verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextExtractor {
    #[default]
    Ocr,
    Ai,
}

impl FromStr for TextExtractor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ocr" => Ok(Self::Ocr),
            "ai" | "vision" => Ok(Self::Ai),
            other => Err(format!("unknown text extractor {other:?} (expected \"ocr\" or \"ai\")")),
        }
    }
}

/// Output of whichever text extractor ran.
#[derive(Debug, Clone, PartialEq)]
pub enum TextExtraction {
    Ocr(OcrExtraction),
    Ai(AiExtraction),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparison(distance: f64) -> FaceComparison {
        FaceComparison {
            verified: true,
            distance,
            threshold: 0.4,
            model: "VGG-Face".into(),
            detector_backend: "opencv".into(),
            similarity_metric: "cosine".into(),
            facial_areas: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_confidence_is_one_minus_distance() {
        let c = comparison(0.2);
        assert_eq!(c.confidence(), 1.0 - 0.2);
    }

    #[test]
    fn test_confidence_boundaries() {
        assert_eq!(comparison(0.0).confidence(), 1.0);
        assert_eq!(comparison(1.0).confidence(), 0.0);
    }

    #[test]
    fn test_accepted_image_types() {
        for ct in ACCEPTED_IMAGE_TYPES {
            assert!(is_accepted_image_type(ct), "{ct} should be accepted");
        }
        assert!(is_accepted_image_type("IMAGE/PNG"));
        assert!(is_accepted_image_type("image/jpeg; charset=binary"));
    }

    #[test]
    fn test_rejected_image_types() {
        assert!(!is_accepted_image_type("image/webp"));
        assert!(!is_accepted_image_type("image/tiff"));
        assert!(!is_accepted_image_type("application/pdf"));
        assert!(!is_accepted_image_type(""));
    }

    #[test]
    fn test_text_extractor_from_str() {
        assert_eq!("ocr".parse::<TextExtractor>(), Ok(TextExtractor::Ocr));
        assert_eq!(" AI ".parse::<TextExtractor>(), Ok(TextExtractor::Ai));
        assert!("tesseract".parse::<TextExtractor>().is_err());
    }

    #[test]
    fn test_face_comparison_tolerates_missing_facial_areas() {
        let json = r#"{"verified":false,"distance":0.7,"threshold":0.4,
            "model":"VGG-Face","detector_backend":"opencv","similarity_metric":"cosine"}"#;
        let c: FaceComparison = serde_json::from_str(json).unwrap();
        assert!(!c.verified);
        assert!(c.facial_areas.is_null());
    }
}
