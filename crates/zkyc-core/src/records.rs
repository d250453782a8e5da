//! Verification Records: write-once JSON files in the uploads directory.
//!
//! Filenames carry a second-resolution timestamp. Two records of the same
//! kind produced within one second map to the same file and the later
//! write replaces the earlier one; callers needing uniqueness must
//! serialize requests.

use crate::types::{FaceComparison, TextExtraction};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Format of record timestamps and verification ids.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Verification id for a given instant.
pub fn verification_id(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationRecord {
    pub timestamp: String,
    pub id_card_filename: String,
    pub selfie_filename: String,
    #[serde(flatten)]
    pub extraction: RecordedExtraction,
    pub face_verification: RecordedFace,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RecordedExtraction {
    #[serde(rename = "ocr_results")]
    Ocr {
        extracted_text: String,
        text_blocks: usize,
        individual_texts: Vec<String>,
    },
    #[serde(rename = "ai_extraction")]
    Ai {
        extracted_info: String,
        model: String,
        method: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedFace {
    pub verified: bool,
    pub distance: f64,
    pub threshold: f64,
    pub model: String,
}

impl From<&FaceComparison> for RecordedFace {
    fn from(face: &FaceComparison) -> Self {
        Self {
            verified: face.verified,
            distance: face.distance,
            threshold: face.threshold,
            model: face.model.clone(),
        }
    }
}

impl From<&TextExtraction> for RecordedExtraction {
    fn from(extraction: &TextExtraction) -> Self {
        match extraction {
            TextExtraction::Ocr(ocr) => Self::Ocr {
                extracted_text: ocr.text.clone(),
                text_blocks: ocr.text_blocks(),
                individual_texts: ocr.individual_texts(),
            },
            TextExtraction::Ai(ai) => Self::Ai {
                extracted_info: ai.text.clone(),
                model: ai.model.clone(),
                method: AI_METHOD.to_string(),
            },
        }
    }
}

/// Human-readable extraction method recorded for vision-model extractions.
pub const AI_METHOD: &str = "AI-powered vision";

impl VerificationRecord {
    /// `verification_<ts>.json` or `ai_verification_<ts>.json`.
    pub fn file_name(&self) -> String {
        let prefix = match self.extraction {
            RecordedExtraction::Ocr { .. } => "verification",
            RecordedExtraction::Ai { .. } => "ai_verification",
        };
        format!("{prefix}_{}.json", self.timestamp)
    }
}

/// Directory of persisted records. Records are never updated or deleted here.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `record` as pretty JSON and return its filename.
    pub async fn persist(&self, record: &VerificationRecord) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = record.file_name();
        let json = serde_json::to_string_pretty(record).map_err(io::Error::other)?;
        tokio::fs::write(self.dir.join(&file_name), json).await?;
        tracing::info!(file = %file_name, "verification record written");
        Ok(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ocr_record(ts: &str, text: &str) -> VerificationRecord {
        VerificationRecord {
            timestamp: ts.into(),
            id_card_filename: "id.jpg".into(),
            selfie_filename: "me.jpg".into(),
            extraction: RecordedExtraction::Ocr {
                extracted_text: text.into(),
                text_blocks: 1,
                individual_texts: vec![text.into()],
            },
            face_verification: RecordedFace {
                verified: true,
                distance: 0.2,
                threshold: 0.4,
                model: "VGG-Face".into(),
            },
        }
    }

    #[test]
    fn test_verification_id_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(verification_id(&at), "20240309_070501");
    }

    #[test]
    fn test_file_name_prefixes() {
        let mut record = ocr_record("20240309_070501", "A");
        assert_eq!(record.file_name(), "verification_20240309_070501.json");
        record.extraction = RecordedExtraction::Ai {
            extracted_info: "A".into(),
            model: "qwen2.5vl:3b".into(),
            method: AI_METHOD.into(),
        };
        assert_eq!(record.file_name(), "ai_verification_20240309_070501.json");
    }

    #[test]
    fn test_record_json_layout() {
        let json = serde_json::to_value(ocr_record("20240309_070501", "JOHN DOE")).unwrap();
        assert_eq!(json["timestamp"], "20240309_070501");
        assert_eq!(json["ocr_results"]["extracted_text"], "JOHN DOE");
        assert_eq!(json["ocr_results"]["text_blocks"], 1);
        assert_eq!(json["face_verification"]["verified"], true);
        assert!(json.get("extraction").is_none());
    }

    #[tokio::test]
    async fn test_persist_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("uploads"));
        let record = ocr_record("20240309_070501", "ÉLODIE");
        let name = store.persist(&record).await.unwrap();

        let raw = std::fs::read_to_string(store.dir().join(&name)).unwrap();
        assert!(raw.contains('\n'));
        assert!(raw.contains("ÉLODIE"));
        let back: VerificationRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn test_same_second_records_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let first = store.persist(&ocr_record("20240309_070501", "first")).await.unwrap();
        let second = store.persist(&ocr_record("20240309_070501", "second")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        let raw = std::fs::read_to_string(dir.path().join(&second)).unwrap();
        let kept: VerificationRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(kept, ocr_record("20240309_070501", "second"));
    }
}
