//! Upload orchestration: materialize uploads in a scratch location, run the
//! analyzers one after another, assemble the result, release the scratch
//! location on every exit path.

use crate::analyzer::{AnalyzerError, FaceComparator, OcrEngine, VisionHealth, VisionModel};
use crate::error::OrchestratorError;
use crate::records::{verification_id, RecordStore, VerificationRecord};
use crate::scratch::ScratchLocation;
use crate::types::{
    is_accepted_image_type, AiExtraction, FaceComparison, OcrExtraction, OcrFragment,
    ScratchFile, TextExtraction, TextExtractor, Upload,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_OCR_MIN_CONFIDENCE: f64 = 0.5;

/// Longest client basename kept in a scratch filename. Well under the
/// 255-byte name limit of common filesystems once the label is prefixed.
pub const MAX_SCRATCH_BASENAME: usize = 128;

/// Longest extension (dot included) preserved when a basename is shortened.
const MAX_KEPT_EXTENSION: usize = 16;

pub const DEFAULT_EXTRACT_PROMPT: &str =
    "Extract all visible text from this image. Format the response as clear, structured text.";

pub const ID_EXTRACTION_PROMPT: &str = "Extract key information from this ID document:
- Full name
- ID number
- Date of birth
- Document type
- Nationality
- Any other important details

Format as clear, structured text.";

const INVALID_TYPE_MSG: &str = "Only image files are allowed";
const UNDECODABLE_MSG: &str = "Invalid image file";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Parent directory for scratch locations.
    pub scratch_root: PathBuf,
    /// OCR fragments at or below this confidence are dropped.
    pub ocr_min_confidence: f64,
    /// Prompt for free-form extraction when the caller supplies none.
    pub extract_prompt: String,
    /// Prompt for the text half of a combined verification.
    pub id_prompt: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
            ocr_min_confidence: DEFAULT_OCR_MIN_CONFIDENCE,
            extract_prompt: DEFAULT_EXTRACT_PROMPT.to_string(),
            id_prompt: ID_EXTRACTION_PROMPT.to_string(),
        }
    }
}

/// Outcome of a combined text + face check, already persisted.
#[derive(Debug, Clone)]
pub struct CombinedVerification {
    /// `YYYYMMDD_HHMMSS` of generation; also the record's timestamp.
    pub verification_id: String,
    /// Filename of the persisted record inside the uploads directory.
    pub log_filename: String,
    pub record: VerificationRecord,
    pub face: FaceComparison,
    pub extraction: TextExtraction,
}

pub struct Orchestrator {
    faces: Arc<dyn FaceComparator>,
    ocr: Arc<dyn OcrEngine>,
    vision: Arc<dyn VisionModel>,
    records: RecordStore,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        faces: Arc<dyn FaceComparator>,
        ocr: Arc<dyn OcrEngine>,
        vision: Arc<dyn VisionModel>,
        records: RecordStore,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            faces,
            ocr,
            vision,
            records,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn vision_model(&self) -> &str {
        self.vision.model_name()
    }

    pub async fn vision_health(&self) -> VisionHealth {
        self.vision.health().await
    }

    /// Allocate a fresh scratch location.
    pub async fn scratch(&self) -> Result<ScratchLocation, OrchestratorError> {
        ScratchLocation::create(&self.settings.scratch_root)
            .await
            .map_err(OrchestratorError::Scratch)
    }

    /// Validate the declared content type and write the bytes verbatim into
    /// `scratch` as `{label}_{filename}`.
    pub async fn ingest(
        &self,
        scratch: &mut ScratchLocation,
        label: &str,
        upload: &Upload,
    ) -> Result<ScratchFile, OrchestratorError> {
        validate(upload)?;
        let name = scratch_file_name(label, &upload.filename);
        let path = scratch
            .write(&name, &upload.bytes)
            .await
            .map_err(OrchestratorError::Scratch)?;
        tracing::debug!(
            path = %path.display(),
            bytes = upload.bytes.len(),
            content_type = %upload.content_type,
            "upload ingested"
        );
        Ok(ScratchFile {
            path,
            original_name: upload.filename.clone(),
        })
    }

    pub async fn compare_faces(
        &self,
        img1: &Path,
        img2: &Path,
    ) -> Result<FaceComparison, OrchestratorError> {
        let result = self
            .faces
            .compare(img1, img2)
            .await
            .map_err(|e| analyzer_error("face comparator", e))?;
        tracing::info!(
            verified = result.verified,
            distance = result.distance,
            threshold = result.threshold,
            model = %result.model,
            "faces compared"
        );
        Ok(result)
    }

    /// OCR with confidence filtering. Fragment order is the engine's.
    pub async fn extract_text(&self, path: &Path) -> Result<OcrExtraction, OrchestratorError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(OrchestratorError::Scratch)?;
        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| OrchestratorError::Analyzer {
                analyzer: "image decoder",
                detail: e.to_string(),
            })?;
        let image = decoded.map_err(|e| {
            tracing::debug!(error = %e, "upload is not a decodable image");
            OrchestratorError::invalid_input(UNDECODABLE_MSG)
        })?;

        let fragments = self
            .ocr
            .read_text(&image)
            .await
            .map_err(|e| analyzer_error("OCR engine", e))?;
        let total = fragments.len();
        let extraction = filter_fragments(fragments, self.settings.ocr_min_confidence);
        tracing::info!(total, kept = extraction.text_blocks(), "text extracted");
        Ok(extraction)
    }

    /// Ask the vision model about the image at `path`. A blank or missing
    /// prompt falls back to the configured default.
    pub async fn extract_text_ai(
        &self,
        path: &Path,
        prompt: Option<&str>,
    ) -> Result<AiExtraction, OrchestratorError> {
        let prompt = prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.settings.extract_prompt);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(OrchestratorError::Scratch)?;
        let encoded = STANDARD.encode(&bytes);

        let text = self
            .vision
            .generate(prompt, &encoded)
            .await
            .map_err(upstream_error)?;
        tracing::info!(
            model = self.vision.model_name(),
            chars = text.len(),
            "vision model answered"
        );
        Ok(AiExtraction {
            text,
            model: self.vision.model_name().to_string(),
            prompt: prompt.to_string(),
        })
    }

    /// Text extraction, then face comparison, then a persisted record.
    ///
    /// A failed extraction returns before the face comparator is called.
    pub async fn run_combined_verification(
        &self,
        id_card: &ScratchFile,
        selfie: &ScratchFile,
        extractor: TextExtractor,
    ) -> Result<CombinedVerification, OrchestratorError> {
        let extraction = match extractor {
            TextExtractor::Ocr => TextExtraction::Ocr(self.extract_text(&id_card.path).await?),
            TextExtractor::Ai => TextExtraction::Ai(
                self.extract_text_ai(&id_card.path, Some(&self.settings.id_prompt))
                    .await?,
            ),
        };
        let face = self.compare_faces(&id_card.path, &selfie.path).await?;

        let verification_id = verification_id(&Local::now());
        let record = VerificationRecord {
            timestamp: verification_id.clone(),
            id_card_filename: id_card.original_name.clone(),
            selfie_filename: selfie.original_name.clone(),
            extraction: (&extraction).into(),
            face_verification: (&face).into(),
        };
        let log_filename = self
            .records
            .persist(&record)
            .await
            .map_err(OrchestratorError::Record)?;

        tracing::info!(
            verification_id = %verification_id,
            face_verified = face.verified,
            "combined verification completed"
        );
        Ok(CombinedVerification {
            verification_id,
            log_filename,
            record,
            face,
            extraction,
        })
    }

    /// Compare the faces in two uploads.
    pub async fn face_recognition(
        &self,
        img1: &Upload,
        img2: &Upload,
    ) -> Result<FaceComparison, OrchestratorError> {
        validate(img1)?;
        validate(img2)?;
        let mut scratch = self.scratch().await?;
        let a = self.ingest(&mut scratch, "img1", img1).await?;
        let b = self.ingest(&mut scratch, "img2", img2).await?;
        let result = self.compare_faces(&a.path, &b.path).await;
        release(scratch);
        result
    }

    pub async fn ocr_extract(&self, upload: &Upload) -> Result<OcrExtraction, OrchestratorError> {
        validate(upload)?;
        let mut scratch = self.scratch().await?;
        let image = self.ingest(&mut scratch, "image", upload).await?;
        let result = self.extract_text(&image.path).await;
        release(scratch);
        result
    }

    pub async fn ai_extract(
        &self,
        upload: &Upload,
        prompt: Option<&str>,
    ) -> Result<AiExtraction, OrchestratorError> {
        validate(upload)?;
        let mut scratch = self.scratch().await?;
        let image = self.ingest(&mut scratch, "image", upload).await?;
        let result = self.extract_text_ai(&image.path, prompt).await;
        release(scratch);
        result
    }

    pub async fn id_verify(
        &self,
        id_card: &Upload,
        selfie: &Upload,
        extractor: TextExtractor,
    ) -> Result<CombinedVerification, OrchestratorError> {
        validate(id_card)?;
        validate(selfie)?;
        let mut scratch = self.scratch().await?;
        let id_file = self.ingest(&mut scratch, "id_card", id_card).await?;
        let selfie_file = self.ingest(&mut scratch, "selfie", selfie).await?;
        let result = self
            .run_combined_verification(&id_file, &selfie_file, extractor)
            .await;
        release(scratch);
        result
    }
}

/// Reject uploads whose declared type is not an accepted image type.
pub fn validate(upload: &Upload) -> Result<(), OrchestratorError> {
    if is_accepted_image_type(&upload.content_type) {
        Ok(())
    } else {
        tracing::debug!(content_type = %upload.content_type, "upload rejected");
        Err(OrchestratorError::invalid_input(INVALID_TYPE_MSG))
    }
}

/// Keep fragments strictly above `min_confidence`, joined by single spaces.
pub fn filter_fragments(fragments: Vec<OcrFragment>, min_confidence: f64) -> OcrExtraction {
    let fragments: Vec<OcrFragment> = fragments
        .into_iter()
        .filter(|f| f.confidence > min_confidence)
        .collect();
    let text = fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    OcrExtraction { text, fragments }
}

/// `{label}_{basename}`; directory components of client filenames are dropped
/// and long basenames are shortened.
pub fn scratch_file_name(label: &str, filename: &str) -> String {
    let base = filename.rsplit(|c| c == '/' || c == '\\').next().unwrap_or_default();
    let base = match base {
        "" | "." | ".." => "upload",
        name => name,
    };
    format!("{label}_{}", shorten(base))
}

/// Cap `name` at [`MAX_SCRATCH_BASENAME`] bytes on a char boundary, keeping a
/// short extension.
fn shorten(name: &str) -> String {
    if name.len() <= MAX_SCRATCH_BASENAME {
        return name.to_string();
    }
    let ext = name
        .rfind('.')
        .filter(|&i| i > 0 && name.len() - i <= MAX_KEPT_EXTENSION)
        .map(|i| &name[i..])
        .unwrap_or_default();
    let stem = &name[..name.len() - ext.len()];
    let mut end = MAX_SCRATCH_BASENAME - ext.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ext}", &stem[..end])
}

fn release(scratch: ScratchLocation) {
    if let Err(e) = scratch.release() {
        tracing::warn!(error = %e, "scratch cleanup failed");
    }
}

fn analyzer_error(analyzer: &'static str, err: AnalyzerError) -> OrchestratorError {
    tracing::warn!(analyzer, error = %err, "analyzer call failed");
    OrchestratorError::Analyzer {
        analyzer,
        detail: err.to_string(),
    }
}

fn upstream_error(err: AnalyzerError) -> OrchestratorError {
    tracing::warn!(error = %err, "vision model call failed");
    let status = err.status();
    let detail = match err {
        AnalyzerError::Status { detail, .. } => detail,
        other => other.to_string(),
    };
    OrchestratorError::Upstream { status, detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use std::time::Duration;

    struct Harness {
        scratch: tempfile::TempDir,
        uploads: tempfile::TempDir,
        faces: Arc<FakeFaceComparator>,
        ocr: Arc<FakeOcrEngine>,
        vision: Arc<FakeVisionModel>,
        orchestrator: Orchestrator,
    }

    impl Harness {
        fn new(faces: FakeFaceComparator, ocr: FakeOcrEngine, vision: FakeVisionModel) -> Self {
            let scratch = tempfile::tempdir().unwrap();
            let uploads = tempfile::tempdir().unwrap();
            let faces = Arc::new(faces);
            let ocr = Arc::new(ocr);
            let vision = Arc::new(vision);
            let orchestrator = Orchestrator::new(
                faces.clone(),
                ocr.clone(),
                vision.clone(),
                RecordStore::new(uploads.path()),
                OrchestratorSettings {
                    scratch_root: scratch.path().to_path_buf(),
                    ..OrchestratorSettings::default()
                },
            );
            Self {
                scratch,
                uploads,
                faces,
                ocr,
                vision,
                orchestrator,
            }
        }

        fn default_fakes() -> Self {
            Self::new(
                FakeFaceComparator::returning(face_result(true, 0.2, 0.4)),
                FakeOcrEngine::returning(vec![fragment("JOHN", 0.9), fragment("DOE", 0.8)]),
                FakeVisionModel::returning("Name: John Doe"),
            )
        }

        fn scratch_entries(&self) -> usize {
            std::fs::read_dir(self.scratch.path()).unwrap().count()
        }

        fn records(&self) -> Vec<String> {
            std::fs::read_dir(self.uploads.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        }
    }

    #[test]
    fn test_filter_drops_at_or_below_threshold() {
        let out = filter_fragments(
            vec![
                fragment("A", 0.9),
                fragment("B", 0.5),
                fragment("C", 0.51),
                fragment("D", 0.2),
            ],
            0.5,
        );
        assert_eq!(out.text, "A C");
        assert_eq!(out.text_blocks(), 2);
        assert!(out.fragments.iter().all(|f| f.confidence > 0.5));
    }

    #[test]
    fn test_filter_preserves_analyzer_order() {
        let mut bottom = fragment("bottom", 0.9);
        bottom.bbox = [[0.0, 90.0], [10.0, 90.0], [10.0, 99.0], [0.0, 99.0]];
        let top = fragment("top", 0.9);
        let out = filter_fragments(vec![bottom, top], 0.5);
        assert_eq!(out.text, "bottom top");
        assert_eq!(out.individual_texts(), vec!["bottom", "top"]);
    }

    #[test]
    fn test_filter_empty() {
        let out = filter_fragments(vec![fragment("x", 0.1)], 0.5);
        assert_eq!(out.text, "");
        assert_eq!(out.text_blocks(), 0);
    }

    #[test]
    fn test_scratch_file_name_strips_directories() {
        assert_eq!(scratch_file_name("img1", "face.jpg"), "img1_face.jpg");
        assert_eq!(scratch_file_name("img1", "../../etc/passwd"), "img1_passwd");
        assert_eq!(scratch_file_name("img2", "C:\\photos\\me.png"), "img2_me.png");
        assert_eq!(scratch_file_name("selfie", ""), "selfie_upload");
        assert_eq!(scratch_file_name("selfie", "dir/.."), "selfie_upload");
    }

    #[test]
    fn test_scratch_file_name_caps_long_basenames() {
        let long = format!("{}.png", "a".repeat(300));
        let name = scratch_file_name("img1", &long);
        assert!(name.starts_with("img1_aaa"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "img1_".len() + MAX_SCRATCH_BASENAME);

        // Multi-byte characters are never split.
        let wide = format!("{}.jpg", "é".repeat(100));
        let name = scratch_file_name("selfie", &wide);
        assert!(name.ends_with(".jpg"));
        assert!(name.len() <= "selfie_".len() + MAX_SCRATCH_BASENAME);

        // No usable extension: plain truncation.
        let name = scratch_file_name("id_card", &"x".repeat(200));
        assert_eq!(name.len(), "id_card_".len() + MAX_SCRATCH_BASENAME);

        let short = "a".repeat(MAX_SCRATCH_BASENAME);
        assert_eq!(scratch_file_name("img2", &short), format!("img2_{short}"));
    }

    #[tokio::test]
    async fn test_face_recognition_success_cleans_up() {
        let h = Harness::default_fakes();
        let result = h
            .orchestrator
            .face_recognition(&png_upload("a.png"), &png_upload("b.png"))
            .await
            .unwrap();
        assert!(result.verified);
        assert_eq!(result.distance, 0.2);
        assert_eq!(h.faces.calls(), 1);
        assert!(h.faces.inputs_present());
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_face_recognition_accepts_very_long_filename() {
        let h = Harness::default_fakes();
        let long = format!("{}.png", "a".repeat(296));
        assert_eq!(long.len(), 300);
        let result = h
            .orchestrator
            .face_recognition(&png_upload(&long), &png_upload("b.png"))
            .await
            .unwrap();
        assert!(result.verified);
        assert_eq!(h.faces.calls(), 1);
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_face_recognition_analyzer_failure_cleans_up() {
        let h = Harness::new(
            FakeFaceComparator::failing(AnalyzerError::Failed("no model".into())),
            FakeOcrEngine::returning(vec![]),
            FakeVisionModel::returning(""),
        );
        let err = h
            .orchestrator
            .face_recognition(&png_upload("a.png"), &png_upload("b.png"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Analyzer { analyzer: "face comparator", ref detail } if detail == "no model"
        ));
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_invalid_second_upload_rejected_before_any_work() {
        let h = Harness::default_fakes();
        let bad = Upload::new(b"%PDF".to_vec(), "application/pdf", "doc.pdf");
        let err = h
            .orchestrator
            .face_recognition(&png_upload("a.png"), &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(ref m) if m == INVALID_TYPE_MSG));
        assert_eq!(h.faces.calls(), 0);
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_ingest_rejects_wrong_type() {
        let h = Harness::default_fakes();
        let mut scratch = h.orchestrator.scratch().await.unwrap();
        let bad = Upload::new(b"GIF89a".to_vec(), "text/plain", "x.gif");
        assert!(h.orchestrator.ingest(&mut scratch, "img1", &bad).await.is_err());
        assert!(scratch.files().is_empty());
        drop(scratch);
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_ocr_extract_filters_and_cleans_up() {
        let h = Harness::new(
            FakeFaceComparator::returning(face_result(true, 0.1, 0.4)),
            FakeOcrEngine::returning(vec![
                fragment("REPUBLIC", 0.97),
                fragment("~~", 0.3),
                fragment("ID CARD", 0.75),
            ]),
            FakeVisionModel::returning(""),
        );
        let out = h.orchestrator.ocr_extract(&png_upload("id.png")).await.unwrap();
        assert_eq!(out.text, "REPUBLIC ID CARD");
        assert_eq!(out.text_blocks(), 2);
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_ocr_threshold_is_configurable() {
        let mut h = Harness::new(
            FakeFaceComparator::returning(face_result(true, 0.1, 0.4)),
            FakeOcrEngine::returning(vec![fragment("keep", 0.3), fragment("drop", 0.1)]),
            FakeVisionModel::returning(""),
        );
        h.orchestrator.settings.ocr_min_confidence = 0.2;
        let out = h.orchestrator.ocr_extract(&png_upload("id.png")).await.unwrap();
        assert_eq!(out.text, "keep");
    }

    #[tokio::test]
    async fn test_undecodable_image_is_invalid_input() {
        let h = Harness::default_fakes();
        let garbage = Upload::new(b"not really a jpeg".to_vec(), "image/jpeg", "x.jpg");
        let err = h.orchestrator.ocr_extract(&garbage).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(ref m) if m == UNDECODABLE_MSG));
        assert_eq!(h.ocr.calls(), 0);
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_ai_extract_uses_default_prompt() {
        let h = Harness::default_fakes();
        let out = h
            .orchestrator
            .ai_extract(&png_upload("doc.png"), Some("   "))
            .await
            .unwrap();
        assert_eq!(out.text, "Name: John Doe");
        assert_eq!(out.model, FakeVisionModel::MODEL);
        assert_eq!(out.prompt, DEFAULT_EXTRACT_PROMPT);
        assert_eq!(h.vision.prompts(), vec![DEFAULT_EXTRACT_PROMPT.to_string()]);
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_ai_extract_custom_prompt() {
        let h = Harness::default_fakes();
        let out = h
            .orchestrator
            .ai_extract(&png_upload("doc.png"), Some("Read the MRZ"))
            .await
            .unwrap();
        assert_eq!(out.prompt, "Read the MRZ");
    }

    #[tokio::test]
    async fn test_ai_extract_upstream_status() {
        let h = Harness::new(
            FakeFaceComparator::returning(face_result(true, 0.1, 0.4)),
            FakeOcrEngine::returning(vec![]),
            FakeVisionModel::failing(AnalyzerError::Status {
                status: 404,
                detail: "model not found".into(),
            }),
        );
        let err = h
            .orchestrator
            .ai_extract(&png_upload("doc.png"), None)
            .await
            .unwrap_err();
        match err {
            OrchestratorError::Upstream { status, detail } => {
                assert_eq!(status, Some(404));
                assert_eq!(detail, "model not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_ai_extract_timeout_has_no_status() {
        let h = Harness::new(
            FakeFaceComparator::returning(face_result(true, 0.1, 0.4)),
            FakeOcrEngine::returning(vec![]),
            FakeVisionModel::failing(AnalyzerError::Timeout(Duration::from_secs(60))),
        );
        let err = h
            .orchestrator
            .ai_extract(&png_upload("doc.png"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Upstream { status: None, .. }));
    }

    #[tokio::test]
    async fn test_id_verify_ocr_writes_record() {
        let h = Harness::default_fakes();
        let out = h
            .orchestrator
            .id_verify(&png_upload("id.png"), &png_upload("me.png"), TextExtractor::Ocr)
            .await
            .unwrap();

        assert_eq!(out.log_filename, format!("verification_{}.json", out.verification_id));
        assert_eq!(h.records(), vec![out.log_filename.clone()]);
        assert_eq!(out.record.id_card_filename, "id.png");
        assert_eq!(out.record.selfie_filename, "me.png");
        assert!(matches!(out.extraction, TextExtraction::Ocr(ref o) if o.text == "JOHN DOE"));
        assert_eq!(out.face.confidence(), 1.0 - 0.2);
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_id_verify_ai_uses_id_prompt() {
        let h = Harness::default_fakes();
        let out = h
            .orchestrator
            .id_verify(&png_upload("id.png"), &png_upload("me.png"), TextExtractor::Ai)
            .await
            .unwrap();
        assert!(out.log_filename.starts_with("ai_verification_"));
        assert_eq!(h.vision.prompts(), vec![ID_EXTRACTION_PROMPT.to_string()]);
        assert_eq!(h.ocr.calls(), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_short_circuits_face_comparison() {
        let h = Harness::new(
            FakeFaceComparator::returning(face_result(true, 0.1, 0.4)),
            FakeOcrEngine::failing(AnalyzerError::Failed("engine crashed".into())),
            FakeVisionModel::failing(AnalyzerError::Transport("connection refused".into())),
        );
        for extractor in [TextExtractor::Ocr, TextExtractor::Ai] {
            let err = h
                .orchestrator
                .id_verify(&png_upload("id.png"), &png_upload("me.png"), extractor)
                .await
                .unwrap_err();
            assert!(!err.is_client_error());
        }
        assert_eq!(h.faces.calls(), 0);
        assert!(h.records().is_empty());
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_face_failure_in_combined_writes_no_record() {
        let h = Harness::new(
            FakeFaceComparator::failing(AnalyzerError::Failed("face not found".into())),
            FakeOcrEngine::returning(vec![fragment("JOHN", 0.9)]),
            FakeVisionModel::returning(""),
        );
        let err = h
            .orchestrator
            .id_verify(&png_upload("id.png"), &png_upload("me.png"), TextExtractor::Ocr)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "analyzer_error");
        assert!(h.records().is_empty());
        assert_eq!(h.scratch_entries(), 0);
    }
}
