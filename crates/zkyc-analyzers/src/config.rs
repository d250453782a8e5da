use serde::Deserialize;

pub const DEFAULT_VISION_MODEL: &str = "qwen2.5vl:3b";

/// Where the analyzers live and how long to wait for them.
///
/// Deserializable so it can sit under `[analyzers]` in a TOML config file;
/// environment variables override file values.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// DeepFace REST API base URL.
    pub face_url: String,
    /// DeepFace `model_name`; the service default when unset.
    pub face_model: Option<String>,
    /// DeepFace `detector_backend`; the service default when unset.
    pub face_detector: Option<String>,
    /// EasyOCR sidecar base URL.
    pub ocr_url: String,
    /// Ollama base URL.
    pub ollama_url: String,
    pub vision_model: String,
    /// Upper bound for one vision-model call.
    pub vision_timeout_secs: u64,
    /// Upper bound for one face or OCR call.
    pub analyzer_timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            face_url: "http://localhost:5005".to_string(),
            face_model: None,
            face_detector: None,
            ocr_url: "http://localhost:5006".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            vision_timeout_secs: 60,
            analyzer_timeout_secs: 120,
        }
    }
}

impl AnalyzerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Override fields from `ZKYC_*` / `OLLAMA_BASE_URL` variables found by `lookup`.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ZKYC_FACE_URL") {
            self.face_url = v;
        }
        if let Some(v) = lookup("ZKYC_FACE_MODEL") {
            self.face_model = non_empty(v);
        }
        if let Some(v) = lookup("ZKYC_FACE_DETECTOR") {
            self.face_detector = non_empty(v);
        }
        if let Some(v) = lookup("ZKYC_OCR_URL") {
            self.ocr_url = v;
        }
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            self.ollama_url = v;
        }
        if let Some(v) = lookup("ZKYC_VISION_MODEL") {
            self.vision_model = v;
        }
        self.vision_timeout_secs =
            parse_or(&lookup, "ZKYC_VISION_TIMEOUT_SECS", self.vision_timeout_secs);
        self.analyzer_timeout_secs =
            parse_or(&lookup, "ZKYC_ANALYZER_TIMEOUT_SECS", self.analyzer_timeout_secs);
    }
}

fn non_empty(v: String) -> Option<String> {
    if v.trim().is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Parse `key` from `lookup`, keeping `default` when it is unset or unparseable.
pub fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
