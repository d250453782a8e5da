use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zkyc_analyzers::config::parse_or;
use zkyc_analyzers::AnalyzerConfig;
use zkyc_core::orchestrator::DEFAULT_OCR_MIN_CONFIDENCE;
use zkyc_core::TextExtractor;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Daemon configuration: optional TOML file named by `ZKYC_CONFIG`, then
/// `ZKYC_*` environment variables on top.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind: SocketAddr,
    /// Directory receiving Verification Records.
    pub uploads_dir: PathBuf,
    /// Parent of per-request scratch locations; the OS temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Request body cap in bytes.
    pub max_upload_bytes: usize,
    /// OCR fragments at or below this confidence are dropped.
    pub ocr_min_confidence: f64,
    /// Text extractor used by `/id-verify`.
    pub id_extractor: TextExtractor,
    pub analyzers: AnalyzerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            uploads_dir: PathBuf::from("uploads"),
            scratch_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ocr_min_confidence: DEFAULT_OCR_MIN_CONFIDENCE,
            id_extractor: TextExtractor::Ocr,
            analyzers: AnalyzerConfig::default(),
        }
    }
}

impl Config {
    /// Load the file named by `ZKYC_CONFIG` (if any), then apply the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("ZKYC_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_vars(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("ZKYC_BIND") {
            self.bind = v.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "ZKYC_BIND",
                message: format!("{v:?}: {e}"),
            })?;
        }
        if let Some(v) = lookup("ZKYC_UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ZKYC_SCRATCH_DIR") {
            self.scratch_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ZKYC_ID_EXTRACTOR") {
            self.id_extractor = v.parse().map_err(|message| ConfigError::Invalid {
                key: "ZKYC_ID_EXTRACTOR",
                message,
            })?;
        }
        self.max_upload_bytes =
            parse_or(&lookup, "ZKYC_MAX_UPLOAD_BYTES", self.max_upload_bytes);
        self.ocr_min_confidence =
            parse_or(&lookup, "ZKYC_OCR_MIN_CONFIDENCE", self.ocr_min_confidence);
        self.analyzers.apply_vars(&lookup);
        self.validate()
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.ocr_min_confidence) {
            return Err(ConfigError::Invalid {
                key: "ZKYC_OCR_MIN_CONFIDENCE",
                message: format!("{} is not within [0, 1]", self.ocr_min_confidence),
            });
        }
        Ok(())
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.bind.port(), 8000);
        assert_eq!(c.uploads_dir, PathBuf::from("uploads"));
        assert_eq!(c.max_upload_bytes, 52_428_800);
        assert_eq!(c.ocr_min_confidence, 0.5);
        assert_eq!(c.id_extractor, TextExtractor::Ocr);
        assert_eq!(c.scratch_root(), std::env::temp_dir());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zkyc.toml");
        std::fs::write(
            &path,
            r#"
bind = "127.0.0.1:9000"
id_extractor = "ai"
ocr_min_confidence = 0.7

[analyzers]
ollama_url = "http://gpu:11434"
"#,
        )
        .unwrap();

        let mut c = Config::from_file(&path).unwrap();
        assert_eq!(c.bind.port(), 9000);
        assert_eq!(c.id_extractor, TextExtractor::Ai);
        assert_eq!(c.analyzers.ollama_url, "http://gpu:11434");
        assert_eq!(c.analyzers.vision_timeout_secs, 60);

        c.apply_vars(vars(&[
            ("ZKYC_BIND", "0.0.0.0:8080"),
            ("ZKYC_OCR_MIN_CONFIDENCE", "0.3"),
            ("ZKYC_VISION_MODEL", "llava:7b"),
        ]))
        .unwrap();
        assert_eq!(c.bind.port(), 8080);
        assert_eq!(c.ocr_min_confidence, 0.3);
        assert_eq!(c.analyzers.vision_model, "llava:7b");
        // Untouched by env.
        assert_eq!(c.id_extractor, TextExtractor::Ai);
    }

    #[test]
    fn test_invalid_extractor_is_an_error() {
        let mut c = Config::default();
        let err = c
            .apply_vars(vars(&[("ZKYC_ID_EXTRACTOR", "magic")]))
            .unwrap_err();
        assert!(err.to_string().contains("ZKYC_ID_EXTRACTOR"));
    }

    #[test]
    fn test_invalid_bind_is_an_error() {
        let mut c = Config::default();
        assert!(c.apply_vars(vars(&[("ZKYC_BIND", "localhost")])).is_err());
    }

    #[test]
    fn test_unparseable_limit_keeps_default() {
        let mut c = Config::default();
        c.apply_vars(vars(&[("ZKYC_MAX_UPLOAD_BYTES", "lots")])).unwrap();
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_non_finite_or_out_of_range_threshold_is_an_error() {
        for bad in ["NaN", "inf", "-0.1", "1.5"] {
            let mut c = Config::default();
            let err = c
                .apply_vars(vars(&[("ZKYC_OCR_MIN_CONFIDENCE", bad)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "ZKYC_OCR_MIN_CONFIDENCE", .. }),
                "{bad} accepted"
            );
        }

        let mut c = Config::default();
        c.apply_vars(vars(&[("ZKYC_OCR_MIN_CONFIDENCE", "1")])).unwrap();
        assert_eq!(c.ocr_min_confidence, 1.0);
    }

    #[test]
    fn test_nan_threshold_from_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zkyc.toml");
        std::fs::write(&path, "ocr_min_confidence = nan\n").unwrap();

        let mut c = Config::from_file(&path).unwrap();
        assert!(c.ocr_min_confidence.is_nan());
        assert!(c.apply_vars(vars(&[])).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/zkyc.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
