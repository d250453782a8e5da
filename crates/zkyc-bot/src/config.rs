use std::path::PathBuf;
use thiserror::Error;
use zkyc_analyzers::config::parse_or;
use zkyc_analyzers::AnalyzerConfig;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("bot token missing: set ZKYC_TELEGRAM_TOKEN (or TOKEN)")]
    MissingToken,
}

/// Bot configuration, loaded from environment variables.
pub struct Config {
    pub token: String,
    /// Bot API base URL (default: https://api.telegram.org).
    pub api_base: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Directory receiving Verification Records from the KYC flow.
    pub uploads_dir: PathBuf,
    /// Parent of scratch locations; the OS temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    pub analyzers: AnalyzerConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("uploads_dir", &self.uploads_dir)
            .field("scratch_dir", &self.scratch_dir)
            .field("analyzers", &self.analyzers)
            .finish()
    }
}

impl Config {
    /// Load configuration from `ZKYC_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("ZKYC_TELEGRAM_TOKEN")
            .or_else(|| lookup("TOKEN"))
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let mut analyzers = AnalyzerConfig::default();
        analyzers.apply_vars(&lookup);

        Ok(Self {
            token: token.trim().to_string(),
            api_base: lookup("ZKYC_TELEGRAM_API").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            poll_timeout_secs: parse_or(&lookup, "ZKYC_POLL_TIMEOUT_SECS", 30),
            uploads_dir: lookup("ZKYC_UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            scratch_dir: lookup("ZKYC_SCRATCH_DIR").map(PathBuf::from),
            analyzers,
        })
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
