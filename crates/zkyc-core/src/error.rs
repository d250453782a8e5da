use thiserror::Error;

/// Failure of an orchestrated request.
///
/// Scratch cleanup failures never appear here: they are logged by the
/// scratch location itself and never replace the error a request reports.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Wrong content type, undecodable image or malformed request. User-correctable.
    #[error("{0}")]
    InvalidInput(String),
    /// The face comparator or OCR engine failed.
    #[error("{analyzer} failed: {detail}")]
    Analyzer {
        analyzer: &'static str,
        detail: String,
    },
    /// The vision-model call failed or timed out.
    #[error("vision model request failed{}: {detail}", fmt_status(.status))]
    Upstream { status: Option<u16>, detail: String },
    #[error("scratch I/O failed: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("failed to persist verification record: {0}")]
    Record(#[source] std::io::Error),
}

impl OrchestratorError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Analyzer { .. } => "analyzer_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Scratch(_) | Self::Record(_) => "internal_error",
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}
