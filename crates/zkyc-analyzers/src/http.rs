//! Shared reqwest plumbing: client construction and error mapping.

use reqwest::{Client, Response};
use std::path::Path;
use std::time::Duration;
use zkyc_core::AnalyzerError;

/// Upstream error bodies are cut to this many bytes before being reported.
const MAX_DETAIL_LEN: usize = 512;

pub(crate) fn client(timeout: Duration) -> Result<Client, AnalyzerError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AnalyzerError::Transport(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Map a reqwest failure; `timeout` is what the request was bounded by.
pub(crate) fn request_error(err: reqwest::Error, timeout: Duration) -> AnalyzerError {
    if err.is_timeout() {
        AnalyzerError::Timeout(timeout)
    } else if err.is_decode() {
        AnalyzerError::Malformed(err.to_string())
    } else {
        AnalyzerError::Transport(err.to_string())
    }
}

/// Pass 2xx responses through; turn anything else into `Status`.
pub(crate) async fn check_status(resp: Response) -> Result<Response, AnalyzerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AnalyzerError::Status {
        status: status.as_u16(),
        detail: truncate(body.trim(), MAX_DETAIL_LEN),
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

/// Image MIME type from a scratch file's extension.
pub(crate) fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
        // 'é' is two bytes; cutting at 1 must back off to 0.
        assert_eq!(truncate("é", 1), "…");
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("/tmp/x/img1_a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("/tmp/x/img1_a.bmp")), "image/bmp");
        assert_eq!(mime_for(Path::new("/tmp/x/img1_a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("/tmp/x/img1_blob")), "image/jpeg");
    }

    #[test]
    fn test_base_url_trims_slash() {
        assert_eq!(base_url("http://localhost:11434/"), "http://localhost:11434");
    }
}
