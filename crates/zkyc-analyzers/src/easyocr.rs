//! OCR engine backed by an EasyOCR sidecar.
//!
//! Wire contract: `POST {base}/readtext` with `{"image": "<base64 PNG>"}`;
//! the response is EasyOCR's `readtext` output serialized as JSON, an array
//! of `[bbox, text, confidence]` where `bbox` is four `[x, y]` points.

use crate::http;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use zkyc_core::types::Quad;
use zkyc_core::{AnalyzerError, OcrEngine, OcrFragment};

#[derive(Serialize)]
struct ReadTextRequest {
    image: String,
}

type ReadTextEntry = (Quad, String, f64);

pub struct EasyOcrClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl EasyOcrClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, AnalyzerError> {
        let endpoint = http::base_url(endpoint);
        tracing::info!(endpoint = %endpoint, "EasyOCR client configured");
        Ok(Self {
            client: http::client(timeout)?,
            endpoint,
            timeout,
        })
    }
}

fn encode_png(image: &DynamicImage) -> Result<String, AnalyzerError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| AnalyzerError::Failed(format!("failed to encode image for OCR: {e}")))?;
    Ok(STANDARD.encode(buf.into_inner()))
}

#[async_trait]
impl OcrEngine for EasyOcrClient {
    async fn read_text(&self, image: &DynamicImage) -> Result<Vec<OcrFragment>, AnalyzerError> {
        let image = image.clone();
        let encoded = tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|e| AnalyzerError::Failed(format!("OCR image encoding aborted: {e}")))??;
        let request = ReadTextRequest { image: encoded };
        let resp = self
            .client
            .post(format!("{}/readtext", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| http::request_error(e, self.timeout))?;
        let resp = http::check_status(resp).await?;
        let entries: Vec<ReadTextEntry> = resp
            .json()
            .await
            .map_err(|e| AnalyzerError::Malformed(format!("EasyOCR readtext response: {e}")))?;

        tracing::debug!(fragments = entries.len(), "EasyOCR returned");
        Ok(entries
            .into_iter()
            .map(|(bbox, text, confidence)| OcrFragment {
                text,
                confidence,
                bbox,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image() -> DynamicImage {
        image::load_from_memory(&zkyc_core::testing::png_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_read_text_keeps_engine_order_and_all_fragments() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/readtext")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    [[[10, 80], [90, 80], [90, 95], [10, 95]], "SURNAME", 0.93],
                    [[[10, 5], [90, 5], [90, 20], [10, 20]], "REPUBLIC", 0.88],
                    [[[1, 1], [2, 1], [2, 2], [1, 2]], "~", 0.12]
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = EasyOcrClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let fragments = client.read_text(&image()).await.unwrap();
        mock.assert_async().await;

        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["SURNAME", "REPUBLIC", "~"]);
        assert_eq!(fragments[0].bbox[2], [90.0, 95.0]);
        assert_eq!(fragments[2].confidence, 0.12);
    }

    #[tokio::test]
    async fn test_read_text_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/readtext")
            .with_status(200)
            .with_body(r#"{"text": "not the expected shape"}"#)
            .create_async()
            .await;

        let client = EasyOcrClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = client.read_text(&image()).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_read_text_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/readtext")
            .with_status(500)
            .with_body("CUDA out of memory")
            .create_async()
            .await;

        let client = EasyOcrClient::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = client.read_text(&image()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
