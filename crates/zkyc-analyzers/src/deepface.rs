//! Face comparator backed by the DeepFace REST API (`POST /verify`).

use crate::http;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use zkyc_core::{AnalyzerError, FaceComparator, FaceComparison};

#[derive(Serialize)]
struct VerifyRequest<'a> {
    img1: String,
    img2: String,
    enforce_detection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detector_backend: Option<&'a str>,
}

pub struct DeepFaceClient {
    client: Client,
    endpoint: String,
    model_name: Option<String>,
    detector_backend: Option<String>,
    timeout: Duration,
}

impl DeepFaceClient {
    pub fn new(
        endpoint: &str,
        model_name: Option<String>,
        detector_backend: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AnalyzerError> {
        let endpoint = http::base_url(endpoint);
        tracing::info!(endpoint = %endpoint, model = ?model_name, "DeepFace client configured");
        Ok(Self {
            client: http::client(timeout)?,
            endpoint,
            model_name,
            detector_backend,
            timeout,
        })
    }

    async fn data_uri(path: &Path) -> Result<String, AnalyzerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalyzerError::Failed(format!("cannot read {}: {e}", path.display())))?;
        Ok(format!(
            "data:{};base64,{}",
            http::mime_for(path),
            STANDARD.encode(bytes)
        ))
    }
}

#[async_trait]
impl FaceComparator for DeepFaceClient {
    async fn compare(&self, img1: &Path, img2: &Path) -> Result<FaceComparison, AnalyzerError> {
        let request = VerifyRequest {
            img1: Self::data_uri(img1).await?,
            img2: Self::data_uri(img2).await?,
            enforce_detection: false,
            model_name: self.model_name.as_deref(),
            detector_backend: self.detector_backend.as_deref(),
        };

        let resp = self
            .client
            .post(format!("{}/verify", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| http::request_error(e, self.timeout))?;
        let resp = http::check_status(resp).await?;
        resp.json::<FaceComparison>()
            .await
            .map_err(|e| AnalyzerError::Malformed(format!("DeepFace verify response: {e}")))
    }
}
