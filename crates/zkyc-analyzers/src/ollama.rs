//! Vision model hosted by an Ollama runtime.

use crate::http;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zkyc_core::{AnalyzerError, VisionHealth, VisionModel};

/// Bound for the `/api/tags` probe, independent of the generation timeout.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [&'a str; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, AnalyzerError> {
        let base_url = http::base_url(base_url);
        tracing::info!(base_url = %base_url, model, "Ollama client configured");
        Ok(Self {
            client: http::client(timeout)?,
            base_url,
            model: model.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, image_base64: &str) -> Result<String, AnalyzerError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            images: [image_base64],
            stream: false,
        };
        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| http::request_error(e, self.timeout))?;
        let resp = http::check_status(resp).await?;
        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AnalyzerError::Malformed(format!("Ollama generate response: {e}")))?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = body.response.len(),
            "vision model answered"
        );
        Ok(body.response)
    }

    async fn health(&self) -> VisionHealth {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        let resp = match resp {
            Ok(r) => r,
            Err(e) => return VisionHealth::unhealthy(e.to_string()),
        };
        if !resp.status().is_success() {
            return VisionHealth::unhealthy(format!("Ollama returned status {}", resp.status()));
        }
        match resp.json::<TagsResponse>().await {
            Ok(tags) => {
                let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                let available = names.iter().any(|n| n.contains(self.model.as_str()));
                VisionHealth::healthy(available, names)
            }
            Err(e) => VisionHealth::unhealthy(format!("malformed /api/tags response: {e}")),
        }
    }
}
