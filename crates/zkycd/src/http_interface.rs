use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use zkyc_core::records::AI_METHOD;
use zkyc_core::{
    CombinedVerification, Orchestrator, OrchestratorError, TextExtraction, TextExtractor, Upload,
};

const DEFAULT_BASE64_CONTENT_TYPE: &str = "image/jpeg";

/// Shared state behind every route.
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Text extractor for `/id-verify` and `/id-verify-base64`.
    pub id_extractor: TextExtractor,
}

/// HTTP surface of the daemon.
///
/// | route | input |
/// |---|---|
/// | `GET /` | - |
/// | `GET /health` | - |
/// | `POST /face-recognition` | multipart `img1`, `img2` |
/// | `POST /ocr-extract` | multipart `file` |
/// | `POST /ai-extract` | multipart `file`, optional `prompt` (field or query) |
/// | `POST /id-verify` | multipart `id_card`, `selfie` |
/// | `POST /id-verify-base64` | JSON with base64 images |
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/face-recognition", post(face_recognition))
        .route("/ocr-extract", post(ocr_extract))
        .route("/ai-extract", post(ai_extract))
        .route("/id-verify", post(id_verify))
        .route("/id-verify-base64", post(id_verify_base64))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body: `{"detail": ..., "error": <kind>}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    kind: &'static str,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
            kind: "invalid_input",
        }
    }

    fn multipart(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            detail: err.body_text(),
            kind: "invalid_input",
        }
    }

    /// Client errors keep the bare message; server errors are prefixed
    /// with `context`.
    fn orchestrator(context: &str, err: OrchestratorError) -> Self {
        if err.is_client_error() {
            return Self::bad_request(err.to_string());
        }
        tracing::error!(context, kind = err.kind(), error = %err, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("{context}: {err}"),
            kind: err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "detail": self.detail, "error": self.kind });
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
            kind: "invalid_input",
        }
    }
}

/// Multipart body split into file parts and plain text fields.
#[derive(Default)]
struct Form {
    files: HashMap<String, Upload>,
    fields: HashMap<String, String>,
}

impl Form {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(ApiError::multipart)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(ApiError::multipart)?;
                    form.files
                        .insert(name, Upload::new(bytes.to_vec(), content_type, filename));
                }
                None => {
                    let text = field.text().await.map_err(ApiError::multipart)?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    fn file(&mut self, name: &str) -> Result<Upload, ApiError> {
        self.files
            .remove(name)
            .ok_or_else(|| ApiError::bad_request(format!("missing file field `{name}`")))
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "ZKYC Service is running",
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "face_verification",
            "ocr_extraction",
            "ai_text_extraction",
            "id_verification",
        ],
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.vision_health().await)
}

async fn face_recognition(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let img1 = form.file("img1")?;
    let img2 = form.file("img2")?;

    let result = state
        .orchestrator
        .face_recognition(&img1, &img2)
        .await
        .map_err(|e| ApiError::orchestrator("Face recognition error", e))?;

    Ok(Json(json!({
        "verified": result.verified,
        "distance": result.distance,
        "threshold": result.threshold,
        "model": result.model,
        "detector_backend": result.detector_backend,
        "similarity_metric": result.similarity_metric,
        "facial_areas": result.facial_areas,
        "message": if result.verified { "Same person" } else { "Different people" },
    })))
}

async fn ocr_extract(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let file = form.file("file")?;

    let extraction = state
        .orchestrator
        .ocr_extract(&file)
        .await
        .map_err(|e| ApiError::orchestrator("OCR extraction error", e))?;

    Ok(Json(json!({
        "filename": file.filename,
        "extracted_text": extraction.text,
        "text_blocks": extraction.text_blocks(),
        "detailed_results": extraction.fragments,
        "status": "success",
    })))
}

#[derive(Deserialize)]
struct PromptQuery {
    prompt: Option<String>,
}

async fn ai_extract(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PromptQuery>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let file = form.file("file")?;
    let prompt = form.fields.remove("prompt").or(query.prompt);

    let extraction = state
        .orchestrator
        .ai_extract(&file, prompt.as_deref())
        .await
        .map_err(|e| ApiError::orchestrator("AI extraction error", e))?;

    Ok(Json(json!({
        "filename": file.filename,
        "prompt_used": extraction.prompt,
        "extracted_text": extraction.text,
        "model": extraction.model,
        "status": "success",
    })))
}

async fn id_verify(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let id_card = form.file("id_card")?;
    let selfie = form.file("selfie")?;
    run_id_verify(&state, &id_card, &selfie).await
}

#[derive(Deserialize)]
struct Base64VerifyRequest {
    id_card_base64: String,
    selfie_base64: String,
    id_card_content_type: Option<String>,
    selfie_content_type: Option<String>,
}

async fn id_verify_base64(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Base64VerifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let id_card = decode_upload("id_card", &req.id_card_base64, req.id_card_content_type)?;
    let selfie = decode_upload("selfie", &req.selfie_base64, req.selfie_content_type)?;
    run_id_verify(&state, &id_card, &selfie).await
}

async fn run_id_verify(
    state: &AppState,
    id_card: &Upload,
    selfie: &Upload,
) -> Result<Json<Value>, ApiError> {
    let context = match state.id_extractor {
        TextExtractor::Ocr => "KYC verification error",
        TextExtractor::Ai => "AI KYC verification error",
    };
    let verification = state
        .orchestrator
        .id_verify(id_card, selfie, state.id_extractor)
        .await
        .map_err(|e| ApiError::orchestrator(context, e))?;
    Ok(Json(verification_body(&verification)))
}

fn verification_body(v: &CombinedVerification) -> Value {
    let mut body = json!({
        "verification_id": v.verification_id,
        "face_verified": v.face.verified,
        "face_confidence": v.face.confidence(),
        "verification_log": v.log_filename,
        "status": "success",
    });
    match &v.extraction {
        TextExtraction::Ocr(ocr) => {
            body["extracted_text"] = json!(ocr.text);
            body["text_blocks_found"] = json!(ocr.text_blocks());
            body["message"] = json!("KYC verification completed successfully");
        }
        TextExtraction::Ai(ai) => {
            body["extracted_info"] = json!(ai.text);
            body["extraction_method"] = json!(AI_METHOD);
            body["message"] = json!("AI-powered KYC verification completed successfully");
        }
    }
    body
}

/// Decode a base64 image, accepting an optional `data:<type>;base64,` prefix.
fn decode_upload(
    label: &str,
    encoded: &str,
    content_type: Option<String>,
) -> Result<Upload, ApiError> {
    let (prefix_type, data) = match encoded.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((meta, data)) => (meta.strip_suffix(";base64").map(str::to_string), data),
            None => return Err(ApiError::bad_request(format!("malformed data URI in `{label}`"))),
        },
        None => (None, encoded),
    };
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| ApiError::bad_request(format!("invalid base64 in `{label}`: {e}")))?;
    let content_type = content_type
        .or(prefix_type)
        .unwrap_or_else(|| DEFAULT_BASE64_CONTENT_TYPE.to_string());
    let filename = format!("{label}.{}", extension_for(&content_type));
    Ok(Upload::new(bytes, content_type, filename))
}

fn extension_for(content_type: &str) -> &str {
    match content_type.rsplit('/').next().unwrap_or_default() {
        "jpeg" | "jpg" => "jpg",
        "png" => "png",
        "gif" => "gif",
        "bmp" => "bmp",
        _ => "img",
    }
}
