use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "zkyc", about = "ZKYC identity verification CLI", version)]
struct Cli {
    /// zkycd base URL
    #[arg(long, global = true, env = "ZKYC_SERVER", default_value = "http://localhost:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two images
    Face { img1: PathBuf, img2: PathBuf },
    /// Extract text from an image with OCR
    Ocr { file: PathBuf },
    /// Extract text from an image with the vision model
    Extract {
        file: PathBuf,
        /// Instruction for the vision model (server default when omitted)
        #[arg(short, long)]
        prompt: Option<String>,
    },
    /// Run a full KYC check: ID card text plus face match against a selfie
    IdVerify {
        id_card: PathBuf,
        selfie: PathBuf,
        /// Send the images as base64 JSON instead of multipart
        #[arg(long)]
        base64: bool,
    },
    /// Show vision-model health
    Health,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    let body = match cli.command {
        Commands::Face { img1, img2 } => {
            let form = Form::new()
                .part("img1", file_part(&img1).await?)
                .part("img2", file_part(&img2).await?);
            post_form(&client, &format!("{base}/face-recognition"), form).await?
        }
        Commands::Ocr { file } => {
            let form = Form::new().part("file", file_part(&file).await?);
            post_form(&client, &format!("{base}/ocr-extract"), form).await?
        }
        Commands::Extract { file, prompt } => {
            let mut form = Form::new().part("file", file_part(&file).await?);
            if let Some(prompt) = prompt {
                form = form.text("prompt", prompt);
            }
            post_form(&client, &format!("{base}/ai-extract"), form).await?
        }
        Commands::IdVerify {
            id_card,
            selfie,
            base64: false,
        } => {
            let form = Form::new()
                .part("id_card", file_part(&id_card).await?)
                .part("selfie", file_part(&selfie).await?);
            post_form(&client, &format!("{base}/id-verify"), form).await?
        }
        Commands::IdVerify {
            id_card,
            selfie,
            base64: true,
        } => {
            let payload = base64_payload(&id_card, &selfie).await?;
            let resp = client
                .post(format!("{base}/id-verify-base64"))
                .json(&payload)
                .send()
                .await
                .with_context(|| format!("failed to reach {base}"))?;
            read_json(resp).await?
        }
        Commands::Health => get_json(&client, &format!("{base}/health")).await?,
        Commands::Status => get_json(&client, &format!("{base}/")).await?,
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// MIME type from the file extension; the daemon rejects anything else.
fn content_type_for(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        Some("gif") => Ok("image/gif"),
        Some("bmp") => Ok("image/bmp"),
        _ => bail!(
            "{}: unsupported image type (expected jpg, jpeg, png, gif or bmp)",
            path.display()
        ),
    }
}

async fn file_part(path: &Path) -> Result<Part> {
    let content_type = content_type_for(path)?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    tracing::debug!(path = %path.display(), bytes = bytes.len(), content_type, "attaching file");
    Ok(Part::bytes(bytes).file_name(name).mime_str(content_type)?)
}

async fn base64_payload(id_card: &Path, selfie: &Path) -> Result<Value> {
    let id_type = content_type_for(id_card)?;
    let selfie_type = content_type_for(selfie)?;
    let id_bytes = tokio::fs::read(id_card)
        .await
        .with_context(|| format!("failed to read {}", id_card.display()))?;
    let selfie_bytes = tokio::fs::read(selfie)
        .await
        .with_context(|| format!("failed to read {}", selfie.display()))?;
    Ok(json!({
        "id_card_base64": STANDARD.encode(id_bytes),
        "selfie_base64": STANDARD.encode(selfie_bytes),
        "id_card_content_type": id_type,
        "selfie_content_type": selfie_type,
    }))
}

async fn post_form(client: &reqwest::Client, url: &str, form: Form) -> Result<Value> {
    let resp = client
        .post(url)
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;
    read_json(resp).await
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;
    read_json(resp).await
}

/// Parse the body; non-2xx statuses become errors carrying the server's detail.
async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        bail!("server returned {status}: {detail}");
    }
    serde_json::from_str(&text).context("server returned invalid JSON")
}
