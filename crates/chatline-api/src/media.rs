//! Image hosting for avatars and message attachments.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::CloudinaryConfig;

/// 5 MB upload limit for images
pub const MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFolder {
    Avatars,
    Messages,
}

impl MediaFolder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avatars => "avatars",
            Self::Messages => "messages",
        }
    }
}

pub struct Upload {
    pub bytes: Bytes,
    pub content_type: String,
    pub folder: MediaFolder,
}

/// Somewhere to put an image and get back a public URL for it.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, upload: Upload) -> Result<String>;
}

/// File extension for a supported image content type; `None` means reject.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Split a `data:<mime>;base64,<payload>` URL into content type and bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Bytes)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let content_type = meta.strip_suffix(";base64")?;
    let bytes = B64.decode(payload.trim()).ok()?;
    Some((content_type.to_string(), Bytes::from(bytes)))
}

// -- Cloudinary --

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
}

pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }
}

/// Cloudinary request signature: sorted `k=v` pairs joined by `&`, secret
/// appended, SHA-1, hex.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by_key(|(key, _)| *key);

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, upload: Upload) -> Result<String> {
        let ext = image_extension(&upload.content_type).unwrap_or("bin");
        let folder = format!("chatline/{}", upload.folder.as_str());
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", folder.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let part = reqwest::multipart::Part::bytes(upload.bytes.to_vec())
            .file_name(format!("upload.{}", ext))
            .mime_str(&upload.content_type)?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder)
            .text("signature", signature);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        );

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("Cloudinary unreachable")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Cloudinary upload failed ({}): {}", status, body);
        }

        let body: CloudinaryResponse = resp.json().await?;
        debug!("Uploaded image to {}", body.secure_url);
        Ok(body.secure_url)
    }
}

// -- Local disk --

/// Writes images under `dir` and serves them from `/uploads`.
pub struct LocalDiskStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalDiskStore {
    pub async fn new(dir: PathBuf, public_url: String) -> Result<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;
        info!("Storing uploads on disk at {}", dir.display());
        Ok(Self { dir, public_url })
    }
}

#[async_trait]
impl MediaStore for LocalDiskStore {
    async fn upload(&self, upload: Upload) -> Result<String> {
        let ext = image_extension(&upload.content_type).unwrap_or("bin");
        let folder = upload.folder.as_str();
        let file_name = format!("{}.{}", Uuid::new_v4(), ext);

        let folder_path = self.dir.join(folder);
        tokio::fs::create_dir_all(&folder_path).await?;

        let file_path = folder_path.join(&file_name);
        let mut file = tokio::fs::File::create(&file_path)
            .await
            .with_context(|| format!("Failed to create file {}", file_path.display()))?;
        file.write_all(&upload.bytes).await?;
        file.flush().await?;

        Ok(format!("{}/uploads/{}/{}", self.public_url, folder, file_name))
    }
}
