use crate::{domain::MediaHost, errors::StorageError};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadFailure>,
}

#[derive(Deserialize)]
struct UploadFailure {
    message: String,
}

/// Unsigned uploads to a Cloudinary cloud through an upload preset.
#[derive(Debug, Clone)]
pub struct CloudinaryMediaHost {
    http: reqwest::Client,
    upload_url: String,
    upload_preset: String,
}

impl CloudinaryMediaHost {
    pub fn new(http: reqwest::Client, cloud_name: &str, upload_preset: String) -> Self {
        Self::with_api_base(http, DEFAULT_API_BASE, cloud_name, upload_preset)
    }

    pub fn with_api_base(http: reqwest::Client, api_base: &str, cloud_name: &str, upload_preset: String) -> Self {
        let upload_url = format!("{}/{}/image/upload", api_base.trim_end_matches('/'), cloud_name);
        tracing::info!(%upload_url, "Initializing CloudinaryMediaHost");
        Self {
            http,
            upload_url,
            upload_preset,
        }
    }
}

#[async_trait]
impl MediaHost for CloudinaryMediaHost {
    async fn upload(&self, file_name: &str, data: Vec<u8>, content_type: Option<String>) -> Result<String, StorageError> {
        tracing::debug!(file_name, bytes = data.len(), content_type = ?content_type, "Cloudinary: Uploading file");

        let mut part = Part::bytes(data).file_name(file_name.to_string());
        if let Some(ct) = content_type {
            part = part
                .mime_str(&ct)
                .map_err(|e| StorageError::UploadFailed(format!("invalid content type '{}': {}", ct, e)))?;
        }
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let resp = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context(format!("Cloudinary: Failed to send upload for '{}'", file_name))?;

        let status = resp.status();
        let body: UploadResponse = resp
            .json()
            .await
            .context(format!("Cloudinary: Malformed upload response (status {})", status))?;

        match (body.secure_url, body.error) {
            (Some(url), _) if status.is_success() => {
                tracing::debug!(file_name, %url, "Cloudinary: Upload successful");
                Ok(url)
            }
            (_, Some(failure)) => Err(StorageError::UploadFailed(failure.message)),
            _ => Err(StorageError::UploadFailed(format!(
                "upload returned status {} without a URL",
                status
            ))),
        }
    }
}
