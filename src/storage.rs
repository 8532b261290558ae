use crate::{domain::MediaHost, errors::StorageError};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use uuid::Uuid;

/// Media host backed by an S3 bucket served from a public base URL.
#[derive(Debug, Clone)]
pub struct S3MediaHost {
    client: S3Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3MediaHost {
    pub fn new(client: S3Client, bucket_name: String, public_base_url: String) -> Self {
        tracing::info!(bucket = %bucket_name, %public_base_url, "Initializing S3MediaHost");
        Self {
            client,
            bucket_name,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Builds a collision-free object key, keeping the original extension.
pub fn object_key(file_name: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{}", Uuid::new_v4(), extension)
}

#[async_trait]
impl MediaHost for S3MediaHost {
    /// Uploads data to S3 using PutObject and returns its public URL.
    async fn upload(&self, file_name: &str, data: Vec<u8>, content_type: Option<String>) -> Result<String, StorageError> {
        let key = object_key(file_name);
        let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, %content_type, "S3: Uploading file");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{:#}", e)))?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_keeps_extension() {
        assert!(object_key("Cat.PNG").ends_with(".png"));
        assert!(object_key("meme-1700000000000.png").ends_with(".png"));
        assert!(object_key("noext").ends_with(".bin"));
        assert!(object_key("weird.p/g").ends_with(".bin"));
    }
}
