//! Media submission: push the image to the media host, then record the meme.

use crate::{
    domain::{MediaHost, MemeRepository},
    errors::AppError,
    feed::derive_caption,
    models::{Meme, Template, UserId},
    templates::resolve_upload_category,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// A plain upload as submitted by the viewer.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub caption: Option<String>,
    pub category: Option<String>,
    pub custom_category: Option<String>,
}

/// A rendered template meme ready to publish.
#[derive(Debug, Clone)]
pub struct Generated<'a> {
    pub template: &'a Template,
    pub png: Vec<u8>,
    pub top_text: &'a str,
    pub bottom_text: &'a str,
}

pub struct MemeSubmitter {
    memes: Arc<dyn MemeRepository>,
    media: Arc<dyn MediaHost>,
}

fn some_non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl MemeSubmitter {
    pub fn new(memes: Arc<dyn MemeRepository>, media: Arc<dyn MediaHost>) -> Self {
        Self { memes, media }
    }

    pub async fn submit_upload(&self, viewer: &UserId, upload: Upload) -> Result<Meme, AppError> {
        if upload.data.is_empty() {
            return Err(AppError::MissingFormField("file".to_string()));
        }

        let category = resolve_upload_category(upload.category.as_deref(), upload.custom_category.as_deref());
        let url = self
            .media
            .upload(&upload.file_name, upload.data, upload.content_type)
            .await?;

        let meme = Meme {
            id: Uuid::new_v4(),
            url,
            caption: Some(upload.caption.unwrap_or_default()),
            caption_top: None,
            caption_bottom: None,
            category,
            template_id: None,
            user_id: viewer.clone(),
            created_at: Utc::now(),
        };
        self.memes.create(&meme).await?;

        tracing::info!(meme_id = %meme.id, user = %viewer, "Meme uploaded");
        Ok(meme)
    }

    pub async fn submit_generated(&self, viewer: &UserId, generated: Generated<'_>) -> Result<Meme, AppError> {
        let file_name = format!("meme-{}.png", Utc::now().timestamp_millis());
        let url = self
            .media
            .upload(&file_name, generated.png, Some("image/png".to_string()))
            .await?;

        let meme = Meme {
            id: Uuid::new_v4(),
            url,
            caption: Some(derive_caption(
                Some(generated.top_text),
                Some(generated.bottom_text),
                None,
            )),
            caption_top: some_non_empty(generated.top_text),
            caption_bottom: some_non_empty(generated.bottom_text),
            category: generated.template.category.clone(),
            template_id: Some(generated.template.id),
            user_id: viewer.clone(),
            created_at: Utc::now(),
        };
        self.memes.create(&meme).await?;

        tracing::info!(meme_id = %meme.id, template_id = %generated.template.id, user = %viewer, "Generated meme published");
        Ok(meme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHost {
        uploads: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl MediaHost for FakeHost {
        async fn upload(&self, file_name: &str, _data: Vec<u8>, content_type: Option<String>) -> Result<String, StorageError> {
            if self.fail {
                return Err(StorageError::UploadFailed("preset rejected".into()));
            }
            self.uploads.lock().unwrap().push((file_name.to_string(), content_type));
            Ok(format!("https://cdn.example/{file_name}"))
        }
    }

    fn template() -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "drake".into(),
            url: "https://img.example/drake.jpg".into(),
            category: Some("Funny".into()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upload_stores_meme_with_resolved_category() {
        let store = Arc::new(MemoryStore::default());
        let host = Arc::new(FakeHost::default());
        let submitter = MemeSubmitter::new(store.clone(), host.clone());

        let meme = submitter
            .submit_upload(
                &UserId::new("alice"),
                Upload {
                    file_name: "cat.png".into(),
                    data: vec![1, 2, 3],
                    content_type: Some("image/png".into()),
                    caption: Some("so true".into()),
                    category: Some("Other".into()),
                    custom_category: Some("Cursed".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(meme.url, "https://cdn.example/cat.png");
        assert_eq!(meme.category.as_deref(), Some("Cursed"));
        assert_eq!(meme.caption.as_deref(), Some("so true"));
        assert_eq!(store.memes().await, vec![meme]);
    }

    #[tokio::test]
    async fn empty_file_is_rejected_before_upload() {
        let store = Arc::new(MemoryStore::default());
        let host = Arc::new(FakeHost::default());
        let submitter = MemeSubmitter::new(store.clone(), host.clone());

        let result = submitter.submit_upload(&UserId::new("alice"), Upload::default()).await;

        assert!(matches!(result, Err(AppError::MissingFormField(_))));
        assert!(host.uploads.lock().unwrap().is_empty());
        assert!(store.memes().await.is_empty());
    }

    #[tokio::test]
    async fn failed_upload_inserts_nothing() {
        let store = Arc::new(MemoryStore::default());
        let host = Arc::new(FakeHost { fail: true, ..FakeHost::default() });
        let submitter = MemeSubmitter::new(store.clone(), host);

        let result = submitter
            .submit_upload(
                &UserId::new("alice"),
                Upload {
                    file_name: "cat.png".into(),
                    data: vec![1],
                    ..Upload::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::StorageError(_))));
        assert!(store.memes().await.is_empty());
    }

    #[tokio::test]
    async fn generated_meme_links_template() {
        let store = Arc::new(MemoryStore::default());
        let host = Arc::new(FakeHost::default());
        let submitter = MemeSubmitter::new(store.clone(), host.clone());
        let template = template();

        let meme = submitter
            .submit_generated(
                &UserId::new("bob"),
                Generated {
                    template: &template,
                    png: vec![0x89, b'P', b'N', b'G'],
                    top_text: "when the build",
                    bottom_text: "",
                },
            )
            .await
            .unwrap();

        assert_eq!(meme.template_id, Some(template.id));
        assert_eq!(meme.category.as_deref(), Some("Funny"));
        assert_eq!(meme.caption.as_deref(), Some("when the build"));
        assert_eq!(meme.caption_top.as_deref(), Some("when the build"));
        assert_eq!(meme.caption_bottom, None);

        let uploads = host.uploads.lock().unwrap();
        assert!(uploads[0].0.starts_with("meme-") && uploads[0].0.ends_with(".png"));
        assert_eq!(uploads[0].1.as_deref(), Some("image/png"));
    }
}
