use async_trait::async_trait;
use herald_sdk::objects::{ImageBatch, ImageUpload, StoredImages};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("no image store configured")]
    NotConfigured,

    #[error("image upload timed out after {0:?}")]
    Timeout(Duration),
}

/// Uploads event images and returns where they can be fetched from.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, event_id: Uuid, batch: &ImageBatch)
    -> Result<StoredImages, ImageError>;
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    event_id: Uuid,
    header: Option<&'a ImageUpload>,
    additional: &'a [ImageUpload],
}

/// Posts image batches as JSON to a configured upload endpoint.
pub struct HttpImageStore {
    upload_url: url::Url,
    http_client: reqwest::Client,
}

impl HttpImageStore {
    pub fn new(upload_url: url::Url) -> Self {
        Self {
            upload_url,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn upload(
        &self,
        event_id: Uuid,
        batch: &ImageBatch,
    ) -> Result<StoredImages, ImageError> {
        let request = UploadRequest {
            event_id,
            header: batch.header.as_ref(),
            additional: &batch.additional,
        };
        debug!(
            event_id = %event_id,
            images = batch.additional.len() + usize::from(batch.header.is_some()),
            "Uploading event images"
        );
        let response = self
            .http_client
            .post(self.upload_url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<StoredImages>().await?)
    }
}

/// Used when no upload endpoint is configured. Empty batches succeed.
pub struct NoopImageStore;

#[async_trait]
impl ImageStore for NoopImageStore {
    async fn upload(
        &self,
        _event_id: Uuid,
        batch: &ImageBatch,
    ) -> Result<StoredImages, ImageError> {
        if batch.is_empty() {
            Ok(StoredImages::default())
        } else {
            Err(ImageError::NotConfigured)
        }
    }
}
