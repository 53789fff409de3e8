//! Captioning service collaborator
//!
//! Each retrieved image is uploaded as a single multipart file part; the
//! service answers with `{"caption": "...", "tags": [...]}`.

use crate::config::{CaptionConfig, RetryConfig};
use crate::error::{CaptionError, Error, Result, truncate_body};
use crate::retry::with_retry;
use crate::types::Caption;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use url::Url;

/// Turns image bytes into a caption
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Describe one image
    ///
    /// A returned caption always has non-empty [`Caption::text`].
    async fn describe(
        &self,
        image: &[u8],
        filename: &str,
    ) -> std::result::Result<Caption, CaptionError>;
}

/// HTTP client for the captioning service
#[derive(Debug, Clone)]
pub struct HttpCaptioner {
    client: reqwest::Client,
    url: Url,
    file_field: String,
    content_type: String,
    retry: RetryConfig,
}

impl HttpCaptioner {
    /// Create a captioner from its settings
    ///
    /// # Errors
    /// Returns a configuration error for an invalid URL or content type.
    pub fn new(config: &CaptionConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::config("caption.url", format!("invalid captioning URL: {e}")))?;
        Part::bytes(Vec::new())
            .mime_str(&config.content_type)
            .map_err(|e| Error::config("caption.content_type", e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("edms-crawler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            file_field: config.file_field.clone(),
            content_type: config.content_type.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn upload(
        &self,
        image: &[u8],
        filename: &str,
    ) -> std::result::Result<Caption, CaptionError> {
        let part = Part::bytes(image.to_vec())
            .file_name(filename.to_string())
            .mime_str(&self.content_type)
            .map_err(|e| CaptionError::Malformed(e.to_string()))?;
        let form = Form::new().part(self.file_field.clone(), part);

        let response = self
            .client
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(CaptionError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let caption: Caption =
            serde_json::from_str(&body).map_err(|e| CaptionError::Malformed(e.to_string()))?;
        if caption.text().is_none() {
            return Err(CaptionError::MissingCaption);
        }
        Ok(caption)
    }
}

#[async_trait]
impl Captioner for HttpCaptioner {
    async fn describe(
        &self,
        image: &[u8],
        filename: &str,
    ) -> std::result::Result<Caption, CaptionError> {
        if image.is_empty() {
            return Err(CaptionError::EmptyPayload);
        }

        let caption = with_retry(&self.retry, || self.upload(image, filename)).await?;
        tracing::debug!(filename, tags = ?caption.tags, "image captioned");
        Ok(caption)
    }
}
