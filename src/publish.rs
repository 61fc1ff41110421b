//! Publishing finished videos to Mux for hosting and streaming.
//!
//! Two ingest paths: `publish_from_url` hands Mux a remote URL directly,
//! `publish_from_file` runs the direct-upload flow (create upload, PUT the
//! bytes, poll the upload until it resolves to an asset). Either way the
//! asset is not playable until `wait_until_ready` observes the `ready`
//! status.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MUX_API_BASE: &str = "https://api.mux.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload resolution is usually quick; asset processing takes longer.
const DEFAULT_UPLOAD_POLL_ATTEMPTS: u32 = 60;
const DEFAULT_UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_READY_POLL_ATTEMPTS: u32 = 60;
const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct PublishedAsset {
    pub asset_id: String,
    pub playback_id: String,
}

/// Async trait for the video hosting backend.
#[async_trait]
pub trait AssetPublisher: Send + Sync {
    /// Ingest a remote video URL as a new streaming asset.
    async fn publish_from_url(&self, url: &str) -> Result<PublishedAsset>;

    /// Upload a local file as a new streaming asset.
    async fn publish_from_file(&self, path: &Path) -> Result<PublishedAsset>;

    /// Block until the asset is playable. Upstream `errored` status or an
    /// exhausted polling budget is a hard failure.
    async fn wait_until_ready(&self, asset_id: &str) -> Result<()>;
}

pub struct MuxClient {
    client: reqwest::Client,
    token_id: String,
    token_secret: String,
    base_url: String,
    ready_poll_attempts: u32,
    ready_poll_interval: Duration,
}

// ---------------------------------------------------------------------------
// Mux API response types (private)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct MuxEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct MuxAsset {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    playback_ids: Vec<MuxPlaybackId>,
}

#[derive(Deserialize)]
struct MuxPlaybackId {
    id: String,
}

#[derive(Deserialize)]
struct MuxUpload {
    id: String,
    url: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    asset_id: Option<String>,
}

impl MuxClient {
    pub fn new(token_id: String, token_secret: String) -> Self {
        Self::with_base_url(token_id, token_secret, MUX_API_BASE.to_string())
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_base_url(token_id: String, token_secret: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            token_id,
            token_secret,
            base_url: base_url.trim_end_matches('/').to_string(),
            ready_poll_attempts: DEFAULT_READY_POLL_ATTEMPTS,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
        }
    }

    /// Override the ready-polling budget.
    pub fn with_ready_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_poll_attempts = attempts;
        self.ready_poll_interval = interval;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/video/v1{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .basic_auth(&self.token_id, Some(&self.token_secret))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "publish API error: {status} - {body}"
            )));
        }
        Ok(response.json().await?)
    }

    fn playback_id(asset: &MuxAsset) -> Result<String> {
        asset
            .playback_ids
            .first()
            .map(|p| p.id.clone())
            .ok_or_else(|| Error::provider("published asset has no playback id"))
    }

    async fn fetch_asset(&self, asset_id: &str) -> Result<MuxAsset> {
        let envelope: MuxEnvelope<MuxAsset> = self.get_json(&format!("/assets/{asset_id}")).await?;
        Ok(envelope.data)
    }
}

#[derive(Serialize)]
struct NewAssetSettings {
    playback_policy: Vec<&'static str>,
    video_quality: &'static str,
}

impl Default for NewAssetSettings {
    fn default() -> Self {
        Self {
            playback_policy: vec!["public"],
            video_quality: "basic",
        }
    }
}

#[async_trait]
impl AssetPublisher for MuxClient {
    async fn publish_from_url(&self, url: &str) -> Result<PublishedAsset> {
        #[derive(Serialize)]
        struct CreateAssetRequest<'a> {
            input: Vec<AssetInput<'a>>,
            playback_policy: Vec<&'static str>,
            video_quality: &'static str,
        }

        #[derive(Serialize)]
        struct AssetInput<'a> {
            url: &'a str,
        }

        let request = CreateAssetRequest {
            input: vec![AssetInput { url }],
            playback_policy: vec!["public"],
            video_quality: "basic",
        };

        let envelope: MuxEnvelope<MuxAsset> = self.post_json("/assets", &request).await?;
        let playback_id = Self::playback_id(&envelope.data)?;
        Ok(PublishedAsset {
            asset_id: envelope.data.id,
            playback_id,
        })
    }

    async fn publish_from_file(&self, path: &Path) -> Result<PublishedAsset> {
        #[derive(Serialize)]
        struct CreateUploadRequest {
            new_asset_settings: NewAssetSettings,
            cors_origin: &'static str,
        }

        let request = CreateUploadRequest {
            new_asset_settings: NewAssetSettings::default(),
            cors_origin: "*",
        };

        let envelope: MuxEnvelope<MuxUpload> = self.post_json("/uploads", &request).await?;
        let upload = envelope.data;

        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(
            upload = %upload.id,
            size = bytes.len(),
            "uploading merged video"
        );

        let put_response = self
            .client
            .put(&upload.url)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .body(bytes)
            .send()
            .await?;
        if !put_response.status().is_success() {
            return Err(Error::provider(format!(
                "upload failed: {}",
                put_response.status()
            )));
        }

        // The upload resolves to an asset id asynchronously.
        for _ in 0..DEFAULT_UPLOAD_POLL_ATTEMPTS {
            let envelope: MuxEnvelope<MuxUpload> =
                self.get_json(&format!("/uploads/{}", upload.id)).await?;
            let status = envelope.data;

            if let Some(asset_id) = status.asset_id {
                let asset = self.fetch_asset(&asset_id).await?;
                let playback_id = Self::playback_id(&asset)?;
                return Ok(PublishedAsset {
                    asset_id: asset.id,
                    playback_id,
                });
            }

            if status.status == "errored" {
                return Err(Error::provider("upload processing failed"));
            }

            tokio::time::sleep(DEFAULT_UPLOAD_POLL_INTERVAL).await;
        }

        Err(Error::timeout("upload never resolved to an asset"))
    }

    async fn wait_until_ready(&self, asset_id: &str) -> Result<()> {
        for _ in 0..self.ready_poll_attempts {
            let asset = self.fetch_asset(asset_id).await?;

            match asset.status.as_str() {
                "ready" => return Ok(()),
                "errored" => return Err(Error::provider("asset processing failed")),
                _ => tokio::time::sleep(self.ready_poll_interval).await,
            }
        }

        Err(Error::timeout(format!(
            "asset {asset_id} was not ready after {} attempts",
            self.ready_poll_attempts
        )))
    }
}

/// HLS stream URL for a playback id.
pub fn stream_url(playback_id: &str) -> String {
    format!("https://stream.mux.com/{playback_id}.m3u8")
}

/// Thumbnail URL for a playback id, smart-cropped to 640x360.
pub fn thumbnail_url(playback_id: &str) -> String {
    format!(
        "https://image.mux.com/{playback_id}/thumbnail.webp?width=640&height=360&time=0&fit_mode=smartcrop"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_and_thumbnail_urls() {
        assert_eq!(stream_url("pb123"), "https://stream.mux.com/pb123.m3u8");
        assert!(thumbnail_url("pb123").starts_with("https://image.mux.com/pb123/thumbnail.webp"));
    }

    #[test]
    fn playback_id_requires_one() {
        let asset = MuxAsset {
            id: "a".into(),
            status: "ready".into(),
            playback_ids: vec![],
        };
        assert!(MuxClient::playback_id(&asset).is_err());

        let asset = MuxAsset {
            id: "a".into(),
            status: "ready".into(),
            playback_ids: vec![MuxPlaybackId { id: "pb".into() }],
        };
        assert_eq!(MuxClient::playback_id(&asset).unwrap(), "pb");
    }
}
