use crate::error::{IngestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// 播放列表与分片获取能力
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_playlist(&self, url: &Url) -> Result<String>;

    async fn fetch_segment(&self, url: &Url) -> Result<Bytes>;
}

/// 基于 reqwest 的 HTTP 获取
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| IngestError::Playlist(format!("failed to build http client: {}", e)))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &Url) -> std::result::Result<reqwest::Response, reqwest::Error> {
        self.client.get(url.clone()).send().await?.error_for_status()
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch_playlist(&self, url: &Url) -> Result<String> {
        let response = self
            .get(url)
            .await
            .map_err(|e| IngestError::Playlist(format!("{}: {}", url, e)))?;
        let text = response
            .text()
            .await
            .map_err(|e| IngestError::Playlist(format!("{}: {}", url, e)))?;
        debug!(url = %url, bytes = text.len(), "Playlist fetched");
        Ok(text)
    }

    async fn fetch_segment(&self, url: &Url) -> Result<Bytes> {
        let response = self
            .get(url)
            .await
            .map_err(|e| IngestError::download(url, e))?;
        response
            .bytes()
            .await
            .map_err(|e| IngestError::download(url, e))
    }
}
