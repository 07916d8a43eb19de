//! Raw file downloads from the repository host.

use async_trait::async_trait;
use hookgraph_core::fetch::{ConfigFetcher, FetchError};
use reqwest::StatusCode;
use std::time::Duration;

pub struct RawConfigFetcher {
    client: reqwest::Client,
}

impl RawConfigFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ConfigFetcher for RawConfigFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(url.to_string())),
            status if !status.is_success() => Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
            _ => response
                .text()
                .await
                .map_err(|e| FetchError::Unavailable(e.to_string())),
        }
    }
}
