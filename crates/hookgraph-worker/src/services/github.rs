//! GitHub commit status client.

use async_trait::async_trait;
use hookgraph_core::status::{CommitState, CommitStatusApi, StatusUpdate};
use hookgraph_core::{Error, Result};
use serde::Serialize;
use std::time::Duration;

/// Request body of the create-status endpoint.
#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: CommitState,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

impl<'a> From<&'a StatusUpdate> for StatusBody<'a> {
    fn from(update: &'a StatusUpdate) -> Self {
        Self {
            state: update.state,
            description: &update.description,
            target_url: update.target_url.as_deref(),
            context: update.context.as_deref(),
        }
    }
}

pub struct GitHubStatusClient {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl GitHubStatusClient {
    pub fn new(api_url: String, access_token: String, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            api_url,
            access_token,
        })
    }
}

#[async_trait]
impl CommitStatusApi for GitHubStatusClient {
    async fn set_status(&self, update: &StatusUpdate) -> Result<()> {
        let url = super::endpoint(
            &self.api_url,
            &["repos", &update.user, &update.repo, "statuses", &update.sha],
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Accept", "application/vnd.github+json")
            .json(&StatusBody::from(update))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::StatusApi(format!(
                "Failed to set status on {}/{}@{}: {}",
                update.user, update.repo, update.sha, text
            )));
        }

        Ok(())
    }
}
