//! Task graph scheduler API client.

use async_trait::async_trait;
use hookgraph_core::graph::TaskGraph;
use hookgraph_core::scheduler::Scheduler;
use hookgraph_core::{Error, Result, SlugId};
use std::time::Duration;

pub struct SchedulerClient {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl SchedulerClient {
    pub fn new(
        base_url: String,
        access_token: Option<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
            base_url,
            access_token,
        })
    }
}

#[async_trait]
impl Scheduler for SchedulerClient {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn create_graph(&self, graph_id: &SlugId, graph: &TaskGraph) -> Result<()> {
        let url = super::endpoint(&self.base_url, &["task-graph", graph_id.as_str()]);

        let mut request = self.client.put(&url).json(graph);
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Scheduler(format!(
                "createTaskGraph failed with {}: {}",
                status, text
            )));
        }

        Ok(())
    }
}
