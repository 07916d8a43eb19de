//! Local compilation of a `.taskclusterrc`.

use anyhow::Result;
use hookgraph_config::{GraphCompiler, SystemConfig};
use hookgraph_core::event::{
    EventDetails, PullRequestAction, PullRequestEvent, PushEvent, WebhookEvent,
};
use std::path::Path;

/// The commit and event to compile for.
pub struct Target {
    pub event: String,
    pub organization: String,
    pub repository: String,
    pub branch: String,
    pub sha: Option<String>,
    pub user: Option<String>,
}

impl Target {
    fn into_event(self) -> WebhookEvent {
        let action = self
            .event
            .strip_prefix("pull_request.")
            .map(|action| PullRequestAction::from(action.to_string()));

        let details = EventDetails {
            event: Some(self.event),
            branch: Some(self.branch),
            head_sha: self.sha,
            head_user: self.user,
            ..Default::default()
        };

        match action {
            Some(action) => WebhookEvent::PullRequest(PullRequestEvent {
                organization: self.organization,
                repository: self.repository,
                action,
                details,
            }),
            None => WebhookEvent::Push(PushEvent {
                organization: self.organization,
                repository: self.repository,
                details,
            }),
        }
    }
}

pub fn run(config: &SystemConfig, path: &Path, target: Target) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let event = target.into_event();
    let compiler = GraphCompiler::new(config.compiler_options());

    match compiler.process_config(&content, &event) {
        Ok(graph) => {
            if graph.tasks.is_empty() {
                eprintln!("No tasks are activated by {}", event.event_type());
            }
            println!("{}", serde_json::to_string_pretty(&graph)?);
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
