//! Commit statuses on the hosting platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::event::GraphState;
use crate::{Error, Result};

/// Longest description the status API accepts.
pub const MAX_DESCRIPTION_LEN: usize = 140;

/// Commit status vocabulary of the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Error,
    Failure,
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommitState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Error => "error",
            CommitState::Failure => "failure",
        }
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommitState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(CommitState::Pending),
            "success" => Ok(CommitState::Success),
            "error" => Ok(CommitState::Error),
            "failure" => Ok(CommitState::Failure),
            _ => Err(Error::InvalidInput(format!("unknown commit state: {}", s))),
        }
    }
}

/// Maps scheduler graph states onto commit states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    states: HashMap<GraphState, CommitState>,
}

impl Default for StatusTable {
    fn default() -> Self {
        Self {
            states: HashMap::from([
                (GraphState::Running, CommitState::Pending),
                (GraphState::Blocked, CommitState::Pending),
                (GraphState::Finished, CommitState::Success),
            ]),
        }
    }
}

impl StatusTable {
    pub fn with(mut self, graph_state: GraphState, commit_state: CommitState) -> Self {
        self.states.insert(graph_state, commit_state);
        self
    }

    pub fn map(&self, graph_state: GraphState) -> CommitState {
        self.states
            .get(&graph_state)
            .copied()
            .unwrap_or(CommitState::Pending)
    }
}

/// A status to set on one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub user: String,
    pub repo: String,
    pub sha: String,
    pub state: CommitState,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl StatusUpdate {
    pub fn new(
        user: impl Into<String>,
        repo: impl Into<String>,
        sha: impl Into<String>,
        state: CommitState,
        description: impl AsRef<str>,
    ) -> Self {
        Self {
            user: user.into(),
            repo: repo.into(),
            sha: sha.into(),
            state,
            description: truncate(description.as_ref(), MAX_DESCRIPTION_LEN),
            target_url: None,
            context: None,
        }
    }

    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Commit status API of the hosting platform.
#[async_trait]
pub trait CommitStatusApi: Send + Sync {
    /// Set a status. Application-level rejections are reported as
    /// [`Error::StatusApi`].
    async fn set_status(&self, update: &StatusUpdate) -> Result<()>;
}
