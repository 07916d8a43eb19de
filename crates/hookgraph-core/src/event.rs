//! Events consumed from the bus.
//!
//! Webhook events arrive already normalized by the webhook receiver; graph
//! state changes are published by the scheduler and addressed back to a
//! commit through the route the graph was submitted with.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Which webhook exchange an event was published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookKind {
    PullRequest,
    Push,
}

/// Pull request action carried in the routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PullRequestAction {
    Opened,
    Updated,
    /// Any action the worker does not build for (closed, labeled, ...).
    Other(String),
}

impl PullRequestAction {
    pub fn as_str(&self) -> &str {
        match self {
            PullRequestAction::Opened => "opened",
            PullRequestAction::Updated => "updated",
            PullRequestAction::Other(action) => action,
        }
    }
}

impl From<String> for PullRequestAction {
    fn from(action: String) -> Self {
        match action.as_str() {
            "opened" => PullRequestAction::Opened,
            "updated" => PullRequestAction::Updated,
            _ => PullRequestAction::Other(action),
        }
    }
}

impl From<PullRequestAction> for String {
    fn from(action: PullRequestAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit identity and event metadata shared by every webhook event.
///
/// Every field is optional on the wire; push events never carry pull request
/// details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    /// Event type string, e.g. `pull_request.opened` or `push`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub organization: String,
    pub repository: String,
    pub action: PullRequestAction,
    #[serde(default)]
    pub details: EventDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub organization: String,
    pub repository: String,
    #[serde(default)]
    pub details: EventDetails,
}

/// A normalized hosting platform event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WebhookEvent {
    PullRequest(PullRequestEvent),
    Push(PushEvent),
}

impl WebhookEvent {
    /// Decode a message payload published on the exchange for `kind`.
    pub fn from_payload(kind: WebhookKind, payload: Value) -> Result<Self> {
        let event = match kind {
            WebhookKind::PullRequest => serde_json::from_value(payload).map(Self::PullRequest),
            WebhookKind::Push => serde_json::from_value(payload).map(Self::Push),
        };
        event.map_err(|e| Error::InvalidInput(format!("malformed {:?} payload: {}", kind, e)))
    }

    pub fn kind(&self) -> WebhookKind {
        match self {
            WebhookEvent::PullRequest(_) => WebhookKind::PullRequest,
            WebhookEvent::Push(_) => WebhookKind::Push,
        }
    }

    pub fn organization(&self) -> &str {
        match self {
            WebhookEvent::PullRequest(e) => &e.organization,
            WebhookEvent::Push(e) => &e.organization,
        }
    }

    pub fn repository(&self) -> &str {
        match self {
            WebhookEvent::PullRequest(e) => &e.repository,
            WebhookEvent::Push(e) => &e.repository,
        }
    }

    pub fn action(&self) -> Option<&PullRequestAction> {
        match self {
            WebhookEvent::PullRequest(e) => Some(&e.action),
            WebhookEvent::Push(_) => None,
        }
    }

    pub fn details(&self) -> &EventDetails {
        match self {
            WebhookEvent::PullRequest(e) => &e.details,
            WebhookEvent::Push(e) => &e.details,
        }
    }

    /// The event type string activation patterns are matched against.
    ///
    /// Falls back to a type derived from the exchange when the receiver did
    /// not fill in `details.event`.
    pub fn event_type(&self) -> String {
        if let Some(event) = &self.details().event {
            return event.clone();
        }
        match self {
            WebhookEvent::PullRequest(e) => format!("pull_request.{}", e.action),
            WebhookEvent::Push(_) => "push".to_string(),
        }
    }

    pub fn head_sha(&self) -> Option<&str> {
        self.details().head_sha.as_deref()
    }
}

/// A raw message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Fully qualified exchange the message was published on.
    pub exchange: String,
    #[serde(default)]
    pub routing_key: String,
    /// Extra routes (carbon copies) the message was delivered through.
    #[serde(default)]
    pub routes: Vec<String>,
    pub payload: Value,
}

/// `prefix.organization.repository.sha`, the route a graph is submitted with
/// so that its state changes can be traced back to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRoute {
    pub prefix: String,
    pub organization: String,
    pub repository: String,
    pub sha: String,
}

impl CommitRoute {
    pub fn new(
        prefix: impl Into<String>,
        organization: impl Into<String>,
        repository: impl Into<String>,
        sha: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            organization: organization.into(),
            repository: repository.into(),
            sha: sha.into(),
        }
    }
}

impl std::fmt::Display for CommitRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.prefix, self.organization, self.repository, self.sha
        )
    }
}

impl std::str::FromStr for CommitRoute {
    type Err = Error;

    fn from_str(route: &str) -> Result<Self> {
        let segments: Vec<&str> = route.split('.').collect();
        match segments.as_slice() {
            [prefix, organization, repository, sha]
                if segments.iter().all(|s| !s.is_empty()) =>
            {
                Ok(Self::new(*prefix, *organization, *repository, *sha))
            }
            _ => Err(Error::InvalidRoute(format!(
                "expected 4 dot-separated segments, got '{}'",
                route
            ))),
        }
    }
}

/// Scheduler-side graph states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphState {
    Running,
    Blocked,
    Finished,
}

impl GraphState {
    pub const ALL: [GraphState; 3] = [
        GraphState::Running,
        GraphState::Blocked,
        GraphState::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphState::Running => "running",
            GraphState::Blocked => "blocked",
            GraphState::Finished => "finished",
        }
    }
}

impl std::fmt::Display for GraphState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GraphState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(GraphState::Running),
            "blocked" => Ok(GraphState::Blocked),
            "finished" => Ok(GraphState::Finished),
            _ => Err(Error::InvalidInput(format!("unknown graph state: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStatus {
    pub state: GraphState,
    pub task_graph_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GraphStatePayload {
    status: GraphStatus,
}

/// A task graph state notification, resolved to the commit it reports on.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStateChange {
    pub route: CommitRoute,
    pub status: GraphStatus,
}

impl GraphStateChange {
    pub fn from_message(message: &InboundMessage) -> Result<Self> {
        let route = message
            .routes
            .first()
            .ok_or_else(|| Error::InvalidRoute("message carries no routes".to_string()))?
            .parse()?;
        let payload: GraphStatePayload = serde_json::from_value(message.payload.clone())
            .map_err(|e| Error::InvalidInput(format!("malformed graph status: {}", e)))?;

        Ok(Self {
            route,
            status: payload.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pull_request_payload() {
        let payload = json!({
            "organization": "acme",
            "repository": "widgets",
            "action": "opened",
            "details": {
                "event": "pull_request.opened",
                "headSha": "abc123",
                "pullNumber": 7
            },
            "version": 1
        });

        let event = WebhookEvent::from_payload(WebhookKind::PullRequest, payload).unwrap();
        assert_eq!(event.kind(), WebhookKind::PullRequest);
        assert_eq!(event.action(), Some(&PullRequestAction::Opened));
        assert_eq!(event.head_sha(), Some("abc123"));
        assert_eq!(event.details().pull_number, Some(7));
        assert_eq!(event.event_type(), "pull_request.opened");
    }

    #[test]
    fn test_unknown_action_is_kept() {
        let action: PullRequestAction = "labeled".to_string().into();
        assert_eq!(action, PullRequestAction::Other("labeled".to_string()));
        assert_eq!(action.to_string(), "labeled");
    }

    #[test]
    fn test_event_type_fallback() {
        let payload = json!({"organization": "acme", "repository": "widgets"});
        let event = WebhookEvent::from_payload(WebhookKind::Push, payload).unwrap();
        assert_eq!(event.event_type(), "push");
        assert_eq!(event.action(), None);
    }

    #[test]
    fn test_pull_request_requires_action() {
        let payload = json!({"organization": "acme", "repository": "widgets"});
        let result = WebhookEvent::from_payload(WebhookKind::PullRequest, payload);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_commit_route() {
        let route: CommitRoute = "taskcluster-github.acme.widgets.abc123".parse().unwrap();
        assert_eq!(route.organization, "acme");
        assert_eq!(route.repository, "widgets");
        assert_eq!(route.sha, "abc123");
        assert_eq!(route.to_string(), "taskcluster-github.acme.widgets.abc123");

        assert!("a.b.c".parse::<CommitRoute>().is_err());
        assert!("a.b.c.d.e".parse::<CommitRoute>().is_err());
        assert!("a..c.d".parse::<CommitRoute>().is_err());
    }

    #[test]
    fn test_graph_state_change_from_message() {
        let message = InboundMessage {
            exchange: "exchange/taskcluster-scheduler/v1/task-graph-finished".to_string(),
            routing_key: "primary.graph.scheduler._._".to_string(),
            routes: vec!["taskcluster-github.acme.widgets.abc123".to_string()],
            payload: json!({"status": {"state": "finished", "taskGraphId": "graph-1"}}),
        };

        let change = GraphStateChange::from_message(&message).unwrap();
        assert_eq!(change.status.state, GraphState::Finished);
        assert_eq!(change.status.task_graph_id, "graph-1");
        assert_eq!(change.route.sha, "abc123");
    }

    #[test]
    fn test_graph_state_change_without_routes() {
        let message = InboundMessage {
            exchange: "exchange/taskcluster-scheduler/v1/task-graph-running".to_string(),
            routing_key: String::new(),
            routes: vec![],
            payload: json!({"status": {"state": "running", "taskGraphId": "graph-1"}}),
        };

        assert!(matches!(
            GraphStateChange::from_message(&message),
            Err(Error::InvalidRoute(_))
        ));
    }
}
