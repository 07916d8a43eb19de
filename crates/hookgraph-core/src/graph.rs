//! Task graph types and the layered merge used to compile them.
//!
//! A compiled task is built by applying layers on top of a skeleton:
//! skeleton defaults, then the user's task definition, then event-derived
//! overrides. Each layer only sets the fields it carries. Scalars and lists
//! are replaced, nested objects merge field by field, and an absent or `null`
//! value never clears what an earlier layer set.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::SlugId;

/// Activation pattern a task gets when its definition names none.
pub const DEFAULT_ACTIVATION_PATTERN: &str = "pull_request.*";

const DEFAULT_OWNER: &str = "taskcluster-github@mozilla.com";
const DEFAULT_NAME: &str = "taskcluster-github graph";
const DEFAULT_DESCRIPTION: &str = "A task graph submitted by the taskcluster-github worker";
const DEFAULT_SOURCE: &str = "https://github.com/taskcluster/taskcluster-github";

/// Recursively merge `source` into `target`.
pub fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        if value.is_null() {
            continue;
        }
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_optional_map(target: &mut Map<String, Value>, source: Option<Map<String, Value>>) {
    if let Some(source) = source {
        merge_maps(target, source);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub owner: String,
    pub name: String,
    pub description: String,
    pub source: String,
}

impl Metadata {
    pub fn skeleton() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    pub fn apply(&mut self, layer: MetadataLayer) {
        if let Some(owner) = layer.owner {
            self.owner = owner;
        }
        if let Some(name) = layer.name {
            self.name = name;
        }
        if let Some(description) = layer.description {
            self.description = description;
        }
        if let Some(source) = layer.source {
            self.source = source;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetadataLayer {
    pub owner: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub max_run_time: u64,
    #[serde(default)]
    pub features: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub env: Map<String, Value>,
    /// Worker specific settings (image, command, artifacts, ...).
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl TaskPayload {
    pub fn apply(&mut self, layer: PayloadLayer) {
        if let Some(max_run_time) = layer.max_run_time {
            self.max_run_time = max_run_time;
        }
        merge_optional_map(&mut self.features, layer.features);
        merge_optional_map(&mut self.env, layer.env);
        merge_maps(&mut self.rest, layer.rest);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadLayer {
    pub max_run_time: Option<u64>,
    pub features: Option<Map<String, Value>>,
    pub env: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExtra {
    /// Activation patterns, matched against the triggering event type.
    pub github_events: Vec<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl TaskExtra {
    pub fn apply(&mut self, layer: ExtraLayer) {
        if let Some(github_events) = layer.github_events {
            self.github_events = github_events;
        }
        merge_maps(&mut self.rest, layer.rest);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtraLayer {
    pub github_events: Option<Vec<String>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A task definition as submitted to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub provisioner_id: String,
    pub worker_type: String,
    pub retries: u32,
    pub created: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub metadata: Metadata,
    pub payload: TaskPayload,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
    pub extra: TaskExtra,
    /// Any other top-level field of the user's definition.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Task {
    /// The minimum viable task. Deadline is a day after `now`.
    pub fn skeleton(now: DateTime<Utc>) -> Self {
        Self {
            provisioner_id: "aws-provisioner-v1".to_string(),
            worker_type: "b2gtest".to_string(),
            retries: 5,
            created: now,
            deadline: now + Duration::hours(24),
            metadata: Metadata::skeleton(),
            payload: TaskPayload {
                max_run_time: 7200,
                features: Map::new(),
                env: Map::new(),
                rest: Map::new(),
            },
            scopes: Vec::new(),
            routes: Vec::new(),
            extra: TaskExtra {
                github_events: vec![DEFAULT_ACTIVATION_PATTERN.to_string()],
                rest: Map::new(),
            },
            rest: Map::new(),
        }
    }

    pub fn apply(&mut self, layer: TaskLayer) {
        if let Some(provisioner_id) = layer.provisioner_id {
            self.provisioner_id = provisioner_id;
        }
        if let Some(worker_type) = layer.worker_type {
            self.worker_type = worker_type;
        }
        if let Some(retries) = layer.retries {
            self.retries = retries;
        }
        if let Some(created) = layer.created {
            self.created = created;
        }
        if let Some(deadline) = layer.deadline {
            self.deadline = deadline;
        }
        if let Some(metadata) = layer.metadata {
            self.metadata.apply(metadata);
        }
        if let Some(payload) = layer.payload {
            self.payload.apply(payload);
        }
        if let Some(scopes) = layer.scopes {
            self.scopes = scopes;
        }
        if let Some(routes) = layer.routes {
            self.routes = routes;
        }
        if let Some(extra) = layer.extra {
            self.extra.apply(extra);
        }
        merge_maps(&mut self.rest, layer.rest);
    }

    pub fn activation_patterns(&self) -> &[String] {
        &self.extra.github_events
    }
}

/// A partial task: a user definition or an event-derived override.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLayer {
    pub provisioner_id: Option<String>,
    pub worker_type: Option<String>,
    pub retries: Option<u32>,
    pub created: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub metadata: Option<MetadataLayer>,
    pub payload: Option<PayloadLayer>,
    pub scopes: Option<Vec<String>>,
    pub routes: Option<Vec<String>>,
    pub extra: Option<ExtraLayer>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphTask {
    pub task_id: SlugId,
    pub task: Task,
}

/// A complete task graph, ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub tasks: Vec<GraphTask>,
    pub scopes: Vec<String>,
    pub metadata: Metadata,
    #[serde(default)]
    pub routes: Vec<String>,
}

impl TaskGraph {
    /// The minimum viable task graph.
    pub fn skeleton() -> Self {
        Self {
            tasks: Vec::new(),
            scopes: vec![
                "queue:*".to_string(),
                "docker-worker:*".to_string(),
                "scheduler:*".to_string(),
            ],
            metadata: Metadata::skeleton(),
            routes: Vec::new(),
        }
    }

    pub fn apply(&mut self, layer: GraphLayer) {
        if let Some(metadata) = layer.metadata {
            self.metadata.apply(metadata);
        }
        if let Some(scopes) = layer.scopes {
            self.scopes = scopes;
        }
        if let Some(routes) = layer.routes {
            self.routes = routes;
        }
    }
}

/// Graph-level override. Only ever derived from the event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphLayer {
    pub metadata: Option<MetadataLayer>,
    pub scopes: Option<Vec<String>>,
    pub routes: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(value: Value) -> TaskLayer {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_task_skeleton_defaults() {
        let now = Utc::now();
        let task = Task::skeleton(now);
        assert_eq!(task.retries, 5);
        assert_eq!(task.deadline - task.created, Duration::hours(24));
        assert_eq!(task.activation_patterns(), ["pull_request.*"]);
        assert_eq!(task.payload.max_run_time, 7200);
    }

    #[test]
    fn test_layers_apply_in_order() {
        let mut task = Task::skeleton(Utc::now());
        task.apply(layer(json!({
            "retries": 3,
            "workerType": "linux",
            "payload": {"env": {"FOO": "user", "BAR": "user"}}
        })));
        task.apply(layer(json!({
            "payload": {"env": {"FOO": "override"}}
        })));

        assert_eq!(task.retries, 3);
        assert_eq!(task.worker_type, "linux");
        assert_eq!(task.provisioner_id, "aws-provisioner-v1");
        assert_eq!(task.payload.env["FOO"], "override");
        assert_eq!(task.payload.env["BAR"], "user");
    }

    #[test]
    fn test_null_never_clobbers() {
        let mut task = Task::skeleton(Utc::now());
        task.apply(layer(json!({
            "workerType": null,
            "metadata": {"name": null},
            "payload": {"maxRunTime": null, "features": {"taskclusterProxy": true}}
        })));

        assert_eq!(task.worker_type, "b2gtest");
        assert_eq!(task.metadata.name, "taskcluster-github graph");
        assert_eq!(task.payload.max_run_time, 7200);
        assert_eq!(task.payload.features["taskclusterProxy"], true);
    }

    #[test]
    fn test_unknown_fields_are_carried() {
        let mut task = Task::skeleton(Utc::now());
        task.apply(layer(json!({
            "image": "node",
            "command": ["test"],
            "extra": {"github_events": ["push"], "treeherder": {"symbol": "t"}}
        })));

        let rendered = serde_json::to_value(&task).unwrap();
        assert_eq!(rendered["image"], "node");
        assert_eq!(rendered["command"], json!(["test"]));
        assert_eq!(rendered["extra"]["github_events"], json!(["push"]));
        assert_eq!(rendered["extra"]["treeherder"]["symbol"], "t");
        assert_eq!(rendered["provisionerId"], "aws-provisioner-v1");
    }

    #[test]
    fn test_merge_maps_recurses() {
        let mut target = json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]})
            .as_object()
            .cloned()
            .unwrap();
        let source = json!({"a": {"c": 3}, "list": [9]}).as_object().cloned().unwrap();

        merge_maps(&mut target, source);
        assert_eq!(Value::Object(target), json!({"a": {"b": 1, "c": 3}, "list": [9]}));
    }

    #[test]
    fn test_graph_skeleton() {
        let mut graph = TaskGraph::skeleton();
        graph.apply(GraphLayer {
            metadata: Some(MetadataLayer {
                owner: Some("alice@github.taskcluster.net".to_string()),
                ..Default::default()
            }),
            scopes: None,
            routes: Some(vec!["taskcluster-github.acme.widgets.abc123".to_string()]),
        });

        assert!(graph.tasks.is_empty());
        assert_eq!(graph.scopes.len(), 3);
        assert_eq!(graph.metadata.owner, "alice@github.taskcluster.net");
        assert_eq!(graph.metadata.source, DEFAULT_SOURCE);
        assert_eq!(graph.routes.len(), 1);
    }
}
