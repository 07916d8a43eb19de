//! Task graph compilation.
//!
//! Turns a `.taskclusterrc` and the event that triggered it into a complete
//! task graph: skeleton defaults, then the user's definitions, then
//! event-derived overrides, keeping only the tasks activated by the event.

use chrono::{DateTime, Utc};
use hookgraph_core::SlugId;
use hookgraph_core::event::{CommitRoute, WebhookEvent};
use hookgraph_core::graph::{
    GraphLayer, GraphTask, MetadataLayer, PayloadLayer, Task, TaskGraph, TaskLayer,
};
use regex::RegexBuilder;
use serde_json::{Map, Value};
use tracing::debug;

use crate::taskclusterrc::{self, ConfigIdentity, DEFAULT_RAW_HOST};
use crate::{ConfigError, ConfigResult};

/// Prefix of the route graphs are submitted with.
pub const DEFAULT_ROUTE_PREFIX: &str = "taskcluster-github";

/// Domain appended to the head user to form the graph owner.
pub const DEFAULT_OWNER_DOMAIN: &str = "github.taskcluster.net";

/// Which of a task's activation patterns are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationPolicy {
    /// Keep the task if any pattern matches.
    #[default]
    Any,
    /// Only the first pattern decides. Later patterns are ignored.
    FirstOnly,
}

impl std::str::FromStr for ActivationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "any" => Ok(ActivationPolicy::Any),
            "first" => Ok(ActivationPolicy::FirstOnly),
            _ => Err(ConfigError::InvalidValue {
                field: "activation".to_string(),
                message: format!("expected 'any' or 'first', got '{}'", s),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    pub raw_host: String,
    pub owner_domain: String,
    pub route_prefix: String,
    pub activation: ActivationPolicy,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            raw_host: DEFAULT_RAW_HOST.to_string(),
            owner_domain: DEFAULT_OWNER_DOMAIN.to_string(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            activation: ActivationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphCompiler {
    options: CompilerOptions,
}

impl GraphCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Where the configuration for `event`'s commit lives.
    pub fn config_url(&self, event: &WebhookEvent) -> String {
        taskclusterrc::build_config_url(&ConfigIdentity::from(event), &self.options.raw_host)
    }

    /// Compile `raw` into a task graph for `event`.
    pub fn process_config(&self, raw: &str, event: &WebhookEvent) -> ConfigResult<TaskGraph> {
        self.process_config_at(raw, event, Utc::now())
    }

    /// Like [`GraphCompiler::process_config`], with an explicit creation time.
    pub fn process_config_at(
        &self,
        raw: &str,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> ConfigResult<TaskGraph> {
        let definitions = taskclusterrc::parse_document(raw)?;
        let event_type = event.event_type();

        let mut graph = TaskGraph::skeleton();
        graph.apply(self.graph_override(event));

        for definition in definitions {
            let mut task = Task::skeleton(now);
            task.apply(definition);
            task.apply(self.task_override(event));

            if !self.is_activated(&task, &event_type)? {
                debug!(
                    event = %event_type,
                    task = %task.metadata.name,
                    patterns = ?task.activation_patterns(),
                    "Task not activated by event, skipping"
                );
                continue;
            }

            graph.tasks.push(GraphTask {
                task_id: SlugId::new(),
                task,
            });
        }

        Ok(graph)
    }

    /// The route status updates for this graph are addressed by.
    pub fn commit_route(&self, event: &WebhookEvent) -> CommitRoute {
        CommitRoute::new(
            self.options.route_prefix.clone(),
            event.organization(),
            event.repository(),
            event.head_sha().unwrap_or_default(),
        )
    }

    fn owner(&self, event: &WebhookEvent) -> Option<String> {
        event
            .details()
            .head_user
            .as_ref()
            .map(|user| format!("{}@{}", user, self.options.owner_domain))
    }

    fn metadata_override(&self, event: &WebhookEvent) -> MetadataLayer {
        MetadataLayer {
            owner: self.owner(event),
            source: Some(self.config_url(event)),
            ..Default::default()
        }
    }

    fn graph_override(&self, event: &WebhookEvent) -> GraphLayer {
        GraphLayer {
            metadata: Some(self.metadata_override(event)),
            scopes: None,
            routes: Some(vec![self.commit_route(event).to_string()]),
        }
    }

    fn task_override(&self, event: &WebhookEvent) -> TaskLayer {
        let details = event.details();
        let env_entries = [
            ("GITHUB_EVENT", Some(event.event_type())),
            ("GITHUB_BRANCH", details.branch.clone()),
            ("GITHUB_PULL_REQUEST", details.pull_number.map(|n| n.to_string())),
            ("GITHUB_BASE_REPO_URL", details.base_repo_url.clone()),
            ("GITHUB_BASE_USER", details.base_user.clone()),
            ("GITHUB_BASE_SHA", details.base_sha.clone()),
            ("GITHUB_BASE_BRANCH", details.branch.clone()),
            ("GITHUB_BASE_REF", details.base_ref.clone()),
            ("GITHUB_HEAD_REPO_URL", details.head_repo_url.clone()),
            ("GITHUB_HEAD_USER", details.head_user.clone()),
            ("GITHUB_HEAD_SHA", details.head_sha.clone()),
            ("GITHUB_HEAD_BRANCH", details.head_branch.clone()),
            ("GITHUB_HEAD_REF", details.head_ref.clone()),
        ];

        let env: Map<String, Value> = env_entries
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), Value::String(v))))
            .collect();

        TaskLayer {
            metadata: Some(self.metadata_override(event)),
            payload: Some(PayloadLayer {
                env: Some(env),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn is_activated(&self, task: &Task, event_type: &str) -> ConfigResult<bool> {
        let patterns = task.activation_patterns();
        let evaluated = match self.options.activation {
            ActivationPolicy::Any => patterns,
            ActivationPolicy::FirstOnly => &patterns[..patterns.len().min(1)],
        };

        for pattern in evaluated {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            if regex.is_match(event_type) {
                return Ok(true);
            }
        }

        Ok(false)
    }
}
