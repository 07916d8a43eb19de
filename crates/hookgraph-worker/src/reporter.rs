//! Graph submission and commit status reporting.
//!
//! Both entry points are error boundaries: failures are reported on the
//! commit where possible and logged, never returned to the router.

use hookgraph_config::{GraphCompiler, SystemConfig, taskclusterrc};
use hookgraph_core::SlugId;
use hookgraph_core::event::{GraphStateChange, InboundMessage, WebhookEvent};
use hookgraph_core::fetch::ConfigFetcher;
use hookgraph_core::scheduler::Scheduler;
use hookgraph_core::status::{CommitState, CommitStatusApi, StatusTable, StatusUpdate};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::HandlerError;

#[derive(Debug, Clone)]
pub struct ReporterSettings {
    pub inspector_url: String,
    pub status_context: String,
    pub status_map: StatusTable,
}

impl ReporterSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            inspector_url: config.inspector_url.clone(),
            status_context: config.status_context.clone(),
            status_map: config.status_map.clone(),
        }
    }
}

impl Default for ReporterSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

/// What handling a webhook event amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// The commit has no `.taskclusterrc`.
    NoConfig,
    /// No task is activated by this event.
    NoTasks,
    Submitted { graph_id: SlugId, tasks: usize },
    /// Handling failed. `reported` tells whether an error status was set.
    Failed { description: String, reported: bool },
}

/// What handling a graph state notification amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphStateOutcome {
    Updated(CommitState),
    Failed(String),
}

pub struct OutcomeReporter {
    compiler: GraphCompiler,
    fetcher: Arc<dyn ConfigFetcher>,
    scheduler: Arc<dyn Scheduler>,
    statuses: Arc<dyn CommitStatusApi>,
    settings: ReporterSettings,
}

impl OutcomeReporter {
    pub fn new(
        compiler: GraphCompiler,
        fetcher: Arc<dyn ConfigFetcher>,
        scheduler: Arc<dyn Scheduler>,
        statuses: Arc<dyn CommitStatusApi>,
        settings: ReporterSettings,
    ) -> Self {
        Self {
            compiler,
            fetcher,
            scheduler,
            statuses,
            settings,
        }
    }

    /// Resolve, compile and submit the graph for a pull request or push.
    pub async fn on_webhook(&self, event: &WebhookEvent) -> WebhookOutcome {
        info!(
            organization = %event.organization(),
            repository = %event.repository(),
            event = %event.event_type(),
            sha = ?event.head_sha(),
            "Handling webhook event"
        );

        match self.submit(event).await {
            Ok(outcome) => outcome,
            Err(HandlerError::Fetch(e)) if e.is_not_found() => {
                info!(
                    organization = %event.organization(),
                    repository = %event.repository(),
                    "No config file, nothing to do"
                );
                WebhookOutcome::NoConfig
            }
            Err(e) => {
                error!(
                    organization = %event.organization(),
                    repository = %event.repository(),
                    error = %e,
                    "Failed to build task graph"
                );
                self.report_failure(event, &e).await
            }
        }
    }

    async fn submit(&self, event: &WebhookEvent) -> Result<WebhookOutcome, HandlerError> {
        let url = self.compiler.config_url(event);
        let raw = taskclusterrc::resolve(self.fetcher.as_ref(), &url).await?;
        let graph = self.compiler.process_config(&raw, event)?;

        if graph.tasks.is_empty() {
            info!(
                organization = %event.organization(),
                repository = %event.repository(),
                event = %event.event_type(),
                "No tasks activated by event, not submitting"
            );
            return Ok(WebhookOutcome::NoTasks);
        }

        let graph_id = SlugId::new();
        self.scheduler.create_graph(&graph_id, &graph).await?;

        info!(
            graph_id = %graph_id,
            scheduler = self.scheduler.name(),
            tasks = graph.tasks.len(),
            "Submitted task graph"
        );

        Ok(WebhookOutcome::Submitted {
            graph_id,
            tasks: graph.tasks.len(),
        })
    }

    async fn report_failure(&self, event: &WebhookEvent, failure: &HandlerError) -> WebhookOutcome {
        let description = failure.to_string();

        let Some(sha) = event.head_sha() else {
            warn!("Event carries no head sha, cannot report failure");
            return WebhookOutcome::Failed {
                description,
                reported: false,
            };
        };

        let update = StatusUpdate::new(
            event.organization(),
            event.repository(),
            sha,
            CommitState::Error,
            &description,
        )
        .with_context(self.settings.status_context.clone());

        let reported = match self.statuses.set_status(&update).await {
            Ok(()) => true,
            Err(e) => {
                warn!(sha = %sha, error = %e, "Failed to report error status");
                false
            }
        };

        WebhookOutcome::Failed {
            description,
            reported,
        }
    }

    /// Project a scheduler state notification onto the commit's status.
    pub async fn on_graph_state(&self, message: &InboundMessage) -> GraphStateOutcome {
        let change = match GraphStateChange::from_message(message) {
            Ok(change) => change,
            Err(e) => {
                warn!(exchange = %message.exchange, error = %e, "Malformed graph state message");
                return GraphStateOutcome::Failed(e.to_string());
            }
        };

        let state = self.settings.status_map.map(change.status.state);
        let update = StatusUpdate::new(
            change.route.organization.clone(),
            change.route.repository.clone(),
            change.route.sha.clone(),
            state,
            format!("TaskGraph: {}", change.status.state),
        )
        .with_target_url(format!(
            "{}{}",
            self.settings.inspector_url, change.status.task_graph_id
        ))
        .with_context(self.settings.status_context.clone());

        match self.statuses.set_status(&update).await {
            Ok(()) => {
                info!(
                    route = %change.route,
                    graph_state = %change.status.state,
                    commit_state = %state,
                    "Updated commit status"
                );
                GraphStateOutcome::Updated(state)
            }
            Err(e) => {
                warn!(route = %change.route, error = %e, "Failed to update commit status");
                GraphStateOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use hookgraph_core::event::{EventDetails, PullRequestAction, PullRequestEvent};
    use hookgraph_core::fetch::FetchError;
    use hookgraph_core::graph::TaskGraph;
    use serde_json::json;
    use std::sync::Mutex;

    pub(crate) enum Config {
        Text(&'static str),
        Missing,
        Unreachable,
    }

    pub(crate) struct MockFetcher(pub Config);

    #[async_trait]
    impl ConfigFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            match &self.0 {
                Config::Text(text) => Ok(text.to_string()),
                Config::Missing => Err(FetchError::NotFound(url.to_string())),
                Config::Unreachable => {
                    Err(FetchError::Unavailable("connection refused".to_string()))
                }
            }
        }
    }

    #[derive(Default)]
    pub(crate) struct MockScheduler {
        pub graphs: Mutex<Vec<(SlugId, TaskGraph)>>,
        pub reject: bool,
    }

    #[async_trait]
    impl Scheduler for MockScheduler {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn create_graph(
            &self,
            graph_id: &SlugId,
            graph: &TaskGraph,
        ) -> hookgraph_core::Result<()> {
            if self.reject {
                return Err(hookgraph_core::Error::Scheduler("graph rejected".to_string()));
            }
            self.graphs
                .lock()
                .unwrap()
                .push((graph_id.clone(), graph.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct MockStatuses {
        pub updates: Mutex<Vec<StatusUpdate>>,
        pub fail: bool,
    }

    #[async_trait]
    impl CommitStatusApi for MockStatuses {
        async fn set_status(&self, update: &StatusUpdate) -> hookgraph_core::Result<()> {
            if self.fail {
                return Err(hookgraph_core::Error::StatusApi("validation failed".to_string()));
            }
            self.updates.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    fn reporter(
        config: Config,
        scheduler: Arc<MockScheduler>,
        statuses: Arc<MockStatuses>,
    ) -> OutcomeReporter {
        OutcomeReporter::new(
            GraphCompiler::default(),
            Arc::new(MockFetcher(config)),
            scheduler,
            statuses,
            ReporterSettings::default(),
        )
    }

    fn opened_event() -> WebhookEvent {
        WebhookEvent::PullRequest(PullRequestEvent {
            organization: "acme".to_string(),
            repository: "widgets".to_string(),
            action: PullRequestAction::Opened,
            details: EventDetails {
                event: Some("pull_request.opened".to_string()),
                branch: Some("main".to_string()),
                head_sha: Some("abc123".to_string()),
                head_user: Some("alice".to_string()),
                ..Default::default()
            },
        })
    }

    fn state_message(state: &str) -> InboundMessage {
        InboundMessage {
            exchange: format!("exchange/taskcluster-scheduler/v1/task-graph-{}", state),
            routing_key: "primary.graph-1.scheduler._._".to_string(),
            routes: vec!["taskcluster-github.acme.widgets.abc123".to_string()],
            payload: json!({"status": {"state": state, "taskGraphId": "graph-1"}}),
        }
    }

    #[tokio::test]
    async fn test_submits_compiled_graph() {
        let scheduler = Arc::new(MockScheduler::default());
        let statuses = Arc::new(MockStatuses::default());
        let reporter = reporter(Config::Text("image: node\n"), scheduler.clone(), statuses.clone());

        let outcome = reporter.on_webhook(&opened_event()).await;
        assert!(matches!(outcome, WebhookOutcome::Submitted { tasks: 1, .. }));

        let graphs = scheduler.graphs.lock().unwrap();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].1.routes, vec!["taskcluster-github.acme.widgets.abc123"]);
        assert!(statuses.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_config_is_a_no_op() {
        let scheduler = Arc::new(MockScheduler::default());
        let statuses = Arc::new(MockStatuses::default());
        let reporter = reporter(Config::Missing, scheduler.clone(), statuses.clone());

        assert_eq!(reporter.on_webhook(&opened_event()).await, WebhookOutcome::NoConfig);
        assert!(scheduler.graphs.lock().unwrap().is_empty());
        assert!(statuses.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_config_host_is_reported() {
        let statuses = Arc::new(MockStatuses::default());
        let reporter = reporter(
            Config::Unreachable,
            Arc::new(MockScheduler::default()),
            statuses.clone(),
        );

        let outcome = reporter.on_webhook(&opened_event()).await;
        assert!(matches!(outcome, WebhookOutcome::Failed { reported: true, .. }));

        let updates = statuses.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, CommitState::Error);
        assert_eq!(updates[0].sha, "abc123");
        assert!(updates[0].description.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_malformed_config_is_reported() {
        let statuses = Arc::new(MockStatuses::default());
        let reporter = reporter(
            Config::Text("tasks: nope\n"),
            Arc::new(MockScheduler::default()),
            statuses.clone(),
        );

        let outcome = reporter.on_webhook(&opened_event()).await;
        let WebhookOutcome::Failed { description, reported } = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert!(reported);
        assert!(description.contains("tasks"));

        let updates = statuses.updates.lock().unwrap();
        assert_eq!(updates[0].user, "acme");
        assert_eq!(updates[0].repo, "widgets");
        assert_eq!(updates[0].context.as_deref(), Some("TaskCluster"));
    }

    #[tokio::test]
    async fn test_rejected_submission_is_reported() {
        let scheduler = Arc::new(MockScheduler {
            reject: true,
            ..Default::default()
        });
        let statuses = Arc::new(MockStatuses::default());
        let reporter = reporter(Config::Text("image: node\n"), scheduler, statuses.clone());

        let outcome = reporter.on_webhook(&opened_event()).await;
        assert!(matches!(outcome, WebhookOutcome::Failed { reported: true, .. }));
        assert!(statuses.updates.lock().unwrap()[0].description.contains("graph rejected"));
    }

    #[tokio::test]
    async fn test_unactivated_graph_is_not_submitted() {
        let scheduler = Arc::new(MockScheduler::default());
        let reporter = reporter(
            Config::Text("extra:\n  github_events: ['push']\n"),
            scheduler.clone(),
            Arc::new(MockStatuses::default()),
        );

        assert_eq!(reporter.on_webhook(&opened_event()).await, WebhookOutcome::NoTasks);
        assert!(scheduler.graphs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_error_report_is_swallowed() {
        let statuses = Arc::new(MockStatuses {
            fail: true,
            ..Default::default()
        });
        let reporter = reporter(Config::Unreachable, Arc::new(MockScheduler::default()), statuses);

        let outcome = reporter.on_webhook(&opened_event()).await;
        assert!(matches!(outcome, WebhookOutcome::Failed { reported: false, .. }));
    }

    #[tokio::test]
    async fn test_graph_states_map_to_statuses() {
        let statuses = Arc::new(MockStatuses::default());
        let reporter = reporter(
            Config::Missing,
            Arc::new(MockScheduler::default()),
            statuses.clone(),
        );

        assert_eq!(
            reporter.on_graph_state(&state_message("running")).await,
            GraphStateOutcome::Updated(CommitState::Pending)
        );
        assert_eq!(
            reporter.on_graph_state(&state_message("blocked")).await,
            GraphStateOutcome::Updated(CommitState::Pending)
        );
        assert_eq!(
            reporter.on_graph_state(&state_message("finished")).await,
            GraphStateOutcome::Updated(CommitState::Success)
        );

        let updates = statuses.updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        let finished = &updates[2];
        assert_eq!(finished.user, "acme");
        assert_eq!(finished.repo, "widgets");
        assert_eq!(finished.sha, "abc123");
        assert_eq!(finished.description, "TaskGraph: finished");
        assert_eq!(
            finished.target_url.as_deref(),
            Some("https://tools.taskcluster.net/task-graph-inspector/#graph-1")
        );
        assert_eq!(finished.context.as_deref(), Some("TaskCluster"));
    }

    #[tokio::test]
    async fn test_graph_state_failures_are_swallowed() {
        let statuses = Arc::new(MockStatuses {
            fail: true,
            ..Default::default()
        });
        let reporter = reporter(Config::Missing, Arc::new(MockScheduler::default()), statuses);
        assert!(matches!(
            reporter.on_graph_state(&state_message("running")).await,
            GraphStateOutcome::Failed(_)
        ));

        let reporter = reporter_with_defaults();
        let mut message = state_message("running");
        message.routes = vec!["too.short".to_string()];
        assert!(matches!(
            reporter.on_graph_state(&message).await,
            GraphStateOutcome::Failed(_)
        ));
    }

    fn reporter_with_defaults() -> OutcomeReporter {
        reporter(
            Config::Missing,
            Arc::new(MockScheduler::default()),
            Arc::new(MockStatuses::default()),
        )
    }
}
