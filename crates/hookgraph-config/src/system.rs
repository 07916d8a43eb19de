//! Service configuration for the worker, written in KDL.
//!
//! ```kdl
//! exchange-prefix "exchange/taskcluster-github/v1/"
//! route-prefix "taskcluster-github"
//! activation "first"
//! scheduler base-url="https://scheduler.taskcluster.net/v1"
//! status-map {
//!     blocked "failure"
//! }
//! ```
//!
//! Every node is optional. Secrets are never read from this file.

use hookgraph_core::event::GraphState;
use hookgraph_core::exchange::{DEFAULT_EXCHANGE_PREFIX, DEFAULT_SCHEDULER_EXCHANGE_PREFIX};
use hookgraph_core::status::{CommitState, StatusTable};
use kdl::{KdlDocument, KdlNode};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::compiler::{
    ActivationPolicy, CompilerOptions, DEFAULT_OWNER_DOMAIN, DEFAULT_ROUTE_PREFIX,
};
use crate::taskclusterrc::DEFAULT_RAW_HOST;
use crate::{ConfigError, ConfigResult};

pub const DEFAULT_INSPECTOR_URL: &str = "https://tools.taskcluster.net/task-graph-inspector/#";
pub const DEFAULT_STATUS_CONTEXT: &str = "TaskCluster";
pub const DEFAULT_SCHEDULER_URL: &str = "https://scheduler.taskcluster.net/v1";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Worker-wide configuration.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub exchange_prefix: String,
    pub scheduler_exchange_prefix: String,
    pub route_prefix: String,
    pub raw_host: String,
    pub owner_domain: String,
    /// Graph ids are appended to this to link statuses to the inspector.
    pub inspector_url: String,
    pub status_context: String,
    pub activation: ActivationPolicy,
    pub request_timeout: Duration,
    /// Validated base URLs of the scheduler and GitHub APIs.
    pub scheduler_url: String,
    pub github_api_url: String,
    pub status_map: StatusTable,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            exchange_prefix: DEFAULT_EXCHANGE_PREFIX.to_string(),
            scheduler_exchange_prefix: DEFAULT_SCHEDULER_EXCHANGE_PREFIX.to_string(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            raw_host: DEFAULT_RAW_HOST.to_string(),
            owner_domain: DEFAULT_OWNER_DOMAIN.to_string(),
            inspector_url: DEFAULT_INSPECTOR_URL.to_string(),
            status_context: DEFAULT_STATUS_CONTEXT.to_string(),
            activation: ActivationPolicy::default(),
            request_timeout: Duration::from_secs(30),
            scheduler_url: DEFAULT_SCHEDULER_URL.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            status_map: StatusTable::default(),
        }
    }
}

impl SystemConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        parse_system_config(&content)
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            raw_host: self.raw_host.clone(),
            owner_domain: self.owner_domain.clone(),
            route_prefix: self.route_prefix.clone(),
            activation: self.activation,
        }
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "exchange-prefix" => config.exchange_prefix = required_string(node)?,
            "scheduler-exchange-prefix" => {
                config.scheduler_exchange_prefix = required_string(node)?
            }
            "route-prefix" => {
                let prefix = required_string(node)?;
                if prefix.contains('.') {
                    return Err(invalid("route-prefix", "must be a single routing key word"));
                }
                config.route_prefix = prefix;
            }
            "raw-host" => config.raw_host = required_string(node)?,
            "owner-domain" => config.owner_domain = required_string(node)?,
            "inspector-url" => config.inspector_url = required_string(node)?,
            "status-context" => config.status_context = required_string(node)?,
            "activation" => config.activation = required_string(node)?.parse()?,
            "request-timeout-secs" => {
                let secs = get_first_integer_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("request-timeout-secs".to_string()))?;
                let secs = u64::try_from(secs)
                    .map_err(|_| invalid("request-timeout-secs", "must not be negative"))?;
                config.request_timeout = Duration::from_secs(secs);
            }
            "scheduler" => {
                if let Some(url) = get_string_prop(node, "base-url") {
                    config.scheduler_url = parse_url("scheduler base-url", &url)?;
                }
            }
            "github" => {
                if let Some(url) = get_string_prop(node, "api-url") {
                    config.github_api_url = parse_url("github api-url", &url)?;
                }
            }
            "status-map" => config.status_map = parse_status_map(node)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_status_map(node: &KdlNode) -> ConfigResult<StatusTable> {
    let mut table = StatusTable::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let graph_state: GraphState = child
                .name()
                .value()
                .parse()
                .map_err(|e: hookgraph_core::Error| invalid("status-map", &e.to_string()))?;
            let commit_state: CommitState = required_string(child)?
                .parse()
                .map_err(|e: hookgraph_core::Error| invalid("status-map", &e.to_string()))?;
            table = table.with(graph_state, commit_state);
        }
    }

    Ok(table)
}

fn parse_url(field: &str, url: &str) -> ConfigResult<String> {
    let parsed = Url::parse(url).map_err(|e| invalid(field, &e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(field, "must be an http(s) url"));
    }
    Ok(parsed.into())
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// Helper functions for extracting values from KDL nodes

fn required_string(node: &KdlNode) -> ConfigResult<String> {
    get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField(node.name().value().to_string()))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_system_config("").unwrap();
        assert_eq!(config.exchange_prefix, "exchange/taskcluster-github/v1/");
        assert_eq!(config.route_prefix, "taskcluster-github");
        assert_eq!(config.activation, ActivationPolicy::Any);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.scheduler_url, "https://scheduler.taskcluster.net/v1");
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.status_map, StatusTable::default());
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            exchange-prefix "exchange/test-github/v1/"
            route-prefix "test-github"
            raw-host "raw.example.test"
            owner-domain "example.test"
            inspector-url "https://inspector.example.test/#"
            status-context "CI"
            activation "first"
            request-timeout-secs 5
            scheduler base-url="https://scheduler.example.test/v1"
            github api-url="https://github.example.test/api/v3"
            status-map {
                blocked "failure"
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.exchange_prefix, "exchange/test-github/v1/");
        assert_eq!(config.status_context, "CI");
        assert_eq!(config.activation, ActivationPolicy::FirstOnly);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.github_api_url, "https://github.example.test/api/v3");
        assert_eq!(config.scheduler_url, "https://scheduler.example.test/v1");
        assert_eq!(config.status_map.map(GraphState::Blocked), CommitState::Failure);
        assert_eq!(config.status_map.map(GraphState::Finished), CommitState::Success);

        let options = config.compiler_options();
        assert_eq!(options.raw_host, "raw.example.test");
        assert_eq!(options.route_prefix, "test-github");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            parse_system_config(r#"activation "sometimes""#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_system_config(r#"scheduler base-url="not a url""#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_system_config(r#"github api-url="file:///etc/passwd""#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_system_config(r#"route-prefix "a.b""#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_system_config("status-map {\n    finished \"done\"\n}"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_system_config("status-context"),
            Err(ConfigError::MissingField(_))
        ));
    }
}
