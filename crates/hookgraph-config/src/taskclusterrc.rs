//! The in-repository job specification, `.taskclusterrc`.

use hookgraph_core::event::WebhookEvent;
use hookgraph_core::fetch::{ConfigFetcher, FetchError};
use hookgraph_core::graph::TaskLayer;
use serde_json::Value;
use tracing::debug;

use crate::{ConfigError, ConfigResult};

pub const CONFIG_FILE_NAME: &str = ".taskclusterrc";

/// Host serving raw repository contents.
pub const DEFAULT_RAW_HOST: &str = "raw.githubusercontent.com";

/// The commit whose configuration is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigIdentity<'a> {
    pub organization: &'a str,
    pub repository: &'a str,
    pub branch: &'a str,
}

impl<'a> From<&'a WebhookEvent> for ConfigIdentity<'a> {
    fn from(event: &'a WebhookEvent) -> Self {
        Self {
            organization: event.organization(),
            repository: event.repository(),
            branch: event.details().branch.as_deref().unwrap_or_default(),
        }
    }
}

/// URL of the raw `.taskclusterrc` for `identity`.
pub fn build_config_url(identity: &ConfigIdentity<'_>, raw_host: &str) -> String {
    [
        format!("https://{}", raw_host),
        identity.organization.to_string(),
        identity.repository.to_string(),
        identity.branch.to_string(),
        CONFIG_FILE_NAME.to_string(),
    ]
    .join("/")
}

/// Fetch the raw configuration text.
pub async fn resolve(fetcher: &dyn ConfigFetcher, url: &str) -> Result<String, FetchError> {
    debug!(url = %url, "Fetching config");
    fetcher.fetch(url).await
}

/// Parse a configuration document into task definitions.
///
/// A document without a top-level `tasks` list is a single task definition.
pub fn parse_document(raw: &str) -> ConfigResult<Vec<TaskLayer>> {
    let document: Value = serde_yaml::from_str(raw)?;
    let Value::Object(mut fields) = document else {
        return Err(ConfigError::InvalidValue {
            field: CONFIG_FILE_NAME.to_string(),
            message: "document must be a mapping".to_string(),
        });
    };

    let definitions = match fields.remove("tasks") {
        None | Some(Value::Null) => vec![Value::Object(fields)],
        Some(Value::Array(tasks)) => tasks,
        Some(_) => {
            return Err(ConfigError::InvalidValue {
                field: "tasks".to_string(),
                message: "must be a list of task definitions".to_string(),
            });
        }
    };

    definitions
        .into_iter()
        .enumerate()
        .map(|(index, definition)| {
            if !definition.is_object() {
                return Err(ConfigError::InvalidTask {
                    index,
                    message: "task definition must be a mapping".to_string(),
                });
            }
            serde_json::from_value(definition).map_err(|e| ConfigError::InvalidTask {
                index,
                message: e.to_string(),
            })
        })
        .collect()
}
