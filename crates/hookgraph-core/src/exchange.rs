//! Exchange topology.
//!
//! Declares the exchanges webhook events are published on, what their routing
//! keys look like and how an event maps onto one. The same table drives
//! subscription bindings on the consuming side and validation of outgoing
//! messages on the publishing side.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::event::{GraphState, WebhookEvent, WebhookKind};
use crate::{Error, Result};

/// Schema URLs for message payloads are relative to this prefix.
pub const SCHEMA_PREFIX: &str = "http://schemas.taskcluster.net/github/v1/";

/// Schema version stamped on every published message.
pub const MESSAGE_VERSION: u64 = 1;

/// Exchange prefix webhook events are published under.
pub const DEFAULT_EXCHANGE_PREFIX: &str = "exchange/taskcluster-github/v1/";

/// Exchange prefix of the scheduler's task graph exchanges.
pub const DEFAULT_SCHEDULER_EXCHANGE_PREFIX: &str = "exchange/taskcluster-scheduler/v1/";

/// Placeholder rendered for an optional routing key field with no value.
const EMPTY_FIELD: &str = "_";

/// The scheduler exchange a graph state is announced on.
pub fn graph_exchange(state: GraphState) -> &'static str {
    match state {
        GraphState::Running => "task-graph-running",
        GraphState::Blocked => "task-graph-blocked",
        GraphState::Finished => "task-graph-finished",
    }
}

/// One word of a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingKeyField {
    pub name: &'static str,
    pub summary: &'static str,
    /// Literal value this field always takes, whatever the payload says.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    pub required: bool,
    pub multiple_words: bool,
}

/// Routing key shared by every webhook exchange.
///
/// `action` is always part of the key but only required on exchanges whose
/// events carry one.
pub fn common_routing_key(has_actions: bool) -> Vec<RoutingKeyField> {
    vec![
        RoutingKeyField {
            name: "routingKeyKind",
            summary: "Identifier for the routing-key kind. This is always `'primary'` for the formalized routing key.",
            constant: Some("primary"),
            max_size: None,
            required: true,
            multiple_words: false,
        },
        RoutingKeyField {
            name: "organizationName",
            summary: "The GitHub `organizationName` which had an event.",
            constant: None,
            max_size: Some(100),
            required: true,
            multiple_words: false,
        },
        RoutingKeyField {
            name: "repositoryName",
            summary: "The GitHub `repositoryName` which had an event.",
            constant: None,
            max_size: Some(100),
            required: true,
            multiple_words: false,
        },
        RoutingKeyField {
            name: "action",
            summary: "The GitHub `action` which triggered an event.",
            constant: None,
            max_size: Some(22),
            required: has_actions,
            multiple_words: false,
        },
    ]
}

pub type RoutingKeyBuilder = fn(&WebhookEvent) -> BTreeMap<&'static str, String>;
pub type MessageBuilder = fn(&WebhookEvent) -> Result<Value>;
pub type CcBuilder = fn(&WebhookEvent) -> Vec<String>;

fn common_message_builder(event: &WebhookEvent) -> Result<Value> {
    let mut message = serde_json::to_value(event)
        .map_err(|e| Error::Internal(format!("failed to serialize event: {}", e)))?;
    match message.as_object_mut() {
        Some(fields) => {
            fields.insert("version".to_string(), Value::from(MESSAGE_VERSION));
            Ok(message)
        }
        None => Err(Error::Internal("event did not serialize to an object".to_string())),
    }
}

fn no_carbon_copies(_event: &WebhookEvent) -> Vec<String> {
    Vec::new()
}

fn pull_request_routing_key(event: &WebhookEvent) -> BTreeMap<&'static str, String> {
    let mut key = push_routing_key(event);
    if let Some(action) = event.action() {
        key.insert("action", action.to_string());
    }
    key
}

fn push_routing_key(event: &WebhookEvent) -> BTreeMap<&'static str, String> {
    BTreeMap::from([
        ("organizationName", event.organization().to_string()),
        ("repositoryName", event.repository().to_string()),
    ])
}

/// A single exchange and everything needed to address messages on it.
#[derive(Clone)]
pub struct ExchangeDeclaration {
    /// Exchange identifier, relative to the exchange prefix.
    pub exchange: &'static str,
    /// Name of the generated client method for this exchange.
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub kind: WebhookKind,
    pub routing_key: Vec<RoutingKeyField>,
    pub schema: String,
    pub message_builder: MessageBuilder,
    pub routing_key_builder: RoutingKeyBuilder,
    pub cc_builder: CcBuilder,
}

impl std::fmt::Debug for ExchangeDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeDeclaration")
            .field("exchange", &self.exchange)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ExchangeDeclaration {
    /// Build and validate the routing key for `event`.
    pub fn routing_key(&self, event: &WebhookEvent) -> Result<RoutingKey> {
        let values = (self.routing_key_builder)(event);
        let mut words = Vec::with_capacity(self.routing_key.len());

        for field in &self.routing_key {
            let value = match field.constant {
                Some(constant) => Some(constant.to_string()),
                None => values.get(field.name).filter(|v| !v.is_empty()).cloned(),
            };

            match &value {
                None if field.required => {
                    return Err(Error::RoutingKey {
                        field: field.name.to_string(),
                        message: "required field is missing".to_string(),
                    });
                }
                Some(v) if field.max_size.is_some_and(|max| v.chars().count() > max) => {
                    return Err(Error::RoutingKey {
                        field: field.name.to_string(),
                        message: format!(
                            "value '{}' exceeds {} characters",
                            v,
                            field.max_size.unwrap_or_default()
                        ),
                    });
                }
                Some(v) if !field.multiple_words && v.contains('.') => {
                    return Err(Error::RoutingKey {
                        field: field.name.to_string(),
                        message: format!("value '{}' must not contain '.'", v),
                    });
                }
                _ => {}
            }

            words.push((field.name, value));
        }

        Ok(RoutingKey { words })
    }

    /// Routing key pattern for a subscription. Fields not listed in `filter`
    /// match any word.
    pub fn binding_pattern(&self, filter: &[(&str, &str)]) -> String {
        self.routing_key
            .iter()
            .map(|field| {
                if let Some(constant) = field.constant {
                    return constant.to_string();
                }
                match filter.iter().find(|(name, _)| *name == field.name) {
                    Some((_, value)) => value.to_string(),
                    None if field.multiple_words => "#".to_string(),
                    None => "*".to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A validated routing key, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKey {
    words: Vec<(&'static str, Option<String>)>,
}

impl RoutingKey {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.words
            .iter()
            .find(|(field, _)| *field == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Names of the fields that carry a value.
    #[cfg(test)]
    pub fn present_fields(&self) -> Vec<&'static str> {
        self.words
            .iter()
            .filter(|(_, value)| value.is_some())
            .map(|(field, _)| *field)
            .collect()
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<&str> = self
            .words
            .iter()
            .map(|(_, value)| value.as_deref().unwrap_or(EMPTY_FIELD))
            .collect();
        f.write_str(&rendered.join("."))
    }
}

/// A message ready for publication.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub cc: Vec<String>,
    pub payload: Value,
}

/// Machine readable description of the declared exchanges, consumed by
/// subscriber-side client generation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeReference {
    pub version: u32,
    pub title: String,
    pub description: String,
    pub exchange_prefix: String,
    pub entries: Vec<ExchangeEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeEntry {
    #[serde(rename = "type")]
    pub entry_type: &'static str,
    pub exchange: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub routing_key: Vec<RoutingKeyField>,
    pub schema: String,
}

/// Table of declared exchanges.
#[derive(Debug, Clone)]
pub struct Exchanges {
    title: String,
    description: String,
    declarations: Vec<ExchangeDeclaration>,
}

impl Exchanges {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            declarations: Vec::new(),
        }
    }

    /// The exchanges offered for GitHub events.
    pub fn github() -> Result<Self> {
        let mut exchanges = Self::new(
            "TaskCluster-Github Exchanges",
            "The github service is responsible for publishing a pulse message \
             for supported github events.\n\nThis document describes the exchanges \
             offered by the taskcluster github service",
        );

        exchanges.declare(ExchangeDeclaration {
            exchange: "pull-request",
            name: "pullRequest",
            title: "GitHub Pull Request Event",
            description: "When a GitHub pull request event is posted it will be broadcast on this \
                          exchange with the designated `organizationName` and `repositoryName` \
                          in the routing-key along with event specific metadata in the payload.",
            kind: WebhookKind::PullRequest,
            routing_key: common_routing_key(true),
            schema: format!("{}github-pull-request-message.json#", SCHEMA_PREFIX),
            message_builder: common_message_builder,
            routing_key_builder: pull_request_routing_key,
            cc_builder: no_carbon_copies,
        })?;

        exchanges.declare(ExchangeDeclaration {
            exchange: "push",
            name: "push",
            title: "GitHub push Event",
            description: "When a GitHub push event is posted it will be broadcast on this \
                          exchange with the designated `organizationName` and `repositoryName` \
                          in the routing-key along with event specific metadata in the payload.",
            kind: WebhookKind::Push,
            routing_key: common_routing_key(false),
            schema: format!("{}github-push-message.json#", SCHEMA_PREFIX),
            message_builder: common_message_builder,
            routing_key_builder: push_routing_key,
            cc_builder: no_carbon_copies,
        })?;

        Ok(exchanges)
    }

    /// Register an exchange. Identifiers and client names must be unique.
    pub fn declare(&mut self, declaration: ExchangeDeclaration) -> Result<()> {
        if self
            .declarations
            .iter()
            .any(|d| d.exchange == declaration.exchange || d.name == declaration.name)
        {
            return Err(Error::DuplicateExchange(declaration.exchange.to_string()));
        }
        self.declarations.push(declaration);
        Ok(())
    }

    pub fn get(&self, exchange: &str) -> Option<&ExchangeDeclaration> {
        self.declarations.iter().find(|d| d.exchange == exchange)
    }

    pub fn for_kind(&self, kind: WebhookKind) -> Option<&ExchangeDeclaration> {
        self.declarations.iter().find(|d| d.kind == kind)
    }

    /// Look up the declaration for a fully qualified exchange name.
    pub fn resolve(&self, prefix: &str, exchange: &str) -> Option<&ExchangeDeclaration> {
        exchange
            .strip_prefix(prefix)
            .and_then(|relative| self.get(relative))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExchangeDeclaration> {
        self.declarations.iter()
    }

    pub fn reference(&self, exchange_prefix: &str) -> ExchangeReference {
        ExchangeReference {
            version: 0,
            title: self.title.clone(),
            description: self.description.clone(),
            exchange_prefix: exchange_prefix.to_string(),
            entries: self
                .declarations
                .iter()
                .map(|d| ExchangeEntry {
                    entry_type: "topic-exchange",
                    exchange: d.exchange,
                    name: d.name,
                    title: d.title,
                    description: d.description,
                    routing_key: d.routing_key.clone(),
                    schema: d.schema.clone(),
                })
                .collect(),
        }
    }

    /// Build the message that publishing `event` would produce.
    pub fn prepare(&self, exchange_prefix: &str, event: &WebhookEvent) -> Result<OutgoingMessage> {
        let declaration = self
            .for_kind(event.kind())
            .ok_or_else(|| Error::UnknownExchange(format!("{:?}", event.kind())))?;

        Ok(OutgoingMessage {
            exchange: format!("{}{}", exchange_prefix, declaration.exchange),
            routing_key: declaration.routing_key(event)?.to_string(),
            cc: (declaration.cc_builder)(event),
            payload: (declaration.message_builder)(event)?,
        })
    }
}
