//! Message classification and dispatch.

use hookgraph_config::SystemConfig;
use hookgraph_core::binding::Binding;
use hookgraph_core::bus::Listener;
use hookgraph_core::event::{GraphState, InboundMessage, WebhookEvent};
use hookgraph_core::exchange::{Exchanges, graph_exchange};
use hookgraph_core::Result;
use regex::{Regex, RegexBuilder};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::reporter::{GraphStateOutcome, OutcomeReporter, WebhookOutcome};

/// How long to wait after the listener fails before asking again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    WebHook,
    GraphStateChange,
}

#[derive(Debug, Clone)]
struct ClassificationRule {
    pattern: Regex,
    kind: MessageKind,
}

/// Maps exchange names to message kinds. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Patterns are case-insensitive and match anywhere in the
    /// exchange name.
    pub fn with_rule(
        mut self,
        pattern: &str,
        kind: MessageKind,
    ) -> std::result::Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.rules.push(ClassificationRule { pattern, kind });
        Ok(self)
    }

    /// Webhook exchanges end in `pull-request` or `push`; anything from the
    /// scheduler is a graph state change.
    pub fn standard() -> std::result::Result<Self, regex::Error> {
        Self::new()
            .with_rule("(.*pull-request|.*push)", MessageKind::WebHook)?
            .with_rule("exchange/taskcluster-scheduler/.*", MessageKind::GraphStateChange)
    }

    /// The standard rules plus the configured scheduler exchange prefix, so
    /// that every graph state binding is also classified.
    pub fn for_config(config: &SystemConfig) -> std::result::Result<Self, regex::Error> {
        Self::standard()?.with_rule(
            &format!("^{}.*", regex::escape(&config.scheduler_exchange_prefix)),
            MessageKind::GraphStateChange,
        )
    }

    pub fn classify(&self, exchange: &str) -> Option<MessageKind> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(exchange))
            .map(|rule| rule.kind)
    }
}

/// Bindings the worker subscribes with.
///
/// Pull requests are only handled when opened or updated. Graph state
/// changes are received through the commit routes graphs are submitted with.
pub fn subscription_bindings(exchanges: &Exchanges, config: &SystemConfig) -> Vec<Binding> {
    let mut bindings = Vec::new();

    for declaration in exchanges.iter() {
        let exchange = format!("{}{}", config.exchange_prefix, declaration.exchange);
        if declaration
            .routing_key
            .iter()
            .any(|field| field.name == "action" && field.required)
        {
            for action in ["opened", "updated"] {
                bindings.push(Binding::new(
                    exchange.clone(),
                    declaration.binding_pattern(&[("action", action)]),
                ));
            }
        } else {
            bindings.push(Binding::new(exchange, declaration.binding_pattern(&[])));
        }
    }

    let route_pattern = format!("route.{}.*.*.*", config.route_prefix);
    for state in GraphState::ALL {
        bindings.push(Binding::new(
            format!("{}{}", config.scheduler_exchange_prefix, graph_exchange(state)),
            route_pattern.clone(),
        ));
    }

    bindings
}

/// What became of one delivered message.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    WebHook(WebhookOutcome),
    GraphState(GraphStateOutcome),
    /// The payload could not be decoded and was dropped.
    Malformed(String),
    /// No rule classifies the exchange.
    Ignored,
}

/// Receives messages from a listener and hands them to the reporter.
pub struct Router {
    exchanges: Exchanges,
    exchange_prefix: String,
    classifier: Classifier,
    bindings: Vec<Binding>,
    reporter: OutcomeReporter,
}

impl Router {
    pub fn new(
        exchanges: Exchanges,
        config: &SystemConfig,
        classifier: Classifier,
        reporter: OutcomeReporter,
    ) -> Self {
        let bindings = subscription_bindings(&exchanges, config);
        Self {
            exchanges,
            exchange_prefix: config.exchange_prefix.clone(),
            classifier,
            bindings,
            reporter,
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Bind, then process messages one at a time until the listener ends.
    ///
    /// Failures while handling a message never stop the loop.
    pub async fn run<L: Listener + ?Sized>(&self, listener: &mut L) -> Result<()> {
        for binding in &self.bindings {
            debug!(binding = %binding, "Binding");
            listener.bind(binding.clone()).await?;
        }

        info!(bindings = self.bindings.len(), "Router listening");

        loop {
            match listener.next().await {
                Ok(Some(message)) => {
                    self.dispatch(&message).await;
                }
                Ok(None) => {
                    info!("Listener closed, stopping router");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "Failed to receive message");
                    sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }
    }

    pub async fn dispatch(&self, message: &InboundMessage) -> Dispatch {
        match self.classifier.classify(&message.exchange) {
            Some(MessageKind::WebHook) => self.dispatch_webhook(message).await,
            Some(MessageKind::GraphStateChange) => {
                Dispatch::GraphState(self.reporter.on_graph_state(message).await)
            }
            None => {
                info!(exchange = %message.exchange, "Ignoring message from unknown exchange");
                Dispatch::Ignored
            }
        }
    }

    async fn dispatch_webhook(&self, message: &InboundMessage) -> Dispatch {
        let Some(declaration) = self.exchanges.resolve(&self.exchange_prefix, &message.exchange)
        else {
            warn!(exchange = %message.exchange, "No declaration for webhook exchange");
            return Dispatch::Malformed(format!("undeclared exchange {}", message.exchange));
        };

        match WebhookEvent::from_payload(declaration.kind, message.payload.clone()) {
            Ok(event) => Dispatch::WebHook(self.reporter.on_webhook(&event).await),
            Err(e) => {
                warn!(exchange = %message.exchange, error = %e, "Malformed webhook payload");
                Dispatch::Malformed(e.to_string())
            }
        }
    }
}
