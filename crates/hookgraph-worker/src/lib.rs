//! hookgraph worker
//!
//! Subscribes to webhook and scheduler exchanges, turns webhook events into
//! task graphs and mirrors graph progress onto commit statuses.

pub mod error;
pub mod listener;
pub mod reporter;
pub mod router;
pub mod services;

pub use error::HandlerError;
pub use listener::JsonLinesListener;
pub use reporter::{GraphStateOutcome, OutcomeReporter, ReporterSettings, WebhookOutcome};
pub use router::{Classifier, Dispatch, MessageKind, Router, subscription_bindings};
