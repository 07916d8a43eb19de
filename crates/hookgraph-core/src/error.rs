//! Error types for hookgraph.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("duplicate exchange: {0}")]
    DuplicateExchange(String),

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("invalid routing key field {field}: {message}")]
    RoutingKey { field: String, message: String },

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("scheduler rejected graph: {0}")]
    Scheduler(String),

    #[error("status update failed: {0}")]
    StatusApi(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
