//! Errors raised while handling a webhook event.

use hookgraph_config::ConfigError;
use hookgraph_core::fetch::FetchError;
use thiserror::Error;

/// Why a webhook event did not result in a submitted graph.
///
/// Displayed verbatim as the commit status description.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Compile(#[from] ConfigError),

    #[error(transparent)]
    Submit(#[from] hookgraph_core::Error),
}
