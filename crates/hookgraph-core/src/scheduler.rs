//! Scheduler API consumed by the worker.

use async_trait::async_trait;

use crate::graph::TaskGraph;
use crate::{Result, SlugId};

/// The task graph scheduler. Graph ids are generated by the caller.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Returns a short name for this scheduler backend.
    fn name(&self) -> &'static str;

    /// Submit a graph. Rejections surface as [`crate::Error::Scheduler`].
    async fn create_graph(&self, graph_id: &SlugId, graph: &TaskGraph) -> Result<()>;
}
