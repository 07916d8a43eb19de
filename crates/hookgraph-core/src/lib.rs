//! Core types for hookgraph, the bridge between GitHub webhook events and the
//! task graph scheduler.
//!
//! This crate contains:
//! - Slug identifiers for tasks and graphs
//! - Webhook and graph state events
//! - Exchange topology and subscription bindings
//! - Task graph types and their layered merge
//! - Commit status types
//! - Collaborator traits (bus listener, config fetcher, scheduler, status API)

pub mod binding;
pub mod bus;
pub mod error;
pub mod event;
pub mod exchange;
pub mod fetch;
pub mod graph;
pub mod id;
pub mod scheduler;
pub mod status;

pub use error::{Error, Result};
pub use id::SlugId;
