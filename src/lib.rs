//! Workload provisioner - drives an edge workload management API through
//! the full provisioning chain.
//!
//! This library provides capability reconciliation on a shared context,
//! creation of the dependent resource chain, dynamic configuration, and
//! review/publish/install of the resulting solution version.

pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod provisioning;
pub mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use provisioning::{Collaborators, WorkflowFailure, WorkflowOrchestrator, WorkflowReport};
