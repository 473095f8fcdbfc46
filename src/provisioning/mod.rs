//! The provisioning chain: capability reconciliation, resource creation,
//! configuration, review and deployment.

pub mod capabilities;
pub mod configuration;
pub mod context_manager;
pub mod deployment;
pub mod documents;
pub mod resources;
pub mod review;
pub mod workflow;

pub use capabilities::{generate_capability, CapabilityReconciler, MergeOutcome};
pub use configuration::{
    render_values, ConfigValue, ConfigValues, ConfigurationPublisher, StoredConfiguration,
};
pub use context_manager::{ContextManager, ContextSettings, ReconcileOutcome};
pub use deployment::DeploymentDriver;
pub use resources::{target_policy, ProvisionerSettings, ResourceProvisioner};
pub use review::{ResolutionSource, ReviewResolution, ReviewResolver};
pub use workflow::{Collaborators, WorkflowFailure, WorkflowOrchestrator, WorkflowReport};
