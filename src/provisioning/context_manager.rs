use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::capabilities::{generate_capability, CapabilityReconciler};
use super::documents;
use crate::config::Config;
use crate::domain::{Capability, Context, ContextProperties, NameGenerator};
use crate::error::{AppError, Result, RetryExecutor, RetryPolicy};
use crate::infrastructure::ManagementClient;

#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub location: String,
    pub name_prefix: String,
    /// Used when neither the context nor local generation yields a usable name
    pub fallback_capability: String,
    /// Wait between the update and the visibility check
    pub propagation_wait: Duration,
    /// Where the merged capability list is written for reference, if anywhere
    pub capabilities_file: Option<PathBuf>,
    pub update_policy: RetryPolicy,
}

impl ContextSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            location: config.location.clone(),
            name_prefix: config.name_prefix.clone(),
            fallback_capability: config.fallback_capability.clone(),
            propagation_wait: config.timings.context_propagation_wait,
            capabilities_file: Some(config.capabilities_file.clone()),
            update_policy: RetryPolicy::standard(),
        }
    }
}

/// What one reconcile round produced
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Server state after the update
    pub context: Context,
    /// Capability generated locally this round
    pub generated: Capability,
    /// Whether `generated` was accepted by the merge
    pub added: bool,
    /// Capability every downstream resource uses
    pub selected: Capability,
}

/// Appends one generated capability to the shared context without losing
/// entries written by anyone else, then picks the capability downstream
/// resources are bound to.
pub struct ContextManager {
    client: Arc<dyn ManagementClient>,
    retry: RetryExecutor,
    names: Arc<dyn NameGenerator>,
    settings: ContextSettings,
}

impl ContextManager {
    pub fn new(
        client: Arc<dyn ManagementClient>,
        retry: RetryExecutor,
        names: Arc<dyn NameGenerator>,
        settings: ContextSettings,
    ) -> Self {
        Self {
            client,
            retry,
            names,
            settings,
        }
    }

    pub async fn reconcile(&self, resource_group: &str, context_name: &str) -> Result<ReconcileOutcome> {
        let existing = match self.client.get_context(resource_group, context_name).await? {
            Some(context) => context.properties.capabilities,
            None => {
                info!(
                    resource_group = resource_group,
                    context = context_name,
                    "Context not found, starting from an empty capability list"
                );
                Vec::new()
            }
        };
        debug!(existing = existing.len(), "Fetched existing capabilities");

        let generated = generate_capability(self.names.as_ref(), &self.settings.name_prefix);
        let outcome =
            CapabilityReconciler::reconcile(&existing, std::slice::from_ref(&generated));
        let added = outcome.added > 0;
        if !added {
            warn!(capability = %generated.name, "Generated capability already exists in the context");
        }
        info!(
            existing = existing.len(),
            merged = outcome.capabilities.len(),
            capability = %generated.name,
            "🔀 Capabilities merged"
        );

        self.write_capabilities_file(&outcome.capabilities).await;

        let desired = Context::new(ContextProperties {
            capabilities: outcome.capabilities,
            hierarchies: documents::hierarchies(),
            provisioning_state: None,
        })
        .with_location(self.settings.location.as_str());

        let client = &self.client;
        let desired = &desired;
        self.retry
            .execute(&self.settings.update_policy, "update context", move || {
                client.create_or_update_context(resource_group, context_name, desired)
            })
            .await?;

        let refreshed = self
            .client
            .get_context(resource_group, context_name)
            .await?
            .ok_or_else(|| {
                AppError::ConsistencyError(format!(
                    "context {}/{} is missing right after it was updated",
                    resource_group, context_name
                ))
            })?;

        let selected = self.select_capability(&refreshed);
        info!(capability = %selected.name, "🎯 Selected capability for all resources");

        if !self.settings.propagation_wait.is_zero() {
            debug!(
                wait_secs = self.settings.propagation_wait.as_secs(),
                "Waiting for capability propagation"
            );
        }
        self.retry.sleeper().sleep(self.settings.propagation_wait).await;

        let visible = self
            .client
            .get_context(resource_group, context_name)
            .await?
            .map(|c| c.has_capability(&selected.name))
            .unwrap_or(false);
        if !visible {
            return Err(AppError::ConsistencyError(format!(
                "selected capability {} not found in context {}/{}",
                selected.name, resource_group, context_name
            )));
        }
        info!(capability = %selected.name, "✅ Capability verified in context");

        Ok(ReconcileOutcome {
            context: refreshed,
            generated,
            added,
            selected,
        })
    }

    /// The last capability the server returned, which need not be the one
    /// generated this round.
    fn select_capability(&self, context: &Context) -> Capability {
        let selected = match context.properties.capabilities.last() {
            Some(last) => last.clone(),
            None => {
                warn!("Context has no capabilities after the update, generating one");
                generate_capability(self.names.as_ref(), &self.settings.name_prefix)
            }
        };
        if selected.name.is_empty() {
            warn!(fallback = %self.settings.fallback_capability, "No capability name available, using fallback");
            return Capability::new(self.settings.fallback_capability.as_str(), "");
        }
        selected
    }

    async fn write_capabilities_file(&self, capabilities: &[Capability]) {
        let Some(path) = &self.settings.capabilities_file else {
            return;
        };
        let json = match serde_json::to_string_pretty(capabilities) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize capabilities");
                return;
            }
        };
        match tokio::fs::write(path, json).await {
            Ok(()) => debug!(path = %path.display(), "Saved merged capabilities"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to save merged capabilities"),
        }
    }
}
