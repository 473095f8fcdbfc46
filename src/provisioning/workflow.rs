use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::configuration::ConfigurationPublisher;
use super::context_manager::{ContextManager, ContextSettings};
use super::deployment::DeploymentDriver;
use super::documents::default_configuration_values;
use super::resources::{ProvisionerSettings, ResourceProvisioner};
use super::review::ReviewResolver;
use crate::config::Config;
use crate::domain::{NameGenerator, VersionSource};
use crate::error::{AppError, ErrorContext, RetryExecutor, RetryPolicy};
use crate::infrastructure::ManagementClient;

const COMPONENT: &str = "workflow_orchestrator";

/// Everything the workflow talks to, built by the caller
pub struct Collaborators {
    pub client: Arc<dyn ManagementClient>,
    pub publisher: ConfigurationPublisher,
    pub retry: RetryExecutor,
    pub names: Arc<dyn NameGenerator>,
    pub versions: Arc<dyn VersionSource>,
}

/// Outcome of a run that reached the end of the chain
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowReport {
    pub target_name: String,
    pub capability: String,
    pub capability_added: bool,
    pub schema_name: String,
    pub template_name: String,
    pub template_version_id: String,
    pub solution_version_id: String,
    /// Configuration resource of the created target
    pub configuration_name: String,
    pub configuration_set: bool,
    pub configuration_verified: bool,
    pub published: bool,
    pub installed: bool,
    /// Steps that failed without aborting the run
    pub degraded: Vec<String>,
}

impl WorkflowReport {
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Configuration resources are named after the target they configure
fn configuration_name(target_name: &str) -> String {
    format!("{}Config", target_name)
}

/// A fatal step failure, with what an operator needs to find the resource
#[derive(thiserror::Error, Debug)]
#[error("{step} failed ({context}): {error}")]
pub struct WorkflowFailure {
    pub step: String,
    pub context: ErrorContext,
    #[source]
    pub error: AppError,
}

/// Runs the provisioning chain end to end:
/// context → schema → template → target → configuration → review → publish → install.
///
/// Each step starts only once the previous one produced the identifiers it
/// needs. Configuration, publish and install failures degrade the run;
/// every other failure aborts it. Nothing is rolled back.
pub struct WorkflowOrchestrator {
    resource_group: String,
    context_resource_group: String,
    context_name: String,
    contexts: ContextManager,
    provisioner: ResourceProvisioner,
    publisher: ConfigurationPublisher,
    reviewer: ReviewResolver,
    deployment: DeploymentDriver,
}

impl WorkflowOrchestrator {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            client,
            publisher,
            retry,
            names,
            versions,
        } = collaborators;

        Self {
            resource_group: config.resource_group.clone(),
            context_resource_group: config.context_resource_group.clone(),
            context_name: config.context_name.clone(),
            contexts: ContextManager::new(
                client.clone(),
                retry.clone(),
                names.clone(),
                ContextSettings::from_config(config),
            ),
            provisioner: ResourceProvisioner::new(
                client.clone(),
                retry.clone(),
                names,
                versions,
                ProvisionerSettings::from_config(config),
            ),
            publisher,
            reviewer: ReviewResolver::new(client.clone(), retry.clone(), RetryPolicy::standard()),
            deployment: DeploymentDriver::new(client, retry, RetryPolicy::standard()),
        }
    }

    pub async fn run(&self) -> Result<WorkflowReport, WorkflowFailure> {
        let run = ErrorContext::new(COMPONENT, "run").with_resource_group(&self.resource_group);
        let rg = self.resource_group.as_str();
        info!(
            correlation_id = %run.correlation_id,
            resource_group = rg,
            context = %self.context_name,
            "🚀 Starting provisioning workflow"
        );
        let mut report = WorkflowReport::default();

        let step = run
            .create_child_context("context_manager", "reconcile capabilities")
            .with_resource_group(&self.context_resource_group)
            .with_resource_name(&self.context_name);
        let reconciled = self
            .contexts
            .reconcile(&self.context_resource_group, &self.context_name)
            .await
            .map_err(|e| fail(step, e))?;
        report.capability = reconciled.selected.name.clone();
        report.capability_added = reconciled.added;
        let capabilities = vec![report.capability.clone()];

        let step = run
            .create_child_context("resource_provisioner", "create schema")
            .with_resource_group(rg);
        let schema = self
            .provisioner
            .create_schema(rg)
            .await
            .map_err(|e| fail(step, e))?;
        report.schema_name = schema.resource_name().to_string();

        let step = run
            .create_child_context("resource_provisioner", "create schema version")
            .with_resource_group(rg)
            .with_resource_name(&report.schema_name);
        let schema_version = self
            .provisioner
            .create_schema_version(rg, &report.schema_name)
            .await
            .map_err(|e| fail(step, e))?;

        let step = run
            .create_child_context("resource_provisioner", "create solution template")
            .with_resource_group(rg)
            .with_identifier("capability", &report.capability);
        let template = self
            .provisioner
            .create_solution_template(rg, &capabilities)
            .await
            .map_err(|e| fail(step, e))?;
        report.template_name = template.resource_name().to_string();

        let step = run
            .create_child_context("resource_provisioner", "create solution template version")
            .with_resource_group(rg)
            .with_resource_name(&report.template_name);
        let (_, template_version_id) = self
            .provisioner
            .create_solution_template_version(
                rg,
                &report.template_name,
                &report.schema_name,
                schema_version.resource_name(),
            )
            .await
            .map_err(|e| fail(step, e))?;
        report.template_version_id = template_version_id;

        let step = run
            .create_child_context("resource_provisioner", "create target")
            .with_resource_group(rg)
            .with_identifier("capability", &report.capability);
        let target = self
            .provisioner
            .create_target(rg, &capabilities)
            .await
            .map_err(|e| fail(step, e))?;
        report.target_name = target.resource_name().to_string();
        report.configuration_name = configuration_name(&report.target_name);

        self.configure(&mut report).await;

        let step = run
            .create_child_context("review_resolver", "review solution version")
            .with_resource_group(rg)
            .with_resource_name(&report.target_name)
            .with_identifier("solution_template_version_id", &report.template_version_id);
        let resolution = self
            .reviewer
            .review(
                rg,
                &report.target_name,
                &report.template_name,
                &report.template_version_id,
            )
            .await
            .map_err(|e| fail(step, e))?;
        report.solution_version_id = resolution.solution_version_id;

        self.deploy(&mut report).await;

        info!(
            correlation_id = %run.correlation_id,
            target = %report.target_name,
            capability = %report.capability,
            template_version_id = %report.template_version_id,
            solution_version_id = %report.solution_version_id,
            published = report.published,
            installed = report.installed,
            degraded = ?report.degraded,
            "🏁 Provisioning workflow finished"
        );
        Ok(report)
    }

    /// Push the default values and read them back; failures only degrade the run
    async fn configure(&self, report: &mut WorkflowReport) {
        let values = default_configuration_values();
        let config_name = report.configuration_name.clone();
        let solution = report.template_name.clone();

        if let Err(e) = self.publisher.put(&config_name, &solution, &values).await {
            warn!(config = %config_name, error = %e, "Setting configuration failed, continuing");
            report.degraded.push(format!("configuration: {}", e));
            return;
        }
        report.configuration_set = true;

        match self.publisher.get(&config_name, &solution).await {
            Ok(Some(stored)) => {
                let entries = stored.entries();
                report.configuration_verified = values.keys().all(|k| entries.contains_key(k));
                if !report.configuration_verified {
                    warn!(config = %config_name, "Stored configuration is missing values");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(config = %config_name, error = %e, "Reading configuration back failed");
            }
        }
    }

    async fn deploy(&self, report: &mut WorkflowReport) {
        let rg = self.resource_group.as_str();
        if let Err(e) = self
            .deployment
            .publish(rg, &report.target_name, &report.solution_version_id)
            .await
        {
            warn!(solution_version_id = %report.solution_version_id, error = %e, "Publish failed");
            report.degraded.push(format!("publish: {}", e));
            return;
        }
        report.published = true;

        match self
            .deployment
            .install(rg, &report.target_name, &report.solution_version_id)
            .await
        {
            Ok(()) => report.installed = true,
            Err(e) => {
                warn!(solution_version_id = %report.solution_version_id, error = %e, "Install failed");
                report.degraded.push(format!("install: {}", e));
            }
        }
    }
}

fn fail(context: ErrorContext, error: AppError) -> WorkflowFailure {
    context.report(&error);
    WorkflowFailure {
        step: context.operation.clone(),
        context,
        error,
    }
}
