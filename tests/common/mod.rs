#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use workload_provisioner::config::Config;
use workload_provisioner::domain::{
    Capability, FixedNameGenerator, SemanticVersion, SequenceVersionSource, SolutionVersion,
    SolutionVersionProperties, Target, TargetProperties,
};
use workload_provisioner::error::{RetryExecutor, RetryPolicy};
use workload_provisioner::infrastructure::{ArmEndpoint, ManagementClient, StaticTokenCredential};
use workload_provisioner::provisioning::{
    Collaborators, ConfigurationPublisher, ReviewResolver, WorkflowOrchestrator,
};
use workload_provisioner::testing::{
    InMemoryManagementClient, InMemoryTransport, RecordingSleeper,
};

pub const RESOURCE_GROUP: &str = "sdkexamples";
pub const TARGET: &str = "sdkbox-mk71-1";
pub const SOLUTION: &str = "sdkexamples-solution1";

/// In-memory management plane plus everything the workflow needs around it
pub struct TestEnvironment {
    pub config: Config,
    pub client: Arc<InMemoryManagementClient>,
    pub transport: Arc<InMemoryTransport>,
    pub sleeper: Arc<RecordingSleeper>,
    pub capabilities_file: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_vars(&[])
    }

    /// Dry-run configuration with extra variables layered on top
    pub fn with_vars(extra: &[(&str, &str)]) -> Self {
        let capabilities_file =
            std::env::temp_dir().join(format!("context-capabilities-{}.json", Uuid::new_v4()));
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("WO_DRY_RUN".to_string(), "true".to_string());
        vars.insert(
            "WO_CAPABILITIES_FILE".to_string(),
            capabilities_file.display().to_string(),
        );
        for (key, value) in extra {
            vars.insert(key.to_string(), value.to_string());
        }
        let config = Config::from_vars(&vars).expect("dry-run configuration");

        Self {
            client: Arc::new(InMemoryManagementClient::new(&config.subscription_id)),
            transport: Arc::new(InMemoryTransport::new()),
            sleeper: Arc::new(RecordingSleeper::default()),
            capabilities_file,
            config,
        }
    }

    pub fn retry(&self) -> RetryExecutor {
        RetryExecutor::new(self.sleeper.clone())
    }

    pub fn publisher(&self) -> ConfigurationPublisher {
        ConfigurationPublisher::new(
            self.transport.clone(),
            Arc::new(StaticTokenCredential::new("test-token")),
            ArmEndpoint::new(&self.config.management_endpoint, &self.config.subscription_id)
                .expect("endpoint"),
            &self.config.resource_group,
            &self.config.config_api_version,
            self.config.management_scope(),
        )
    }

    pub fn orchestrator(&self) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(
            &self.config,
            Collaborators {
                client: self.client.clone(),
                publisher: self.publisher(),
                retry: self.retry(),
                names: Arc::new(
                    FixedNameGenerator::new()
                        .with_versions([SemanticVersion::new(1, 4, 42)])
                        .with_capabilities([("shampoo", 4242)]),
                ),
                versions: Arc::new(SequenceVersionSource::default()),
            },
        )
    }

    pub fn reviewer(&self) -> ReviewResolver {
        ReviewResolver::new(
            self.client.clone(),
            self.retry(),
            RetryPolicy::retry_all(3, std::time::Duration::from_secs(30)),
        )
    }

    /// Register a bare target so reviews against it are accepted
    pub async fn seed_target(&self, name: &str) {
        self.client
            .create_target(RESOURCE_GROUP, name, &Target::new(TargetProperties::default()))
            .await
            .expect("seed target");
    }

    pub fn context_capabilities(&self) -> Vec<Capability> {
        self.client
            .context(&self.config.context_resource_group, &self.config.context_name)
            .map(|c| c.properties.capabilities)
            .unwrap_or_default()
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.capabilities_file);
    }
}

pub fn solution_version(id: &str, template_version_id: &str) -> SolutionVersion {
    let mut version = SolutionVersion::new(SolutionVersionProperties {
        solution_template_version_id: Some(template_version_id.to_string()),
        state: Some("InReview".to_string()),
        ..Default::default()
    });
    version.id = Some(id.to_string());
    version.name = id.rsplit('/').next().map(str::to_string);
    version
}
