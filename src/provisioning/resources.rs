use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::documents;
use crate::config::Config;
use crate::domain::{
    ExtendedLocation, NameGenerator, Schema, SchemaProperties, SchemaVersion,
    SchemaVersionProperties, SolutionTemplate, SolutionTemplateProperties,
    SolutionTemplateVersion, SolutionTemplateVersionProperties, SolutionTemplateVersionRequest,
    Target, TargetProperties, VersionSource,
};
use crate::error::{Result, RetryExecutor, RetryPolicy};
use crate::infrastructure::{edge_resource_id, ManagementClient};

#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    pub subscription_id: String,
    pub location: String,
    pub extended_location: String,
    /// Resource id of the context targets are bound to
    pub context_id: String,
    pub name_prefix: String,
    /// Base name for targets; also their display name
    pub target_name: String,
    /// Capability used when none is supplied
    pub fallback_capability: String,
    pub template_settle_wait: Duration,
    pub template_policy: RetryPolicy,
    pub target_policy: RetryPolicy,
}

impl ProvisionerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            subscription_id: config.subscription_id.clone(),
            location: config.location.clone(),
            extended_location: config.extended_location.clone(),
            context_id: config.context_id(),
            name_prefix: config.name_prefix.clone(),
            target_name: config.target_name.clone(),
            fallback_capability: config.fallback_capability.clone(),
            template_settle_wait: config.timings.template_settle_wait,
            template_policy: RetryPolicy::standard(),
            target_policy: target_policy(),
        }
    }
}

/// Target creation retries every failure: 5 attempts, 60s doubling
pub fn target_policy() -> RetryPolicy {
    RetryPolicy::retry_all(5, Duration::from_secs(60))
}

/// Creates the dependent resource chain, one resource per call.
///
/// Names are derived from the injected generators so repeated runs do not
/// collide. Nothing is cleaned up on failure.
pub struct ResourceProvisioner {
    client: Arc<dyn ManagementClient>,
    retry: RetryExecutor,
    names: Arc<dyn NameGenerator>,
    versions: Arc<dyn VersionSource>,
    settings: ProvisionerSettings,
}

impl ResourceProvisioner {
    pub fn new(
        client: Arc<dyn ManagementClient>,
        retry: RetryExecutor,
        names: Arc<dyn NameGenerator>,
        versions: Arc<dyn VersionSource>,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            client,
            retry,
            names,
            versions,
            settings,
        }
    }

    pub async fn create_schema(&self, resource_group: &str) -> Result<Schema> {
        let name = format!(
            "{}-schema-v{}",
            self.settings.name_prefix,
            self.names.semantic_version()
        );
        info!(resource_group = resource_group, schema = %name, "Creating schema");

        let desired =
            Schema::new(SchemaProperties::default()).with_location(self.settings.location.as_str());
        let schema = self
            .client
            .create_schema(resource_group, &name, &desired)
            .await?
            .named_if_missing(&name);

        info!(schema = schema.name_or(&name), "📐 Schema created");
        Ok(schema)
    }

    pub async fn create_schema_version(
        &self,
        resource_group: &str,
        schema_name: &str,
    ) -> Result<SchemaVersion> {
        let version_name = self.names.semantic_version().to_string();
        info!(schema = schema_name, version = %version_name, "Creating schema version");

        let desired = SchemaVersion::new(SchemaVersionProperties {
            value: documents::schema_rules()?,
            provisioning_state: None,
        });
        let version = self
            .client
            .create_schema_version(resource_group, schema_name, &version_name, &desired)
            .await?
            .named_if_missing(&version_name);

        info!(version = version.name_or(&version_name), "📐 Schema version created");
        Ok(version)
    }

    /// Retried as a whole, since the context may not have propagated the
    /// capability yet; waits for the template to settle before returning.
    pub async fn create_solution_template(
        &self,
        resource_group: &str,
        capabilities: &[String],
    ) -> Result<SolutionTemplate> {
        let name = format!(
            "{}-solution{}",
            self.settings.name_prefix,
            self.versions.next_version().await
        );
        let desired = SolutionTemplate::new(SolutionTemplateProperties {
            capabilities: self.capabilities_or_fallback(capabilities),
            description: documents::TEMPLATE_DESCRIPTION.to_string(),
            provisioning_state: None,
        })
        .with_location(self.settings.location.as_str());
        info!(
            resource_group = resource_group,
            template = %name,
            capabilities = ?desired.properties.capabilities,
            "Creating solution template"
        );

        let client = &self.client;
        let (name_ref, desired_ref) = (name.as_str(), &desired);
        let template = self
            .retry
            .execute(
                &self.settings.template_policy,
                "create solution template",
                move || client.create_solution_template(resource_group, name_ref, desired_ref),
            )
            .await?
            .named_if_missing(&name);

        info!(template = template.name_or(&name), "📦 Solution template created");
        self.retry
            .sleeper()
            .sleep(self.settings.template_settle_wait)
            .await;
        Ok(template)
    }

    /// Retried like the template itself. Returns the created version and the
    /// id downstream calls refer to it by.
    pub async fn create_solution_template_version(
        &self,
        resource_group: &str,
        template_name: &str,
        schema_name: &str,
        schema_version: &str,
    ) -> Result<(SolutionTemplateVersion, String)> {
        let version = self.names.semantic_version().to_string();
        info!(template = template_name, version = %version, "Creating solution template version");

        let request = SolutionTemplateVersionRequest {
            solution_template_version: SolutionTemplateVersion::new(
                SolutionTemplateVersionProperties {
                    configurations: documents::configurations(schema_name, schema_version),
                    specification: documents::deployment_specification(),
                    orchestrator_type: Some(documents::ORCHESTRATOR_TYPE.to_string()),
                    provisioning_state: None,
                },
            ),
            version: version.clone(),
        };
        let client = &self.client;
        let request_ref = &request;
        let created = self
            .retry
            .execute(
                &self.settings.template_policy,
                "create solution template version",
                move || {
                    client.create_solution_template_version(resource_group, template_name, request_ref)
                },
            )
            .await?;

        let version_id = self.template_version_id(resource_group, template_name, &version, &created);
        info!(solution_template_version_id = %version_id, "📦 Solution template version created");
        Ok((created, version_id))
    }

    /// The server's id when it sends one, otherwise the resource path built
    /// from the template name and the (server-assigned or requested) version name.
    pub fn template_version_id(
        &self,
        resource_group: &str,
        template_name: &str,
        requested_version: &str,
        created: &SolutionTemplateVersion,
    ) -> String {
        if let Some(id) = created.id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let version = created
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(requested_version);
        warn!(
            template = template_name,
            version = version,
            "Server did not return a version id, constructing it"
        );
        edge_resource_id(
            &self.settings.subscription_id,
            resource_group,
            &["solutionTemplates", template_name, "versions", version],
        )
    }

    /// Create the target under the target policy.
    ///
    /// A failure is terminal only for that attempt. When the service reports
    /// the create as still in progress, the target is read back for diagnostics
    /// before the next attempt.
    pub async fn create_target(&self, resource_group: &str, capabilities: &[String]) -> Result<Target> {
        let name = format!(
            "{}-{}",
            self.settings.target_name,
            self.versions.next_version().await
        );
        let desired = Target::new(TargetProperties {
            capabilities: self.capabilities_or_fallback(capabilities),
            context_id: self.settings.context_id.clone(),
            description: documents::TARGET_DESCRIPTION.to_string(),
            display_name: self.settings.target_name.clone(),
            hierarchy_level: documents::HIERARCHY_LEVEL.to_string(),
            solution_scope: documents::SOLUTION_SCOPE.to_string(),
            target_specification: documents::target_specification(),
            provisioning_state: None,
        })
        .with_location(self.settings.location.as_str())
        .with_extended_location(ExtendedLocation::custom_location(
            self.settings.extended_location.as_str(),
        ));
        info!(resource_group = resource_group, target = %name, "Creating target");

        let client = &self.client;
        let (name_ref, desired_ref) = (name.as_str(), &desired);
        let target = self
            .retry
            .execute(&self.settings.target_policy, "create target", move || async move {
                match client.create_target(resource_group, name_ref, desired_ref).await {
                    Ok(target) => Ok(target),
                    Err(e) if e.is_in_progress() => {
                        match client.get_target(resource_group, name_ref).await {
                            Ok(Some(current)) => warn!(
                                target = name_ref,
                                state = ?current.properties.provisioning_state,
                                "Target provisioning still in progress"
                            ),
                            Ok(None) => warn!(target = name_ref, "Target not visible yet"),
                            Err(get_err) => warn!(
                                target = name_ref,
                                error = %get_err,
                                "Failed to read target provisioning state"
                            ),
                        }
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?
            .named_if_missing(&name);

        info!(
            target = target.name_or(&name),
            state = ?target.properties.provisioning_state,
            "🎯 Target created"
        );
        Ok(target)
    }

    fn capabilities_or_fallback(&self, capabilities: &[String]) -> Vec<String> {
        if capabilities.is_empty() {
            vec![self.settings.fallback_capability.clone()]
        } else {
            capabilities.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Capability, Context, ContextProperties, FixedNameGenerator, SemanticVersion,
        SequenceVersionSource,
    };
    use crate::error::AppError;
    use crate::testing::{InMemoryManagementClient, RecordingSleeper};

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    fn settings() -> ProvisionerSettings {
        ProvisionerSettings {
            subscription_id: SUB.to_string(),
            location: "eastus2euap".to_string(),
            extended_location: "/custom/den-Location".to_string(),
            context_id: edge_resource_id(SUB, "Mehoopany", &["contexts", "Mehoopany-Context"]),
            name_prefix: "sdkexamples".to_string(),
            target_name: "sdkbox-mk71".to_string(),
            fallback_capability: "sdkexamples-soap".to_string(),
            template_settle_wait: Duration::from_secs(10),
            template_policy: RetryPolicy::retry_all(3, Duration::from_secs(30)),
            target_policy: target_policy(),
        }
    }

    fn provisioner(
        client: Arc<InMemoryManagementClient>,
    ) -> (ResourceProvisioner, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let provisioner = ResourceProvisioner::new(
            client,
            RetryExecutor::new(sleeper.clone()),
            Arc::new(FixedNameGenerator::new().with_versions([
                SemanticVersion::new(1, 2, 3),
                SemanticVersion::new(4, 5, 6),
            ])),
            Arc::new(SequenceVersionSource::starting_at(7)),
            settings(),
        );
        (provisioner, sleeper)
    }

    fn seed_context(client: &InMemoryManagementClient, capabilities: &[&str]) {
        client.seed_context(
            "Mehoopany",
            "Mehoopany-Context",
            Context::new(ContextProperties {
                capabilities: capabilities
                    .iter()
                    .map(|c| Capability::new(*c, "seeded"))
                    .collect(),
                ..Default::default()
            }),
        );
    }

    fn in_progress() -> AppError {
        AppError::OperationFailed {
            resource: "target".to_string(),
            code: "ResourceOperationInProgress".to_string(),
            message: "InProgress".to_string(),
        }
    }

    #[tokio::test]
    async fn test_schema_chain_names() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        let (provisioner, _) = provisioner(client);

        let schema = provisioner.create_schema("rg").await.unwrap();
        assert_eq!(schema.name.as_deref(), Some("sdkexamples-schema-v1.2.3"));

        let version = provisioner
            .create_schema_version("rg", "sdkexamples-schema-v1.2.3")
            .await
            .unwrap();
        assert_eq!(version.name.as_deref(), Some("4.5.6"));
        assert!(version.properties.value.contains("ErrorThreshold"));
    }

    #[tokio::test]
    async fn test_schema_version_requires_schema() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        let (provisioner, _) = provisioner(client);
        let err = provisioner
            .create_schema_version("rg", "missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_solution_template_defaults_capability_and_settles() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        let (provisioner, sleeper) = provisioner(client);

        let template = provisioner.create_solution_template("rg", &[]).await.unwrap();
        assert_eq!(template.name.as_deref(), Some("sdkexamples-solution7"));
        assert_eq!(template.properties.capabilities, vec!["sdkexamples-soap"]);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn test_solution_template_is_retried() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        client.fail_next(
            "create_solution_template",
            vec![
                AppError::external(400, "capability not found"),
                AppError::external(400, "capability not found"),
            ],
        );
        let (provisioner, sleeper) = provisioner(client.clone());

        provisioner
            .create_solution_template("rg", &["cap".to_string()])
            .await
            .unwrap();
        assert_eq!(client.call_count("create_solution_template"), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(10)
            ]
        );
    }

    #[tokio::test]
    async fn test_template_version_id_prefers_server_id() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        let (provisioner, _) = provisioner(client);
        provisioner.create_solution_template("rg", &[]).await.unwrap();

        let (created, id) = provisioner
            .create_solution_template_version("rg", "sdkexamples-solution7", "schema", "1.0.0")
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some(id.as_str()));
        assert!(id.ends_with("/solutionTemplates/sdkexamples-solution7/versions/1.2.3"));
        assert!(created.properties.configurations.contains("name: schema"));
        assert_eq!(created.properties.orchestrator_type.as_deref(), Some("TO"));
    }

    #[tokio::test]
    async fn test_template_version_is_retried() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        let (provisioner, sleeper) = provisioner(client.clone());
        provisioner.create_solution_template("rg", &[]).await.unwrap();
        client.fail_next(
            "create_solution_template_version",
            vec![AppError::external(404, "solution template not found")],
        );

        let (_, id) = provisioner
            .create_solution_template_version("rg", "sdkexamples-solution7", "schema", "1.0.0")
            .await
            .unwrap();

        assert!(id.ends_with("/solutionTemplates/sdkexamples-solution7/versions/1.2.3"));
        assert_eq!(client.call_count("create_solution_template_version"), 2);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(10), Duration::from_secs(30)]
        );
    }

    #[test]
    fn test_template_version_id_is_constructed_when_missing() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        let (provisioner, _) = provisioner(client);
        let created = SolutionTemplateVersion::new(SolutionTemplateVersionProperties::default());

        assert_eq!(
            provisioner.template_version_id("rg", "tmpl", "2.0.0", &created),
            format!(
                "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Edge/solutionTemplates/tmpl/versions/2.0.0",
                SUB
            )
        );
    }

    #[tokio::test]
    async fn test_target_document() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        seed_context(&client, &["cap-a"]);
        let (provisioner, _) = provisioner(client.clone());

        let target = provisioner
            .create_target("rg", &["cap-a".to_string()])
            .await
            .unwrap();
        assert_eq!(target.name.as_deref(), Some("sdkbox-mk71-7"));

        let stored = client.target("rg", "sdkbox-mk71-7").unwrap();
        assert_eq!(stored.properties.display_name, "sdkbox-mk71");
        assert_eq!(stored.properties.hierarchy_level, "line");
        assert_eq!(stored.properties.solution_scope, "new");
        assert!(stored.properties.context_id.ends_with("/contexts/Mehoopany-Context"));
        assert_eq!(
            stored.extended_location.unwrap().location_type,
            "CustomLocation"
        );
    }

    #[tokio::test]
    async fn test_target_in_progress_is_retried_with_diagnostics() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        seed_context(&client, &["cap-a"]);
        client.fail_next("create_target", vec![in_progress(), in_progress()]);
        let (provisioner, sleeper) = provisioner(client.clone());

        provisioner
            .create_target("rg", &["cap-a".to_string()])
            .await
            .unwrap();

        assert_eq!(client.call_count("create_target"), 3);
        assert_eq!(client.call_count("get_target"), 2);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(60), Duration::from_secs(120)]
        );
    }

    #[tokio::test]
    async fn test_target_in_progress_exhausts_after_five_attempts() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        client.fail_next("create_target", (0..5).map(|_| in_progress()).collect());
        let (provisioner, _) = provisioner(client.clone());

        let err = provisioner.create_target("rg", &[]).await.unwrap_err();
        assert!(matches!(err, AppError::RetryExhausted { attempts: 5, .. }));
        assert_eq!(client.call_count("create_target"), 5);
    }

    #[tokio::test]
    async fn test_target_other_failure_is_retried_without_diagnostics() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        seed_context(&client, &["cap-a"]);
        let (provisioner, sleeper) = provisioner(client.clone());

        let err = provisioner
            .create_target("rg", &["unknown".to_string()])
            .await
            .unwrap_err();
        match err {
            AppError::RetryExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 5);
                assert!(matches!(*source, AppError::OperationFailed { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(client.call_count("create_target"), 5);
        assert_eq!(client.call_count("get_target"), 0);
        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(240),
                Duration::from_secs(480)
            ]
        );
    }

    #[tokio::test]
    async fn test_target_transient_server_error_recovers() {
        let client = Arc::new(InMemoryManagementClient::new(SUB));
        seed_context(&client, &["cap-a"]);
        client.fail_next(
            "create_target",
            vec![AppError::external(500, "InternalServerError")],
        );
        let (provisioner, sleeper) = provisioner(client.clone());

        let target = provisioner
            .create_target("rg", &["cap-a".to_string()])
            .await
            .unwrap();

        assert_eq!(target.name.as_deref(), Some("sdkbox-mk71-7"));
        assert_eq!(client.call_count("create_target"), 2);
        assert_eq!(client.call_count("get_target"), 0);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(60)]);
    }
}
