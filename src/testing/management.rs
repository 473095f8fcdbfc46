use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    Capability, Context, ProvisioningState, Resource, ReviewRequest, Schema, SchemaVersion,
    SolutionTemplate, SolutionTemplateVersion, SolutionTemplateVersionRequest, SolutionVersion,
    SolutionVersionParameter, SolutionVersionProperties, Target,
};
use crate::error::{AppError, Result};
use crate::infrastructure::{edge_resource_id, ManagementClient};

type Key = (String, String);

fn key(resource_group: &str, name: &str) -> Key {
    (resource_group.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    contexts: HashMap<Key, Context>,
    schemas: HashMap<Key, Schema>,
    schema_versions: HashMap<String, SchemaVersion>,
    templates: HashMap<Key, SolutionTemplate>,
    template_versions: HashMap<String, SolutionTemplateVersion>,
    targets: HashMap<Key, Target>,
    /// (resource group, target, solution) -> versions in creation order
    solution_versions: HashMap<(String, String, String), Vec<SolutionVersion>>,
    published: Vec<String>,
    installed: Vec<String>,
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<AppError>>,
    scripted_context_reads: VecDeque<Option<Context>>,
    concurrent_capabilities: Vec<Capability>,
    review_registers_version: bool,
    review_response_id: Option<String>,
}

/// Management plane kept in memory.
///
/// Behaves like the real service where the workflow depends on it: creates
/// assign resource ids, targets must reference capabilities registered in
/// their context, and a review answers with an id that is *not* the
/// solution version id, which must be found by listing.
pub struct InMemoryManagementClient {
    subscription_id: String,
    state: Mutex<State>,
}

impl InMemoryManagementClient {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            state: Mutex::new(State {
                review_registers_version: true,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the call and pop an injected failure for it, if any
    fn enter(&self, operation: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        match state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn id(&self, resource_group: &str, segments: &[&str]) -> String {
        edge_resource_id(&self.subscription_id, resource_group, segments)
    }

    /// Fail the next calls of `operation` with these errors, in order
    pub fn fail_next(&self, operation: &str, errors: Vec<AppError>) {
        self.state()
            .failures
            .entry(operation.to_string())
            .or_default()
            .extend(errors);
    }

    pub fn seed_context(&self, resource_group: &str, name: &str, context: Context) {
        self.state().contexts.insert(key(resource_group, name), context);
    }

    /// Answer the next `get_context` calls with these values instead of the stored context
    pub fn script_context_reads(&self, reads: Vec<Option<Context>>) {
        self.state().scripted_context_reads.extend(reads);
    }

    /// Another writer appends `capability` right after each context update lands
    pub fn add_concurrent_capability(&self, capability: Capability) {
        self.state().concurrent_capabilities.push(capability);
    }

    pub fn seed_solution_versions(
        &self,
        resource_group: &str,
        target_name: &str,
        solution_name: &str,
        versions: Vec<SolutionVersion>,
    ) {
        self.state()
            .solution_versions
            .entry((
                resource_group.to_string(),
                target_name.to_string(),
                solution_name.to_string(),
            ))
            .or_default()
            .extend(versions);
    }

    /// Whether a review creates a listable solution version (default: yes)
    pub fn set_review_registers_version(&self, registers: bool) {
        self.state().review_registers_version = registers;
    }

    /// Id the review response carries; `None` means a generated review id
    pub fn set_review_response_id(&self, id: Option<String>) {
        self.state().review_response_id = id;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == operation).count()
    }

    pub fn context(&self, resource_group: &str, name: &str) -> Option<Context> {
        self.state().contexts.get(&key(resource_group, name)).cloned()
    }

    pub fn target(&self, resource_group: &str, name: &str) -> Option<Target> {
        self.state().targets.get(&key(resource_group, name)).cloned()
    }

    pub fn template_version_ids(&self) -> Vec<String> {
        self.state().template_versions.keys().cloned().collect()
    }

    pub fn solution_versions(&self, resource_group: &str, target_name: &str) -> Vec<SolutionVersion> {
        self.state()
            .solution_versions
            .iter()
            .filter(|((rg, target, _), _)| rg == resource_group && target == target_name)
            .flat_map(|(_, versions)| versions.iter().cloned())
            .collect()
    }

    pub fn published(&self) -> Vec<String> {
        self.state().published.clone()
    }

    pub fn installed(&self) -> Vec<String> {
        self.state().installed.clone()
    }
}

/// `(resource group, name)` from a context resource id
fn parse_context_id(context_id: &str) -> Option<Key> {
    let segments: Vec<&str> = context_id.split('/').filter(|s| !s.is_empty()).collect();
    let group = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("resourceGroups"))
        .and_then(|i| segments.get(i + 1))?;
    let name = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("contexts"))
        .and_then(|i| segments.get(i + 1))?;
    Some(key(group, name))
}

/// Solution (template) name from a solution template version id
fn solution_name_of(template_version_id: &str) -> Option<String> {
    let segments: Vec<&str> = template_version_id.split('/').collect();
    segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("solutionTemplates"))
        .and_then(|i| segments.get(i + 1))
        .map(|s| s.to_string())
}

fn with_identity<P>(mut resource: Resource<P>, id: String, name: &str) -> Resource<P> {
    resource.id = Some(id);
    resource.name = Some(name.to_string());
    resource
}

#[async_trait]
impl ManagementClient for InMemoryManagementClient {
    async fn get_context(&self, resource_group: &str, name: &str) -> Result<Option<Context>> {
        self.enter("get_context")?;
        let mut state = self.state();
        if let Some(scripted) = state.scripted_context_reads.pop_front() {
            return Ok(scripted);
        }
        Ok(state.contexts.get(&key(resource_group, name)).cloned())
    }

    async fn create_or_update_context(
        &self,
        resource_group: &str,
        name: &str,
        context: &Context,
    ) -> Result<Context> {
        self.enter("create_or_update_context")?;
        let id = self.id(resource_group, &["contexts", name]);
        let mut stored = with_identity(context.clone(), id, name);
        stored.properties.provisioning_state = Some(ProvisioningState::Succeeded);

        let mut state = self.state();
        for extra in state.concurrent_capabilities.clone() {
            if !stored.has_capability(&extra.name) {
                stored.properties.capabilities.push(extra);
            }
        }
        state.contexts.insert(key(resource_group, name), stored.clone());
        Ok(stored)
    }

    async fn create_schema(
        &self,
        resource_group: &str,
        name: &str,
        schema: &Schema,
    ) -> Result<Schema> {
        self.enter("create_schema")?;
        let mut stored = with_identity(schema.clone(), self.id(resource_group, &["schemas", name]), name);
        stored.properties.provisioning_state = Some(ProvisioningState::Succeeded);
        self.state().schemas.insert(key(resource_group, name), stored.clone());
        Ok(stored)
    }

    async fn create_schema_version(
        &self,
        resource_group: &str,
        schema_name: &str,
        version_name: &str,
        version: &SchemaVersion,
    ) -> Result<SchemaVersion> {
        self.enter("create_schema_version")?;
        let mut state = self.state();
        if !state.schemas.contains_key(&key(resource_group, schema_name)) {
            return Err(AppError::NotFound(format!(
                "schema {}/{}",
                resource_group, schema_name
            )));
        }
        let id = self.id(resource_group, &["schemas", schema_name, "versions", version_name]);
        let mut stored = with_identity(version.clone(), id.clone(), version_name);
        stored.properties.provisioning_state = Some(ProvisioningState::Succeeded);
        state.schema_versions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn create_solution_template(
        &self,
        resource_group: &str,
        name: &str,
        template: &SolutionTemplate,
    ) -> Result<SolutionTemplate> {
        self.enter("create_solution_template")?;
        let id = self.id(resource_group, &["solutionTemplates", name]);
        let mut stored = with_identity(template.clone(), id, name);
        stored.properties.provisioning_state = Some(ProvisioningState::Succeeded);
        self.state().templates.insert(key(resource_group, name), stored.clone());
        Ok(stored)
    }

    async fn create_solution_template_version(
        &self,
        resource_group: &str,
        template_name: &str,
        request: &SolutionTemplateVersionRequest,
    ) -> Result<SolutionTemplateVersion> {
        self.enter("create_solution_template_version")?;
        let mut state = self.state();
        if !state.templates.contains_key(&key(resource_group, template_name)) {
            return Err(AppError::NotFound(format!(
                "solution template {}/{}",
                resource_group, template_name
            )));
        }
        let id = self.id(
            resource_group,
            &["solutionTemplates", template_name, "versions", &request.version],
        );
        let mut stored = with_identity(
            request.solution_template_version.clone(),
            id.clone(),
            &request.version,
        );
        stored.properties.provisioning_state = Some(ProvisioningState::Succeeded);
        state.template_versions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn create_target(
        &self,
        resource_group: &str,
        name: &str,
        target: &Target,
    ) -> Result<Target> {
        self.enter("create_target")?;
        let mut state = self.state();
        if let Some(context) = parse_context_id(&target.properties.context_id)
            .and_then(|k| state.contexts.get(&k))
        {
            if let Some(missing) = target
                .properties
                .capabilities
                .iter()
                .find(|c| !context.has_capability(c))
            {
                return Err(AppError::OperationFailed {
                    resource: format!("target {}/{}", resource_group, name),
                    code: "InvalidCapability".to_string(),
                    message: format!("capability {} is not registered in the context", missing),
                });
            }
        }
        let mut stored = with_identity(target.clone(), self.id(resource_group, &["targets", name]), name);
        stored.properties.provisioning_state = Some(ProvisioningState::Succeeded);
        state.targets.insert(key(resource_group, name), stored.clone());
        Ok(stored)
    }

    async fn get_target(&self, resource_group: &str, name: &str) -> Result<Option<Target>> {
        self.enter("get_target")?;
        Ok(self.state().targets.get(&key(resource_group, name)).cloned())
    }

    async fn review_solution_version(
        &self,
        resource_group: &str,
        target_name: &str,
        request: &ReviewRequest,
    ) -> Result<SolutionVersion> {
        self.enter("review_solution_version")?;
        let mut state = self.state();
        if !state.targets.contains_key(&key(resource_group, target_name)) {
            return Err(AppError::NotFound(format!(
                "target {}/{}",
                resource_group, target_name
            )));
        }

        let solution = solution_name_of(&request.solution_template_version_id)
            .unwrap_or_else(|| request.solution_instance_name.clone());
        let review_id = Uuid::new_v4().to_string();

        if state.review_registers_version {
            let versions = state
                .solution_versions
                .entry((
                    resource_group.to_string(),
                    target_name.to_string(),
                    solution.clone(),
                ))
                .or_default();
            let revision = versions.len() as i64 + 1;
            let version_name = format!("{}-{}.0.0", solution, revision);
            let id = edge_resource_id(
                &self.subscription_id,
                resource_group,
                &["targets", target_name, "solutions", &solution, "versions", &version_name],
            );
            let mut version = SolutionVersion::new(SolutionVersionProperties {
                state: Some("InReview".to_string()),
                provisioning_state: Some(ProvisioningState::Succeeded),
                solution_template_version_id: Some(request.solution_template_version_id.clone()),
                review_id: Some(review_id.clone()),
                revision: Some(revision),
            });
            version.id = Some(id);
            version.name = Some(version_name);
            versions.push(version);
        }

        let response_id = state.review_response_id.clone().unwrap_or_else(|| {
            edge_resource_id(
                &self.subscription_id,
                resource_group,
                &["targets", target_name, "reviews", &review_id],
            )
        });
        let mut response = SolutionVersion::new(SolutionVersionProperties {
            state: Some("InReview".to_string()),
            review_id: Some(review_id),
            ..Default::default()
        });
        if !response_id.is_empty() {
            response.id = Some(response_id);
        }
        Ok(response)
    }

    async fn list_solution_versions(
        &self,
        resource_group: &str,
        target_name: &str,
        solution_name: &str,
    ) -> Result<Vec<SolutionVersion>> {
        self.enter("list_solution_versions")?;
        Ok(self
            .state()
            .solution_versions
            .get(&(
                resource_group.to_string(),
                target_name.to_string(),
                solution_name.to_string(),
            ))
            .cloned()
            .unwrap_or_default())
    }

    async fn publish_solution_version(
        &self,
        resource_group: &str,
        target_name: &str,
        parameter: &SolutionVersionParameter,
    ) -> Result<SolutionVersion> {
        self.enter("publish_solution_version")?;
        let mut state = self.state();
        let version = state
            .solution_versions
            .iter_mut()
            .filter(|((rg, target, _), _)| rg == resource_group && target == target_name)
            .flat_map(|(_, versions)| versions.iter_mut())
            .find(|v| v.id.as_deref() == Some(parameter.solution_version_id.as_str()))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "solution version {} on target {}",
                    parameter.solution_version_id, target_name
                ))
            })?;
        version.properties.state = Some("ReadyToDeploy".to_string());
        let published = version.clone();
        state.published.push(parameter.solution_version_id.clone());
        Ok(published)
    }

    async fn install_solution(
        &self,
        _resource_group: &str,
        target_name: &str,
        parameter: &SolutionVersionParameter,
    ) -> Result<()> {
        self.enter("install_solution")?;
        let mut state = self.state();
        if !state.published.contains(&parameter.solution_version_id) {
            return Err(AppError::OperationFailed {
                resource: format!("install on target {}", target_name),
                code: "SolutionVersionNotPublished".to_string(),
                message: format!("{} has not been published", parameter.solution_version_id),
            });
        }
        state.installed.push(parameter.solution_version_id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContextProperties, TargetProperties};

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let client = InMemoryManagementClient::new(SUB);
        client.fail_next("get_target", vec![AppError::external(500, "boom")]);

        assert!(client.get_target("rg", "t").await.is_err());
        assert!(client.get_target("rg", "t").await.unwrap().is_none());
        assert_eq!(client.call_count("get_target"), 2);
    }

    #[tokio::test]
    async fn test_target_requires_registered_capability() {
        let client = InMemoryManagementClient::new(SUB);
        client.seed_context(
            "Mehoopany",
            "ctx",
            Context::new(ContextProperties {
                capabilities: vec![Capability::new("cap-a", "a")],
                ..Default::default()
            }),
        );
        let mut target = Target::new(TargetProperties {
            capabilities: vec!["cap-b".to_string()],
            context_id: edge_resource_id(SUB, "Mehoopany", &["contexts", "ctx"]),
            ..Default::default()
        });

        let err = client.create_target("rg", "t", &target).await.unwrap_err();
        assert!(err.to_string().contains("cap-b"));

        target.properties.capabilities = vec!["cap-a".to_string()];
        let created = client.create_target("rg", "t", &target).await.unwrap();
        assert!(created.id.unwrap().ends_with("/targets/t"));
    }

    #[test]
    fn test_id_parsing() {
        assert_eq!(
            parse_context_id("/subscriptions/s/resourceGroups/Mehoopany/providers/Microsoft.Edge/contexts/Mehoopany-Context"),
            Some(key("Mehoopany", "Mehoopany-Context"))
        );
        assert_eq!(
            solution_name_of("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Edge/solutionTemplates/sdkexamples-solution3/versions/1.2.3"),
            Some("sdkexamples-solution3".to_string())
        );
        assert_eq!(solution_name_of("tv-42"), None);
    }
}
