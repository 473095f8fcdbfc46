use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::credentials::TokenCredential;
use super::http::{HttpRequest, HttpTransport};
use super::lro::LroPoller;
use crate::domain::{
    Context, Resource, ReviewRequest, Schema, SchemaVersion, SolutionTemplate,
    SolutionTemplateVersion, SolutionTemplateVersionRequest, SolutionVersion,
    SolutionVersionParameter, Target,
};
use crate::error::{AppError, Result};

const PROVIDER: &str = "Microsoft.Edge";

/// Management-plane operations the provisioning workflow depends on.
///
/// Create-or-update and action calls return only once the underlying
/// long-running operation is terminal. Gets return `Ok(None)` for a missing
/// resource.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    async fn get_context(&self, resource_group: &str, name: &str) -> Result<Option<Context>>;

    async fn create_or_update_context(
        &self,
        resource_group: &str,
        name: &str,
        context: &Context,
    ) -> Result<Context>;

    async fn create_schema(&self, resource_group: &str, name: &str, schema: &Schema)
        -> Result<Schema>;

    async fn create_schema_version(
        &self,
        resource_group: &str,
        schema_name: &str,
        version_name: &str,
        version: &SchemaVersion,
    ) -> Result<SchemaVersion>;

    async fn create_solution_template(
        &self,
        resource_group: &str,
        name: &str,
        template: &SolutionTemplate,
    ) -> Result<SolutionTemplate>;

    async fn create_solution_template_version(
        &self,
        resource_group: &str,
        template_name: &str,
        request: &SolutionTemplateVersionRequest,
    ) -> Result<SolutionTemplateVersion>;

    async fn create_target(&self, resource_group: &str, name: &str, target: &Target)
        -> Result<Target>;

    async fn get_target(&self, resource_group: &str, name: &str) -> Result<Option<Target>>;

    async fn review_solution_version(
        &self,
        resource_group: &str,
        target_name: &str,
        request: &ReviewRequest,
    ) -> Result<SolutionVersion>;

    /// Every solution version of `solution_name` on the target, in listing order
    async fn list_solution_versions(
        &self,
        resource_group: &str,
        target_name: &str,
        solution_name: &str,
    ) -> Result<Vec<SolutionVersion>>;

    async fn publish_solution_version(
        &self,
        resource_group: &str,
        target_name: &str,
        parameter: &SolutionVersionParameter,
    ) -> Result<SolutionVersion>;

    async fn install_solution(
        &self,
        resource_group: &str,
        target_name: &str,
        parameter: &SolutionVersionParameter,
    ) -> Result<()>;
}

/// Resource id of a `Microsoft.Edge` resource or child resource
pub fn edge_resource_id(subscription_id: &str, resource_group: &str, segments: &[&str]) -> String {
    let mut id = format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}",
        subscription_id, resource_group, PROVIDER
    );
    for segment in segments {
        id.push('/');
        id.push_str(segment);
    }
    id
}

/// Builds resource URLs under one subscription
#[derive(Debug, Clone)]
pub struct ArmEndpoint {
    base: Url,
    subscription_id: String,
}

impl ArmEndpoint {
    pub fn new(base: &str, subscription_id: impl Into<String>) -> Result<Self> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(AppError::ConfigurationError(format!(
                "management endpoint {} cannot be used as a base URL",
                base
            )));
        }
        Ok(Self {
            base,
            subscription_id: subscription_id.into(),
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Edge/{segments...}`
    pub fn resource_id(&self, resource_group: &str, segments: &[&str]) -> String {
        edge_resource_id(&self.subscription_id, resource_group, segments)
    }

    /// Full URL for a resource or action, with its `api-version` query
    pub fn url(&self, resource_group: &str, segments: &[&str], api_version: &str) -> Result<String> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                AppError::ConfigurationError("management endpoint cannot hold a path".to_string())
            })?;
            path.pop_if_empty()
                .extend(["subscriptions", self.subscription_id.as_str()])
                .extend(["resourceGroups", resource_group])
                .extend(["providers", PROVIDER])
                .extend(segments.iter().copied());
        }
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url.to_string())
    }
}

/// `ManagementClient` over the Azure Resource Manager REST API
pub struct ArmClient {
    endpoint: ArmEndpoint,
    api_version: String,
    scope: String,
    transport: Arc<dyn HttpTransport>,
    credential: Arc<dyn TokenCredential>,
    poller: LroPoller,
}

impl ArmClient {
    pub fn new(
        endpoint: ArmEndpoint,
        api_version: impl Into<String>,
        scope: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        credential: Arc<dyn TokenCredential>,
        poller: LroPoller,
    ) -> Self {
        Self {
            endpoint,
            api_version: api_version.into(),
            scope: scope.into(),
            transport,
            credential,
            poller,
        }
    }

    async fn token(&self) -> Result<String> {
        Ok(self.credential.get_token(&[self.scope.as_str()]).await?.token)
    }

    fn url(&self, resource_group: &str, segments: &[&str]) -> Result<String> {
        self.endpoint.url(resource_group, segments, &self.api_version)
    }

    async fn get_optional<T: DeserializeOwned>(&self, label: &str, url: String) -> Result<Option<T>> {
        let token = self.token().await?;
        let response = self
            .transport
            .send(HttpRequest::get(url).bearer(&token))
            .await?;
        if response.status == 404 {
            debug!(resource = label, "Resource does not exist");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response.into_error(label));
        }
        Ok(Some(response.parse()?))
    }

    async fn put_and_wait<B, T>(&self, label: &str, url: String, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let token = self.token().await?;
        let request = HttpRequest::put(url.clone(), serde_json::to_value(body)?).bearer(&token);
        let initial = self.transport.send(request).await?;
        let value = self
            .poller
            .poll_until_done(label, initial, Some(&url), &token)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn post_and_wait<B>(&self, label: &str, url: String, body: &B) -> Result<Value>
    where
        B: Serialize + Sync,
    {
        let token = self.token().await?;
        let request = HttpRequest::post(url, serde_json::to_value(body)?).bearer(&token);
        let initial = self.transport.send(request).await?;
        self.poller.poll_until_done(label, initial, None, &token).await
    }
}

/// Action results may come back empty; treat that as a resource with no properties
fn resource_or_default<P>(value: Value) -> Result<Resource<P>>
where
    P: DeserializeOwned + Default,
{
    if value.is_null() {
        return Ok(Resource::new(P::default()));
    }
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl ManagementClient for ArmClient {
    async fn get_context(&self, resource_group: &str, name: &str) -> Result<Option<Context>> {
        let url = self.url(resource_group, &["contexts", name])?;
        self.get_optional(&format!("context {}/{}", resource_group, name), url)
            .await
    }

    async fn create_or_update_context(
        &self,
        resource_group: &str,
        name: &str,
        context: &Context,
    ) -> Result<Context> {
        let url = self.url(resource_group, &["contexts", name])?;
        self.put_and_wait(&format!("context {}/{}", resource_group, name), url, context)
            .await
    }

    async fn create_schema(
        &self,
        resource_group: &str,
        name: &str,
        schema: &Schema,
    ) -> Result<Schema> {
        let url = self.url(resource_group, &["schemas", name])?;
        self.put_and_wait(&format!("schema {}/{}", resource_group, name), url, schema)
            .await
    }

    async fn create_schema_version(
        &self,
        resource_group: &str,
        schema_name: &str,
        version_name: &str,
        version: &SchemaVersion,
    ) -> Result<SchemaVersion> {
        let url = self.url(
            resource_group,
            &["schemas", schema_name, "versions", version_name],
        )?;
        let label = format!(
            "schema version {}/{}/{}",
            resource_group, schema_name, version_name
        );
        self.put_and_wait(&label, url, version).await
    }

    async fn create_solution_template(
        &self,
        resource_group: &str,
        name: &str,
        template: &SolutionTemplate,
    ) -> Result<SolutionTemplate> {
        let url = self.url(resource_group, &["solutionTemplates", name])?;
        let label = format!("solution template {}/{}", resource_group, name);
        self.put_and_wait(&label, url, template).await
    }

    async fn create_solution_template_version(
        &self,
        resource_group: &str,
        template_name: &str,
        request: &SolutionTemplateVersionRequest,
    ) -> Result<SolutionTemplateVersion> {
        let url = self.url(
            resource_group,
            &["solutionTemplates", template_name, "createVersion"],
        )?;
        let label = format!(
            "solution template version {}/{}:{}",
            resource_group, template_name, request.version
        );
        let value = self.post_and_wait(&label, url, request).await?;
        resource_or_default(value)
    }

    async fn create_target(
        &self,
        resource_group: &str,
        name: &str,
        target: &Target,
    ) -> Result<Target> {
        let url = self.url(resource_group, &["targets", name])?;
        self.put_and_wait(&format!("target {}/{}", resource_group, name), url, target)
            .await
    }

    async fn get_target(&self, resource_group: &str, name: &str) -> Result<Option<Target>> {
        let url = self.url(resource_group, &["targets", name])?;
        self.get_optional(&format!("target {}/{}", resource_group, name), url)
            .await
    }

    async fn review_solution_version(
        &self,
        resource_group: &str,
        target_name: &str,
        request: &ReviewRequest,
    ) -> Result<SolutionVersion> {
        let url = self.url(
            resource_group,
            &["targets", target_name, "reviewSolutionVersion"],
        )?;
        let label = format!("review on target {}/{}", resource_group, target_name);
        let value = self.post_and_wait(&label, url, request).await?;
        resource_or_default(value)
    }

    async fn list_solution_versions(
        &self,
        resource_group: &str,
        target_name: &str,
        solution_name: &str,
    ) -> Result<Vec<SolutionVersion>> {
        let label = format!(
            "solution versions of {} on target {}/{}",
            solution_name, resource_group, target_name
        );
        let mut next = Some(self.url(
            resource_group,
            &["targets", target_name, "solutions", solution_name, "solutionVersions"],
        )?);
        let mut versions = Vec::new();

        while let Some(url) = next.take() {
            let token = self.token().await?;
            let response = self
                .transport
                .send(HttpRequest::get(url).bearer(&token))
                .await?;
            if !response.is_success() {
                return Err(response.into_error(&label));
            }
            let page = response.json_value()?;
            if let Some(items) = page.get("value").and_then(Value::as_array) {
                for item in items {
                    versions.push(serde_json::from_value(item.clone())?);
                }
            }
            next = page
                .get("nextLink")
                .and_then(Value::as_str)
                .filter(|link| !link.is_empty())
                .map(str::to_string);
        }

        debug!(count = versions.len(), solution = solution_name, "Listed solution versions");
        Ok(versions)
    }

    async fn publish_solution_version(
        &self,
        resource_group: &str,
        target_name: &str,
        parameter: &SolutionVersionParameter,
    ) -> Result<SolutionVersion> {
        let url = self.url(
            resource_group,
            &["targets", target_name, "publishSolutionVersion"],
        )?;
        let label = format!("publish on target {}/{}", resource_group, target_name);
        let value = self.post_and_wait(&label, url, parameter).await?;
        resource_or_default(value)
    }

    async fn install_solution(
        &self,
        resource_group: &str,
        target_name: &str,
        parameter: &SolutionVersionParameter,
    ) -> Result<()> {
        let url = self.url(resource_group, &["targets", target_name, "installSolution"])?;
        let label = format!("install on target {}/{}", resource_group, target_name);
        self.post_and_wait(&label, url, parameter).await?;
        info!(target = target_name, solution_version_id = %parameter.solution_version_id, "Install accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContextProperties, SolutionVersionProperties};
    use crate::infrastructure::credentials::StaticTokenCredential;
    use crate::infrastructure::http::{HttpMethod, HttpResponse};
    use crate::testing::{RecordingSleeper, ScriptedTransport};
    use serde_json::json;
    use std::time::Duration;

    const SUB: &str = "973d15c6-6c57-447e-b9c6-6d79b5b784ab";

    fn client(responses: Vec<HttpResponse>) -> (ArmClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let poller = LroPoller::new(
            transport.clone(),
            Arc::new(RecordingSleeper::default()),
            Duration::from_secs(1),
            5,
        );
        let client = ArmClient::new(
            ArmEndpoint::new("https://management.azure.com", SUB).unwrap(),
            "2025-06-01",
            "https://management.azure.com/.default",
            transport.clone(),
            Arc::new(StaticTokenCredential::new("tok")),
            poller,
        );
        (client, transport)
    }

    #[test]
    fn test_endpoint_builds_urls_and_ids() {
        let endpoint = ArmEndpoint::new("https://management.azure.com/", SUB).unwrap();
        assert_eq!(
            endpoint
                .url("sdkexamples", &["targets", "sdkbox-mk71-3"], "2025-06-01")
                .unwrap(),
            format!(
                "https://management.azure.com/subscriptions/{}/resourceGroups/sdkexamples/providers/Microsoft.Edge/targets/sdkbox-mk71-3?api-version=2025-06-01",
                SUB
            )
        );
        assert_eq!(
            endpoint.resource_id("rg", &["solutionTemplates", "t1", "versions", "1.0.0"]),
            format!(
                "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Edge/solutionTemplates/t1/versions/1.0.0",
                SUB
            )
        );
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let endpoint = ArmEndpoint::new("https://management.azure.com", SUB).unwrap();
        let url = endpoint.url("rg", &["contexts", "a b"], "v").unwrap();
        assert!(url.contains("/contexts/a%20b?"));
    }

    #[tokio::test]
    async fn test_get_context_missing_is_none() {
        let (client, transport) = client(vec![HttpResponse::new(404, "")]);
        let context = client.get_context("Mehoopany", "Mehoopany-Context").await.unwrap();
        assert!(context.is_none());

        let request = &transport.requests()[0];
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.header_value("Authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_put_context_sends_body() {
        let stored = json!({
            "name": "Mehoopany-Context",
            "properties": {"capabilities": [{"name": "c1", "description": "d"}], "hierarchies": [], "provisioningState": "Succeeded"}
        });
        let (client, transport) = client(vec![HttpResponse::json(200, &stored)]);
        let context = Context::new(ContextProperties::default()).with_location("eastus2euap");

        let saved = client
            .create_or_update_context("Mehoopany", "Mehoopany-Context", &context)
            .await
            .unwrap();
        assert!(saved.has_capability("c1"));

        let request = &transport.requests()[0];
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.json_body().unwrap()["location"], "eastus2euap");
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let (client, transport) = client(vec![
            HttpResponse::json(
                200,
                &json!({"value": [{"id": "sv-1", "properties": {}}], "nextLink": "https://management.azure.com/page2"}),
            ),
            HttpResponse::json(200, &json!({"value": [{"id": "sv-2", "properties": {}}]})),
        ]);

        let versions = client
            .list_solution_versions("rg", "target", "solution")
            .await
            .unwrap();
        let ids: Vec<_> = versions.iter().filter_map(|v| v.id.clone()).collect();
        assert_eq!(ids, vec!["sv-1", "sv-2"]);
        assert!(transport.requests()[0]
            .url
            .contains("/targets/target/solutions/solution/solutionVersions?"));
        assert_eq!(transport.requests()[1].url, "https://management.azure.com/page2");
    }

    #[tokio::test]
    async fn test_empty_action_result_is_default_resource() {
        let (client, _) = client(vec![HttpResponse::new(200, "")]);
        let published = client
            .publish_solution_version(
                "rg",
                "target",
                &SolutionVersionParameter {
                    solution_version_id: "sv-1".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(published.id.is_none());
        assert_eq!(published.properties, SolutionVersionProperties::default());
    }
}
