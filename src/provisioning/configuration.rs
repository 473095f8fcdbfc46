use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::infrastructure::{ArmEndpoint, HttpRequest, HttpTransport, TokenCredential};

const CONFIGURATION_VERSION: &str = "version1";

/// Scalar configuration value, rendered in its natural string form
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Integer(v) => write!(f, "{}", v),
            // keep a fractional part so float fields stay floats
            ConfigValue::Float(v) => write!(f, "{:?}", v),
            ConfigValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}

pub type ConfigValues = BTreeMap<String, ConfigValue>;

/// Newline-delimited `key: value` block, one line per entry
pub fn render_values(values: &ConfigValues) -> String {
    let mut block = values
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("\n");
    block.push('\n');
    block
}

/// Configuration as stored by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConfiguration {
    #[serde(default)]
    pub values: String,
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

impl StoredConfiguration {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.values.lines().filter(|line| !line.trim().is_empty())
    }

    /// Entries of the values block; values are kept verbatim
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ConfigurationEnvelope {
    #[serde(default)]
    properties: StoredConfiguration,
}

/// Writes and reads a target's dynamic configuration through plain REST calls.
///
/// A token is acquired right before every call.
pub struct ConfigurationPublisher {
    transport: Arc<dyn HttpTransport>,
    credential: Arc<dyn TokenCredential>,
    endpoint: ArmEndpoint,
    resource_group: String,
    api_version: String,
    scope: String,
}

impl ConfigurationPublisher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credential: Arc<dyn TokenCredential>,
        endpoint: ArmEndpoint,
        resource_group: impl Into<String>,
        api_version: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credential,
            endpoint,
            resource_group: resource_group.into(),
            api_version: api_version.into(),
            scope: scope.into(),
        }
    }

    pub fn url(&self, config_name: &str, solution_name: &str) -> Result<String> {
        self.endpoint.url(
            &self.resource_group,
            &[
                "configurations",
                config_name,
                "DynamicConfigurations",
                solution_name,
                "versions",
                CONFIGURATION_VERSION,
            ],
            &self.api_version,
        )
    }

    async fn token(&self) -> Result<String> {
        Ok(self.credential.get_token(&[self.scope.as_str()]).await?.token)
    }

    /// Replace the stored values with `values`
    pub async fn put(
        &self,
        config_name: &str,
        solution_name: &str,
        values: &ConfigValues,
    ) -> Result<()> {
        let url = self.url(config_name, solution_name)?;
        let body = json!({
            "properties": {
                "values": render_values(values),
                "provisioningState": "Succeeded"
            }
        });
        let token = self.token().await?;

        debug!(url = %url, "Putting dynamic configuration");
        let response = self
            .transport
            .send(
                HttpRequest::put(url, body)
                    .bearer(&token)
                    .header("Content-Type", "application/json"),
            )
            .await?;

        if !response.is_success() {
            return Err(AppError::external(
                response.status,
                format!(
                    "configuration {}/{} in {}: {}",
                    config_name, solution_name, self.resource_group, response.body
                ),
            ));
        }
        info!(
            config = config_name,
            solution = solution_name,
            entries = values.len(),
            "⚙️ Configuration values set"
        );
        Ok(())
    }

    /// Read the stored configuration.
    ///
    /// A non-200 answer is logged and yields `Ok(None)`; only token and
    /// transport failures are errors.
    pub async fn get(
        &self,
        config_name: &str,
        solution_name: &str,
    ) -> Result<Option<StoredConfiguration>> {
        let url = self.url(config_name, solution_name)?;
        let token = self.token().await?;
        let response = self
            .transport
            .send(
                HttpRequest::get(url)
                    .bearer(&token)
                    .header("Content-Type", "application/json"),
            )
            .await?;

        if response.status != 200 {
            warn!(
                config = config_name,
                solution = solution_name,
                status = response.status,
                body = %response.body,
                "Configuration read failed, continuing"
            );
            return Ok(None);
        }

        match response.parse::<ConfigurationEnvelope>() {
            Ok(envelope) => {
                debug!(values = %envelope.properties.values, "Configuration read back");
                Ok(Some(envelope.properties))
            }
            Err(e) => {
                warn!(error = %e, "Configuration response is not valid JSON");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::StaticTokenCredential;
    use crate::testing::InMemoryTransport;

    const SUB: &str = "973d15c6-6c57-447e-b9c6-6d79b5b784ab";

    fn publisher(transport: Arc<InMemoryTransport>) -> ConfigurationPublisher {
        ConfigurationPublisher::new(
            transport,
            Arc::new(StaticTokenCredential::new("tok")),
            ArmEndpoint::new("https://management.azure.com", SUB).unwrap(),
            "sdkexamples",
            "2024-06-01-preview",
            "https://management.azure.com/.default",
        )
    }

    #[test]
    fn test_render_values_natural_forms() {
        let mut values = ConfigValues::new();
        values.insert("a".to_string(), ConfigValue::from(1i64));
        values.insert("b".to_string(), ConfigValue::from(true));
        values.insert("c".to_string(), ConfigValue::from(35.3));
        values.insert("d".to_string(), ConfigValue::from("http://localhost:8080/app"));
        values.insert("e".to_string(), ConfigValue::from(100.0));

        assert_eq!(
            render_values(&values),
            "a: 1\nb: true\nc: 35.3\nd: http://localhost:8080/app\ne: 100.0\n"
        );
    }

    #[test]
    fn test_url_shape() {
        let publisher = publisher(Arc::new(InMemoryTransport::new()));
        assert_eq!(
            publisher.url("sdkbox-mk71Config", "sdkexamples-solution1").unwrap(),
            format!(
                "https://management.azure.com/subscriptions/{}/resourceGroups/sdkexamples/providers/Microsoft.Edge/configurations/sdkbox-mk71Config/DynamicConfigurations/sdkexamples-solution1/versions/version1?api-version=2024-06-01-preview",
                SUB
            )
        );
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips_values() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(transport.clone());
        let mut values = ConfigValues::new();
        values.insert("a".to_string(), 1i64.into());
        values.insert("b".to_string(), true.into());

        publisher.put("cfg", "sol", &values).await.unwrap();
        let stored = publisher.get("cfg", "sol").await.unwrap().unwrap();

        let lines: Vec<&str> = stored.lines().collect();
        assert!(lines.contains(&"a: 1"));
        assert!(lines.contains(&"b: true"));
        assert_eq!(stored.provisioning_state.as_deref(), Some("Succeeded"));
        assert_eq!(stored.entries()["b"], "true");

        let requests = transport.requests();
        assert!(requests
            .iter()
            .all(|r| r.header_value("Authorization") == Some("Bearer tok")));
    }

    #[tokio::test]
    async fn test_put_fully_replaces_previous_values() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(transport);
        let mut first = ConfigValues::new();
        first.insert("old".to_string(), "x".into());
        let mut second = ConfigValues::new();
        second.insert("new".to_string(), "y".into());

        publisher.put("cfg", "sol", &first).await.unwrap();
        publisher.put("cfg", "sol", &second).await.unwrap();

        let stored = publisher.get("cfg", "sol").await.unwrap().unwrap();
        assert_eq!(stored.values, "new: y\n");
    }

    #[tokio::test]
    async fn test_get_failure_is_not_an_error() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = publisher(transport.clone());
        assert!(publisher.get("cfg", "missing").await.unwrap().is_none());

        transport.fail_with(500);
        assert!(publisher.get("cfg", "sol").await.unwrap().is_none());
        let err = publisher
            .put("cfg", "sol", &ConfigValues::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalServiceError { status: 500, .. }));
    }
}
