use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use super::http::{HttpRequest, HttpTransport};
use crate::config::{Config, ServicePrincipal};
use crate::error::{AppError, Result};

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Bearer token plus its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }
}

/// Credential provider.
///
/// Tokens are acquired right before each call; implementations do not cache.
/// Failures are fatal to the caller and are never retried at this layer.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;

    fn name(&self) -> &str;
}

/// Fixed token, for dry runs and tests
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: Utc::now() + ChronoDuration::hours(1),
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// OAuth2 client-credentials grant for a service principal
pub struct ClientSecretCredential {
    principal: ServicePrincipal,
    authority: String,
    transport: Arc<dyn HttpTransport>,
}

impl ClientSecretCredential {
    pub fn new(principal: ServicePrincipal, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            principal,
            authority: DEFAULT_AUTHORITY.to_string(),
            transport,
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority,
            urlencoding::encode(&self.principal.tenant_id)
        );
        let form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), self.principal.client_id.clone()),
            ("client_secret".to_string(), self.principal.client_secret.clone()),
            ("scope".to_string(), scopes.join(" ")),
        ];

        let response = self
            .transport
            .send(HttpRequest::post_form(url, form))
            .await
            .map_err(|e| AppError::AuthenticationError(format!("token request failed: {}", e)))?;

        if !response.is_success() {
            return Err(AppError::AuthenticationError(format!(
                "token endpoint returned {}: {}",
                response.status, response.body
            )));
        }

        let parsed: TokenResponse = response
            .parse()
            .map_err(|e| AppError::AuthenticationError(format!("invalid token response: {}", e)))?;
        let expires_in = parsed
            .expires_in
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(3600);

        debug!(client_id = %self.principal.client_id, "🔐 Acquired token via client secret");
        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: Utc::now() + ChronoDuration::seconds(expires_in),
        })
    }

    fn name(&self) -> &str {
        "client_secret"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenOutput {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<i64>,
}

/// Token from a logged-in Azure CLI (`az login`)
#[derive(Debug, Clone, Default)]
pub struct AzureCliCredential;

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let scope = scopes.first().copied().unwrap_or_default();
        let resource = scope.trim_end_matches("/.default");

        let output = Command::new("az")
            .args(["account", "get-access-token", "--output", "json", "--resource", resource])
            .output()
            .await
            .map_err(|e| AppError::AuthenticationError(format!("failed to run az: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::AuthenticationError(format!(
                "az account get-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let parsed: CliTokenOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::AuthenticationError(format!("invalid az output: {}", e)))?;
        let expires_on = parsed
            .expires_on
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + ChronoDuration::minutes(5));

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on,
        })
    }

    fn name(&self) -> &str {
        "azure_cli"
    }
}

/// Tries each credential in order and returns the first token obtained
pub struct ChainedCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedCredential {
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    /// Service principal from the environment when configured, then the Azure CLI
    pub fn default_chain(config: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::new();
        if let Some(principal) = &config.service_principal {
            sources.push(Arc::new(ClientSecretCredential::new(
                principal.clone(),
                transport,
            )));
        }
        sources.push(Arc::new(AzureCliCredential));
        Self::new(sources)
    }
}

#[async_trait]
impl TokenCredential for ChainedCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.get_token(scopes).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    warn!(credential = source.name(), error = %e, "Credential unavailable, trying next");
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }
        Err(AppError::AuthenticationError(format!(
            "no credential could provide a token. Set AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET, or run `az login`. [{}]",
            failures.join("; ")
        )))
    }

    fn name(&self) -> &str {
        "chained"
    }
}
