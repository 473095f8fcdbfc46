use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::LogFormat;
use crate::error::{AppError, Result};

const DEFAULT_LOCATION: &str = "eastus2euap";
const DEFAULT_RESOURCE_GROUP: &str = "sdkexamples";
const DEFAULT_CONTEXT_RESOURCE_GROUP: &str = "Mehoopany";
const DEFAULT_CONTEXT_NAME: &str = "Mehoopany-Context";
const DEFAULT_CUSTOM_LOCATION_GROUP: &str = "configmanager-cloudtest-playground-portal";
const DEFAULT_CUSTOM_LOCATION: &str = "den-Location";
const DEFAULT_NAME_PREFIX: &str = "sdkexamples";
const DEFAULT_TARGET_NAME: &str = "sdkbox-mk71";
const DEFAULT_FALLBACK_CAPABILITY: &str = "sdkexamples-soap";
const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
const DEFAULT_API_VERSION: &str = "2025-06-01";
const DEFAULT_CONFIG_API_VERSION: &str = "2024-06-01-preview";
const DRY_RUN_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

/// Service principal credentials, present only when all three variables are set
#[derive(Debug, Clone)]
pub struct ServicePrincipal {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Fixed waits and LRO polling cadence
#[derive(Debug, Clone)]
pub struct Timings {
    /// Wait after the context update before verifying the selected capability
    pub context_propagation_wait: Duration,
    /// Wait after creating a solution template before submitting its version
    pub template_settle_wait: Duration,
    pub lro_poll_interval: Duration,
    pub lro_max_polls: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            context_propagation_wait: Duration::from_secs(30),
            template_settle_wait: Duration::from_secs(10),
            lro_poll_interval: Duration::from_secs(5),
            lro_max_polls: 120,
        }
    }
}

impl Timings {
    pub fn immediate() -> Self {
        Self {
            context_propagation_wait: Duration::ZERO,
            template_settle_wait: Duration::ZERO,
            lro_poll_interval: Duration::ZERO,
            lro_max_polls: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub subscription_id: String,
    pub service_principal: Option<ServicePrincipal>,
    pub location: String,
    pub resource_group: String,
    pub context_resource_group: String,
    pub context_name: String,
    pub extended_location: String,
    pub name_prefix: String,
    pub target_name: String,
    pub fallback_capability: String,
    pub management_endpoint: String,
    pub api_version: String,
    pub config_api_version: String,
    pub version_file: PathBuf,
    /// Reference copy of the merged capability list
    pub capabilities_file: PathBuf,
    pub timings: Timings,
    pub dry_run: bool,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment (after `.env`)
    pub fn init() -> Result<Config> {
        dotenv::dotenv().ok();
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Config> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let dry_run = match get("WO_DRY_RUN") {
            Some(v) => parse_bool("WO_DRY_RUN", &v)?,
            None => false,
        };

        let subscription_id = match get("AZURE_SUBSCRIPTION_ID") {
            Some(id) => id,
            None if dry_run => DRY_RUN_SUBSCRIPTION.to_string(),
            None => {
                return Err(AppError::ConfigurationError(
                    "AZURE_SUBSCRIPTION_ID must be set".to_string(),
                ))
            }
        };
        validate_subscription_id(&subscription_id)?;

        let service_principal = match (
            get("AZURE_TENANT_ID"),
            get("AZURE_CLIENT_ID"),
            get("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let extended_location = get("WO_EXTENDED_LOCATION").unwrap_or_else(|| {
            format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ExtendedLocation/customLocations/{}",
                subscription_id, DEFAULT_CUSTOM_LOCATION_GROUP, DEFAULT_CUSTOM_LOCATION
            )
        });

        let defaults = if dry_run {
            Timings::immediate()
        } else {
            Timings::default()
        };
        let timings = Timings {
            context_propagation_wait: parse_secs(
                get("WO_CONTEXT_PROPAGATION_WAIT_SECS"),
                "WO_CONTEXT_PROPAGATION_WAIT_SECS",
                defaults.context_propagation_wait,
            )?,
            template_settle_wait: parse_secs(
                get("WO_TEMPLATE_SETTLE_WAIT_SECS"),
                "WO_TEMPLATE_SETTLE_WAIT_SECS",
                defaults.template_settle_wait,
            )?,
            lro_poll_interval: parse_secs(
                get("WO_LRO_POLL_INTERVAL_SECS"),
                "WO_LRO_POLL_INTERVAL_SECS",
                defaults.lro_poll_interval,
            )?,
            lro_max_polls: match get("WO_LRO_MAX_POLLS") {
                Some(v) => v.parse::<u32>().map_err(|_| {
                    AppError::ConfigurationError("WO_LRO_MAX_POLLS must be a number".to_string())
                })?,
                None => defaults.lro_max_polls,
            },
        };

        let log_format = match get("WO_LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => LogFormat::default(),
        };

        Ok(Config {
            subscription_id,
            service_principal,
            location: get_or("WO_LOCATION", DEFAULT_LOCATION),
            resource_group: get_or("WO_RESOURCE_GROUP", DEFAULT_RESOURCE_GROUP),
            context_resource_group: get_or(
                "WO_CONTEXT_RESOURCE_GROUP",
                DEFAULT_CONTEXT_RESOURCE_GROUP,
            ),
            context_name: get_or("WO_CONTEXT_NAME", DEFAULT_CONTEXT_NAME),
            extended_location,
            name_prefix: get_or("WO_NAME_PREFIX", DEFAULT_NAME_PREFIX),
            target_name: get_or("WO_TARGET_NAME", DEFAULT_TARGET_NAME),
            fallback_capability: get_or("WO_FALLBACK_CAPABILITY", DEFAULT_FALLBACK_CAPABILITY),
            management_endpoint: get_or("WO_MANAGEMENT_ENDPOINT", DEFAULT_MANAGEMENT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            api_version: get_or("WO_API_VERSION", DEFAULT_API_VERSION),
            config_api_version: get_or("WO_CONFIG_API_VERSION", DEFAULT_CONFIG_API_VERSION),
            version_file: PathBuf::from(get_or("WO_VERSION_FILE", "version.txt")),
            capabilities_file: PathBuf::from(get_or(
                "WO_CAPABILITIES_FILE",
                "context-capabilities.json",
            )),
            timings,
            dry_run,
            log_format,
        })
    }

    /// Resource id of the shared context targets are bound to
    pub fn context_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Edge/contexts/{}",
            self.subscription_id, self.context_resource_group, self.context_name
        )
    }

    /// Token scope for the management plane
    pub fn management_scope(&self) -> String {
        format!("{}/.default", self.management_endpoint)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigurationError(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_secs(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match value {
        Some(v) => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| AppError::ConfigurationError(format!("{} must be a number", key))),
        None => Ok(default),
    }
}

fn validate_subscription_id(id: &str) -> Result<()> {
    if id.len() != 36 || id.chars().filter(|&c| c == '-').count() != 4 {
        return Err(AppError::ConfigurationError(
            "Azure subscription ID must be a valid UUID format".to_string(),
        ));
    }
    Ok(())
}
