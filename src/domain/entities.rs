use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provisioning state reported by the management plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    Succeeded,
    Failed,
    Canceled,
    Accepted,
    Provisioning,
    Updating,
    Deleting,
    #[serde(other)]
    InProgress,
}

impl ProvisioningState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Succeeded | ProvisioningState::Failed | ProvisioningState::Canceled
        )
    }

    /// Parse the free-form `status` string of an async-operation document
    pub fn from_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "succeeded" => ProvisioningState::Succeeded,
            "failed" => ProvisioningState::Failed,
            "canceled" | "cancelled" => ProvisioningState::Canceled,
            "accepted" => ProvisioningState::Accepted,
            "provisioning" => ProvisioningState::Provisioning,
            "updating" => ProvisioningState::Updating,
            "deleting" => ProvisioningState::Deleting,
            _ => ProvisioningState::InProgress,
        }
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProvisioningState::Succeeded => "Succeeded",
            ProvisioningState::Failed => "Failed",
            ProvisioningState::Canceled => "Canceled",
            ProvisioningState::Accepted => "Accepted",
            ProvisioningState::Provisioning => "Provisioning",
            ProvisioningState::Updating => "Updating",
            ProvisioningState::Deleting => "Deleting",
            ProvisioningState::InProgress => "InProgress",
        };
        f.write_str(s)
    }
}

/// Envelope shared by every tracked resource: identity on the outside,
/// type-specific properties inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<P> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_location: Option<ExtendedLocation>,
    pub properties: P,
}

impl<P> Resource<P> {
    pub fn new(properties: P) -> Self {
        Self {
            id: None,
            name: None,
            location: None,
            extended_location: None,
            properties,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_extended_location(mut self, extended_location: ExtendedLocation) -> Self {
        self.extended_location = Some(extended_location);
        self
    }

    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }

    pub fn resource_name(&self) -> &str {
        self.name_or("")
    }

    /// Fill in the name the resource was created under when the service
    /// answered without one (e.g. an empty LRO result).
    pub fn named_if_missing(mut self, name: &str) -> Self {
        if self.name.as_deref().map_or(true, str::is_empty) {
            self.name = Some(name.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedLocation {
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: String,
}

impl ExtendedLocation {
    pub fn custom_location(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location_type: "CustomLocation".to_string(),
        }
    }
}

/// A named tag a target or solution template can provide or require.
/// Names are unique within a context and compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Capability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub name: String,
    pub description: String,
}

impl Hierarchy {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextProperties {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub hierarchies: Vec<Hierarchy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
}

pub type Context = Resource<ContextProperties>;

impl Context {
    pub fn has_capability(&self, name: &str) -> bool {
        self.properties.capabilities.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
}

pub type Schema = Resource<SchemaProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaVersionProperties {
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
}

pub type SchemaVersion = Resource<SchemaVersionProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionTemplateProperties {
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
}

pub type SolutionTemplate = Resource<SolutionTemplateProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionTemplateVersionProperties {
    #[serde(default)]
    pub configurations: String,
    #[serde(default)]
    pub specification: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
}

pub type SolutionTemplateVersion = Resource<SolutionTemplateVersionProperties>;

/// Body of the `createVersion` action on a solution template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionTemplateVersionRequest {
    pub solution_template_version: SolutionTemplateVersion,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetProperties {
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub context_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub hierarchy_level: String,
    #[serde(default)]
    pub solution_scope: String,
    #[serde(default)]
    pub target_specification: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
}

pub type Target = Resource<TargetProperties>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionVersionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_template_version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

/// Target-scoped outcome of reviewing a solution template version
pub type SolutionVersion = Resource<SolutionVersionProperties>;

/// Body of the `reviewSolutionVersion` action on a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub solution_dependencies: Vec<Value>,
    pub solution_instance_name: String,
    pub solution_template_version_id: String,
}

/// Body of the `publishSolutionVersion` and `installSolution` actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionVersionParameter {
    pub solution_version_id: String,
}
