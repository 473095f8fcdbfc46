//! Static desired-state documents submitted by the workflow.

use serde_json::{json, Value};
use serde_yaml::{Mapping, Value as YamlValue};

use super::configuration::{ConfigValue, ConfigValues};
use crate::domain::Hierarchy;
use crate::error::Result;

pub const TEMPLATE_DESCRIPTION: &str = "This is Holtmelt Solution with random capabilities";
pub const TARGET_DESCRIPTION: &str = "This is MK-71 Site with random capabilities";
pub const HIERARCHY_LEVEL: &str = "line";
pub const SOLUTION_SCOPE: &str = "new";
pub const ORCHESTRATOR_TYPE: &str = "TO";
pub const APP_NAME: &str = "Hotmelt";

const EDIT_SCOPE: &str = "line";
const EDIT_ROLE: &str = "OT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    String,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
        }
    }
}

/// One validated configuration field of the schema
#[derive(Debug, Clone, Copy)]
pub struct SchemaField {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

const fn field(name: &'static str, field_type: FieldType, required: bool) -> SchemaField {
    SchemaField {
        name,
        field_type,
        required,
    }
}

pub const SCHEMA_FIELDS: [SchemaField; 7] = [
    field("ErrorThreshold", FieldType::Float, true),
    field("HealthCheckEndpoint", FieldType::String, false),
    field("EnableLocalLog", FieldType::Boolean, true),
    field("AgentEndpoint", FieldType::String, true),
    field("HealthCheckEnabled", FieldType::Boolean, false),
    field("ApplicationEndpoint", FieldType::String, true),
    field("TemperatureRangeMax", FieldType::Float, true),
];

/// Organisational levels attached to the context on every update
pub fn hierarchies() -> Vec<Hierarchy> {
    vec![
        Hierarchy::new("country", "Country level hierarchy"),
        Hierarchy::new("region", "Regional level hierarchy"),
        Hierarchy::new("factory", "Factory level hierarchy"),
        Hierarchy::new("line", "Production line hierarchy"),
    ]
}

/// YAML rule document stored as the schema version value
pub fn schema_rules() -> Result<String> {
    let mut configs = Mapping::new();
    for field in SCHEMA_FIELDS {
        let mut rule = Mapping::new();
        rule.insert("type".into(), field.field_type.as_str().into());
        rule.insert("required".into(), field.required.into());
        rule.insert(
            "editableAt".into(),
            YamlValue::Sequence(vec![EDIT_SCOPE.into()]),
        );
        rule.insert(
            "editableBy".into(),
            YamlValue::Sequence(vec![EDIT_ROLE.into()]),
        );
        configs.insert(field.name.into(), YamlValue::Mapping(rule));
    }

    let mut rules = Mapping::new();
    rules.insert("configs".into(), YamlValue::Mapping(configs));
    let mut document = Mapping::new();
    document.insert("rules".into(), YamlValue::Mapping(rules));

    Ok(serde_yaml::to_string(&document)?)
}

/// Configuration template bound to a schema version; every field is a value placeholder
pub fn configurations(schema_name: &str, schema_version: &str) -> String {
    let mut out = format!(
        "schema:\n  name: {}\n  version: {}\nconfigs:\n  AppName: {}\n",
        schema_name, schema_version, APP_NAME
    );
    for field in SCHEMA_FIELDS {
        out.push_str(&format!("  {}: ${{{{$val({})}}}}\n", field.name, field.name));
    }
    out
}

/// One helm component, waited on for up to five minutes
pub fn deployment_specification() -> Value {
    json!({
        "components": [
            {
                "name": "helmcomponent",
                "type": "helm.v3",
                "properties": {
                    "chart": {
                        "repo": "ghcr.io/eclipse-symphony/tests/helm/simple-chart",
                        "version": "0.3.0",
                        "wait": true,
                        "timeout": "5m"
                    }
                }
            }
        ]
    })
}

pub fn target_specification() -> Value {
    json!({
        "topologies": [
            {
                "bindings": [
                    {
                        "role": "helm.v3",
                        "provider": "providers.target.helm",
                        "config": {
                            "inCluster": "true"
                        }
                    }
                ]
            }
        ]
    })
}

/// Values pushed to the target's dynamic configuration, one per schema field
pub fn default_configuration_values() -> ConfigValues {
    let mut values = ConfigValues::new();
    values.insert("ErrorThreshold".to_string(), ConfigValue::Float(35.3));
    values.insert(
        "HealthCheckEndpoint".to_string(),
        ConfigValue::from("http://localhost:8080/health"),
    );
    values.insert("EnableLocalLog".to_string(), ConfigValue::Bool(true));
    values.insert(
        "AgentEndpoint".to_string(),
        ConfigValue::from("http://localhost:8080/agent"),
    );
    values.insert("HealthCheckEnabled".to_string(), ConfigValue::Bool(true));
    values.insert(
        "ApplicationEndpoint".to_string(),
        ConfigValue::from("http://localhost:8080/app"),
    );
    values.insert("TemperatureRangeMax".to_string(), ConfigValue::Float(100.5));
    values
}
