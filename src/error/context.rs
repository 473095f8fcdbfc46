use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;
use uuid::Uuid;

use super::AppError;

/// Identifies where in the provisioning chain a failure happened.
///
/// Every fatal error is surfaced together with the resource group, resource
/// name and any identifier that was being worked on, so an operator can go
/// and look at the resource in the management plane directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique correlation ID for tracking one workflow step
    pub correlation_id: Uuid,
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed when the error occurred
    pub operation: String,
    /// Timestamp when the context was created
    pub timestamp: DateTime<Utc>,
    /// Resource identifiers (resource group, name, attempted ids)
    pub identifiers: BTreeMap<String, String>,
    /// Correlation ID of the enclosing workflow run
    pub parent_correlation_id: Option<Uuid>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            component: component.into(),
            operation: operation.into(),
            timestamp: Utc::now(),
            identifiers: BTreeMap::new(),
            parent_correlation_id: None,
        }
    }

    pub fn with_resource_group(self, resource_group: impl Into<String>) -> Self {
        self.with_identifier("resource_group", resource_group)
    }

    pub fn with_resource_name(self, name: impl Into<String>) -> Self {
        self.with_identifier("resource_name", name)
    }

    pub fn with_identifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(key.into(), value.into());
        self
    }

    /// Create a child context for one step of a larger run
    pub fn create_child_context(
        &self,
        component: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            component: component.into(),
            operation: operation.into(),
            timestamp: Utc::now(),
            identifiers: BTreeMap::new(),
            parent_correlation_id: Some(self.correlation_id),
        }
    }

    pub fn format_context(&self) -> String {
        let ids = self
            .identifiers
            .iter()
            .map(|(k, v)| format!(", {}={}", k, v))
            .collect::<String>();
        format!(
            "correlation_id={}, component={}, operation={}{}",
            self.correlation_id, self.component, self.operation, ids
        )
    }

    /// Log a fatal error with everything an operator needs to find the resource.
    pub fn report(&self, err: &AppError) {
        error!(
            correlation_id = %self.correlation_id,
            component = %self.component,
            operation = %self.operation,
            identifiers = ?self.identifiers,
            error = %err,
            "❌ Workflow step failed"
        );
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_context())
    }
}
