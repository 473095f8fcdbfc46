use std::sync::Arc;
use tracing::info;

use crate::domain::{SolutionVersion, SolutionVersionParameter};
use crate::error::{Result, RetryExecutor, RetryPolicy};
use crate::infrastructure::ManagementClient;

/// Publishes and installs a resolved solution version on a target.
/// Each call is retried on its own; nothing is rolled back on failure.
pub struct DeploymentDriver {
    client: Arc<dyn ManagementClient>,
    retry: RetryExecutor,
    policy: RetryPolicy,
}

impl DeploymentDriver {
    pub fn new(client: Arc<dyn ManagementClient>, retry: RetryExecutor, policy: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            policy,
        }
    }

    pub async fn publish(
        &self,
        resource_group: &str,
        target_name: &str,
        solution_version_id: &str,
    ) -> Result<SolutionVersion> {
        let parameter = SolutionVersionParameter {
            solution_version_id: solution_version_id.to_string(),
        };
        let client = &self.client;
        let parameter = &parameter;
        let published = self
            .retry
            .execute(&self.policy, "publish solution version", move || {
                client.publish_solution_version(resource_group, target_name, parameter)
            })
            .await?;

        info!(target = target_name, solution_version_id = solution_version_id, "📤 Solution version published");
        Ok(published)
    }

    pub async fn install(
        &self,
        resource_group: &str,
        target_name: &str,
        solution_version_id: &str,
    ) -> Result<()> {
        let parameter = SolutionVersionParameter {
            solution_version_id: solution_version_id.to_string(),
        };
        let client = &self.client;
        let parameter = &parameter;
        self.retry
            .execute(&self.policy, "install solution", move || {
                client.install_solution(resource_group, target_name, parameter)
            })
            .await?;

        info!(target = target_name, solution_version_id = solution_version_id, "🚀 Solution installed");
        Ok(())
    }
}
