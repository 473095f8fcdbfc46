use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ReviewRequest, SolutionVersion};
use crate::error::{AppError, Result, RetryExecutor, RetryPolicy};
use crate::infrastructure::ManagementClient;

/// Where the resolved solution version id came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Matched in the solution version listing
    Listing {
        review_id: Option<String>,
        revision: Option<i64>,
    },
    /// Taken from the review response because the listing had no match
    ReviewResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewResolution {
    pub solution_version_id: String,
    pub source: ResolutionSource,
}

/// Reviews a solution template version against a target and finds the
/// solution version the review produced.
///
/// The review response does not reliably carry the solution version id, so
/// the versions of the solution are listed and matched on
/// `solutionTemplateVersionId` (exact string equality). The response id is
/// only a fallback.
pub struct ReviewResolver {
    client: Arc<dyn ManagementClient>,
    retry: RetryExecutor,
    policy: RetryPolicy,
}

impl ReviewResolver {
    pub fn new(client: Arc<dyn ManagementClient>, retry: RetryExecutor, policy: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            policy,
        }
    }

    pub async fn review(
        &self,
        resource_group: &str,
        target_name: &str,
        solution_name: &str,
        solution_template_version_id: &str,
    ) -> Result<ReviewResolution> {
        let request = ReviewRequest {
            solution_dependencies: Vec::new(),
            solution_instance_name: target_name.to_string(),
            solution_template_version_id: solution_template_version_id.to_string(),
        };
        info!(
            target = target_name,
            solution_template_version_id = solution_template_version_id,
            "🔍 Reviewing solution template version"
        );

        let client = &self.client;
        let request_ref = &request;
        let response = self
            .retry
            .execute(&self.policy, "review solution version", move || {
                client.review_solution_version(resource_group, target_name, request_ref)
            })
            .await?;

        let fallback_id = response.id.clone().filter(|id| !id.is_empty());
        debug!(fallback_id = ?fallback_id, "Review response received");

        let listed = match self
            .client
            .list_solution_versions(resource_group, target_name, solution_name)
            .await
        {
            Ok(versions) => versions,
            Err(e) if fallback_id.is_some() => {
                warn!(error = %e, "Listing solution versions failed, using review response id");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if let Some(resolution) = match_listing(&listed, solution_template_version_id) {
            info!(
                solution_version_id = %resolution.solution_version_id,
                source = ?resolution.source,
                "✅ Solution version resolved"
            );
            return Ok(resolution);
        }

        match fallback_id {
            Some(id) => {
                warn!(
                    solution_template_version_id = solution_template_version_id,
                    listed = listed.len(),
                    fallback_id = %id,
                    "No listed solution version matches, using review response id"
                );
                Ok(ReviewResolution {
                    solution_version_id: id,
                    source: ResolutionSource::ReviewResponse,
                })
            }
            None => Err(AppError::SolutionVersionUnresolved {
                target: format!("{}/{}", resource_group, target_name),
                solution_template_version_id: solution_template_version_id.to_string(),
            }),
        }
    }
}

/// First listed version whose `solutionTemplateVersionId` equals the given id.
/// More than one match is unexpected and only logged.
fn match_listing(
    versions: &[SolutionVersion],
    solution_template_version_id: &str,
) -> Option<ReviewResolution> {
    let mut matches = versions.iter().filter(|v| {
        v.properties.solution_template_version_id.as_deref() == Some(solution_template_version_id)
            && v.id.as_deref().map_or(false, |id| !id.is_empty())
    });
    let first = matches.next()?;
    let others = matches.count();
    if others > 0 {
        warn!(
            solution_template_version_id = solution_template_version_id,
            matches = others + 1,
            "Several solution versions match, taking the first listed"
        );
    }

    Some(ReviewResolution {
        solution_version_id: first.id.clone().unwrap_or_default(),
        source: ResolutionSource::Listing {
            review_id: first.properties.review_id.clone(),
            revision: first.properties.revision,
        },
    })
}
