use std::collections::HashSet;
use tracing::{debug, warn};

use crate::domain::{Capability, NameGenerator};

/// Result of merging capabilities, with what was dropped and why
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub capabilities: Vec<Capability>,
    /// Existing entries without a name
    pub skipped_empty: usize,
    /// Existing entries whose name was already seen
    pub skipped_duplicates: Vec<String>,
    /// Incoming names that were already present
    pub rejected: Vec<String>,
    /// Incoming entries appended to the output
    pub added: usize,
}

/// Merges server-held and newly generated capabilities.
///
/// Existing entries are never overwritten: a name that is already present
/// wins over any incoming entry with the same name. Output keeps the
/// surviving existing entries in order, followed by accepted incoming ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityReconciler;

impl CapabilityReconciler {
    pub fn merge(existing: &[Capability], incoming: &[Capability]) -> Vec<Capability> {
        Self::reconcile(existing, incoming).capabilities
    }

    pub fn reconcile(existing: &[Capability], incoming: &[Capability]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(existing.len() + incoming.len());

        for capability in existing {
            if capability.name.is_empty() {
                warn!("Skipping existing capability with an empty name");
                outcome.skipped_empty += 1;
                continue;
            }
            if !seen.insert(capability.name.as_str()) {
                warn!(capability = %capability.name, "Skipping duplicate existing capability");
                outcome.skipped_duplicates.push(capability.name.clone());
                continue;
            }
            outcome.capabilities.push(capability.clone());
        }

        for capability in incoming {
            if capability.name.is_empty() || !seen.insert(capability.name.as_str()) {
                debug!(capability = %capability.name, "Capability already present, keeping existing entry");
                outcome.rejected.push(capability.name.clone());
                continue;
            }
            outcome.capabilities.push(capability.clone());
            outcome.added += 1;
        }

        outcome
    }
}

/// `{prefix}-{category}-{suffix}`, described as an SDK generated manufacturing capability
pub fn generate_capability(generator: &dyn NameGenerator, prefix: &str) -> Capability {
    let (category, suffix) = generator.capability_parts();
    Capability::new(
        format!("{}-{}-{}", prefix, category, suffix),
        format!("SDK generated {} manufacturing capability", category),
    )
}
