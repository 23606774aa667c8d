//! Priority Classifier — maps a policy id to its descriptor and tells the
//! scheduler how each tier executes.
//!
//! The table is built once at startup from `GuardConfig` plus the built-in
//! registrations; lookups are O(1) thereafter. Unknown policy ids get the
//! documented default (medium tier, warning-only, 3000 ms).

use std::collections::HashMap;

use crate::config::GuardConfig;
use crate::policy::{BlockingBehavior, DescriptorTable, PolicyDescriptor, Tier};

/// How a tier's policies are driven by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One at a time, early abort on first block.
    Sequential,
    /// Bounded worker pool up to the tier's ceiling.
    Parallel,
    /// Dispatched without waiting; never part of the decision.
    FireAndForget,
}

pub struct PriorityClassifier {
    table: DescriptorTable,
}

impl PriorityClassifier {
    /// Build the static table from seed descriptors (the registration
    /// records) refined by config. Precedence: per-policy override, then
    /// the family row when one is configured, then the seed itself.
    /// Disabled families are excluded entirely.
    pub fn new(config: &GuardConfig, registrations: &[PolicyDescriptor]) -> Self {
        let mut table: DescriptorTable = HashMap::new();

        for seed in registrations {
            let family_settings = config.families.get(&seed.family);
            if !family_settings.map(|f| f.enabled).unwrap_or(true) {
                tracing::debug!(policy = %seed.id, family = %seed.family, "Policy excluded: family disabled");
                continue;
            }

            let overrides = config.policies.get(&seed.id);

            let descriptor = PolicyDescriptor {
                id: seed.id.clone(),
                tier: overrides.and_then(|o| o.tier).unwrap_or(seed.tier),
                family: overrides
                    .and_then(|o| o.family.clone())
                    .unwrap_or_else(|| seed.family.clone()),
                timeout_ms: overrides
                    .and_then(|o| o.timeout_ms)
                    .or(family_settings.map(|f| f.timeout_ms))
                    .unwrap_or(seed.timeout_ms),
                blocking: overrides
                    .and_then(|o| o.blocking)
                    .or(family_settings.map(|f| f.blocking))
                    .unwrap_or(seed.blocking),
            };
            table.insert(descriptor.id.clone(), descriptor);
        }

        tracing::debug!(policies = table.len(), "Classifier table built");
        Self { table }
    }

    /// Resolve a policy id. Unknown ids never fail — they get a
    /// conservative default descriptor instead.
    pub fn classify(&self, policy_id: &str) -> PolicyDescriptor {
        match self.table.get(policy_id) {
            Some(d) => d.clone(),
            None => {
                tracing::debug!(policy = policy_id, "Unknown policy id — default descriptor");
                PolicyDescriptor::unknown(policy_id)
            }
        }
    }

    /// True when the policy survived family filtering and is runnable.
    pub fn is_registered(&self, policy_id: &str) -> bool {
        self.table.contains_key(policy_id)
    }

    pub fn execution_strategy(&self, tier: Tier) -> ExecutionStrategy {
        match tier {
            Tier::Critical => ExecutionStrategy::Sequential,
            Tier::High | Tier::Medium | Tier::Low => ExecutionStrategy::Parallel,
            Tier::Background => ExecutionStrategy::FireAndForget,
        }
    }

    /// Whether a block under this (tier, blocking) pair aborts the
    /// remaining tiers. Hard-block violations at high tier are treated as
    /// unrecoverable like critical ones; soft-block and warning families
    /// stay advisory at every tier below critical.
    pub fn should_stop_on_failure(&self, tier: Tier, blocking: BlockingBehavior) -> bool {
        match tier {
            Tier::Critical => true,
            Tier::High => blocking == BlockingBehavior::HardBlock,
            _ => false,
        }
    }
}
