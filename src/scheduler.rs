//! Execution Scheduler — drives one event through the policy tiers and
//! merges verdicts into a single decision.
//!
//! Tier order is fixed: critical, high, medium, low, background. Critical
//! runs strictly sequentially with early abort; high/medium/low run on a
//! bounded worker pool per tier; background is dispatched without waiting
//! and never touches the decision. If the parallel substrate itself fails,
//! the scheduler falls back to fully sequential execution for the rest of
//! the event — its own fail-open guarantee, independent of the per-policy
//! fail-open inside the runner.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::analytics::AnalyticsRecorder;
use crate::cache::VerdictCache;
use crate::classifier::{ExecutionStrategy, PriorityClassifier};
use crate::config::SchedulerConfig;
use crate::event::Event;
use crate::policy::{
    AggregateDecision, BlockingBehavior, ExecutionResult, Policy, PolicyDescriptor, Tier,
};
use crate::runner::PolicyRunner;
use crate::{GuardError, GuardResult};

/// One registered policy with its classified descriptor. The registration
/// index is the tie-break for deterministic message ordering.
struct Registered {
    index: usize,
    policy: Arc<dyn Policy>,
    descriptor: PolicyDescriptor,
}

/// A completed execution tagged for aggregation.
struct TaggedResult {
    tier_rank: usize,
    index: usize,
    blocking: BlockingBehavior,
    result: ExecutionResult,
}

pub struct ExecutionScheduler {
    policies: Vec<Registered>,
    classifier: PriorityClassifier,
    runner: Arc<PolicyRunner>,
    cache: Arc<VerdictCache>,
    analytics: Arc<AnalyticsRecorder>,
    config_hash: String,
    limits: SchedulerConfig,
}

impl ExecutionScheduler {
    /// Wire the pipeline. Policies whose family was disabled at
    /// classification time are dropped here, before any event arrives.
    pub fn new(
        registrations: Vec<(Arc<dyn Policy>, PolicyDescriptor)>,
        classifier: PriorityClassifier,
        runner: Arc<PolicyRunner>,
        cache: Arc<VerdictCache>,
        analytics: Arc<AnalyticsRecorder>,
        config_hash: String,
        limits: SchedulerConfig,
    ) -> Self {
        let mut policies = Vec::new();
        for (index, (policy, seed)) in registrations.into_iter().enumerate() {
            if !classifier.is_registered(&seed.id) {
                tracing::info!(policy = %seed.id, "Policy not scheduled (family disabled)");
                continue;
            }
            let descriptor = classifier.classify(&seed.id);
            policies.push(Registered { index, policy, descriptor });
        }
        Self {
            policies,
            classifier,
            runner,
            cache,
            analytics,
            config_hash,
            limits,
        }
    }

    /// Decide one event. Never errors: every failure path inside degrades
    /// to "allowed" with diagnostics in the log.
    pub fn decide(&self, event: &Event) -> AggregateDecision {
        let started = Instant::now();

        // Group applicable policies by tier, preserving registration order
        let mut by_tier: [Vec<&Registered>; 5] = Default::default();
        for reg in &self.policies {
            if reg.policy.applies_to(event) {
                by_tier[reg.descriptor.tier.rank()].push(reg);
            }
        }

        let mut collected: Vec<TaggedResult> = Vec::new();
        let mut stopped_early = false;
        // Flipped once if the parallel substrate fails; the rest of the
        // event then runs sequentially
        let mut force_sequential = false;

        'tiers: for tier in Tier::ALL {
            let group = &by_tier[tier.rank()];
            if group.is_empty() {
                continue;
            }

            let strategy = if force_sequential {
                ExecutionStrategy::Sequential
            } else {
                self.classifier.execution_strategy(tier)
            };

            match strategy {
                ExecutionStrategy::Sequential => {
                    for reg in group {
                        let result = self.execute_one(reg, event);
                        self.analytics.record(&result, event);
                        let blocked = result.is_block();
                        collected.push(TaggedResult {
                            tier_rank: tier.rank(),
                            index: reg.index,
                            blocking: reg.descriptor.blocking,
                            result,
                        });
                        if blocked
                            && self
                                .classifier
                                .should_stop_on_failure(tier, reg.descriptor.blocking)
                        {
                            tracing::info!(policy = %reg.descriptor.id, tier = tier.as_str(), "Early stop: blocking failure");
                            stopped_early = true;
                            break 'tiers;
                        }
                    }
                }
                ExecutionStrategy::Parallel => {
                    let tier_results = match self.run_tier_parallel(group, event, tier) {
                        Ok(results) => results,
                        Err(e) => {
                            // Caught once per event; remaining policies in
                            // this and later tiers run sequentially
                            tracing::warn!(error = %e, tier = tier.as_str(), "Parallel substrate failed — sequential fallback");
                            force_sequential = true;
                            group
                                .iter()
                                .map(|reg| (reg.index, self.execute_one(reg, event)))
                                .collect()
                        }
                    };

                    let mut tier_stop = false;
                    for (index, result) in tier_results {
                        self.analytics.record(&result, event);
                        let reg = group.iter().find(|r| r.index == index);
                        let blocking = reg
                            .map(|r| r.descriptor.blocking)
                            .unwrap_or(BlockingBehavior::Warning);
                        if result.is_block()
                            && self.classifier.should_stop_on_failure(tier, blocking)
                        {
                            tier_stop = true;
                        }
                        collected.push(TaggedResult {
                            tier_rank: tier.rank(),
                            index,
                            blocking,
                            result,
                        });
                    }
                    if tier_stop {
                        tracing::info!(tier = tier.as_str(), "Early stop: hard-block failure in tier");
                        stopped_early = true;
                        break 'tiers;
                    }
                }
                ExecutionStrategy::FireAndForget => {
                    self.dispatch_background(group, event);
                }
            }
        }

        let decision = aggregate(collected, stopped_early);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.limits.global_budget_ms {
            // Advisory only: the budget is a tuning signal, not a deadline
            tracing::warn!(
                elapsed_ms,
                budget_ms = self.limits.global_budget_ms,
                "Event exceeded soft global budget"
            );
        }
        tracing::debug!(
            event = %event.id,
            allowed = decision.allowed,
            stopped_early = decision.stopped_early,
            elapsed_ms,
            "Decision"
        );
        decision
    }

    /// Cache-aware single execution.
    fn execute_one(&self, reg: &Registered, event: &Event) -> ExecutionResult {
        if !event.is_cacheable() {
            return self.runner.run(reg.policy.clone(), event, &reg.descriptor);
        }
        // is_cacheable guarantees both are present
        let path = event.target_path.as_deref().unwrap_or_default();
        let payload = event.payload.as_deref().unwrap_or_default();

        if let Some(hit) = self
            .cache
            .get(&reg.descriptor.id, path, payload, &self.config_hash)
        {
            return hit;
        }
        let result = self.runner.run(reg.policy.clone(), event, &reg.descriptor);
        // Only clean verdicts are worth memoizing
        if result.error.is_none() {
            self.cache
                .set(&reg.descriptor.id, path, payload, &self.config_hash, &result);
        }
        result
    }

    fn tier_ceiling(&self, tier: Tier) -> usize {
        let ceiling = match tier {
            Tier::High => self.limits.high_concurrency,
            Tier::Medium => self.limits.medium_concurrency,
            Tier::Low => self.limits.low_concurrency,
            Tier::Critical | Tier::Background => 1,
        };
        ceiling.max(1)
    }

    /// Bounded worker pool over the tier's job list. Errors only when the
    /// substrate itself is unusable (no worker could start) — individual
    /// policy failures are already absorbed by the runner.
    fn run_tier_parallel(
        &self,
        group: &[&Registered],
        event: &Event,
        tier: Tier,
    ) -> GuardResult<Vec<(usize, ExecutionResult)>> {
        let workers = self.tier_ceiling(tier).min(group.len());
        let jobs: Mutex<VecDeque<&Registered>> = Mutex::new(group.iter().copied().collect());
        let results: Mutex<Vec<(usize, ExecutionResult)>> = Mutex::new(Vec::with_capacity(group.len()));

        let spawned = std::thread::scope(|scope| {
            let mut spawned = 0usize;
            for worker_id in 0..workers {
                let jobs = &jobs;
                let results = &results;
                let handle = std::thread::Builder::new()
                    .name(format!("tier-{}-worker-{}", tier.as_str(), worker_id))
                    .spawn_scoped(scope, move || loop {
                        let reg = {
                            let mut queue = jobs.lock().unwrap_or_else(|p| p.into_inner());
                            match queue.pop_front() {
                                Some(reg) => reg,
                                None => break,
                            }
                        };
                        let result = self.execute_one(reg, event);
                        results
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .push((reg.index, result));
                    });
                match handle {
                    Ok(_) => spawned += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, worker_id, "Tier worker spawn failed");
                    }
                }
            }
            spawned
        });

        if spawned == 0 {
            return Err(GuardError::Scheduler(format!(
                "no worker could be spawned for tier {}",
                tier.as_str()
            )));
        }

        Ok(results.into_inner().unwrap_or_else(|p| p.into_inner()))
    }

    /// Background tier: detached threads, analytics only, decision
    /// untouched. Spawn failures are logged and dropped.
    fn dispatch_background(&self, group: &[&Registered], event: &Event) {
        for reg in group {
            let runner = self.runner.clone();
            let analytics = self.analytics.clone();
            let policy = reg.policy.clone();
            let descriptor = reg.descriptor.clone();
            let event = event.clone();
            let spawn = std::thread::Builder::new()
                .name(format!("background-{}", descriptor.id))
                .spawn(move || {
                    let result = runner.run(policy, &event, &descriptor);
                    analytics.record(&result, &event);
                });
            if let Err(e) = spawn {
                tracing::warn!(policy = %reg.descriptor.id, error = %e, "Background dispatch failed");
            }
        }
    }
}

/// Merge collected results: stable order by (tier, registration index),
/// block wins over any concurrently-finishing allow, and only hard/soft
/// block families can flip `allowed`.
fn aggregate(mut collected: Vec<TaggedResult>, stopped_early: bool) -> AggregateDecision {
    collected.sort_by_key(|t| (t.tier_rank, t.index));

    let allowed = !collected
        .iter()
        .any(|t| t.result.is_block() && t.blocking.can_block());

    let messages = collected
        .iter()
        .filter(|t| t.result.is_block())
        .filter_map(|t| t.result.message.clone())
        .collect();

    AggregateDecision { allowed, messages, stopped_early }
}
