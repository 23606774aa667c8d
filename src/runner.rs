//! Policy Runner — the single boundary where arbitrary policy code is
//! sandboxed from the pipeline.
//!
//! Each run executes the policy body on its own thread and waits with
//! `recv_timeout(descriptor.timeout_ms)`. Timeouts, panics, and policy
//! errors all map to `verdict = Allow` with the failure recorded in
//! `ExecutionResult::error` — an individual validator's bug must never be
//! capable of halting all development work.

use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PolicyError;
use crate::event::Event;
use crate::policy::{ExecutionResult, Policy, PolicyContext, PolicyDescriptor, PolicyOutcome, Verdict};

pub struct PolicyRunner {
    ctx: PolicyContext,
}

impl PolicyRunner {
    pub fn new(ctx: PolicyContext) -> Self {
        Self { ctx }
    }

    /// Run one policy against one event under its timeout budget.
    pub fn run(
        &self,
        policy: Arc<dyn Policy>,
        event: &Event,
        descriptor: &PolicyDescriptor,
    ) -> ExecutionResult {
        let started = Instant::now();
        let policy_id = descriptor.id.clone();

        let outcome = self.evaluate_with_timeout(policy, event, descriptor.timeout_ms);
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(PolicyOutcome { verdict, message }) => {
                tracing::debug!(
                    policy = %policy_id,
                    verdict = verdict.as_str(),
                    duration_ms,
                    "Policy completed"
                );
                ExecutionResult {
                    policy_id,
                    verdict,
                    message,
                    duration_ms,
                    from_cache: false,
                    error: None,
                }
            }
            Err(err) => {
                // Fail open: infrastructure or policy failure never blocks
                tracing::warn!(policy = %policy_id, error = %err, duration_ms, "Policy failed — allowing (fail open)");
                ExecutionResult {
                    policy_id,
                    verdict: Verdict::Allow,
                    message: None,
                    duration_ms,
                    from_cache: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Policy body on a dedicated thread, guarded by timeout + catch_unwind.
    fn evaluate_with_timeout(
        &self,
        policy: Arc<dyn Policy>,
        event: &Event,
        timeout_ms: u64,
    ) -> Result<PolicyOutcome, PolicyError> {
        let (tx, rx) = mpsc::channel();
        let thread_policy = policy.clone();
        let thread_event = event.clone();
        let ctx = self.ctx.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("policy-{}", policy.id()))
            .spawn(move || {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    thread_policy.evaluate(&thread_event, &ctx)
                }));
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(PolicyError::Panic(describe_panic(&panic))),
                };
                // Receiver may have given up on timeout; that's fine
                tx.send(outcome).ok();
            });

        match spawned {
            Ok(_handle) => rx
                .recv_timeout(Duration::from_millis(timeout_ms))
                .unwrap_or(Err(PolicyError::Timeout)),
            Err(e) => {
                // Thread spawn failed — degrade to inline execution with
                // panic protection but no timeout guard
                tracing::warn!(error = %e, "Policy thread spawn failed — running inline");
                std::panic::catch_unwind(AssertUnwindSafe(|| policy.evaluate(event, &self.ctx)))
                    .unwrap_or_else(|panic| Err(PolicyError::Panic(describe_panic(&panic))))
            }
        }
    }
}

fn describe_panic(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
