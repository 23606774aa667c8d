//! Shared test utilities — policy stubs and pipeline wiring.
//!
//! Available only under `#[cfg(test)]`.

use std::sync::Arc;

use crate::config::BackupConfig;
use crate::error::PolicyError;
use crate::event::Event;
use crate::policy::{
    BlockingBehavior, Policy, PolicyContext, PolicyDescriptor, PolicyOutcome, Tier,
    DEFAULT_TIMEOUT_MS,
};
use crate::storage::backup::BackupManager;
use crate::storage::state_store::StateStore;

/// Policy built from a closure, for scripting verdicts in tests.
pub struct FnPolicy<F> {
    id: String,
    body: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&Event, &PolicyContext) -> Result<PolicyOutcome, PolicyError> + Send + Sync,
{
    pub fn new(id: &str, body: F) -> Arc<Self> {
        Arc::new(Self { id: id.to_string(), body })
    }
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(&Event, &PolicyContext) -> Result<PolicyOutcome, PolicyError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }
    fn evaluate(&self, event: &Event, ctx: &PolicyContext) -> Result<PolicyOutcome, PolicyError> {
        (self.body)(event, ctx)
    }
}

/// Always-allow stub.
pub fn allow_policy(id: &str) -> Arc<dyn Policy> {
    FnPolicy::new(id, |_, _| Ok(PolicyOutcome::allow()))
}

/// Always-block stub with a fixed message.
pub fn block_policy(id: &str, message: &'static str) -> Arc<dyn Policy> {
    FnPolicy::new(id, move |_, _| Ok(PolicyOutcome::block(message)))
}

/// Stub that panics when evaluated.
pub fn panicking_policy(id: &str) -> Arc<dyn Policy> {
    FnPolicy::new(id, |_, _| -> Result<PolicyOutcome, PolicyError> {
        panic!("intentional test panic")
    })
}

/// Stub that sleeps past any reasonable timeout.
pub fn hanging_policy(id: &str) -> Arc<dyn Policy> {
    FnPolicy::new(id, |_, _| {
        std::thread::sleep(std::time::Duration::from_secs(30));
        Ok(PolicyOutcome::block("should have timed out"))
    })
}

/// Descriptor with explicit tier/family/blocking and the default timeout.
pub fn descriptor(id: &str, tier: Tier, family: &str, blocking: BlockingBehavior) -> PolicyDescriptor {
    PolicyDescriptor {
        id: id.to_string(),
        tier,
        family: family.to_string(),
        timeout_ms: DEFAULT_TIMEOUT_MS,
        blocking,
    }
}

/// Context backed by a temp project dir.
pub fn context(dir: &std::path::Path) -> PolicyContext {
    PolicyContext {
        state: Arc::new(StateStore::open(dir)),
        backup: Arc::new(BackupManager::open(dir, &BackupConfig::default())),
    }
}
