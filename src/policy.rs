//! Policy contract — descriptors, verdicts, and the trait every
//! validation unit implements.
//!
//! Policies are opaque to the orchestration machinery: the scheduler only
//! sees `PolicyDescriptor` (tier, family, timeout, blocking behavior) and
//! the `evaluate` entry point. Registration is explicit at startup; there
//! is no filesystem discovery.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::event::Event;
use crate::storage::backup::BackupManager;
use crate::storage::state_store::StateStore;

/// Priority bucket controlling execution order and concurrency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Critical,
    High,
    Medium,
    Low,
    Background,
}

impl Tier {
    /// Fixed scheduling order. The scheduler iterates this, never a set.
    pub const ALL: [Tier; 5] = [
        Tier::Critical,
        Tier::High,
        Tier::Medium,
        Tier::Low,
        Tier::Background,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Background => "background",
        }
    }

    /// Position in scheduling order, for deterministic result sorting.
    pub fn rank(&self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Background => 4,
        }
    }
}

/// How a family's block verdicts affect the aggregate decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlockingBehavior {
    /// Block wins unconditionally; at high tier it also stops later tiers.
    HardBlock,
    /// Block wins but never stops later tiers.
    SoftBlock,
    /// Message surfaces, decision unaffected.
    #[default]
    Warning,
    /// Verdict ignored entirely for the decision.
    None,
}

impl BlockingBehavior {
    /// Only hard/soft-block families can flip `allowed` to false.
    pub fn can_block(&self) -> bool {
        matches!(self, Self::HardBlock | Self::SoftBlock)
    }
}

/// Static registration record for one policy. Built once at startup
/// from config; never mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDescriptor {
    pub id: String,
    pub tier: Tier,
    /// Functional grouping, e.g. "file-hygiene", "security".
    pub family: String,
    pub timeout_ms: u64,
    pub blocking: BlockingBehavior,
}

/// Documented defaults for a policy id absent from the config table.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

impl PolicyDescriptor {
    /// Descriptor for an unknown policy id: medium tier, warning-only.
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tier: Tier::Medium,
            family: "unclassified".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            blocking: BlockingBehavior::Warning,
        }
    }
}

/// A policy's answer for one event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Block,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }
}

/// What a policy body returns on a normal (non-error) run.
#[derive(Debug, Clone)]
pub struct PolicyOutcome {
    pub verdict: Verdict,
    /// Human-readable explanation; required in practice for Block,
    /// the scheduler surfaces it verbatim.
    pub message: Option<String>,
}

impl PolicyOutcome {
    pub fn allow() -> Self {
        Self { verdict: Verdict::Allow, message: None }
    }

    pub fn block(message: impl Into<String>) -> Self {
        Self { verdict: Verdict::Block, message: Some(message.into()) }
    }
}

/// Per-policy outcome as seen by the scheduler and analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub policy_id: String,
    pub verdict: Verdict,
    pub message: Option<String>,
    pub duration_ms: u64,
    pub from_cache: bool,
    /// Set only on internal failure (timeout, panic, policy error).
    /// An error never forces `verdict = Block` — fail open.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_block(&self) -> bool {
        self.verdict == Verdict::Block
    }
}

/// Shared collaborators a policy may use while evaluating.
///
/// The state store is the only resource multiple policies mutate
/// concurrently; it serializes internally. The backup manager is consulted
/// only when a policy wants a pre-mutation snapshot before an auto-fix.
#[derive(Clone)]
pub struct PolicyContext {
    pub state: Arc<StateStore>,
    pub backup: Arc<BackupManager>,
}

/// One validation unit. Implementations must be cheap to construct and
/// safe to call from worker threads.
pub trait Policy: Send + Sync {
    fn id(&self) -> &str;

    /// Cheap pre-filter — policies that only care about file writes can
    /// skip unrelated events without paying runner overhead.
    fn applies_to(&self, _event: &Event) -> bool {
        true
    }

    /// Evaluate the event. Errors are mapped to `Verdict::Allow` at the
    /// runner boundary; a policy should return `Err` for its own internal
    /// failures rather than guessing a verdict.
    fn evaluate(&self, event: &Event, ctx: &PolicyContext) -> Result<PolicyOutcome, PolicyError>;
}

/// Final output of one scheduling pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateDecision {
    pub allowed: bool,
    /// Diagnostics from all block verdicts, ordered by tier then
    /// registration order — deterministic for identical inputs.
    pub messages: Vec<String>,
    /// True when a critical-tier or hard-block failure short-circuited
    /// the remaining tiers.
    pub stopped_early: bool,
}

impl AggregateDecision {
    pub fn allowed() -> Self {
        Self { allowed: true, messages: Vec::new(), stopped_early: false }
    }

    /// Joined diagnostic text for the hook response.
    pub fn joined_message(&self) -> String {
        self.messages.join("\n")
    }
}

/// Per-family configuration row as it appears in `guardrail.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub blocking: BlockingBehavior,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for FamilySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            blocking: BlockingBehavior::Warning,
        }
    }
}

/// Per-policy configuration row; unset fields inherit from the family
/// row or the registration seed.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PolicySettings {
    pub tier: Option<Tier>,
    pub family: Option<String>,
    pub timeout_ms: Option<u64>,
    pub blocking: Option<BlockingBehavior>,
}

/// Static policy table type used by the classifier.
pub type DescriptorTable = HashMap<String, PolicyDescriptor>;
