//! AI Guardrail — policy-enforcement orchestration for AI coding agents.
//!
//! Single-crate library: an intercepted intent event goes in, the policy
//! tiers run under priority and blocking rules, one allow/block decision
//! comes out. Infrastructure failures always fail open.

// Core types
pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod policy;
pub mod session;

// Pipeline
pub mod cache;
pub mod engine;
pub mod policies;
pub mod runner;
pub mod scheduler;

// Sub-systems
pub mod analytics;
pub mod hook;
pub mod storage;
pub mod tracing_init;

#[cfg(test)]
pub mod test_helpers;

// Re-exports for convenience
pub use error::{GuardError, GuardResult};
