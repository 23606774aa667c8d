//! Hook entry point — the subprocess protocol between the host and the
//! engine.
//!
//! stdin carries one event as JSON; stdout gets the decision response.
//! Exit codes: 0 = allowed, 2 = blocked. Anything unexpected (panic,
//! unparsable input, engine failure) exits 0 — a tooling malfunction must
//! never block a user's legitimate work.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::event::Event;
use crate::policy::AggregateDecision;

pub const EXIT_ALLOWED: i32 = 0;
pub const EXIT_BLOCKED: i32 = 2;

/// Wire response emitted on stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookResponse {
    pub status: HookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    Ok,
    Blocked,
}

impl HookResponse {
    pub fn from_decision(decision: &AggregateDecision) -> Self {
        if decision.allowed {
            Self { status: HookStatus::Ok, message: None }
        } else {
            Self {
                status: HookStatus::Blocked,
                message: Some(decision.joined_message()),
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            HookStatus::Ok => EXIT_ALLOWED,
            HookStatus::Blocked => EXIT_BLOCKED,
        }
    }
}

/// Run one check: read stdin, decide, print the response, return the exit
/// code. The whole body sits under `catch_unwind`; a panic anywhere
/// degrades to "allowed".
pub fn run_check(project_root: &Path) -> i32 {
    let project_root = project_root.to_path_buf();
    let outcome = std::panic::catch_unwind(move || {
        let input = read_stdin();
        let response = check(&project_root, &input);
        print!("{}", serde_json::to_string(&response).unwrap_or_else(|_| "{\"status\":\"ok\"}".into()));
        // The caller exits via process::exit, which skips buffered flushes
        std::io::stdout().flush().ok();
        response.exit_code()
    });

    match outcome {
        Ok(code) => code,
        Err(_) => {
            // Fail open at the very top too
            eprintln!("[ai-guardrail] internal error — allowing");
            EXIT_ALLOWED
        }
    }
}

/// Decide one raw input against a project. Unparsable input allows.
pub fn check(project_root: &Path, input: &str) -> HookResponse {
    let event = match Event::from_json(input) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Unparsable event input — allowing");
            return HookResponse { status: HookStatus::Ok, message: None };
        }
    };

    let engine = Engine::open(project_root);
    let decision = engine.decide(&event);
    engine.flush_analytics();

    if !decision.allowed {
        tracing::info!(
            event = %event.id,
            messages = decision.messages.len(),
            "Event blocked"
        );
    }
    HookResponse::from_decision(&decision)
}

fn read_stdin() -> String {
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer).ok();
    buffer
}
