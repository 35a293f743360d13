//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::applier::{FirewallTool, ToolOutput};
use crate::core::error::ApplyError;
use crate::core::firewall::{Action, Protocol, Rule, RuleStore};
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("FWMENU_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("FWMENU_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// In-memory [`FirewallTool`] that records every invocation.
///
/// `failing_on(n)` makes the n-th call (1-based) exit with status 1.
#[derive(Debug, Default)]
pub struct RecordingTool {
    calls: Mutex<Vec<Vec<String>>>,
    fail_on: Option<usize>,
}

impl RecordingTool {
    pub fn failing_on(call: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(call),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls that reported success
    pub fn successes(&self) -> usize {
        let total = self.calls.lock().unwrap().len();
        match self.fail_on {
            Some(n) if n <= total => total - 1,
            _ => total,
        }
    }
}

impl FirewallTool for RecordingTool {
    async fn run(&self, args: &[String]) -> Result<ToolOutput, ApplyError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(args.to_vec());
        let failed = self.fail_on == Some(calls.len());
        Ok(ToolOutput {
            success: !failed,
            exit_code: Some(i32::from(failed)),
            stderr: if failed {
                "iptables: Bad rule (does a matching rule exist in that chain?).".to_string()
            } else {
                String::new()
            },
        })
    }
}

/// Creates a test rule dropping TCP traffic from the given host.
pub fn create_test_rule(source: &str, comment: Option<&str>) -> Rule {
    Rule::new(Protocol::Tcp, source, "any", Action::Drop, comment).unwrap()
}

/// Creates a store of `count` distinct rules (sources 10.0.0.1, 10.0.0.2, ...).
pub fn create_test_store(count: usize) -> RuleStore {
    let mut store = RuleStore::new();
    for i in 1..=count {
        store.append(create_test_rule(&format!("10.0.0.{i}"), Some("test rule")));
    }
    store
}
