//! Applying rules to the live firewall
//!
//! Each structured rule becomes one `iptables -A <chain> ...` invocation and a
//! flush is a single `iptables -F`. The executable sits behind the
//! [`FirewallTool`] trait so the apply/flush policy can be exercised without
//! touching the host firewall.
//!
//! # Policy
//!
//! - Rules are applied one at a time, in store order; the first failure stops
//!   the batch and identifies the rule.
//! - The local rule list is cleared only after iptables confirms the flush.

use crate::core::error::ApplyError;
use crate::core::firewall::{Rule, RuleStore};
use tracing::{error, info};

/// Chain used when the config does not name one
pub const DEFAULT_CHAIN: &str = "INPUT";

/// Outcome of one external invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// The external firewall-control executable
#[allow(async_fn_in_trait)]
pub trait FirewallTool {
    /// Runs the tool with `args` and waits for it to exit.
    async fn run(&self, args: &[String]) -> Result<ToolOutput, ApplyError>;
}

/// Runs iptables (or a stand-in binary) as a child process.
#[derive(Debug, Clone)]
pub struct IptablesTool {
    program: String,
    elevate: bool,
}

impl IptablesTool {
    pub fn new(program: impl Into<String>, elevate: bool) -> Self {
        Self {
            program: program.into(),
            elevate,
        }
    }
}

impl FirewallTool for IptablesTool {
    async fn run(&self, args: &[String]) -> Result<ToolOutput, ApplyError> {
        info!("Running: {} {}", self.program, args.join(" "));

        let output =
            crate::elevation::create_firewall_command(&self.program, args, self.elevate)
                .map_err(|e| ApplyError::Elevation(e.to_string()))?
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .output()
                .await
                .map_err(|e| {
                    error!("Failed to spawn {}: {e}", self.program);
                    ApplyError::Spawn {
                        program: self.program.clone(),
                        source: e,
                    }
                })?;

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Translates rules into tool invocations
#[derive(Debug, Clone)]
pub struct Applier<T> {
    tool: T,
    chain: String,
}

impl<T: FirewallTool> Applier<T> {
    pub fn new(tool: T, chain: impl Into<String>) -> Self {
        Self {
            tool,
            chain: chain.into(),
        }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Full argument list for appending `rule` to the target chain
    pub fn rule_args(&self, rule: &Rule) -> Vec<String> {
        let mut args = vec!["-A".to_string(), self.chain.clone()];
        args.extend(rule.to_args());
        args
    }

    async fn invoke(&self, args: &[String]) -> Result<(), ApplyError> {
        let output = self.tool.run(args).await?;
        if output.success {
            Ok(())
        } else {
            error!(
                "Firewall command failed ({:?}): {}",
                output.exit_code, output.stderr
            );
            Err(ApplyError::CommandFailed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    /// Applies a single rule.
    pub async fn apply(&self, rule: &Rule) -> Result<(), ApplyError> {
        self.invoke(&self.rule_args(rule)).await
    }

    /// Applies every rule in order, stopping at the first failure.
    ///
    /// Returns the number of rules applied. The error carries the 1-based
    /// position and text of the rule that failed.
    pub async fn apply_all(&self, rules: &RuleStore) -> Result<usize, ApplyError> {
        for (i, rule) in rules.iter().enumerate() {
            if let Err(e) = self.apply(rule).await {
                error!("Stopped applying at rule {}: {}", i + 1, rule);
                return Err(ApplyError::Rule {
                    position: i + 1,
                    rule: rule.to_string(),
                    source: Box::new(e),
                });
            }
        }
        info!("Applied {} rules to chain {}", rules.len(), self.chain);
        Ok(rules.len())
    }

    /// Flushes all live rules; clears `rules` only once the flush succeeded.
    ///
    /// Returns the number of local rules that were cleared.
    pub async fn flush_all(&self, rules: &mut RuleStore) -> Result<usize, ApplyError> {
        self.invoke(&["-F".to_string()]).await?;
        let cleared = rules.len();
        rules.clear();
        info!("Flushed firewall, cleared {} local rules", cleared);
        Ok(cleared)
    }
}
