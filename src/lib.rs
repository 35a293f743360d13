//! fwmenu - menu-driven iptables rule manager
//!
//! Compose firewall rules and named chains interactively, keep them in a JSON
//! file or a line-based backup, and push them to the kernel through iptables.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, rule and chain stores, persistence and the iptables applier
//! - [`session`] - Owner of the stores for one interactive or one-shot run
//! - [`shell`] - Numbered menu loop over any reader/writer pair
//! - [`elevation`] - sudo/run0/pkexec wrapping for the firewall executable
//! - [`audit`] - Audit trail of apply and flush operations
//! - [`validators`] - Input validation and sanitization
//! - [`config`] - Configuration persistence
//! - [`utils`] - XDG directories and atomic writes

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod session;
pub mod shell;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::firewall::{Action, Protocol, Rule, RuleStore};
