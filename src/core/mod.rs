//! Core firewall management functionality
//!
//! This module contains the core types and logic for composing and persisting rules.
//! It provides:
//!
//! - [`firewall`]: The structured rule model and the rule store
//! - [`chains`]: Named chains of opaque rule text
//! - [`persistence`]: Structured JSON snapshots and the line-based backup format
//! - [`applier`]: Applying and flushing rules through iptables
//! - [`error`]: Error types for firewall operations

pub mod applier;
pub mod chains;
pub mod error;
pub mod firewall;
pub mod persistence;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;
