//! Named chains of opaque rule text
//!
//! Chains are kept apart from the structured [`RuleStore`](crate::core::firewall::RuleStore):
//! their entries are free-form strings that are stored and listed verbatim,
//! never parsed. Rule order inside a chain is insertion order.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Mapping of chain name to its ordered rule strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainStore {
    chains: BTreeMap<String, Vec<String>>,
}

impl ChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty chain. Names are exact and case-sensitive.
    pub fn create(&mut self, name: &str) -> Result<()> {
        if self.chains.contains_key(name) {
            return Err(Error::DuplicateChain(name.to_string()));
        }
        self.chains.insert(name.to_string(), Vec::new());
        info!("Created chain '{}'", name);
        Ok(())
    }

    /// Removes a chain, returning the rules it held.
    pub fn delete(&mut self, name: &str) -> Result<Vec<String>> {
        let rules = self
            .chains
            .remove(name)
            .ok_or_else(|| Error::ChainNotFound(name.to_string()))?;
        info!("Deleted chain '{}' ({} rules)", name, rules.len());
        Ok(rules)
    }

    /// Chain names containing `needle` as a literal substring.
    pub fn search(&self, needle: &str) -> Vec<&str> {
        self.chains
            .keys()
            .filter(|name| name.contains(needle))
            .map(String::as_str)
            .collect()
    }

    /// Appends `rule` verbatim and returns the chain's new length.
    pub fn add_rule(&mut self, name: &str, rule: &str) -> Result<usize> {
        let rules = self
            .chains
            .get_mut(name)
            .ok_or_else(|| Error::ChainNotFound(name.to_string()))?;
        rules.push(rule.to_string());
        Ok(rules.len())
    }

    /// Removes the rule at the 1-based `index` and returns it.
    pub fn delete_rule(&mut self, name: &str, index: usize) -> Result<String> {
        let rules = self
            .chains
            .get_mut(name)
            .ok_or_else(|| Error::ChainNotFound(name.to_string()))?;
        if index == 0 || index > rules.len() {
            return Err(Error::IndexOutOfRange {
                chain: name.to_string(),
                index,
                len: rules.len(),
            });
        }
        Ok(rules.remove(index - 1))
    }

    pub fn list_rules(&self, name: &str) -> Result<&[String]> {
        self.chains
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::ChainNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Chains in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.chains
            .iter()
            .map(|(name, rules)| (name.as_str(), rules.as_slice()))
    }
}
