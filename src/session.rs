//! Session state: the single owner of the rule and chain stores
//!
//! Every menu action goes through a [`Session`]. It holds both stores, the
//! applier and the configuration, so no operation reaches for shared globals.

use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::core::applier::{Applier, FirewallTool};
use crate::core::chains::ChainStore;
use crate::core::error::{ApplyError, Error, Result};
use crate::core::firewall::{Rule, RuleStore, parse_action, parse_protocol};
use crate::core::persistence::{self, ImportSummary, LoadOutcome};
use std::path::Path;
use tracing::{info, warn};

/// What a load did to the stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReport {
    Loaded { rules: usize, chains: usize },
    /// Nothing on disk; both stores were reset to empty
    Missing,
}

pub struct Session<T> {
    rules: RuleStore,
    chains: ChainStore,
    applier: Applier<T>,
    config: AppConfig,
    audit: Option<AuditLog>,
}

impl<T: FirewallTool> Session<T> {
    pub fn new(config: AppConfig, tool: T) -> Self {
        let applier = Applier::new(tool, config.default_chain.clone());
        Self {
            rules: RuleStore::new(),
            chains: ChainStore::new(),
            applier,
            config,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn chains(&self) -> &ChainStore {
        &self.chains
    }

    pub fn chains_mut(&mut self) -> &mut ChainStore {
        &mut self.chains
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn applier(&self) -> &Applier<T> {
        &self.applier
    }

    /// Validates the raw field values and appends the new rule.
    ///
    /// Nothing is stored when any field is rejected.
    pub fn create_rule(
        &mut self,
        protocol: &str,
        source: &str,
        destination: &str,
        action: &str,
        comment: Option<&str>,
    ) -> Result<&Rule> {
        let rule = Rule::new(
            parse_protocol(protocol)?,
            source.trim(),
            destination.trim(),
            parse_action(action)?,
            comment,
        )?;
        info!("Rule added: {}", rule);
        self.rules.append(rule);
        self.rules
            .last()
            .ok_or_else(|| Error::Internal("rule store empty after append".to_string()))
    }

    /// Applies every stored rule, stopping at the first failure.
    pub async fn apply_rules(&self) -> Result<usize> {
        let result = self.applier.apply_all(&self.rules).await;
        if let Some(audit) = &self.audit {
            match &result {
                Ok(applied) => audit.log_apply(self.rules.len(), *applied, true, None).await,
                Err(e) => {
                    let applied = match e {
                        ApplyError::Rule { position, .. } => position - 1,
                        _ => 0,
                    };
                    audit
                        .log_apply(self.rules.len(), applied, false, Some(e.to_string()))
                        .await;
                }
            }
        }
        Ok(result?)
    }

    /// Flushes the live firewall; the rule store is cleared only on success.
    pub async fn flush_rules(&mut self) -> Result<usize> {
        let result = self.applier.flush_all(&mut self.rules).await;
        if let Some(audit) = &self.audit {
            match &result {
                Ok(cleared) => audit.log_flush(*cleared, true, None).await,
                Err(e) => audit.log_flush(0, false, Some(e.to_string())).await,
            }
        }
        Ok(result?)
    }

    pub async fn save(&self) -> Result<&Path> {
        persistence::save_structured(&self.config.rules_file, &self.rules, &self.chains).await?;
        Ok(&self.config.rules_file)
    }

    /// Replaces both stores with the structured file's contents.
    ///
    /// A missing or corrupt file resets both stores to empty. Any other read
    /// failure leaves them untouched.
    pub async fn load(&mut self) -> Result<LoadReport> {
        match persistence::load_structured(&self.config.rules_file).await {
            Ok(LoadOutcome::Loaded { rules, chains }) => {
                self.rules = rules;
                self.chains = chains;
                Ok(LoadReport::Loaded {
                    rules: self.rules.len(),
                    chains: self.chains.len(),
                })
            }
            Ok(LoadOutcome::Missing) => {
                self.reset();
                Ok(LoadReport::Missing)
            }
            Err(e @ Error::DataFormat { .. }) => {
                warn!("Discarding stores after failed load: {e}");
                self.reset();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn export_backup(&self) -> Result<usize> {
        persistence::export_backup(&self.config.backup_file, &self.rules).await
    }

    pub async fn import_backup(&mut self) -> Result<ImportSummary> {
        persistence::import_backup(
            &self.config.backup_file,
            &mut self.rules,
            self.config.duplicate_policy,
        )
        .await
    }

    fn reset(&mut self) {
        self.rules.clear();
        self.chains = ChainStore::new();
    }
}
