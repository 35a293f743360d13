//! Rule and chain persistence
//!
//! Two independent on-disk formats:
//!
//! - **Structured file** (`firewall_rules.json`): a whole-store JSON snapshot
//!   holding both the rule list and the chains. Saved atomically with a SHA-256
//!   sidecar, loaded with a clear split between "missing" and "corrupt".
//! - **Backup file** (`firewall_rules.txt`): one rule per line,
//!   `<rule>  # <comment> (<timestamp>)` or the bare rule text, meant for people
//!   to read and for moving rules between machines.

use crate::core::chains::ChainStore;
use crate::core::error::{Error, Result};
use crate::core::firewall::{Rule, RuleRecord, RuleStore};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default structured file name
pub const DEFAULT_RULES_FILE: &str = "firewall_rules.json";

/// Default backup file name
pub const DEFAULT_BACKUP_FILE: &str = "firewall_rules.txt";

/// Comment given to backup lines that carry none
pub const IMPORTED_COMMENT: &str = "Imported rule";

/// Canonical structured document
#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    rules: Vec<RuleRecord>,
    chains: &'a ChainStore,
}

/// Rule entry as found on disk; bare strings come from older files
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRule {
    Record(RuleRecord),
    Text(String),
}

/// Every document shape we accept on load
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredDocument {
    Combined {
        #[serde(default)]
        rules: Vec<StoredRule>,
        #[serde(default)]
        chains: ChainStore,
    },
    RulesOnly(Vec<StoredRule>),
}

/// Result of reading the structured file
#[derive(Debug)]
pub enum LoadOutcome {
    /// The file existed and decoded cleanly
    Loaded { rules: RuleStore, chains: ChainStore },
    /// No file at the path
    Missing,
}

/// What to do with backup lines whose rule text is already stored
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Append every line
    Keep,
    /// Skip lines whose canonical rule text is already stored.
    ///
    /// Matching happens after parsing, so `-s any` and `-s 0.0.0.0/0` are the
    /// same rule.
    #[default]
    Skip,
}

/// Counts reported by [`import_backup`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped_duplicates: usize,
}

fn checksum_path(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".sha256");
    PathBuf::from(sidecar)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

/// Saves both stores to the structured file.
///
/// The whole document is replaced atomically; a checksum sidecar is written
/// afterwards for integrity verification on load.
pub async fn save_structured(path: &Path, rules: &RuleStore, chains: &ChainStore) -> Result<()> {
    let snapshot = Snapshot {
        rules: rules.to_serializable(),
        chains,
    };
    let json = serde_json::to_string_pretty(&snapshot)?;

    crate::utils::write_atomic(path, json.as_bytes()).await?;

    // The rule file is already replaced; a stale sidecar only triggers a warning on load
    let sidecar = checksum_path(path);
    let digest = sha256_hex(json.as_bytes());
    if let Err(e) = crate::utils::write_atomic(&sidecar, digest.as_bytes()).await {
        warn!("Failed to write checksum {}: {e}", sidecar.display());
    }

    info!(
        "Saved {} rules and {} chains to {}",
        rules.len(),
        chains.len(),
        path.display()
    );
    Ok(())
}

/// Loads both stores from the structured file.
///
/// # Errors
///
/// - `DataFormat` if the file is not valid JSON, has an unexpected shape, or
///   holds a malformed rule record
/// - `Io` for any other read failure
pub async fn load_structured(path: &Path) -> Result<LoadOutcome> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No structured file at {}", path.display());
            return Ok(LoadOutcome::Missing);
        }
        Err(e) => return Err(e.into()),
    };

    // Verify checksum if present (warns but doesn't fail for manually edited files)
    if let Ok(expected) = tokio::fs::read_to_string(checksum_path(path)).await {
        let actual = sha256_hex(&bytes);
        if expected.trim() != actual {
            warn!(
                "'{}' checksum mismatch (expected: {}, got: {})",
                path.display(),
                expected.trim(),
                actual
            );
        }
    }

    let document: StoredDocument = serde_json::from_slice(&bytes)
        .map_err(|e| Error::data_format(display_name(path), e.to_string()))?;

    let (stored_rules, chains) = match document {
        StoredDocument::Combined { rules, chains } => (rules, chains),
        StoredDocument::RulesOnly(rules) => (rules, ChainStore::new()),
    };

    let now = Utc::now();
    let mut rules = RuleStore::new();
    for (i, stored) in stored_rules.iter().enumerate() {
        let rule = match stored {
            StoredRule::Record(record) => Rule::from_record(record),
            StoredRule::Text(text) => Rule::parse(text, None, now),
        }
        .map_err(|e| {
            Error::data_format(display_name(path), format!("rule record {}: {e}", i + 1))
        })?;
        rules.append(rule);
    }

    info!(
        "Loaded {} rules and {} chains from {}",
        rules.len(),
        chains.len(),
        path.display()
    );
    Ok(LoadOutcome::Loaded { rules, chains })
}

/// Formats one backup line (without the newline).
pub fn format_backup_line(rule: &Rule) -> String {
    match rule.comment() {
        Some(comment) => format!(
            "{rule}  # {comment} ({})",
            rule.created_at().to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        None => rule.to_string(),
    }
}

/// Splits a trailing ` (<timestamp>)` off a comment when it parses.
fn split_timestamp(comment: &str) -> (&str, Option<DateTime<Utc>>) {
    if let Some(body) = comment.strip_suffix(')')
        && let Some(open) = body.rfind('(')
        && let Ok(ts) = DateTime::parse_from_rfc3339(&body[open + 1..])
    {
        return (body[..open].trim_end(), Some(ts.with_timezone(&Utc)));
    }
    (comment, None)
}

/// True for lines that carry no rule: blank lines and `#` comment lines.
fn is_note_line(line: &str) -> bool {
    line.split_once('#')
        .map_or(line, |(text, _)| text)
        .trim()
        .is_empty()
}

/// Parses one backup line that holds rule text.
pub fn parse_backup_line(line: &str, now: DateTime<Utc>) -> Result<Rule> {
    let Some((text, remainder)) = line.split_once('#') else {
        return Rule::parse(line.trim(), Some(IMPORTED_COMMENT), now);
    };

    let (comment, timestamp) = split_timestamp(remainder.trim());
    let comment = if comment.is_empty() {
        IMPORTED_COMMENT
    } else {
        comment
    };
    Rule::parse(text.trim(), Some(comment), timestamp.unwrap_or(now))
}

/// Writes every rule to the backup file, replacing it. Returns the line count.
pub async fn export_backup(path: &Path, rules: &RuleStore) -> Result<usize> {
    let mut out = String::new();
    for rule in rules {
        let _ = writeln!(out, "{}", format_backup_line(rule));
    }

    crate::utils::write_atomic(path, out.as_bytes()).await?;
    info!("Exported {} rules to {}", rules.len(), path.display());
    Ok(rules.len())
}

/// Appends the rules from a backup file to `rules`.
///
/// Blank lines and lines starting with `#` are skipped. Every other line is
/// parsed before anything is appended, so a malformed line leaves `rules`
/// untouched.
///
/// # Errors
///
/// - `MissingFile` if there is no file at `path`
/// - `DataFormat` naming the first malformed line
/// - `Io` for any other read failure
pub async fn import_backup(
    path: &Path,
    rules: &mut RuleStore,
    policy: DuplicatePolicy,
) -> Result<ImportSummary> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let now = Utc::now();
    let parsed = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !is_note_line(line))
        .map(|(i, line)| {
            parse_backup_line(line, now).map_err(|e| {
                Error::data_format(display_name(path), format!("line {}: {e}", i + 1))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut summary = ImportSummary::default();
    for rule in parsed {
        if policy == DuplicatePolicy::Skip && rules.contains_text(&rule.to_string()) {
            summary.skipped_duplicates += 1;
            continue;
        }
        rules.append(rule);
        summary.imported += 1;
    }

    info!(
        "Imported {} rules from {} ({} duplicates skipped)",
        summary.imported,
        path.display(),
        summary.skipped_duplicates
    );
    Ok(summary)
}
