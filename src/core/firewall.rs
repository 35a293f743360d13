//! Firewall rule data structures
//!
//! This module defines the structured rule model used for the main rule list.
//!
//! # Rule Structure
//!
//! A [`Rule`] represents a single filter directive with:
//! - Protocol filtering (TCP, UDP, ICMP)
//! - Source and destination IPv4 networks (`any` is stored as `0.0.0.0/0`)
//! - Action (ACCEPT, DROP, REJECT)
//! - Optional comment and a creation timestamp
//!
//! Rules are immutable once built. Their textual form is the iptables match
//! fragment `-p tcp -s 0.0.0.0/0 -d 10.0.0.0/8 -j ACCEPT`, which is also what
//! the persistence formats store and parse back.
//!
//! # Example
//!
//! ```
//! use fwmenu::core::firewall::{Action, Protocol, Rule};
//!
//! let rule = Rule::new(Protocol::Tcp, "any", "10.0.0.0/8", Action::Accept, Some("lan"))
//!     .unwrap();
//! assert_eq!(rule.to_string(), "-p tcp -s 0.0.0.0/0 -d 10.0.0.0/8 -j ACCEPT");
//! ```

use crate::core::error::{Error, Result};
use crate::validators;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network protocol type for firewall rules
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    /// Transmission Control Protocol
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
    /// Internet Control Message Protocol
    #[strum(serialize = "icmp")]
    Icmp,
}

/// Rule action (Accept, Drop, or Reject)
///
/// Controls what happens when a packet matches this rule.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Action {
    /// Accept the packet (allow it through)
    #[strum(serialize = "ACCEPT")]
    Accept,
    /// Drop the packet silently (no response sent)
    #[strum(serialize = "DROP")]
    Drop,
    /// Reject the packet and send ICMP unreachable response
    #[strum(serialize = "REJECT")]
    Reject,
}

/// Parses a protocol name, producing a validation error for anything else.
pub fn parse_protocol(input: &str) -> Result<Protocol> {
    input.trim().parse().map_err(|_| {
        Error::validation(
            "protocol",
            format!("'{}' is not one of tcp/udp/icmp", input.trim()),
        )
    })
}

/// Parses an action name, producing a validation error for anything else.
pub fn parse_action(input: &str) -> Result<Action> {
    input.trim().parse().map_err(|_| {
        Error::validation(
            "action",
            format!("'{}' is not one of ACCEPT/DROP/REJECT", input.trim()),
        )
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    protocol: Protocol,
    source: String,
    destination: String,
    action: Action,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl Rule {
    /// Builds a rule stamped with the current time.
    ///
    /// Addresses go through [`validators::normalize_address`]; the comment is
    /// sanitized and dropped when empty.
    pub fn new(
        protocol: Protocol,
        source: &str,
        destination: &str,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Self> {
        Self::with_timestamp(protocol, source, destination, action, comment, Utc::now())
    }

    pub fn with_timestamp(
        protocol: Protocol,
        source: &str,
        destination: &str,
        action: Action,
        comment: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let source =
            validators::normalize_address(source).map_err(|e| Error::validation("source", e))?;
        let destination = validators::normalize_address(destination)
            .map_err(|e| Error::validation("destination", e))?;
        let comment = comment
            .map(validators::sanitize_comment)
            .filter(|c| !c.is_empty());

        Ok(Self {
            protocol,
            source,
            destination,
            action,
            comment,
            created_at,
        })
    }

    /// Parses iptables rule text (`-p tcp -s any -d 10.0.0.1 -j DROP`).
    ///
    /// Flags may appear in any order; long forms (`--protocol`, `--source`,
    /// `--destination`, `--jump`) are accepted too.
    pub fn parse(text: &str, comment: Option<&str>, created_at: DateTime<Utc>) -> Result<Self> {
        let mut protocol = None;
        let mut source = None;
        let mut destination = None;
        let mut action = None;

        let mut tokens = text.split_whitespace();
        while let Some(flag) = tokens.next() {
            let value = tokens
                .next()
                .ok_or_else(|| Error::validation("rule", format!("flag '{flag}' has no value")))?;
            let slot = match flag {
                "-p" | "--protocol" => &mut protocol,
                "-s" | "--source" => &mut source,
                "-d" | "--destination" => &mut destination,
                "-j" | "--jump" => &mut action,
                other => {
                    return Err(Error::validation(
                        "rule",
                        format!("unsupported flag '{other}'"),
                    ));
                }
            };
            if slot.replace(value).is_some() {
                return Err(Error::validation("rule", format!("flag '{flag}' given twice")));
            }
        }

        let missing = |name: &str| Error::validation("rule", format!("missing {name}"));
        let protocol = parse_protocol(protocol.ok_or_else(|| missing("protocol (-p)"))?)?;
        let source = source.ok_or_else(|| missing("source (-s)"))?;
        let destination = destination.ok_or_else(|| missing("destination (-d)"))?;
        let action = parse_action(action.ok_or_else(|| missing("action (-j)"))?)?;

        Self::with_timestamp(protocol, source, destination, action, comment, created_at)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// iptables arguments for the match and jump part of this rule
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "-p".to_string(),
            self.protocol.to_string(),
            "-s".to_string(),
            self.source.clone(),
            "-d".to_string(),
            self.destination.clone(),
            "-j".to_string(),
            self.action.to_string(),
        ]
    }

    /// Lossless record form used by the structured file
    pub fn to_record(&self) -> RuleRecord {
        RuleRecord {
            rule: self.to_string(),
            comment: self.comment.clone().unwrap_or_default(),
            timestamp: self
                .created_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    pub fn from_record(record: &RuleRecord) -> Result<Self> {
        let created_at = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|e| {
                Error::validation(
                    "timestamp",
                    format!("'{}' is not an RFC 3339 timestamp ({e})", record.timestamp),
                )
            })?
            .with_timezone(&Utc);
        Self::parse(&record.rule, Some(&record.comment), created_at)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-p {} -s {} -d {} -j {}",
            self.protocol, self.source, self.destination, self.action
        )
    }
}

/// One entry of the structured file's `rules` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleRecord {
    pub rule: String,
    #[serde(default)]
    pub comment: String,
    pub timestamp: String,
}

/// Ordered list of structured rules
///
/// Append-only during a session, apart from [`RuleStore::clear`] after a
/// successful flush and wholesale replacement on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStore {
    rules: Vec<Rule>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn last(&self) -> Option<&Rule> {
        self.rules.last()
    }

    /// Verbatim rule-text lookup
    pub fn contains_text(&self, text: &str) -> bool {
        self.rules.iter().any(|r| r.to_string() == text)
    }

    pub fn to_serializable(&self) -> Vec<RuleRecord> {
        self.rules.iter().map(Rule::to_record).collect()
    }

    /// Rebuilds a store from records.
    ///
    /// Either every record decodes or the whole call fails; the error names the
    /// first bad record (1-based).
    pub fn from_serializable(records: &[RuleRecord]) -> Result<Self> {
        let rules = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                Rule::from_record(record).map_err(|e| {
                    Error::data_format(format!("rule record {}", i + 1), e.to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl<'a> IntoIterator for &'a RuleStore {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
