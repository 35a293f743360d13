//! Input validation and sanitization functions for fwmenu
//!
//! This module provides centralized validation for all user inputs so that
//! nothing reaching the rule stores or the iptables argument list is malformed.

use ipnetwork::Ipv4Network;

/// Canonical "match every address" network used for `any` and blank input.
pub const MATCH_ALL: &str = "0.0.0.0/0";

/// Maximum length kept from a user supplied comment.
pub const MAX_COMMENT_LEN: usize = 128;

/// Normalizes a source or destination address.
///
/// Empty input and `any` (any case) become [`MATCH_ALL`]. Everything else must
/// parse as an IPv4 address or CIDR network and is returned unchanged.
///
/// # Examples
///
/// ```
/// use fwmenu::validators::normalize_address;
///
/// assert_eq!(normalize_address("ANY").unwrap(), "0.0.0.0/0");
/// assert_eq!(normalize_address("10.0.0.0/8").unwrap(), "10.0.0.0/8");
/// assert!(normalize_address("10.0.0.0/33").is_err());
/// ```
///
/// # Errors
///
/// Returns `Err` if the value is neither the match-all sentinel nor a valid
/// IPv4 network.
pub fn normalize_address(input: &str) -> Result<String, String> {
    if input.is_empty() || input.eq_ignore_ascii_case("any") {
        return Ok(MATCH_ALL.to_string());
    }

    match input.parse::<Ipv4Network>() {
        Ok(_) => Ok(input.to_string()),
        Err(e) => Err(format!("'{input}' is not a valid IPv4 address or CIDR ({e})")),
    }
}

/// Sanitizes a free-text comment.
///
/// Removes control characters so a comment can never split a backup line,
/// trims surrounding whitespace and limits length to [`MAX_COMMENT_LEN`] characters.
///
/// # Examples
///
/// ```
/// use fwmenu::validators::sanitize_comment;
///
/// assert_eq!(sanitize_comment("  allow web\n"), "allow web");
/// ```
pub fn sanitize_comment(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_COMMENT_LEN)
        .collect();
    cleaned.trim().to_string()
}

/// Validates a chain name typed at the prompt.
///
/// Chain names are exact, case-sensitive keys. Only blank names are refused.
///
/// # Errors
///
/// Returns `Err` if the name is empty or whitespace only.
pub fn validate_chain_name(input: &str) -> Result<String, String> {
    let name = input.trim();
    if name.is_empty() {
        return Err("Chain name cannot be empty".to_string());
    }
    Ok(name.to_string())
}

/// Parses a 1-based rule number typed at the prompt.
///
/// # Errors
///
/// Returns `Err` if the input is not a non-negative integer.
pub fn parse_rule_number(input: &str) -> Result<usize, String> {
    input
        .trim()
        .parse::<usize>()
        .map_err(|_| "Please enter a number".to_string())
}
