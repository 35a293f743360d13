use std::path::PathBuf;
use thiserror::Error;

/// Core error types for fwmenu
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file that was expected to exist is missing
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// A chain with this name already exists
    #[error("Chain already exists: {0}")]
    DuplicateChain(String),

    /// No chain with this name
    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    /// Rule number outside `1..=len`
    #[error("Rule number {index} is out of range for chain '{chain}' (valid: 1-{len})")]
    IndexOutOfRange {
        chain: String,
        index: usize,
        len: usize,
    },

    /// Stored data could not be decoded
    #[error("Invalid data in {source_name}: {message}")]
    DataFormat {
        source_name: String,
        message: String,
    },

    /// iptables invocation failed
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn data_format(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataFormat {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Errors raised at the external firewall tool boundary
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("iptables exited with status {}: {stderr}", .exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    CommandFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Privilege elevation unavailable: {0}")]
    Elevation(String),

    #[error("Rule {position} ({rule}) failed: {source}")]
    Rule {
        position: usize,
        rule: String,
        #[source]
        source: Box<ApplyError>,
    },
}

impl ApplyError {
    /// stderr of the failing invocation, looking through `Rule` wrappers
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ApplyError::CommandFailed { stderr, .. } => Some(stderr),
            ApplyError::Rule { source, .. } => source.stderr(),
            ApplyError::Spawn { .. } | ApplyError::Elevation(_) => None,
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Database of iptables error patterns and their translations
pub struct IptablesErrorPattern;

impl IptablesErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Permission errors
        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("you must be root")
        {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run fwmenu as root, or leave elevation enabled")
                .with_suggestion("Set FWMENU_ELEVATION_METHOD=sudo to force sudo")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available");
        }

        // Missing iptables
        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install iptables  (Fedora/RHEL)")
                .with_suggestion("Or: sudo pacman -S iptables  (Arch)")
                .with_suggestion("Or point --iptables at the binary");
        }

        // xtables lock held by another process
        if lower.contains("xtables lock") || lower.contains("resource temporarily unavailable") {
            return ErrorTranslation::new("Another process is holding the iptables lock")
                .with_suggestion("Wait a moment and try again")
                .with_suggestion(
                    "Check for conflicting firewall managers: sudo systemctl status firewalld ufw",
                );
        }

        // Unknown chain
        if lower.contains("no chain/target/match by that name") {
            return ErrorTranslation::new("Firewall chain or target not found")
                .with_suggestion("Ensure the target chain exists: sudo iptables -L")
                .with_suggestion("Use --chain to select an existing chain");
        }

        // Unresolvable address
        if lower.contains("host/network") && lower.contains("not found") {
            return ErrorTranslation::new("Invalid IP address or network")
                .with_suggestion("Use proper IPv4 format: 192.168.1.1 or 192.168.1.0/24")
                .with_suggestion("Use 'any' to match every address");
        }

        // Syntax errors
        if lower.contains("bad argument")
            || lower.contains("unknown option")
            || lower.contains("invalid argument")
            || lower.contains("try `iptables -h'")
        {
            return ErrorTranslation::new("Invalid firewall rule syntax")
                .with_suggestion("Check the rule for typos")
                .with_suggestion("Ensure IP addresses and network masks are valid");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify iptables is working: sudo iptables -L")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
