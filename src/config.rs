use crate::core::applier::DEFAULT_CHAIN;
use crate::core::persistence::{DEFAULT_BACKUP_FILE, DEFAULT_RULES_FILE, DuplicatePolicy};
use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Structured (JSON) rule file, relative paths resolve against the working directory
    #[serde(default = "default_rules_file")]
    pub rules_file: PathBuf,
    /// Line-based backup file
    #[serde(default = "default_backup_file")]
    pub backup_file: PathBuf,
    /// How backup imports treat rule text that is already stored
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Firewall executable invoked for apply and flush
    #[serde(default = "default_iptables_command")]
    pub iptables_command: String,
    /// Chain that applied rules are appended to
    #[serde(default = "default_chain")]
    pub default_chain: String,
    /// Wrap the firewall executable in sudo/run0/pkexec when not root
    #[serde(default = "default_true")]
    pub elevate: bool,
    /// Record apply/flush operations in the audit log
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules_file: default_rules_file(),
            backup_file: default_backup_file(),
            duplicate_policy: DuplicatePolicy::default(),
            iptables_command: default_iptables_command(),
            default_chain: default_chain(),
            elevate: true,
            audit_log: true,
        }
    }
}

fn default_rules_file() -> PathBuf {
    PathBuf::from(DEFAULT_RULES_FILE)
}

fn default_backup_file() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUP_FILE)
}

fn default_iptables_command() -> String {
    "iptables".to_string()
}

fn default_chain() -> String {
    DEFAULT_CHAIN.to_string()
}

fn default_true() -> bool {
    true
}

/// Location of the config file under the XDG data directory
pub fn config_path() -> Option<PathBuf> {
    get_data_dir().map(|mut path| {
        path.push("config.json");
        path
    })
}

/// Saves the config to `path` using an atomic write pattern with 0o600 permissions.
pub async fn save_config_to(path: &Path, config: &AppConfig) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    crate::utils::write_atomic(path, json.as_bytes()).await
}

/// Loads the config from `path`, or returns the default if it is missing or unreadable.
pub async fn load_config_from(path: &Path) -> AppConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => match serde_json::from_str::<AppConfig>(&json) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring invalid config {}: {e}", path.display());
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

/// Loads the app config from the data directory, or returns default if not found.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}
