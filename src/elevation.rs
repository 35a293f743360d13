//! Privilege elevation for firewall commands
//!
//! iptables needs root. fwmenu itself may run unprivileged and only wraps the
//! firewall executable in an elevation helper when it has to.
//!
//! # Elevation Strategy
//!
//! - **Preferred**: Uses `run0` when available (systemd v256+, no SUID)
//! - **Terminal fallback**: Uses `sudo`
//! - **No terminal**: Uses `pkexec`
//!
//! # Environment Variables
//!
//! - `FWMENU_ELEVATION_METHOD`: Force a specific elevation method (`sudo`, `run0`, or `pkexec`).
//!   Useful for scripts with sudoers NOPASSWD rules.
//!   Example: `FWMENU_ELEVATION_METHOD=sudo fwmenu apply`
//!
//! - `FWMENU_NO_ELEVATION`: Bypass elevation entirely (containers, tests).
//!
//! # Security
//!
//! - Commands are built from argument lists, never through a shell
//! - Wrapper binaries are checked for availability before use

use tokio::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `FWMENU_ELEVATION_METHOD`
    #[error("Invalid FWMENU_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

fn wrapped(wrapper: &str, program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(wrapper);
    cmd.arg(program).args(args);
    cmd
}

fn direct(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Creates the command that runs the firewall executable with `args`.
///
/// With `elevate` false the program is run as-is. Otherwise the precedence is:
///
/// 1. `FWMENU_NO_ELEVATION` set: run directly
/// 2. Already root: run directly
/// 3. `FWMENU_ELEVATION_METHOD`: the requested wrapper
/// 4. `run0` if installed, else `sudo` on a terminal, else `pkexec`
///
/// # Errors
///
/// Returns `Err` if the requested or required wrapper is unavailable, or the
/// method name is unknown.
pub fn create_firewall_command(
    program: &str,
    args: &[String],
    elevate: bool,
) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    if !elevate || std::env::var("FWMENU_NO_ELEVATION").is_ok() {
        return Ok(direct(program, args));
    }

    // Direct Root Execution (No prompt needed)
    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    // Explicit elevation method override
    if let Ok(method) = std::env::var("FWMENU_ELEVATION_METHOD") {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if !binary_exists(&method) {
                        return Err(ElevationError::MethodNotAvailable(method));
                    }
                    Ok(wrapped(&method, program, args))
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    // Prefer run0 everywhere when available (better security, no SUID bit)
    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        Ok(wrapped("sudo", program, args))
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        Ok(wrapped("pkexec", program, args))
    }
}
