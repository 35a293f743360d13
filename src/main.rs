//! fwmenu - menu-driven iptables rule manager
//!
//! Without a subcommand fwmenu opens the interactive shell. The one-shot
//! subcommands work on the saved rule file so they can be scripted.
//!
//! # Usage
//!
//! ```bash
//! fwmenu                         # Interactive shell
//! fwmenu apply                   # Apply every rule in firewall_rules.json
//! fwmenu flush                   # Flush the live firewall
//! fwmenu list                    # Show saved rules and chains
//! fwmenu export                  # Write the saved rules to firewall_rules.txt
//! fwmenu history -n 20           # Last 20 audit events
//! fwmenu --chain FORWARD apply   # Append to another chain
//! ```

use clap::{Parser, Subcommand};
use fwmenu::audit::AuditLog;
use fwmenu::config::{self, AppConfig};
use fwmenu::core::applier::IptablesTool;
use fwmenu::core::persistence::{DuplicatePolicy, format_backup_line};
use fwmenu::session::{LoadReport, Session};
use fwmenu::shell::Shell;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

#[derive(Parser)]
#[command(name = "fwmenu")]
#[command(version, about = "Menu-driven iptables rule manager", long_about = None)]
struct Cli {
    /// Structured rule file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    rules_file: Option<PathBuf>,

    /// Line-based backup file
    #[arg(long, global = true, value_name = "PATH")]
    backup_file: Option<PathBuf>,

    /// How imports treat rules that are already stored
    #[arg(long, global = true, value_enum)]
    duplicates: Option<DuplicatePolicy>,

    /// Firewall executable
    #[arg(long, global = true, value_name = "PATH")]
    iptables: Option<String>,

    /// Chain that applied rules are appended to
    #[arg(long, global = true, value_name = "NAME")]
    chain: Option<String>,

    /// Run the firewall executable directly, without sudo/run0/pkexec
    #[arg(long, global = true)]
    no_elevate: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive menu (default)
    Shell,
    /// Load the rule file and apply every rule
    Apply,
    /// Flush all live firewall rules
    Flush,
    /// List rules and chains in the rule file
    List,
    /// Load the rule file and write the backup file
    Export,
    /// Show recent apply/flush events from the audit log
    History {
        /// Number of events to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(path) = &self.rules_file {
            config.rules_file.clone_from(path);
        }
        if let Some(path) = &self.backup_file {
            config.backup_file.clone_from(path);
        }
        if let Some(policy) = self.duplicates {
            config.duplicate_policy = policy;
        }
        if let Some(program) = &self.iptables {
            config.iptables_command.clone_from(program);
        }
        if let Some(chain) = &self.chain {
            config.default_chain.clone_from(chain);
        }
        if self.no_elevate {
            config.elevate = false;
        }
    }
}

fn main() -> ExitCode {
    let _ = fwmenu::utils::ensure_dirs();
    let cli = Cli::parse();
    init_logging();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    // Log to file so tracing output never interleaves with the menus
    if let Some(mut log_path) = fwmenu::utils::get_state_dir() {
        log_path.push("fwmenu.log");
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
        {
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .init();
            return;
        }
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();
}

fn open_session(config: AppConfig) -> Session<IptablesTool> {
    let tool = IptablesTool::new(config.iptables_command.clone(), config.elevate);
    let audit_enabled = config.audit_log;
    let session = Session::new(config, tool);

    if !audit_enabled {
        return session;
    }
    match AuditLog::new() {
        Ok(audit) => session.with_audit(audit),
        Err(e) => {
            warn!("Audit log unavailable: {e}");
            session
        }
    }
}

/// Loads the rule file, treating a missing file as an error.
async fn load_saved(
    session: &mut Session<IptablesTool>,
) -> Result<(), Box<dyn std::error::Error>> {
    match session.load().await? {
        LoadReport::Loaded { .. } => Ok(()),
        LoadReport::Missing => Err(format!(
            "No saved rules at {}",
            session.config().rules_file.display()
        )
        .into()),
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = config::load_config().await;
    cli.apply_overrides(&mut config);

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            let session = open_session(config);
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let mut shell = Shell::new(session, stdin.lock(), stdout.lock());
            shell.run().await?;
        }
        Commands::Apply => {
            let mut session = open_session(config);
            load_saved(&mut session).await?;

            if !nix::unistd::getuid().is_root() && session.config().elevate {
                println!("Note: Not running as root. Will use sudo/run0/pkexec for apply.");
            }
            let applied = session.apply_rules().await?;
            println!(
                "Applied {applied} rules to chain {}",
                session.applier().chain()
            );
        }
        Commands::Flush => {
            // -F empties every chain regardless of what is saved locally
            let mut session = open_session(config);
            session.flush_rules().await?;
            println!("Firewall flushed");
        }
        Commands::List => {
            let mut session = open_session(config);
            load_saved(&mut session).await?;

            println!("Rules ({}):", session.rules().len());
            for (i, rule) in session.rules().iter().enumerate() {
                println!("{:5}. {}", i + 1, format_backup_line(rule));
            }
            println!("Chains ({}):", session.chains().len());
            for (name, rules) in session.chains().iter() {
                println!("  {name} ({} rules)", rules.len());
                for (i, rule) in rules.iter().enumerate() {
                    println!("{:7}. {rule}", i + 1);
                }
            }
        }
        Commands::Export => {
            let mut session = open_session(config);
            load_saved(&mut session).await?;
            let count = session.export_backup().await?;
            println!(
                "Exported {count} rules to {}",
                session.config().backup_file.display()
            );
        }
        Commands::History { count } => {
            let audit = AuditLog::new()?;
            let events = match audit.read_recent(count).await {
                Ok(events) => events,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            if events.is_empty() {
                println!("No audit events recorded in {}", audit.path().display());
            }
            for event in events {
                let status = if event.success { "ok" } else { "FAILED" };
                print!(
                    "{}  {:<12} {:<7} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type.to_string(),
                    status,
                    event.details
                );
                match event.error {
                    Some(error) => println!("  {error}"),
                    None => println!(),
                }
            }
        }
        Commands::InitConfig { force } => {
            let path = config::config_path().ok_or("Data directory not found")?;
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }
            config::save_config_to(&path, &AppConfig::default()).await?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}
