//! raidtier - Tiered RAID5 Storage Pool Manager
//!
//! Command-line front end: one subcommand per pool lifecycle operation,
//! mapped onto the [`Orchestrator`]. Precondition refusals exit with code
//! 2, operational failures with code 1.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use raidtier::{services, Orchestrator, OrchestratorConfig, Result, Services, WaitPolicy};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tiered RAID5 storage pool manager built on sfdisk, mdadm and LVM
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Prompt for confirmation before each destructive step
    #[arg(short, long, env = "RAIDTIER_INTERACTIVE")]
    interactive: bool,

    /// Seconds between resync state polls
    #[arg(long, env = "RAIDTIER_WAIT_INTERVAL", default_value = "15")]
    wait_interval_secs: u64,

    /// Resync poll limit before giving up (0 waits forever)
    #[arg(long, env = "RAIDTIER_WAIT_POLLS", default_value = "960")]
    wait_polls: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RAIDTIER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also append logs to this file
    #[arg(long, env = "RAIDTIER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Output logs as JSON
    #[arg(long, env = "RAIDTIER_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new pool from two or more empty drives
    Create {
        /// Volume group name (default: first free lvmraid_vgN)
        #[arg(long)]
        vg_name: Option<String>,

        /// Drives to pool, e.g. /dev/sda /dev/sdb
        #[arg(required = true)]
        drives: Vec<String>,
    },

    /// Widen a clean pool with an additional empty drive
    Add {
        #[command(flatten)]
        join: JoinArgs,
    },

    /// Replace a removed or failed drive with an empty one
    Replace {
        #[command(flatten)]
        join: JoinArgs,
    },

    /// Release a drive from the pool, leaving its arrays degraded
    Remove {
        /// Logical volume, e.g. lvmraid_vg0/lvol0
        lv: String,
        /// Drive to release
        drive: String,
    },

    /// Report the pool topology under a logical volume
    Examine {
        /// Logical volume, e.g. lvmraid_vg0/lvol0
        lv: String,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct JoinArgs {
    /// Logical volume, e.g. lvmraid_vg0/lvol0
    lv: String,

    /// Empty drive to join
    drive: String,

    /// Reshape backup file handed to mdadm
    #[arg(long, default_value = raidtier::lifecycle::orchestrator::DEFAULT_BACKUP_FILE)]
    backup_file: PathBuf,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("raidtier {} starting", raidtier::VERSION);
    services::preflight().await?;

    let wait = WaitPolicy {
        interval: Duration::from_secs(cli.wait_interval_secs),
        max_polls: match cli.wait_polls {
            0 => None,
            n => Some(n),
        },
    };
    let mut config = OrchestratorConfig {
        wait,
        interactive: cli.interactive,
        ..Default::default()
    };

    match cli.command {
        Command::Create { vg_name, drives } => {
            let mut orch = Orchestrator::new(Services::system(), config);
            let lv = orch.create(&drives, vg_name.as_deref()).await?;
            println!("{lv}");
        }
        Command::Add { join } => {
            config.backup_file = join.backup_file;
            let mut orch = Orchestrator::new(Services::system(), config);
            orch.add_or_replace(&join.lv, &join.drive, true).await?;
        }
        Command::Replace { join } => {
            config.backup_file = join.backup_file;
            let mut orch = Orchestrator::new(Services::system(), config);
            orch.add_or_replace(&join.lv, &join.drive, false).await?;
        }
        Command::Remove { lv, drive } => {
            let mut orch = Orchestrator::new(Services::system(), config);
            orch.remove(&lv, &drive).await?;
        }
        Command::Examine { lv, json } => {
            let mut orch = Orchestrator::new(Services::system(), config);
            let report = orch.examine(&lv).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
    }
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(cli: &Cli) {
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Shared writer, but the layer itself is built per branch: its
    // subscriber type parameter must match the stack it lands on.
    let file_writer = cli.log_file.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(std::sync::Arc::new(file)),
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {e}", path.display());
                None
            }
        }
    });

    if cli.log_json {
        let file_layer =
            file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_layer)
            .init();
    } else {
        let file_layer =
            file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(file_layer)
            .init();
    }
}
