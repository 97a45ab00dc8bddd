//! CLI entrypoint wiring shared by the gradebox binary.

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::check::suite;
use crate::config::HarnessConfig;
use crate::core::monitor::run_supervised;
use crate::core::types::WorkerSpec;
use crate::core::worker;
use crate::sandbox::dir::SandboxDir;
use crate::testing::suites::register_builtin;

#[derive(Parser)]
#[command(author, version, about = "Check-execution harness for grading small programs", long_about = None)]
struct Cli {
    /// Internal role selector (hidden; used by the worker re-exec path)
    #[arg(long, hide = true)]
    internal_role: Option<String>,
    /// Message channel fd for the internal worker role
    #[arg(long, hide = true)]
    channel_fd: Option<i32>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a registered check suite against an artifact
    Run {
        /// Artifact (file) to check
        artifact: PathBuf,
        /// Name of the check suite
        #[arg(long)]
        suite: String,
        /// Emit the report as JSON instead of plain text
        #[arg(long)]
        json: bool,
        /// Default per-check budget in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List the registered check suites
    Suites,
    /// Remove orphaned run directories left behind by killed workers
    Sweep {
        /// Age in hours past which a run directory is removed
        #[arg(long, default_value_t = 24)]
        max_age_hours: u64,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();
    register_builtin();

    let cli = Cli::parse();

    if let Some(role) = cli.internal_role.as_deref() {
        if role != "worker" {
            bail!("unsupported internal role: {role}");
        }
        let fd = cli
            .channel_fd
            .ok_or_else(|| anyhow!("--channel-fd is required for --internal-role=worker"))?;
        std::process::exit(worker::run_worker(fd));
    }

    match cli.command {
        Some(Commands::Run {
            artifact,
            suite,
            json,
            timeout,
        }) => {
            if suite::resolve(&suite).is_none() {
                bail!("unknown suite '{suite}'");
            }
            let mut config = HarnessConfig::default();
            if let Some(secs) = timeout {
                config.default_timeout = Duration::from_secs(secs);
            }
            let spec = WorkerSpec::from_config(&suite, &artifact, &config);
            let report = run_supervised(spec, &config)?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.render_plain());
            }
            if !report.succeeded() {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Suites) => {
            for name in suite::registered_names() {
                println!("{name}");
            }
            Ok(())
        }
        Some(Commands::Sweep { max_age_hours }) => {
            let config = HarnessConfig::default();
            let removed = SandboxDir::sweep(
                &config.workspace_root,
                Duration::from_secs(max_age_hours * 3600),
            )?;
            println!("removed {removed} run directories");
            Ok(())
        }
        None => bail!("no command given (see --help)"),
    }
}
