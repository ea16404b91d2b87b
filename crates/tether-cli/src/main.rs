mod cmd_assemble;
mod cmd_paths;
mod cmd_session;
mod cmd_start;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tether_store::TetherPaths;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tether",
    version,
    about = "Provision a Codex agent and keep its session across restarts"
)]
struct Cli {
    /// Home directory the agent files live under
    #[arg(long, env = "TETHER_HOME", global = true)]
    home: Option<PathBuf>,
    /// Append logs to this file instead of stderr
    #[arg(long, env = "TETHER_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write ~/.codex/config.toml and inject the system prompt
    Assemble(cmd_assemble::AssembleArgs),
    /// Start the agent, resuming the tracked session when continuity is on
    Start(cmd_start::StartArgs),
    /// Assemble the configuration, then start the agent
    Up {
        #[command(flatten)]
        assemble: cmd_assemble::AssembleArgs,
        #[command(flatten)]
        start: cmd_start::StartArgs,
    },
    /// Inspect or clear the tracked session
    Session {
        #[command(subcommand)]
        cmd: SessionCmd,
    },
    /// Print the well-known file locations
    Paths {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SessionCmd {
    /// Show the tracked workdir and session id
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop the tracked session so the next start is fresh
    Forget,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let codex_home = std::env::var_os("CODEX_HOME").map(PathBuf::from);
    let paths = TetherPaths::resolve(cli.home.as_deref(), codex_home.as_deref());

    match cli.cmd {
        Command::Assemble(args) => cmd_assemble::execute(&paths, &args),
        Command::Start(args) => cmd_start::execute(&paths, &args),
        Command::Up { assemble, start } => {
            let report = cmd_assemble::run(&paths, &assemble)?;
            // Keep stdout a single JSON document.
            if !start.json {
                cmd_assemble::print_report(&report);
            }
            cmd_start::execute(&paths, &start)
        }
        Command::Session { cmd } => match cmd {
            SessionCmd::Show { json } => cmd_session::show(&paths, json),
            SessionCmd::Forget => cmd_session::forget(&paths),
        },
        Command::Paths { json } => cmd_paths::execute(&paths, json),
    }
}

/// `RUST_LOG` filters, default `info`. Logs go to stderr unless a log file is set.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        let ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(ansi)
            .with_writer(std::io::stderr)
            .try_init();
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file: {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}
