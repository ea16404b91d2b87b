use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tether_session::{
    decide, display_args, resolve_workdir, CodexLauncher, ContinuityManager, ContinuityState,
    DirectoryObserver, FileSessionTracker, LaunchDecision, LaunchMode, PollSettings, StartReport,
    WorkspaceContext,
};
use tether_store::TetherPaths;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Directory the agent runs in (defaults to the current directory)
    #[arg(long, env = "TETHER_WORKDIR")]
    pub workdir: Option<PathBuf>,
    /// Model passed to the agent as `--model`
    #[arg(long, env = "TETHER_MODEL", default_value = "")]
    pub model: String,
    /// Task prompt for a fresh session (never sent on resume)
    #[arg(long, env = "TETHER_TASK_PROMPT")]
    pub prompt: Option<String>,
    /// Resume the session tracked for this workdir, and track new ones
    #[arg(long = "continue", env = "TETHER_CONTINUE", value_parser = FalseyValueParser::new())]
    pub continue_session: bool,
    /// Codex CLI binary
    #[arg(long, env = "TETHER_CODEX_BIN", default_value = "codex")]
    pub codex_bin: PathBuf,
    /// Front program the agent runs behind, e.g. "agentapi server --"
    #[arg(long, env = "TETHER_AGENT_WRAPPER")]
    pub wrapper: Option<String>,
    /// Session directory poll interval
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,
    /// Maximum session directory polls after launch
    #[arg(long, default_value_t = 60)]
    pub poll_attempts: u32,
    /// Print the launch decision without starting the agent
    #[arg(long)]
    pub dry_run: bool,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StartArgs {
    fn context(&self) -> Result<WorkspaceContext> {
        let cwd = std::env::current_dir()?;
        let workdir = match &self.workdir {
            Some(dir) => resolve_workdir(dir, &cwd),
            None => cwd,
        };
        Ok(WorkspaceContext {
            workdir,
            model: self.model.clone(),
            continuity: self.continue_session,
            task_prompt: self.prompt.clone(),
        })
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.poll_attempts.max(1),
        }
    }

    fn wrapper(&self) -> Vec<String> {
        self.wrapper
            .as_deref()
            .map(|w| w.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Execute `tether start`
pub fn execute(paths: &TetherPaths, args: &StartArgs) -> Result<()> {
    let ctx = args.context()?;
    let store = FileSessionTracker::new(&paths.tracking_file);

    if std::env::var_os("OPENAI_API_KEY").is_some_and(|v| !v.is_empty()) {
        info!("OpenAI API Key: Provided");
    } else {
        warn!("OpenAI API Key: Not provided");
    }

    if args.dry_run {
        let decision = decide(&store, &ctx)?;
        return print_decision(&args.codex_bin, &decision, args.json);
    }

    paths.ensure_layout()?;
    std::fs::create_dir_all(&ctx.workdir)
        .with_context(|| format!("creating workdir: {}", ctx.workdir.display()))?;

    let launcher = CodexLauncher::with_bin(args.codex_bin.clone())
        .with_wrapper(args.wrapper())
        .with_log_file(Some(paths.start_log.clone()));
    launcher.verify_available()?;

    let settings = args.poll_settings();
    let mut observer = DirectoryObserver::new(&paths.sessions_dir).with_settings(settings);
    debug!(
        dir = %observer.dir().display(),
        timeout = ?settings.timeout(),
        "watching for new session records"
    );
    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        ContinuityManager::new(&launcher, &store, &mut observer)
            .start(&ctx, cancel)
            .await
    })?;

    print_report(&report, args.json)
}

fn print_decision(codex_bin: &std::path::Path, decision: &LaunchDecision, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(decision)?);
        return Ok(());
    }
    println!("[dry-run] {}", describe_mode(&decision.mode));
    println!(
        "  Command: {} {}",
        codex_bin.display(),
        display_args(&decision.args)
    );
    println!(
        "  Capture new session: {}",
        if decision.capture { "yes" } else { "no" }
    );
    Ok(())
}

fn print_report(report: &StartReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}", describe_mode(&report.mode));
    println!("  Args: {}", display_args(&report.args));
    if let Some(pid) = report.pid {
        println!("  PID: {pid}");
    }
    match (report.terminal, &report.session_id) {
        (ContinuityState::Tracking, Some(id)) => println!("  Session: {id} (tracked)"),
        _ => println!("  Session: untracked (next start will be fresh)"),
    }
    Ok(())
}

fn describe_mode(mode: &LaunchMode) -> String {
    match mode {
        LaunchMode::Fresh => "Starting new session".to_string(),
        LaunchMode::Resume { session_id } => format!("Resuming session {session_id}"),
    }
}

/// Cancel session observation on Ctrl+C. The agent itself keeps running.
fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
