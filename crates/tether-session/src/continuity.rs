use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::launcher::{build_args, display_args, AgentLauncher, LaunchMode, LaunchRequest};
use crate::machine::{ContinuityMachine, ContinuityState};
use crate::observer::{Observation, SessionObserver};
use crate::tracker::SessionStore;

/// Everything about the current workspace a launch depends on.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceContext {
    pub workdir: PathBuf,
    pub model: String,
    /// Resume the tracked session instead of starting fresh.
    pub continuity: bool,
    /// Task prompt for a fresh start. Never passed on resume.
    pub task_prompt: Option<String>,
}

/// What a launch will do, decided before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchDecision {
    pub mode: LaunchMode,
    pub args: Vec<String>,
    /// Whether the new session id should be captured after launch.
    pub capture: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    #[serde(flatten)]
    pub mode: LaunchMode,
    pub terminal: ContinuityState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub args: Vec<String>,
    pub history: Vec<ContinuityState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
}

/// Decides new-vs-resume, launches the agent, and on a fresh start captures
/// the session id the agent picks.
pub struct ContinuityManager<'a> {
    launcher: &'a dyn AgentLauncher,
    store: &'a dyn SessionStore,
    observer: &'a mut dyn SessionObserver,
}

impl<'a> ContinuityManager<'a> {
    pub fn new(
        launcher: &'a dyn AgentLauncher,
        store: &'a dyn SessionStore,
        observer: &'a mut dyn SessionObserver,
    ) -> Self {
        Self {
            launcher,
            store,
            observer,
        }
    }

    /// Pick the launch mode from the continuity flag and the tracked session.
    pub fn decide(&self, ctx: &WorkspaceContext) -> Result<LaunchDecision> {
        decide(self.store, ctx)
    }

    /// Launch the agent once and settle in `Tracking` or `Untracked`.
    ///
    /// Failing to observe or record the new session is not an error: the
    /// agent keeps running, the next launch just starts fresh.
    pub async fn start(
        &mut self,
        ctx: &WorkspaceContext,
        cancel: CancellationToken,
    ) -> Result<StartReport> {
        let mut machine = ContinuityMachine::new();
        let decision = self.decide(ctx)?;

        machine.advance(match decision.mode {
            LaunchMode::Resume { .. } => ContinuityState::Resuming,
            LaunchMode::Fresh => ContinuityState::Starting,
        })?;

        let mut capture = decision.capture;
        if capture {
            if let Err(e) = self.observer.arm().await {
                warn!(error = %e, "cannot snapshot session records; starting untracked");
                capture = false;
            }
        }

        info!("Starting Codex with arguments: {}", display_args(&decision.args));
        let request = LaunchRequest {
            mode: decision.mode.clone(),
            args: decision.args.clone(),
            workdir: ctx.workdir.clone(),
        };
        let handle = self.launcher.launch(&request).await?;
        machine.advance(ContinuityState::Running)?;

        let (terminal, session_id, observation) = match &decision.mode {
            LaunchMode::Resume { session_id } => {
                (ContinuityState::Tracking, Some(session_id.clone()), None)
            }
            LaunchMode::Fresh if !capture => (ContinuityState::Untracked, None, None),
            LaunchMode::Fresh => self.capture(ctx, cancel).await,
        };
        machine.advance(terminal)?;

        Ok(StartReport {
            mode: decision.mode,
            terminal,
            session_id,
            args: decision.args,
            history: machine.history().to_vec(),
            pid: handle.pid,
            observation,
        })
    }

    async fn capture(
        &mut self,
        ctx: &WorkspaceContext,
        cancel: CancellationToken,
    ) -> (ContinuityState, Option<String>, Option<Observation>) {
        info!("Capturing new session ID");
        let observation = match self.observer.observe(&ctx.workdir, cancel).await {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "session observation failed; continuing untracked");
                return (ContinuityState::Untracked, None, None);
            }
        };

        match &observation {
            Observation::Observed { session_id, .. } => {
                if let Err(e) = self.store.record(&ctx.workdir, session_id) {
                    warn!(error = %e, %session_id, "could not record session; continuing untracked");
                    return (ContinuityState::Untracked, None, Some(observation));
                }
                info!(
                    %session_id,
                    workdir = %ctx.workdir.display(),
                    "Session tracked: {session_id}"
                );
                let id = session_id.clone();
                (ContinuityState::Tracking, Some(id), Some(observation))
            }
            Observation::NotObserved { attempts } => {
                warn!(attempts, "no new session record appeared; continuing untracked");
                (ContinuityState::Untracked, None, Some(observation))
            }
            Observation::Cancelled => {
                warn!("session observation cancelled; agent left running untracked");
                (ContinuityState::Untracked, None, Some(observation))
            }
        }
    }
}

/// Shared by `ContinuityManager::decide` and dry runs.
pub fn decide(store: &dyn SessionStore, ctx: &WorkspaceContext) -> Result<LaunchDecision> {
    let prompt = ctx.task_prompt.as_deref();

    if !ctx.continuity {
        info!("Session continuity disabled; starting fresh");
        return Ok(LaunchDecision {
            args: build_args(&ctx.model, &LaunchMode::Fresh, prompt),
            mode: LaunchMode::Fresh,
            capture: false,
        });
    }

    match store.lookup(&ctx.workdir)? {
        Some(session_id) => {
            info!(%session_id, "Found existing task session: {session_id}");
            info!("Resuming existing session");
            let mode = LaunchMode::Resume { session_id };
            Ok(LaunchDecision {
                args: build_args(&ctx.model, &mode, None),
                mode,
                capture: false,
            })
        }
        None => {
            info!(
                workdir = %ctx.workdir.display(),
                "No existing task session; starting new session"
            );
            Ok(LaunchDecision {
                args: build_args(&ctx.model, &LaunchMode::Fresh, prompt),
                mode: LaunchMode::Fresh,
                capture: true,
            })
        }
    }
}
