use anyhow::{bail, Result};
use serde::Serialize;

// ── States ──

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityState {
    Init,
    Resuming,
    Starting,
    Running,
    /// The running agent's session is recorded for the next launch.
    Tracking,
    /// The agent runs, but the next launch will start fresh.
    Untracked,
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(ContinuityState, &[ContinuityState])] = &[
    (
        ContinuityState::Init,
        &[ContinuityState::Resuming, ContinuityState::Starting],
    ),
    (ContinuityState::Resuming, &[ContinuityState::Running]),
    (ContinuityState::Starting, &[ContinuityState::Running]),
    (
        ContinuityState::Running,
        &[ContinuityState::Tracking, ContinuityState::Untracked],
    ),
    // Tracking and Untracked are terminal
];

fn is_valid_transition(from: ContinuityState, to: ContinuityState) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

/// One launch's walk through the continuity states.
#[derive(Debug, Clone)]
pub struct ContinuityMachine {
    history: Vec<ContinuityState>,
}

impl Default for ContinuityMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuityMachine {
    pub fn new() -> Self {
        Self {
            history: vec![ContinuityState::Init],
        }
    }

    pub fn state(&self) -> ContinuityState {
        self.history
            .last()
            .copied()
            .unwrap_or(ContinuityState::Init)
    }

    pub fn history(&self) -> &[ContinuityState] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state(),
            ContinuityState::Tracking | ContinuityState::Untracked
        )
    }

    pub fn advance(&mut self, to: ContinuityState) -> Result<()> {
        let from = self.state();
        if !is_valid_transition(from, to) {
            bail!("invalid continuity transition: {from:?} → {to:?}");
        }
        self.history.push(to);
        Ok(())
    }
}
