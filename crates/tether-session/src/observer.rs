use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::watcher::{self, PollOutcome, PollSettings, SessionRecord};

/// Result of waiting for the agent to report a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Observation {
    Observed {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        record: Option<PathBuf>,
        /// Ids of other new sessions passed over by the tie-break.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        ambiguous: Vec<String>,
    },
    /// Nothing appeared within the bounded wait.
    NotObserved { attempts: u32 },
    Cancelled,
}

/// Learns the id of a session the agent opens after launch.
///
/// `arm` runs right before the launch, `observe` right after. The directory
/// diff below is one implementation; an agent-side hook that reports its own
/// id would be another.
#[async_trait::async_trait]
pub trait SessionObserver: Send + Sync {
    async fn arm(&mut self) -> Result<()>;

    async fn observe(&mut self, workdir: &Path, cancel: CancellationToken) -> Result<Observation>;
}

/// Watches the session-record directory for files that were not there at `arm`.
pub struct DirectoryObserver {
    dir: PathBuf,
    settings: PollSettings,
    baseline: Option<BTreeSet<String>>,
}

impl DirectoryObserver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            settings: PollSettings::default(),
            baseline: None,
        }
    }

    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl SessionObserver for DirectoryObserver {
    async fn arm(&mut self) -> Result<()> {
        self.baseline = Some(watcher::snapshot(&self.dir)?);
        Ok(())
    }

    async fn observe(&mut self, workdir: &Path, cancel: CancellationToken) -> Result<Observation> {
        let Some(before) = self.baseline.take() else {
            bail!("session observer used before arm()");
        };

        let new = match watcher::poll_for_new(&self.dir, &before, self.settings, &cancel).await? {
            PollOutcome::Found(new) => new,
            PollOutcome::TimedOut { attempts } => return Ok(Observation::NotObserved { attempts }),
            PollOutcome::Cancelled => return Ok(Observation::Cancelled),
        };

        let records: Vec<SessionRecord> = new
            .iter()
            .filter_map(|name| match watcher::read_record(&self.dir, name) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(record = %name, error = %e, "unreadable session record");
                    None
                }
            })
            .collect();

        let Some((winner, others)) = watcher::pick_latest(records, workdir) else {
            return Ok(Observation::NotObserved {
                attempts: self.settings.max_attempts,
            });
        };
        if !others.is_empty() {
            warn!(
                chosen = %winner.id,
                passed_over = ?others,
                "ambiguous session observation: several new session records"
            );
        }
        Ok(Observation::Observed {
            session_id: winner.id,
            record: Some(winner.path),
            ambiguous: others,
        })
    }
}
