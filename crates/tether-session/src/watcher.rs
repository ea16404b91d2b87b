//! Snapshot/diff of the agent's session-record directory.
//!
//! Codex writes one `*.jsonl` record per conversation, usually nested by date
//! (`sessions/2025/10/24/rollout-…-<uuid>.jsonl`). The only signal that a
//! freshly launched agent opened a session is a new file showing up here.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const RECORD_EXT: &str = "jsonl";

/// Bounds of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 60,
        }
    }
}

impl PollSettings {
    pub fn timeout(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Found(BTreeSet<String>),
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Relative paths (forward slashes) of every session record under `dir`.
/// A missing directory is an empty snapshot.
pub fn snapshot(dir: &Path) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    walk(dir, dir, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<String>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        // Directory vanished between listing and descending.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, out)?;
        } else if path.extension().is_some_and(|ext| ext == RECORD_EXT) {
            if let Ok(rel) = path.strip_prefix(root) {
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.insert(name);
            }
        }
    }
    Ok(())
}

/// Entries present in `after` but not in `before`.
pub fn diff(before: &BTreeSet<String>, after: &BTreeSet<String>) -> BTreeSet<String> {
    after.difference(before).cloned().collect()
}

/// Re-snapshot `dir` every `settings.interval` until something new appears,
/// the attempts run out, or `cancel` fires. Cancellation only stops watching.
pub async fn poll_for_new(
    dir: &Path,
    before: &BTreeSet<String>,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> Result<PollOutcome> {
    for attempt in 1..=settings.max_attempts {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
        let new = diff(before, &snapshot(dir)?);
        if !new.is_empty() {
            debug!(attempt, count = new.len(), "new session records");
            return Ok(PollOutcome::Found(new));
        }
        if attempt == settings.max_attempts {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {}
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
        }
    }
    Ok(PollOutcome::TimedOut {
        attempts: settings.max_attempts,
    })
}

/// What we can learn about one session record without owning its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub path: PathBuf,
    pub cwd: Option<String>,
    pub created_at: Option<OffsetDateTime>,
}

/// Read the record at `dir/name`. The id comes from the first JSON line
/// (`id` or `payload.id`), falling back to the file name.
pub fn read_record(dir: &Path, name: &str) -> Result<SessionRecord> {
    let path = dir.join(name);
    let modified = fs::metadata(&path)
        .and_then(|m| m.modified())
        .ok()
        .map(OffsetDateTime::from);

    let meta = first_line_json(&path).unwrap_or(serde_json::Value::Null);
    let field = |key: &str| {
        meta.get(key)
            .or_else(|| meta.get("payload").and_then(|p| p.get(key)))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let id = field("id").unwrap_or_else(|| token_from_file_name(&path));
    Ok(SessionRecord {
        id,
        cwd: field("cwd"),
        created_at: modified,
        path,
    })
}

fn first_line_json(path: &Path) -> Option<serde_json::Value> {
    let file = fs::File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    serde_json::from_str(line.trim()).ok()
}

fn uuid_suffix() -> Option<&'static regex::Regex> {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .ok()
    })
    .as_ref()
}

/// Trailing UUID of the file stem, or the whole stem.
pub fn token_from_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match uuid_suffix().and_then(|re| re.find(&stem)) {
        Some(m) => m.as_str().to_string(),
        None => stem,
    }
}

/// Best-effort tie-break among several new records: prefer one whose `cwd`
/// is `workdir`, then the newest, then the greatest path.
/// Returns the winner and the ids of the ones passed over.
pub fn pick_latest(
    mut records: Vec<SessionRecord>,
    workdir: &Path,
) -> Option<(SessionRecord, Vec<String>)> {
    records.sort_by(|a, b| {
        let rank = |r: &SessionRecord| r.cwd.as_deref().map(Path::new) == Some(workdir);
        rank(a)
            .cmp(&rank(b))
            .then(a.created_at.cmp(&b.created_at))
            .then(a.path.cmp(&b.path))
    });
    let winner = records.pop()?;
    let others = records.into_iter().map(|r| r.id).collect();
    Some((winner, others))
}
