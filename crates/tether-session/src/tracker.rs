use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{field} must not be empty or contain '|' or line breaks: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// The single workdir → session mapping kept between launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingEntry {
    pub workdir: PathBuf,
    pub session_id: String,
}

impl TrackingEntry {
    pub fn new(workdir: &Path, session_id: &str) -> Result<Self, TrackerError> {
        let workdir_str = workdir.to_string_lossy();
        if !valid_field(&workdir_str) {
            return Err(TrackerError::InvalidField {
                field: "workdir",
                value: workdir_str.into_owned(),
            });
        }
        if !valid_field(session_id) {
            return Err(TrackerError::InvalidField {
                field: "session id",
                value: session_id.to_string(),
            });
        }
        Ok(Self {
            workdir: workdir.to_path_buf(),
            session_id: session_id.to_string(),
        })
    }

    /// Parse `<workdir>|<token>`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (workdir, token) = line.trim().split_once('|')?;
        let (workdir, token) = (workdir.trim(), token.trim());
        if workdir.is_empty() || token.is_empty() || token.contains('|') {
            return None;
        }
        Some(Self {
            workdir: PathBuf::from(workdir),
            session_id: token.to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        format!("{}|{}", self.workdir.display(), self.session_id)
    }

    pub fn matches(&self, workdir: &Path) -> bool {
        self.workdir == workdir
    }
}

fn valid_field(s: &str) -> bool {
    !s.trim().is_empty() && !s.contains(['|', '\n', '\r'])
}

/// Where the tracked session lives between launches.
pub trait SessionStore: Send + Sync {
    /// The stored entry, whatever workdir it belongs to.
    fn entry(&self) -> Result<Option<TrackingEntry>>;

    /// Overwrite the stored entry.
    fn record(&self, workdir: &Path, session_id: &str) -> Result<()>;

    /// Drop the stored entry. Returns whether there was one.
    fn clear(&self) -> Result<bool>;

    /// Session tracked for `workdir`. An entry for another workdir is a miss.
    fn lookup(&self, workdir: &Path) -> Result<Option<String>> {
        match self.entry()? {
            Some(entry) if entry.matches(workdir) => Ok(Some(entry.session_id)),
            Some(entry) => {
                debug!(
                    tracked = %entry.workdir.display(),
                    requested = %workdir.display(),
                    "tracked session belongs to another workdir"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// One-line state file, replaced atomically on every `record`.
#[derive(Debug, Clone)]
pub struct FileSessionTracker {
    path: PathBuf,
}

impl FileSessionTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionTracker {
    fn entry(&self) -> Result<Option<TrackingEntry>> {
        let Some(content) = tether_store::read_optional(&self.path)? else {
            return Ok(None);
        };
        let Some(line) = content.lines().find(|l| !l.trim().is_empty()) else {
            return Ok(None);
        };
        let entry = TrackingEntry::parse_line(line);
        if entry.is_none() {
            warn!(path = %self.path.display(), "ignoring malformed tracking file");
        }
        Ok(entry)
    }

    fn record(&self, workdir: &Path, session_id: &str) -> Result<()> {
        let entry = TrackingEntry::new(workdir, session_id)?;
        let line = format!("{}\n", entry.to_line());
        tether_store::write_atomic(&self.path, line.as_bytes())
            .with_context(|| format!("writing tracking file: {}", self.path.display()))
    }

    fn clear(&self) -> Result<bool> {
        tether_store::remove_if_exists(&self.path)
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entry: Mutex<Option<TrackingEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(workdir: &Path, session_id: &str) -> Result<Self> {
        let store = Self::new();
        store.record(workdir, session_id)?;
        Ok(store)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<TrackingEntry>> {
        self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn entry(&self) -> Result<Option<TrackingEntry>> {
        Ok(self.slot().clone())
    }

    fn record(&self, workdir: &Path, session_id: &str) -> Result<()> {
        *self.slot() = Some(TrackingEntry::new(workdir, session_id)?);
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        Ok(self.slot().take().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SID: &str = "019a1234-5678-9abc-def0-123456789012";

    fn tracker() -> (tempfile::TempDir, FileSessionTracker) {
        let dir = tempfile::tempdir().unwrap();
        let t = FileSessionTracker::new(dir.path().join(".codex-module").join(".codex-task-session"));
        (dir, t)
    }

    #[test]
    fn missing_file_is_no_entry() {
        let (_dir, t) = tracker();
        assert!(t.lookup(Path::new("/home/coder")).unwrap().is_none());
        assert!(!t.clear().unwrap());
    }

    #[test]
    fn record_then_lookup() {
        let (_dir, t) = tracker();
        t.record(Path::new("/home/coder"), SID).unwrap();
        assert_eq!(t.lookup(Path::new("/home/coder")).unwrap().as_deref(), Some(SID));
        let raw = std::fs::read_to_string(t.path()).unwrap();
        assert_eq!(raw, format!("/home/coder|{SID}\n"));
    }

    #[test]
    fn record_overwrites_single_entry() {
        let (_dir, t) = tracker();
        t.record(Path::new("/a"), "one").unwrap();
        t.record(Path::new("/b"), "two").unwrap();
        assert!(t.lookup(Path::new("/a")).unwrap().is_none());
        assert_eq!(t.lookup(Path::new("/b")).unwrap().as_deref(), Some("two"));
        assert_eq!(std::fs::read_to_string(t.path()).unwrap().lines().count(), 1);
    }

    #[test]
    fn reads_shell_written_line() {
        let (_dir, t) = tracker();
        std::fs::create_dir_all(t.path().parent().unwrap()).unwrap();
        std::fs::write(t.path(), format!("/home/coder|{SID}\n")).unwrap();
        assert_eq!(t.lookup(Path::new("/home/coder/")).unwrap().as_deref(), Some(SID));
    }

    #[test]
    fn empty_or_malformed_file_is_no_entry() {
        let (_dir, t) = tracker();
        std::fs::create_dir_all(t.path().parent().unwrap()).unwrap();
        std::fs::write(t.path(), "\n\n").unwrap();
        assert!(t.entry().unwrap().is_none());
        std::fs::write(t.path(), "no separator here").unwrap();
        assert!(t.entry().unwrap().is_none());
        std::fs::write(t.path(), "/w|").unwrap();
        assert!(t.entry().unwrap().is_none());
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let (_dir, t) = tracker();
        let err = t.record(Path::new("/w"), "a|b").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::InvalidField { field: "session id", .. })
        ));
        assert!(t.record(Path::new("/w"), "").is_err());
        assert!(t.record(Path::new("/w|x"), "ok").is_err());
        assert!(!t.path().exists());
    }

    #[test]
    fn clear_removes_entry() {
        let (_dir, t) = tracker();
        t.record(Path::new("/w"), SID).unwrap();
        assert!(t.clear().unwrap());
        assert!(t.entry().unwrap().is_none());
    }

    #[test]
    fn memory_store_behaves_like_file() {
        let store = MemorySessionStore::new();
        assert!(store.lookup(Path::new("/w")).unwrap().is_none());
        store.record(Path::new("/w"), SID).unwrap();
        assert_eq!(store.lookup(Path::new("/w")).unwrap().as_deref(), Some(SID));
        assert!(store.lookup(Path::new("/other")).unwrap().is_none());
        assert!(store.clear().unwrap());
        assert!(store.entry().unwrap().is_none());
    }
}
