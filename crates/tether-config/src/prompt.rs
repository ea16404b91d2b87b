use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

/// What `inject` did to the prompt file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// Fragment empty: file left absent or untouched.
    Skipped,
    Created,
    Appended,
    AlreadyPresent,
}

/// Idempotently add `fragment` to the prompt file at `path`.
///
/// Identity is exact substring containment: a file that already contains the
/// fragment is not written.
pub fn inject(path: &Path, fragment: &str) -> Result<InjectOutcome> {
    if fragment.trim().is_empty() {
        debug!(path = %path.display(), "no system prompt configured");
        return Ok(InjectOutcome::Skipped);
    }

    let existing = tether_store::read_optional(path)?;
    let (content, outcome) = match existing {
        None => (fragment.to_string(), InjectOutcome::Created),
        Some(current) if current.contains(fragment) => {
            debug!(path = %path.display(), "system prompt already present");
            return Ok(InjectOutcome::AlreadyPresent);
        }
        Some(mut current) => {
            if !current.is_empty() && !current.ends_with('\n') {
                current.push('\n');
            }
            current.push_str(fragment);
            (current, InjectOutcome::Appended)
        }
    };

    tether_store::write_atomic(path, content.as_bytes())
        .with_context(|| format!("writing prompt file: {}", path.display()))?;
    info!(path = %path.display(), ?outcome, "system prompt injected");
    Ok(outcome)
}

/// Read the prompt file. An absent file means no system prompt is configured.
pub fn read_prompt(path: &Path) -> Result<Option<String>> {
    tether_store::read_optional(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODEX: &str = "This is a system prompt for Codex.";
    const GOOSE: &str = "This is a system prompt for Goose.";

    #[test]
    fn creates_missing_file_with_exact_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".codex").join("AGENTS.md");
        assert_eq!(inject(&path, CODEX).unwrap(), InjectOutcome::Created);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), CODEX);
    }

    #[test]
    fn second_inject_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AGENTS.md");
        inject(&path, CODEX).unwrap();
        let once = std::fs::read_to_string(&path).unwrap();
        assert_eq!(inject(&path, CODEX).unwrap(), InjectOutcome::AlreadyPresent);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), once);
    }

    #[test]
    fn distinct_fragments_each_appear_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AGENTS.md");
        inject(&path, CODEX).unwrap();
        assert_eq!(inject(&path, GOOSE).unwrap(), InjectOutcome::Appended);
        inject(&path, GOOSE).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(CODEX).count(), 1);
        assert_eq!(content.matches(GOOSE).count(), 1);
        assert_eq!(content, format!("{CODEX}\n{GOOSE}"));
    }

    #[test]
    fn fragment_inside_existing_text_is_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AGENTS.md");
        let existing = format!("{CODEX}\nThis is a system prompt for Gemini.\n");
        std::fs::write(&path, &existing).unwrap();
        assert_eq!(inject(&path, CODEX).unwrap(), InjectOutcome::AlreadyPresent);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), existing);
    }

    #[test]
    fn append_keeps_existing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AGENTS.md");
        std::fs::write(&path, "user notes\n").unwrap();
        inject(&path, GOOSE).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("user notes\n{GOOSE}")
        );
    }

    #[test]
    fn empty_fragment_leaves_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AGENTS.md");
        assert_eq!(inject(&path, "").unwrap(), InjectOutcome::Skipped);
        assert_eq!(inject(&path, "  \n").unwrap(), InjectOutcome::Skipped);
        assert!(!path.exists());
        assert!(read_prompt(&path).unwrap().is_none());
    }
}
