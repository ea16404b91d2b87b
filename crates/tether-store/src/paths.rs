use std::path::{Path, PathBuf};

/// Well-known file locations for one workspace user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TetherPaths {
    pub home: PathBuf,
    /// Codex home: `~/.codex` unless `CODEX_HOME` points elsewhere.
    pub codex_dir: PathBuf,
    pub config_toml: PathBuf,
    pub agents_md: PathBuf,
    pub sessions_dir: PathBuf,
    /// Private state of this tool: `~/.codex-module`.
    pub module_dir: PathBuf,
    pub tracking_file: PathBuf,
    pub start_log: PathBuf,
}

impl TetherPaths {
    /// Derive all paths from a home directory. Pure computation, no I/O.
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let codex_dir = home.join(".codex");
        Self::with_codex_dir(home, codex_dir)
    }

    /// Same as [`TetherPaths::from_home`] but with an explicit Codex home.
    pub fn with_codex_dir(home: impl Into<PathBuf>, codex_dir: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let codex_dir = codex_dir.into();
        let module_dir = home.join(".codex-module");
        Self {
            config_toml: codex_dir.join("config.toml"),
            agents_md: codex_dir.join("AGENTS.md"),
            sessions_dir: codex_dir.join("sessions"),
            tracking_file: module_dir.join(".codex-task-session"),
            start_log: module_dir.join("agentapi-start.log"),
            module_dir,
            codex_dir,
            home,
        }
    }

    /// Resolve from an optional home override and an optional `CODEX_HOME` value.
    pub fn resolve(home: Option<&Path>, codex_home: Option<&Path>) -> Self {
        let home = home
            .map(Path::to_path_buf)
            .unwrap_or_else(crate::home_root);
        match codex_home {
            Some(dir) if !dir.as_os_str().is_empty() => Self::with_codex_dir(home, dir),
            _ => Self::from_home(home),
        }
    }

    /// Create the directories this tool writes into. Idempotent.
    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        for dir in [&self.codex_dir, &self.module_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
