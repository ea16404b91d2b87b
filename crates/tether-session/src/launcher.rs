use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tracing::debug;

/// How the agent is asked to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LaunchMode {
    Fresh,
    Resume { session_id: String },
}

/// Agent arguments: a model selector plus either a resume directive or the
/// task prompt. A resumed session never gets the prompt.
pub fn build_args(model: &str, mode: &LaunchMode, prompt: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if !model.trim().is_empty() {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    match mode {
        LaunchMode::Resume { session_id } => {
            args.push("resume".to_string());
            args.push(session_id.clone());
        }
        LaunchMode::Fresh => {
            if let Some(p) = prompt.filter(|p| !p.trim().is_empty()) {
                args.push(p.to_string());
            }
        }
    }
    args
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub mode: LaunchMode,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

/// A started agent process. The launcher does not wait for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchHandle {
    pub pid: Option<u32>,
}

/// One-shot start of the agent process. Implemented by `CodexLauncher`
/// and `MockLauncher` (tests).
#[async_trait::async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchHandle>;
}

/// Spawns the real Codex CLI, optionally behind a front program such as
/// `agentapi server --`.
pub struct CodexLauncher {
    pub codex_bin: PathBuf,
    pub wrapper: Vec<String>,
    /// If set, agent stdout/stderr are appended here.
    pub log_file: Option<PathBuf>,
}

impl Default for CodexLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl CodexLauncher {
    pub fn new() -> Self {
        Self::with_bin(PathBuf::from("codex"))
    }

    pub fn with_bin(codex_bin: PathBuf) -> Self {
        Self {
            codex_bin,
            wrapper: Vec::new(),
            log_file: None,
        }
    }

    pub fn with_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    /// Program and full argv for a request.
    pub fn command_line(&self, request: &LaunchRequest) -> (PathBuf, Vec<String>) {
        match self.wrapper.split_first() {
            None => (self.codex_bin.clone(), request.args.clone()),
            Some((program, rest)) => {
                let mut argv = rest.to_vec();
                argv.push(self.codex_bin.to_string_lossy().into_owned());
                argv.extend(request.args.iter().cloned());
                (PathBuf::from(program), argv)
            }
        }
    }

    /// Check that the Codex binary is reachable.
    pub fn verify_available(&self) -> Result<()> {
        let status = std::process::Command::new(&self.codex_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => anyhow::bail!(
                "Codex CLI not found (looked for {:?}).\n\
                 Install: npm install -g @openai/codex",
                self.codex_bin
            ),
        }
    }

    fn output(&self) -> Result<(Stdio, Stdio)> {
        let Some(path) = &self.log_file else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening agent log: {}", path.display()))?;
        let err = file.try_clone()?;
        Ok((Stdio::from(file), Stdio::from(err)))
    }
}

#[async_trait::async_trait]
impl AgentLauncher for CodexLauncher {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchHandle> {
        let (program, argv) = self.command_line(request);
        let (stdout, stderr) = self.output()?;
        let child = tokio::process::Command::new(&program)
            .args(&argv)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .with_context(|| format!("spawning {}", program.display()))?;
        let pid = child.id();
        debug!(?pid, program = %program.display(), "agent process spawned");
        // Not awaited: supervision belongs to whoever owns the workspace.
        drop(child);
        Ok(LaunchHandle { pid })
    }
}

type LaunchHook = Box<dyn Fn(&LaunchRequest) + Send + Sync>;

/// Mock launcher for testing. Records every request; an optional hook plays
/// the agent's part (e.g. writing a session record).
#[derive(Default)]
pub struct MockLauncher {
    requests: Mutex<Vec<LaunchRequest>>,
    hook: Option<LaunchHook>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: impl Fn(&LaunchRequest) + Send + Sync + 'static) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn requests(&self) -> Vec<LaunchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl AgentLauncher for MockLauncher {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchHandle> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        if let Some(hook) = &self.hook {
            hook(request);
        }
        Ok(LaunchHandle { pid: None })
    }
}

/// Render argv for logs, quoting arguments with spaces.
pub fn display_args(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.contains(char::is_whitespace) {
                format!("{a:?}")
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Workdir for the agent; relative paths are anchored at `base`.
pub fn resolve_workdir(workdir: &Path, base: &Path) -> PathBuf {
    if workdir.is_relative() {
        base.join(workdir)
    } else {
        workdir.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_args_carry_token_not_prompt() {
        let args = build_args(
            "gpt-4-turbo",
            &LaunchMode::Resume {
                session_id: "abc".into(),
            },
            Some("test prompt"),
        );
        assert_eq!(args, vec!["--model", "gpt-4-turbo", "resume", "abc"]);
    }

    #[test]
    fn fresh_args_carry_prompt() {
        let args = build_args("o3", &LaunchMode::Fresh, Some("fix the bug"));
        assert_eq!(args, vec!["--model", "o3", "fix the bug"]);
    }

    #[test]
    fn empty_model_and_prompt_are_omitted() {
        assert!(build_args("", &LaunchMode::Fresh, Some("  ")).is_empty());
        assert_eq!(build_args("", &LaunchMode::Fresh, None), Vec::<String>::new());
    }

    #[test]
    fn wrapper_prefixes_codex() {
        let launcher = CodexLauncher::new().with_wrapper(vec![
            "agentapi".into(),
            "server".into(),
            "--".into(),
        ]);
        let request = LaunchRequest {
            mode: LaunchMode::Fresh,
            args: vec!["--model".into(), "o3".into()],
            workdir: PathBuf::from("/w"),
        };
        let (program, argv) = launcher.command_line(&request);
        assert_eq!(program, PathBuf::from("agentapi"));
        assert_eq!(argv, vec!["server", "--", "codex", "--model", "o3"]);
    }

    #[test]
    fn no_wrapper_runs_codex_directly() {
        let launcher = CodexLauncher::with_bin(PathBuf::from("/usr/bin/codex"));
        let request = LaunchRequest {
            mode: LaunchMode::Fresh,
            args: vec!["hi".into()],
            workdir: PathBuf::from("/w"),
        };
        let (program, argv) = launcher.command_line(&request);
        assert_eq!(program, PathBuf::from("/usr/bin/codex"));
        assert_eq!(argv, vec!["hi"]);
    }

    #[test]
    fn missing_binary_is_reported() {
        let launcher = CodexLauncher::with_bin(PathBuf::from("/nonexistent/codex-bin"));
        let err = launcher.verify_available().unwrap_err();
        assert!(err.to_string().contains("Codex CLI not found"));
    }

    #[test]
    fn display_args_quotes_spaces() {
        let args = vec!["--model".to_string(), "o3".to_string(), "fix it".to_string()];
        assert_eq!(display_args(&args), r#"--model o3 "fix it""#);
    }

    #[test]
    fn relative_workdir_is_anchored() {
        assert_eq!(
            resolve_workdir(Path::new("proj"), Path::new("/home/coder")),
            PathBuf::from("/home/coder/proj")
        );
        assert_eq!(
            resolve_workdir(Path::new("/abs"), Path::new("/home/coder")),
            PathBuf::from("/abs")
        );
    }

    #[tokio::test]
    async fn mock_records_and_runs_hook() {
        let seen = std::sync::Arc::new(Mutex::new(0));
        let s = seen.clone();
        let launcher = MockLauncher::with_hook(move |_| *s.lock().unwrap() += 1);
        let request = LaunchRequest {
            mode: LaunchMode::Fresh,
            args: vec![],
            workdir: PathBuf::from("/w"),
        };
        launcher.launch(&request).await.unwrap();
        assert_eq!(launcher.requests(), vec![request]);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn codex_launcher_spawns_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("agent.log");
        let launcher = CodexLauncher::with_bin(PathBuf::from("echo"))
            .with_log_file(Some(log.clone()));
        let request = LaunchRequest {
            mode: LaunchMode::Fresh,
            args: vec!["hello-from-agent".into()],
            workdir: dir.path().to_path_buf(),
        };
        let handle = launcher.launch(&request).await.unwrap();
        assert!(handle.pid.is_some());
        let mut content = String::new();
        for _ in 0..100 {
            content = std::fs::read_to_string(&log).unwrap_or_default();
            if !content.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(content.contains("hello-from-agent"));
    }
}
