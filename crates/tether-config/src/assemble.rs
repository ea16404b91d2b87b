use anyhow::{Context, Result};
use std::path::PathBuf;
use tether_store::TetherPaths;
use toml_edit::{value, Array, InlineTable};
use tracing::info;

use crate::document::{ConfigDocument, Section};
use crate::error::ConfigError;
use crate::merge::{overlay, MergeInput};
use crate::prompt::{inject, InjectOutcome};

/// Baseline written when the operator supplies nothing.
pub const DEFAULT_CONFIG_TOML: &str = r#"sandbox_mode = "workspace-write"
approval_policy = "never"
preferred_auth_method = "apikey"

[sandbox_workspace_write]
network_access = true
"#;

/// MCP server id reserved for the platform integration.
pub const RESERVED_SERVER_ID: &str = "Coder";

/// The platform MCP server that reports task status back to the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIntegration {
    pub server_id: String,
    pub command: String,
    pub args: Vec<String>,
    pub app_status_slug: String,
    pub agentapi_url: String,
    pub description: String,
}

impl Default for PlatformIntegration {
    fn default() -> Self {
        Self {
            server_id: RESERVED_SERVER_ID.to_string(),
            command: "coder".to_string(),
            args: vec!["exp".into(), "mcp".into(), "server".into()],
            app_status_slug: "codex".to_string(),
            agentapi_url: "http://localhost:3284".to_string(),
            description: "Report ALL tasks and statuses (in progress, done, failed) you are working on."
                .to_string(),
        }
    }
}

impl PlatformIntegration {
    pub fn section(&self) -> Section {
        let mut env = InlineTable::new();
        env.insert("CODER_MCP_APP_STATUS_SLUG", self.app_status_slug.as_str().into());
        env.insert("CODER_MCP_AI_AGENTAPI_URL", self.agentapi_url.as_str().into());

        Section::named(["mcp_servers", self.server_id.as_str()])
            .with_entry("command", value(self.command.as_str()))
            .with_entry("args", value(Array::from_iter(self.args.iter().map(String::as_str))))
            .with_entry("env", value(env))
            .with_entry("description", value(self.description.as_str()))
            .with_entry("type", value("stdio"))
    }

    pub fn fragment(&self) -> ConfigDocument {
        ConfigDocument::from_sections([self.section()])
    }
}

/// Operator inputs for one provisioning run.
#[derive(Debug, Clone, Default)]
pub struct AssembleInput {
    pub base_config: Option<String>,
    pub additional_mcp_servers: Option<String>,
    pub system_prompt: Option<String>,
    pub platform: PlatformIntegration,
}

#[derive(Debug, Clone)]
pub struct AssembleReport {
    pub config_path: PathBuf,
    /// False when the file already had exactly this content.
    pub config_changed: bool,
    pub prompt_path: PathBuf,
    pub prompt: InjectOutcome,
    pub sections: Vec<String>,
}

/// Build the merged document without touching the file system.
pub fn build_document(input: &AssembleInput) -> Result<ConfigDocument> {
    let default = ConfigDocument::parse("default config", DEFAULT_CONFIG_TOML)?;
    let base = parse_optional("base config", input.base_config.as_deref())?;
    let additional = parse_optional(
        ADDITIONAL_SOURCE,
        input.additional_mcp_servers.as_deref(),
    )?;
    // Only tables here: a root section would replace the base tier's root.
    if let Some(root) = additional.root() {
        let keys = root.keys().collect::<Vec<_>>().join(", ");
        return Err(ConfigError::malformed(
            ADDITIONAL_SOURCE,
            format!("top-level keys are not allowed here ({keys}); put them in the base config"),
        )
        .into());
    }
    let user = overlay(&base, &additional);
    let platform = input.platform.fragment();
    Ok(MergeInput {
        default: &default,
        user: &user,
        fixed_append: &platform,
    }
    .merge())
}

const ADDITIONAL_SOURCE: &str = "additional MCP servers";

/// Write `config.toml` and inject the system prompt.
///
/// Every input is parsed before anything is written, so a malformed input
/// leaves the previous files in place.
pub fn assemble(paths: &TetherPaths, input: &AssembleInput) -> Result<AssembleReport> {
    let merged = build_document(input)?;
    let rendered = merged.render()?;

    let current = tether_store::read_optional(&paths.config_toml)?;
    let config_changed = current.as_deref() != Some(rendered.as_str());
    if config_changed {
        tether_store::write_atomic(&paths.config_toml, rendered.as_bytes())
            .with_context(|| format!("writing config: {}", paths.config_toml.display()))?;
    }

    let prompt = match input.system_prompt.as_deref() {
        Some(fragment) => inject(&paths.agents_md, fragment)?,
        None => InjectOutcome::Skipped,
    };

    let sections = merged.section_names();
    info!(
        path = %paths.config_toml.display(),
        changed = config_changed,
        sections = sections.len(),
        "config assembled"
    );

    Ok(AssembleReport {
        config_path: paths.config_toml.clone(),
        config_changed,
        prompt_path: paths.agents_md.clone(),
        prompt,
        sections,
    })
}

fn parse_optional(source_name: &str, text: Option<&str>) -> Result<ConfigDocument> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(ConfigDocument::parse(source_name, t)?),
        _ => Ok(ConfigDocument::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> (tempfile::TempDir, TetherPaths) {
        let dir = tempfile::tempdir().unwrap();
        let p = TetherPaths::from_home(dir.path());
        (dir, p)
    }

    fn read(path: &std::path::Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn minimal_default_config() {
        let (_dir, p) = paths();
        let report = assemble(&p, &AssembleInput::default()).unwrap();
        assert!(report.config_changed);
        assert_eq!(report.prompt, InjectOutcome::Skipped);
        let out = read(&p.config_toml);
        assert!(out.contains(r#"sandbox_mode = "workspace-write""#));
        assert!(out.contains(r#"approval_policy = "never""#));
        assert!(out.contains("[sandbox_workspace_write]"));
        assert!(out.contains("network_access = true"));
        assert!(out.contains("[mcp_servers.Coder]"));
        assert!(out.contains("Report ALL tasks and statuses"));
        assert_eq!(out.matches("[mcp_servers.").count(), 1);
        assert!(!p.agents_md.exists());
    }

    #[test]
    fn full_custom_config() {
        let (_dir, p) = paths();
        let input = AssembleInput {
            base_config: Some(
                r#"sandbox_mode = "read-only"
approval_policy = "untrusted"
preferred_auth_method = "chatgpt"
custom_setting = "test-value"

[advanced_settings]
timeout = 30000
debug = true
logging_level = "verbose"
"#
                .into(),
            ),
            additional_mcp_servers: Some(
                r#"[mcp_servers.CustomTool]
command = "/usr/local/bin/custom-tool"
args = ["--serve", "--port", "8080"]
type = "stdio"
description = "Custom development tool"

[mcp_servers.DatabaseMCP]
command = "python"
args = ["-m", "database_mcp_server"]
type = "stdio"
description = "Database query interface"
"#
                .into(),
            ),
            ..Default::default()
        };
        assemble(&p, &input).unwrap();
        let out = read(&p.config_toml);
        assert!(out.contains(r#"sandbox_mode = "read-only""#));
        assert!(out.contains(r#"preferred_auth_method = "chatgpt""#));
        assert!(out.contains(r#"custom_setting = "test-value""#));
        assert!(out.contains("[advanced_settings]"));
        assert!(out.contains(r#"logging_level = "verbose""#));
        assert!(out.contains("[mcp_servers.CustomTool]"));
        assert!(out.contains("[mcp_servers.DatabaseMCP]"));
        assert!(out.contains("Custom development tool"));
        assert!(out.contains("Database query interface"));
        assert_eq!(out.matches("[mcp_servers.Coder]").count(), 1);
    }

    #[test]
    fn top_level_keys_in_additional_servers_are_rejected() {
        let (_dir, p) = paths();
        let input = AssembleInput {
            base_config: Some("sandbox_mode = \"read-only\"\n".into()),
            additional_mcp_servers: Some(
                "model = \"o3\"\n\n[mcp_servers.X]\ncommand = \"x\"\n".into(),
            ),
            ..Default::default()
        };
        let err = assemble(&p, &input).unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::Malformed { source_name, message }) => {
                assert_eq!(source_name, "additional MCP servers");
                assert!(message.contains("model"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!p.config_toml.exists());
    }

    #[test]
    fn inline_mcp_servers_in_base_config_assemble() {
        let (_dir, p) = paths();
        let input = AssembleInput {
            base_config: Some("mcp_servers = { GitHub = { command = \"npx\" } }\n".into()),
            ..Default::default()
        };
        assemble(&p, &input).unwrap();
        let doc = ConfigDocument::parse("written", &read(&p.config_toml)).unwrap();
        assert!(doc.section("mcp_servers.GitHub").is_some());
        assert!(doc.section("mcp_servers.Coder").is_some());
    }

    #[test]
    fn platform_section_has_status_env() {
        let (_dir, p) = paths();
        let input = AssembleInput {
            platform: PlatformIntegration {
                app_status_slug: "my-codex".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assemble(&p, &input).unwrap();
        let doc = ConfigDocument::parse("written", &read(&p.config_toml)).unwrap();
        let coder = doc.section("mcp_servers.Coder").unwrap();
        let env = coder.get("env").unwrap().as_inline_table().unwrap();
        assert_eq!(
            env.get("CODER_MCP_APP_STATUS_SLUG").and_then(|v| v.as_str()),
            Some("my-codex")
        );
        assert_eq!(coder.get("type").and_then(|v| v.as_str()), Some("stdio"));
    }

    #[test]
    fn malformed_base_writes_nothing() {
        let (_dir, p) = paths();
        let input = AssembleInput {
            base_config: Some("sandbox_mode = ".into()),
            system_prompt: Some("prompt".into()),
            ..Default::default()
        };
        let err = assemble(&p, &input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Malformed { .. })
        ));
        assert!(!p.config_toml.exists());
        assert!(!p.agents_md.exists());
    }

    #[test]
    fn malformed_additional_keeps_previous_config() {
        let (_dir, p) = paths();
        assemble(&p, &AssembleInput::default()).unwrap();
        let before = read(&p.config_toml);
        let input = AssembleInput {
            additional_mcp_servers: Some("[mcp_servers.Broken".into()),
            ..Default::default()
        };
        let err = assemble(&p, &input).unwrap_err();
        assert!(err.to_string().contains("additional MCP servers"));
        assert_eq!(read(&p.config_toml), before);
    }

    #[test]
    fn rerun_is_idempotent() {
        let (_dir, p) = paths();
        let input = AssembleInput {
            base_config: Some("model = \"o4-mini\"\n[custom_section]\nnew_feature = true\n".into()),
            system_prompt: Some("Be terse.".into()),
            ..Default::default()
        };
        let first = assemble(&p, &input).unwrap();
        let config = read(&p.config_toml);
        let prompt = read(&p.agents_md);
        let second = assemble(&p, &input).unwrap();
        assert!(first.config_changed);
        assert!(!second.config_changed);
        assert_eq!(first.prompt, InjectOutcome::Created);
        assert_eq!(second.prompt, InjectOutcome::AlreadyPresent);
        assert_eq!(read(&p.config_toml), config);
        assert_eq!(read(&p.agents_md), prompt);
    }

    #[test]
    fn build_document_without_io() {
        let doc = build_document(&AssembleInput {
            base_config: Some("[mcp_servers.Coder]\ncommand = \"mine\"\n".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            doc.section_names(),
            vec!["", "sandbox_workspace_write", "mcp_servers.Coder"]
        );
        let coder = doc.section("mcp_servers.Coder").unwrap();
        assert_eq!(coder.get("command").and_then(|v| v.as_str()), Some("coder"));
    }
}
