use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tether_config::{assemble, AssembleInput, AssembleReport, InjectOutcome, PlatformIntegration};
use tether_store::TetherPaths;

#[derive(Args, Debug, Clone)]
pub struct AssembleArgs {
    /// Base configuration overrides (TOML text)
    #[arg(long, env = "TETHER_BASE_CONFIG_TOML")]
    pub base_config: Option<String>,
    /// Read base configuration overrides from a file (wins over --base-config)
    #[arg(long)]
    pub base_config_file: Option<PathBuf>,
    /// Extra MCP server sections (TOML text)
    #[arg(long, env = "TETHER_ADDITIONAL_MCP_SERVERS")]
    pub additional_mcp_servers: Option<String>,
    /// Fragment appended once to AGENTS.md
    #[arg(long, env = "TETHER_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,
    /// App status slug reported by the platform MCP server
    #[arg(long, env = "TETHER_APP_STATUS_SLUG", default_value = "codex")]
    pub app_status_slug: String,
    /// AgentAPI endpoint reported by the platform MCP server
    #[arg(long, env = "TETHER_AGENTAPI_URL", default_value = "http://localhost:3284")]
    pub agentapi_url: String,
}

impl AssembleArgs {
    pub fn to_input(&self) -> Result<AssembleInput> {
        let base_config = match &self.base_config_file {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading base config: {}", path.display()))?,
            ),
            None => self.base_config.clone(),
        };
        Ok(AssembleInput {
            base_config,
            additional_mcp_servers: self.additional_mcp_servers.clone(),
            system_prompt: self.system_prompt.clone(),
            platform: PlatformIntegration {
                app_status_slug: self.app_status_slug.clone(),
                agentapi_url: self.agentapi_url.clone(),
                ..PlatformIntegration::default()
            },
        })
    }
}

/// Execute `tether assemble`
pub fn execute(paths: &TetherPaths, args: &AssembleArgs) -> Result<()> {
    let report = run(paths, args)?;
    print_report(&report);
    Ok(())
}

pub fn run(paths: &TetherPaths, args: &AssembleArgs) -> Result<AssembleReport> {
    let input = args.to_input()?;
    assemble(paths, &input)
}

pub fn print_report(report: &AssembleReport) {
    let state = if report.config_changed {
        "written"
    } else {
        "unchanged"
    };
    println!("Config: {} ({state})", report.config_path.display());
    let names: Vec<&str> = report
        .sections
        .iter()
        .map(|s| if s.is_empty() { "(root)" } else { s.as_str() })
        .collect();
    println!("  sections: {}", names.join(", "));

    let prompt = match report.prompt {
        InjectOutcome::Skipped => "no system prompt",
        InjectOutcome::Created => "created",
        InjectOutcome::Appended => "appended",
        InjectOutcome::AlreadyPresent => "already present",
    };
    println!("Prompt: {} ({prompt})", report.prompt_path.display());
}
