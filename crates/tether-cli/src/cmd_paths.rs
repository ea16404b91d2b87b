use anyhow::Result;
use tether_store::TetherPaths;

/// Execute `tether paths`
pub fn execute(paths: &TetherPaths, json: bool) -> Result<()> {
    let rows = [
        ("home", &paths.home),
        ("codex_dir", &paths.codex_dir),
        ("config_toml", &paths.config_toml),
        ("agents_md", &paths.agents_md),
        ("sessions_dir", &paths.sessions_dir),
        ("tracking_file", &paths.tracking_file),
        ("start_log", &paths.start_log),
    ];

    if json {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for (name, path) in rows {
        println!("{name:<14} {}", path.display());
    }
    Ok(())
}
