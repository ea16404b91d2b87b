use anyhow::Result;
use tether_session::{FileSessionTracker, SessionStore};
use tether_store::TetherPaths;

/// Execute `tether session show`
pub fn show(paths: &TetherPaths, json: bool) -> Result<()> {
    let store = FileSessionTracker::new(&paths.tracking_file);
    let entry = store.entry()?;

    if json {
        let value = match &entry {
            Some(e) => serde_json::json!({
                "workdir": e.workdir,
                "session_id": e.session_id,
                "tracking_file": paths.tracking_file,
            }),
            None => serde_json::json!({
                "workdir": null,
                "session_id": null,
                "tracking_file": paths.tracking_file,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match entry {
        Some(e) => {
            println!("Tracked session: {}", e.session_id);
            println!("  workdir: {}", e.workdir.display());
        }
        None => println!("No tracked session."),
    }
    Ok(())
}

/// Execute `tether session forget`
pub fn forget(paths: &TetherPaths) -> Result<()> {
    let store = FileSessionTracker::new(&paths.tracking_file);
    if store.clear()? {
        println!("Forgot tracked session. Next start will be fresh.");
    } else {
        println!("No tracked session.");
    }
    Ok(())
}
