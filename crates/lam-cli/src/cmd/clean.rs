//! Clean command

use anyhow::Result;
use std::path::Path;

use super::Session;

/// Remove staging files left by interrupted downloads
pub async fn clean(session: &Session, game_root: Option<&Path>) -> Result<()> {
    let ctx = session.context(game_root)?;
    let output = &session.output;

    let removed = ctx.store.clean_staging()?;
    for path in &removed {
        output.info(&format!("removed {}", path.display()));
    }
    output.success(if removed.is_empty() {
        "Nothing to clean"
    } else {
        "Addon directories are clean"
    });
    output.wait_async().await;
    Ok(())
}
