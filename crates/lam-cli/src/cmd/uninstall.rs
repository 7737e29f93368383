//! Uninstall command

use anyhow::{Result, bail};
use std::path::Path;

use super::{Session, parse_ids, repatch};
use crate::ops;

/// Remove addons and their archives
pub async fn uninstall(
    session: &Session,
    game_root: Option<&Path>,
    ids: &[String],
    no_patch: bool,
) -> Result<()> {
    let ids = parse_ids(ids)?;
    let ctx = session.context(game_root)?;
    let output = &session.output;

    let mut failures = 0;
    for id in &ids {
        match ops::uninstall(&ctx, id).await {
            Ok(addon) => output.success(&format!("Removed {} ({id})", addon.display_name())),
            Err(e) => {
                failures += 1;
                output.error(&e.to_string());
            }
        }
    }
    if failures < ids.len() {
        repatch(&ctx, output, no_patch).await?;
    }
    output.wait_async().await;

    if failures > 0 {
        bail!("{failures} addon(s) could not be removed");
    }
    Ok(())
}
