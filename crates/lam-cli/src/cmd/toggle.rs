//! Enable / disable commands

use anyhow::{Result, bail};
use std::path::Path;

use super::{Session, parse_ids, repatch};

/// Enable or disable the given addons
pub async fn set_enabled(
    session: &Session,
    game_root: Option<&Path>,
    ids: &[String],
    enabled: bool,
    no_patch: bool,
) -> Result<()> {
    let ids = parse_ids(ids)?;
    let ctx = session.context(game_root)?;
    let output = &session.output;
    let verb = if enabled { "Enabled" } else { "Disabled" };

    let mut failures = 0;
    for id in ids {
        match ctx.registry.set_enabled(id.clone(), enabled).await {
            Ok(true) => output.success(&format!("{verb} {id}")),
            Ok(false) => output.info(&format!("{id} already {}", verb.to_lowercase())),
            Err(e) => {
                failures += 1;
                output.error(&e.to_string());
            }
        }
    }
    if ctx.registry.is_dirty().await? {
        repatch(&ctx, output, no_patch).await?;
    }
    output.wait_async().await;

    if failures > 0 {
        bail!("{failures} addon(s) could not be changed");
    }
    Ok(())
}

/// Enable or disable every installed addon
pub async fn set_all_enabled(
    session: &Session,
    game_root: Option<&Path>,
    enabled: bool,
    no_patch: bool,
) -> Result<()> {
    let ctx = session.context(game_root)?;
    let output = &session.output;

    let changed = ctx.registry.set_all_enabled(enabled).await?;
    let verb = if enabled { "enabled" } else { "disabled" };
    output.success(&format!("{changed} addon(s) {verb}"));
    if ctx.registry.is_dirty().await? {
        repatch(&ctx, output, no_patch).await?;
    }
    output.wait_async().await;
    Ok(())
}
