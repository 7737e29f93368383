//! Patch and unpatch commands

use anyhow::{Context as _, Result};
use std::path::Path;

use super::{Session, repatch};

/// Write enabled addons into gameinfo.txt
pub async fn patch(session: &Session, game_root: Option<&Path>, dry_run: bool) -> Result<()> {
    let ctx = session.context(game_root)?;
    let output = &session.output;

    if dry_run {
        let addons = ctx.registry.snapshot().await?;
        let plan = ctx
            .patcher
            .plan(&addons)
            .context("Failed to read gameinfo.txt")?;
        if plan.is_noop() {
            output.success("gameinfo.txt is up to date");
        } else {
            for id in &plan.report.added {
                output.info(&format!("would add {id}"));
            }
            for id in &plan.report.removed {
                output.info(&format!("would remove {id}"));
            }
            output.success(&format!(
                "{} entries would be written",
                plan.report.written.len()
            ));
        }
        output.wait_async().await;
        return Ok(());
    }

    repatch(&ctx, output, false).await?;
    output.success("gameinfo.txt is up to date");
    output.wait_async().await;
    Ok(())
}

/// Remove every lam entry from gameinfo.txt
pub async fn unpatch(session: &Session, game_root: Option<&Path>) -> Result<()> {
    let root = session.game_root(game_root)?;
    let patcher = lam_core::patcher::ConfigPatcher::new(root);
    let report = tokio::task::spawn_blocking(move || patcher.unpatch())
        .await?
        .context("Failed to update gameinfo.txt")?;

    let output = &session.output;
    if report.changed {
        output.success(&format!("Removed {} entries", report.removed.len()));
    } else {
        output.success("gameinfo.txt has no lam entries");
    }
    output.wait_async().await;
    Ok(())
}
