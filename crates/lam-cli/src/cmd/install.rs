//! Install command

use anyhow::{Result, bail};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::{Session, repatch};
use crate::ops;

/// Install Workshop items or collections
pub async fn install(
    session: &Session,
    game_root: Option<&Path>,
    references: &[String],
    enable: bool,
    workers: Option<usize>,
) -> Result<()> {
    let ctx = session.context(game_root)?;
    let output = &session.output;
    let workers = workers.unwrap_or_else(|| ctx.config.workers()).max(1);

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let report = ops::install_references(&ctx, references, workers, &cancel).await;
    watcher.abort();

    if enable && !report.installed.is_empty() {
        for addon in &report.installed {
            ctx.registry.set_enabled(addon.id.clone(), true).await?;
        }
        repatch(&ctx, output, false).await?;
    }

    for id in &report.nested {
        output.info(&format!(
            "{id} is a collection inside a collection; run 'lam install {id}' to install it"
        ));
    }
    output.wait_async().await;
    ctx.registry.shutdown();

    if report.is_success() {
        return Ok(());
    }
    if !report.cancelled.is_empty() {
        bail!(
            "Interrupted: {} item(s) were not installed",
            report.cancelled.len()
        );
    }
    bail!(
        "{} of {} item(s) failed to install",
        report.failed.len(),
        report.failed.len() + report.installed.len()
    )
}
