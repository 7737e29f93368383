//! Orphans command

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

use super::Session;
use crate::ops;
use crate::ui::table::orphan_table;

/// List (or adopt) archives that lam does not track
pub async fn orphans(session: &Session, game_root: Option<&Path>, adopt: bool) -> Result<()> {
    let ctx = session.context(game_root)?;
    let output = &session.output;

    if adopt {
        let adopted = ops::adopt_orphans(&ctx).await?;
        if adopted.is_empty() {
            output.success("No untracked archives");
        } else {
            output.success(&format!(
                "Registered {} archive(s); enable them with 'lam enable <id>'",
                adopted.len()
            ));
        }
        output.wait_async().await;
        return Ok(());
    }

    let tracked: HashSet<_> = ctx
        .registry
        .snapshot()
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    let orphans = ctx.store.list_orphans(|id| tracked.contains(id))?;
    if orphans.is_empty() {
        output.success("No untracked archives");
        output.wait_async().await;
        return Ok(());
    }
    output.wait_async().await;
    println!("{}", orphan_table(&orphans));
    println!();
    println!("  Run 'lam orphans --adopt' to register them.");
    Ok(())
}
