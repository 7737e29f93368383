//! List and search commands

use anyhow::Result;
use lam_core::registry::SortKey;
use lam_schema::Addon;
use std::path::Path;

use super::Session;
use crate::ui::Output;
use crate::ui::table::addon_table;
use crate::ui::theme::format_size;

/// List installed addons
pub async fn list(
    session: &Session,
    game_root: Option<&Path>,
    key: SortKey,
    enabled_only: bool,
) -> Result<()> {
    let ctx = session.context(game_root)?;
    let mut addons = ctx.registry.search("", key).await?;
    if enabled_only {
        addons.retain(|a| a.enabled);
    }

    if addons.is_empty() {
        println!();
        println!("  No addons installed.");
        println!("  Run 'lam install <workshop id>' or 'lam orphans --adopt' to get started.");
        return Ok(());
    }
    print_addons(&session.output, &addons).await;
    Ok(())
}

/// Search installed addons by display name
pub async fn search(
    session: &Session,
    game_root: Option<&Path>,
    query: &str,
    key: SortKey,
) -> Result<()> {
    let ctx = session.context(game_root)?;
    let hits = ctx.registry.search(query, key).await?;
    if hits.is_empty() {
        session.output.info(&format!("No addons match '{query}'"));
        session.output.wait_async().await;
        return Ok(());
    }
    print_addons(&session.output, &hits).await;
    Ok(())
}

async fn print_addons(output: &Output, addons: &[Addon]) {
    output.wait_async().await;
    println!("{}", addon_table(addons));

    let enabled = addons.iter().filter(|a| a.enabled).count();
    let total: u64 = addons.iter().map(|a| a.size_bytes).sum();
    println!();
    println!(
        "  {} addon{}, {enabled} enabled, {}",
        addons.len(),
        if addons.len() == 1 { "" } else { "s" },
        format_size(total)
    );
}
