//! Status command

use anyhow::Result;
use crossterm::style::Stylize;
use std::collections::HashSet;
use std::path::Path;

use super::Session;
use crate::ui::Theme;
use crate::ui::theme::format_size;
use lam_core::updater;

/// Show registry and manifest health
pub async fn status(session: &Session, game_root: Option<&Path>) -> Result<()> {
    let ctx = session.context(game_root)?;
    let theme = Theme::default();
    let icons = &theme.icons;
    let colors = &theme.colors;

    let addons = ctx.registry.snapshot().await?;
    let enabled = addons.iter().filter(|a| a.enabled).count();
    let broken: Vec<_> = addons.iter().filter(|a| a.is_broken()).collect();
    let size: u64 = addons.iter().map(|a| a.size_bytes).sum();

    let tracked: HashSet<_> = addons.iter().map(|a| a.id.clone()).collect();
    let orphans = ctx.store.list_orphans(|id| tracked.contains(id))?;

    let label = |s: &str| format!("{s:<12}").with(colors.header);

    session.output.wait_async().await;
    println!();
    println!("  {} {}", label("lam"), crate::VERSION);
    println!("  {} {}", label("game"), ctx.root.path().display());
    println!(
        "  {} {} installed, {enabled} enabled, {}",
        label("addons"),
        addons.len(),
        format_size(size)
    );
    println!();

    for addon in &broken {
        println!(
            "  {} {} ({}) is missing its archive",
            icons.warning.with(colors.warning),
            addon.display_name(),
            addon.id
        );
    }
    if !orphans.is_empty() {
        println!(
            "  {} {} untracked archive(s); see 'lam orphans'",
            icons.warning.with(colors.warning),
            orphans.len()
        );
    }

    match ctx.patcher.plan(&addons) {
        Ok(plan) if plan.is_noop() => println!(
            "  {} gameinfo.txt is in sync",
            icons.success.with(colors.success)
        ),
        Ok(plan) => println!(
            "  {} gameinfo.txt is out of date (+{} -{}); run 'lam patch'",
            icons.warning.with(colors.warning),
            plan.report.added.len(),
            plan.report.removed.len()
        ),
        Err(e) => println!("  {} {e}", icons.error.with(colors.error)),
    }

    if let Ok(Some(staged)) = updater::pending(&crate::update_dir(&ctx.home)) {
        println!(
            "  {} update to {} is staged and applies when lam exits",
            icons.info,
            staged.version
        );
    }
    Ok(())
}
