//! lam - Left 4 Dead 2 addon manager

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use lam_cli::cmd::{self, Session};
use lam_cli::{Cli, Commands};
use lam_core::updater;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }

    let session = Session::load(cli.quiet)?;
    finish_pending_update(&session.home);

    let root = cli.game_root.as_deref();
    let auto_check = !cli.quiet && !matches!(cli.command, Commands::SelfUpdate { .. });
    let result = match cli.command {
        Commands::Install {
            references,
            enable,
            workers,
        } => cmd::install::install(&session, root, &references, enable, workers).await,
        Commands::Uninstall { ids, no_patch } => {
            cmd::uninstall::uninstall(&session, root, &ids, no_patch).await
        }
        Commands::Enable { ids, no_patch } => {
            cmd::toggle::set_enabled(&session, root, &ids, true, no_patch).await
        }
        Commands::Disable { ids, no_patch } => {
            cmd::toggle::set_enabled(&session, root, &ids, false, no_patch).await
        }
        Commands::EnableAll { no_patch } => {
            cmd::toggle::set_all_enabled(&session, root, true, no_patch).await
        }
        Commands::DisableAll { no_patch } => {
            cmd::toggle::set_all_enabled(&session, root, false, no_patch).await
        }
        Commands::Rename { id, name } => cmd::rename::rename(&session, root, &id, name).await,
        Commands::List { sort, enabled } => {
            cmd::list::list(&session, root, sort.into(), enabled).await
        }
        Commands::Search { query, sort } => {
            cmd::list::search(&session, root, &query, sort.into()).await
        }
        Commands::Patch { dry_run } => cmd::patch::patch(&session, root, dry_run).await,
        Commands::Unpatch => cmd::patch::unpatch(&session, root).await,
        Commands::Orphans { adopt } => cmd::orphans::orphans(&session, root, adopt).await,
        Commands::Clean => cmd::clean::clean(&session, root).await,
        Commands::Status => cmd::status::status(&session, root).await,
        Commands::SelfUpdate { check } => cmd::self_update::self_update(&session, check).await,
        Commands::Completions { .. } => Ok(()),
    };

    if result.is_ok() && auto_check {
        cmd::self_update::auto_check(&session).await;
    }
    session.output.wait_async().await;

    // Hand off an update staged by this process.
    finish_pending_update(&session.home);
    result
}

/// `LAM_LOG` sets the filter; `--verbose` forces debug.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LAM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Applies a staged self-update and removes the previous binary's leftovers.
fn finish_pending_update(home: &Path) {
    match updater::apply_pending(&lam_cli::update_dir(home)) {
        Ok(Some(version)) => eprintln!("lam updated to v{version}"),
        Ok(None) => {}
        Err(e) => tracing::warn!("could not apply staged update: {e}"),
    }
    if let Ok(exe) = std::env::current_exe() {
        updater::cleanup_stale(&exe);
    }
}
