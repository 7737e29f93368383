//! Self-update command

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::Session;
use lam_core::steam::SteamTransport;
use lam_core::updater::{CheckSchedule, GithubReleaseFeed, UpdateManager, UpdateStatus};
use lam_schema::version::parse_tag;

/// Timeout for the throttled check that follows other commands.
const AUTO_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

fn manager(session: &Session, timeout: Duration) -> Result<UpdateManager> {
    let Some((owner, repo)) = session.config.release_feed() else {
        bail!("No release feed configured; set [update] owner and repo in config.toml");
    };
    let current = parse_tag(crate::VERSION)
        .with_context(|| format!("Build version '{}' is not semver", crate::VERSION))?;
    let feed = GithubReleaseFeed::new(owner, repo, timeout)?;
    let transport = SteamTransport::new(timeout)?;
    let target = std::env::current_exe().context("Failed to locate the running executable")?;
    Ok(UpdateManager::new(
        current,
        Arc::new(feed),
        Arc::new(transport),
        crate::update_dir(&session.home),
        target,
    ))
}

fn schedule(session: &Session) -> CheckSchedule {
    CheckSchedule::new(
        &crate::update_dir(&session.home),
        session.config.check_interval(),
    )
}

/// Update lam itself
pub async fn self_update(session: &Session, check_only: bool) -> Result<()> {
    let output = &session.output;
    let mut manager = manager(session, session.config.timeout())?;

    output.info("Checking for lam updates...");
    let status = manager.check_for_update().await;
    if let Err(e) = schedule(session).record(Utc::now()) {
        tracing::debug!("could not record update check: {e}");
    }

    match status {
        UpdateStatus::UpToDate => {
            output.success(&format!(
                "lam is already up to date (v{})",
                manager.current_version()
            ));
        }
        UpdateStatus::CheckFailed(reason) => {
            output.wait_async().await;
            bail!("Update check failed: {reason}");
        }
        UpdateStatus::UpdateAvailable(release) => {
            output.info(&format!(
                "v{} -> v{}",
                manager.current_version(),
                release.version
            ));
            if let Some(notes) = release.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                for line in notes.lines().take(10) {
                    output.info(line);
                }
            }
            if check_only {
                output.success("Run 'lam self-update' to install it");
            } else {
                let staged = manager
                    .download(&release)
                    .await
                    .context("Failed to download the update")?;
                output.success(&format!(
                    "lam v{} downloaded; it replaces this binary when lam exits",
                    staged.version
                ));
            }
        }
    }
    output.wait_async().await;
    Ok(())
}

/// Throttled background check; prints a hint when a newer release exists.
pub async fn auto_check(session: &Session) {
    if !session.config.update.auto_check || session.config.release_feed().is_none() {
        return;
    }
    let schedule = schedule(session);
    let now = Utc::now();
    if !schedule.is_due(now) {
        return;
    }
    if let Err(e) = schedule.record(now) {
        tracing::debug!("could not record update check: {e}");
    }

    let mut manager = match manager(session, AUTO_CHECK_TIMEOUT) {
        Ok(manager) => manager,
        Err(e) => {
            tracing::debug!("skipping update check: {e:#}");
            return;
        }
    };
    match manager.check_for_update().await {
        UpdateStatus::UpdateAvailable(release) => {
            session.output.info(&format!(
                "lam v{} is available; run 'lam self-update'",
                release.version
            ));
            session.output.wait_async().await;
        }
        UpdateStatus::CheckFailed(reason) => tracing::debug!("update check failed: {reason}"),
        UpdateStatus::UpToDate => {}
    }
}
