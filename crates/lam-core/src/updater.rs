//! Self-update: check a release feed, stage a new executable, and swap it in
//! at a process boundary.
//!
//! The running executable is never overwritten in place. A download is
//! staged under the update directory together with a marker file; the swap
//! happens in [`apply_pending`] at shutdown or on the next start.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lam_schema::version::is_newer;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::io::{StagedFile, write_atomic};
use crate::transport::Transport;

const MARKER_FILE: &str = "pending-update.json";
const LAST_CHECK_FILE: &str = "last-check";

/// Self-update failures.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("downloading update {version} failed: {reason}")]
    UpdateDownloadFailed { version: Version, reason: String },

    #[error("applying update from '{}' failed: {source}", staged.display())]
    ApplyFailed {
        staged: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("update state in '{}' is unreadable: {reason}", path.display())]
    CorruptMarker { path: PathBuf, reason: String },
}

/// Failures querying a release feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("release feed request failed: {0}")]
    Request(String),

    #[error("release feed returned HTTP {0}")]
    Status(u16),

    #[error("release feed response is malformed: {0}")]
    Malformed(String),

    #[error("release {version} has no asset for this platform")]
    NoAsset { version: Version },
}

/// A published release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: Version,
    pub download_url: String,
    pub notes: Option<String>,
}

#[async_trait]
pub trait VersionFeed: Send + Sync {
    async fn latest_release(&self) -> Result<Release, FeedError>;
}

/// Result of comparing the running version against the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    UpdateAvailable(Release),
    /// The check could not complete; nothing was changed.
    CheckFailed(String),
}

/// A downloaded update waiting to be swapped in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedUpdate {
    pub version: Version,
    pub staged_path: PathBuf,
    pub target: PathBuf,
}

/// Progress of the manager towards a staged update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable(Release),
    Downloading(Version),
    Staged(StagedUpdate),
}

/// Checks a release feed and stages a replacement binary.
pub struct UpdateManager {
    current: Version,
    feed: Arc<dyn VersionFeed>,
    transport: Arc<dyn Transport>,
    dir: PathBuf,
    target: PathBuf,
    state: UpdateState,
}

impl UpdateManager {
    /// `dir` holds staged downloads and the pending marker. `target` is the
    /// executable that a staged update will replace.
    pub fn new(
        current: Version,
        feed: Arc<dyn VersionFeed>,
        transport: Arc<dyn Transport>,
        dir: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            current,
            feed,
            transport,
            dir: dir.into(),
            target: target.into(),
            state: UpdateState::Idle,
        }
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn current_version(&self) -> &Version {
        &self.current
    }

    /// Asks the feed for the latest release. Never fails: problems come
    /// back as [`UpdateStatus::CheckFailed`] with the manager idle again.
    pub async fn check_for_update(&mut self) -> UpdateStatus {
        self.state = UpdateState::Checking;
        match self.feed.latest_release().await {
            Ok(release) if is_newer(&self.current, &release.version) => {
                info!("update available: {} -> {}", self.current, release.version);
                self.state = UpdateState::UpdateAvailable(release.clone());
                UpdateStatus::UpdateAvailable(release)
            }
            Ok(release) => {
                debug!("latest release {} is not newer", release.version);
                self.state = UpdateState::UpToDate;
                UpdateStatus::UpToDate
            }
            Err(e) => {
                warn!("update check failed: {e}");
                self.state = UpdateState::Idle;
                UpdateStatus::CheckFailed(e.to_string())
            }
        }
    }

    /// Downloads `release` and stages it for [`apply_pending`].
    ///
    /// On failure nothing is staged and the manager returns to
    /// `UpdateAvailable`.
    pub async fn download(&mut self, release: &Release) -> Result<StagedUpdate, UpdateError> {
        self.state = UpdateState::Downloading(release.version.clone());
        match self.stage(release).await {
            Ok(staged) => {
                self.state = UpdateState::Staged(staged.clone());
                Ok(staged)
            }
            Err(e) => {
                self.state = UpdateState::UpdateAvailable(release.clone());
                Err(e)
            }
        }
    }

    async fn stage(&self, release: &Release) -> Result<StagedUpdate, UpdateError> {
        let failed = |reason: String| UpdateError::UpdateDownloadFailed {
            version: release.version.clone(),
            reason,
        };
        let payload = self
            .transport
            .get_bytes(&release.download_url)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if payload.is_empty() {
            return Err(failed("empty payload".to_string()));
        }

        fs::create_dir_all(&self.dir).map_err(|e| failed(e.to_string()))?;
        let name = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lam".to_string());
        let staged_path = self.dir.join(format!("{name}-{}", release.version));

        let mut file = StagedFile::create(&staged_path).map_err(|e| failed(e.to_string()))?;
        file.write_all(&payload).map_err(|e| failed(e.to_string()))?;
        file.commit().map_err(|e| failed(e.to_string()))?;
        make_executable(&staged_path).map_err(|e| failed(e.to_string()))?;

        let staged = StagedUpdate {
            version: release.version.clone(),
            staged_path,
            target: self.target.clone(),
        };
        let marker = serde_json::to_vec_pretty(&staged).map_err(|e| failed(e.to_string()))?;
        write_atomic(&marker_path(&self.dir), &marker).map_err(|e| failed(e.to_string()))?;
        info!("staged update {} at {}", staged.version, staged.staged_path.display());
        Ok(staged)
    }
}

fn marker_path(dir: &Path) -> PathBuf {
    dir.join(MARKER_FILE)
}

/// The update staged in `dir`, if any.
pub fn pending(dir: &Path) -> Result<Option<StagedUpdate>, UpdateError> {
    let path = marker_path(dir);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(UpdateError::CorruptMarker {
                path,
                reason: e.to_string(),
            });
        }
    };
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| UpdateError::CorruptMarker {
            path,
            reason: e.to_string(),
        })
}

/// Swaps a staged update into place.
///
/// The current executable is moved aside to `<name>.old` first and restored
/// if the swap fails. Returns the version applied, or `None` if nothing was
/// staged.
pub fn apply_pending(dir: &Path) -> Result<Option<Version>, UpdateError> {
    let Some(update) = pending(dir)? else {
        return Ok(None);
    };
    let marker = marker_path(dir);
    let failed = |source: io::Error| UpdateError::ApplyFailed {
        staged: update.staged_path.clone(),
        source,
    };

    if !update.staged_path.is_file() {
        warn!(
            "staged update {} is missing; discarding",
            update.staged_path.display()
        );
        fs::remove_file(&marker).map_err(failed)?;
        return Ok(None);
    }

    // Copy next to the target first so the final step is a same-directory
    // rename.
    let mut incoming = StagedFile::create(&update.target).map_err(failed)?;
    io::copy(&mut File::open(&update.staged_path).map_err(failed)?, &mut incoming)
        .map_err(failed)?;

    let backup = old_path(&update.target);
    let had_target = update.target.exists();
    if had_target {
        fs::rename(&update.target, &backup).map_err(failed)?;
    }
    if let Err(e) = incoming.commit().and_then(|p| make_executable(&p)) {
        if had_target && let Err(restore) = fs::rename(&backup, &update.target) {
            warn!("could not restore {}: {restore}", update.target.display());
        }
        return Err(failed(e));
    }

    fs::remove_file(&marker).map_err(failed)?;
    if let Err(e) = fs::remove_file(&update.staged_path) {
        debug!("leaving {}: {e}", update.staged_path.display());
    }
    // Windows keeps the running image locked; cleanup_stale catches it later.
    if had_target && let Err(e) = fs::remove_file(&backup) {
        debug!("leaving {}: {e}", backup.display());
    }
    info!("applied update {}", update.version);
    Ok(Some(update.version))
}

/// Removes a `<name>.old` left behind by an earlier swap.
pub fn cleanup_stale(target: &Path) {
    let backup = old_path(target);
    if backup.exists() {
        match fs::remove_file(&backup) {
            Ok(()) => debug!("removed {}", backup.display()),
            Err(e) => debug!("leaving {}: {e}", backup.display()),
        }
    }
}

fn old_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

fn make_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Persisted throttle for automatic background checks.
#[derive(Debug, Clone)]
pub struct CheckSchedule {
    path: PathBuf,
    interval: Duration,
}

impl CheckSchedule {
    pub fn new(dir: &Path, interval: Duration) -> Self {
        Self {
            path: dir.join(LAST_CHECK_FILE),
            interval,
        }
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        let raw = fs::read_to_string(&self.path).ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Whether a check is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_check() else {
            return true;
        };
        match (now - last).to_std() {
            Ok(elapsed) => elapsed >= self.interval,
            // Clock went backwards.
            Err(_) => true,
        }
    }

    pub fn record(&self, now: DateTime<Utc>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&self.path, now.to_rfc3339().as_bytes())
    }
}

#[cfg(feature = "network")]
pub use github::GithubReleaseFeed;

#[cfg(feature = "network")]
mod github {
    use super::*;
    use lam_schema::version::parse_tag;

    const GITHUB_API: &str = "https://api.github.com";

    #[derive(Debug, Deserialize)]
    struct GithubRelease {
        tag_name: String,
        #[serde(default)]
        draft: bool,
        #[serde(default)]
        prerelease: bool,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        assets: Vec<GithubAsset>,
    }

    #[derive(Debug, Deserialize)]
    struct GithubAsset {
        name: String,
        browser_download_url: String,
    }

    /// Releases of a GitHub repository.
    #[derive(Debug, Clone)]
    pub struct GithubReleaseFeed {
        client: reqwest::Client,
        api_base: String,
        owner: String,
        repo: String,
        asset_hint: String,
    }

    impl GithubReleaseFeed {
        pub fn new(owner: &str, repo: &str, timeout: Duration) -> Result<Self, FeedError> {
            let client = reqwest::Client::builder()
                .user_agent(crate::USER_AGENT)
                .timeout(timeout)
                .build()
                .map_err(|e| FeedError::Request(e.to_string()))?;
            Ok(Self {
                client,
                api_base: GITHUB_API.to_string(),
                owner: owner.to_string(),
                repo: repo.to_string(),
                asset_hint: std::env::consts::OS.to_string(),
            })
        }

        pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
            self.api_base = base.into().trim_end_matches('/').to_string();
            self
        }

        /// Substring an asset name must contain to be picked.
        pub fn with_asset_hint(mut self, hint: impl Into<String>) -> Self {
            self.asset_hint = hint.into();
            self
        }
    }

    #[async_trait]
    impl VersionFeed for GithubReleaseFeed {
        async fn latest_release(&self) -> Result<Release, FeedError> {
            let url = format!(
                "{}/repos/{}/{}/releases",
                self.api_base, self.owner, self.repo
            );
            let resp = self
                .client
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .send()
                .await
                .map_err(|e| FeedError::Request(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(FeedError::Status(resp.status().as_u16()));
            }
            let releases: Vec<GithubRelease> = resp
                .json()
                .await
                .map_err(|e| FeedError::Malformed(e.to_string()))?;

            let (version, release) = releases
                .into_iter()
                .filter(|r| !r.draft && !r.prerelease)
                .filter_map(|r| parse_tag(&r.tag_name).ok().map(|v| (v, r)))
                .max_by(|a, b| a.0.cmp(&b.0))
                .ok_or_else(|| FeedError::Malformed("no published releases".to_string()))?;

            let hint = self.asset_hint.to_lowercase();
            let asset = match release.assets.as_slice() {
                [only] => Some(only),
                assets => assets.iter().find(|a| a.name.to_lowercase().contains(&hint)),
            };
            let Some(asset) = asset else {
                return Err(FeedError::NoAsset { version });
            };
            Ok(Release {
                version,
                download_url: asset.browser_download_url.clone(),
                notes: release.body,
            })
        }
    }
}
