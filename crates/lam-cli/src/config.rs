//! User configuration (`<lam home>/config.toml`).

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lam_core::root::DEFAULT_CONTENT_DIR;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game installation directory.
    pub game_root: Option<PathBuf>,
    /// Content directory inside the game root.
    pub content_dir: String,
    /// Parallel downloads for collection installs.
    pub workers: usize,
    /// Per-request network timeout.
    pub timeout_secs: u64,
    pub update: UpdateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// GitHub owner of the release feed.
    pub owner: Option<String>,
    /// GitHub repository of the release feed.
    pub repo: Option<String>,
    pub auto_check: bool,
    pub check_interval_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_root: None,
            content_dir: DEFAULT_CONTENT_DIR.to_string(),
            workers: 4,
            timeout_secs: 60,
            update: UpdateConfig::default(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            owner: None,
            repo: None,
            auto_check: true,
            check_interval_hours: 24,
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }

    /// `(owner, repo)` of the release feed, if configured.
    pub fn release_feed(&self) -> Option<(&str, &str)> {
        match (&self.update.owner, &self.update.repo) {
            (Some(owner), Some(repo)) => Some((owner, repo)),
            _ => None,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.update.check_interval_hours.saturating_mul(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg = Config::parse(
            r#"
            game_root = "/games/l4d2"
            workers = 8

            [update]
            owner = "acme"
            repo = "lam"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.game_root, Some(PathBuf::from("/games/l4d2")));
        assert_eq!(cfg.workers(), 8);
        assert_eq!(cfg.content_dir, "left4dead2");
        assert_eq!(cfg.timeout(), Duration::from_secs(60));
        assert_eq!(cfg.release_feed(), Some(("acme", "lam")));
        assert!(cfg.update.auto_check);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(cfg.release_feed().is_none());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "workers = \"many\"").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_huge_check_interval_saturates() {
        let cfg = Config::parse("[update]\ncheck_interval_hours = 9223372036854775807\n").unwrap();
        assert_eq!(cfg.check_interval(), Duration::from_secs(u64::MAX));
        assert_eq!(Config::default().check_interval(), Duration::from_secs(24 * 3600));
    }
}
