use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the lam state directory, or None if the user's home cannot be resolved.
///
/// `LAM_HOME` overrides the default of `~/.lam`.
pub fn try_lam_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("LAM_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".lam"))
}

/// Registry record file: <home>/registry.json
pub fn registry_path(home: &Path) -> PathBuf {
    home.join("registry.json")
}

/// User configuration: <home>/config.toml
pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

/// Self-update staging area: <home>/updates
pub fn update_dir(home: &Path) -> PathBuf {
    home.join("updates")
}
