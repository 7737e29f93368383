//! The game installation a session operates on.
//!
//! Discovering where the game lives is someone else's job; this module only
//! validates a supplied root and derives the paths the store and patcher
//! work with. A `GameRoot` is passed explicitly to every component that
//! touches the game directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Content directory of Left 4 Dead 2. Other Source titles use their own.
pub const DEFAULT_CONTENT_DIR: &str = "left4dead2";

const MANIFEST_FILE: &str = "gameinfo.txt";

/// Why a directory was rejected as a game root.
#[derive(Error, Debug)]
pub enum RootError {
    #[error("invalid game root '{}': {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },
}

impl RootError {
    fn invalid(path: &Path, reason: impl Into<String>) -> Self {
        Self::InvalidRoot {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// A validated Left 4 Dead 2 installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRoot {
    root: PathBuf,
    content_dir: String,
}

impl GameRoot {
    /// Validates `root` and prepares the addon directories inside it.
    ///
    /// The root must be an existing directory containing `content_dir`, and
    /// the content directory must be writable.
    pub fn open(root: impl Into<PathBuf>, content_dir: &str) -> Result<Self, RootError> {
        let root = root.into();
        if content_dir.is_empty() || Path::new(content_dir).components().count() != 1 {
            return Err(RootError::invalid(&root, "content dir must be a single directory name"));
        }
        if !root.is_dir() {
            return Err(RootError::invalid(&root, "not a directory"));
        }
        let content = root.join(content_dir);
        if !content.is_dir() {
            return Err(RootError::invalid(
                &root,
                format!("missing content directory '{content_dir}'"),
            ));
        }
        if let Err(e) = tempfile::tempfile_in(&content) {
            return Err(RootError::invalid(&root, format!("content directory not writable: {e}")));
        }

        let this = Self {
            root,
            content_dir: content_dir.to_string(),
        };
        fs::create_dir_all(this.workshop_dir()).map_err(|e| {
            RootError::invalid(&this.root, format!("cannot create addon directory: {e}"))
        })?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The game content directory, `left4dead2` by default.
    pub fn content_dir(&self) -> PathBuf {
        self.root.join(&self.content_dir)
    }

    /// Loose archives: <root>/<content>/addons
    pub fn addons_dir(&self) -> PathBuf {
        self.content_dir().join("addons")
    }

    /// Archives fetched by this tool: <root>/<content>/addons/workshop
    pub fn workshop_dir(&self) -> PathBuf {
        self.addons_dir().join("workshop")
    }

    /// The engine's content-search manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.content_dir().join(MANIFEST_FILE)
    }

    /// `path` relative to the root with `/` separators, as the engine expects
    /// search paths. Paths outside the root are rendered in full.
    pub fn engine_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                Component::RootDir | Component::Prefix(_) => Some(String::new()),
                _ => None,
            })
            .collect();
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_prepares_addon_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("left4dead2")).unwrap();

        let root = GameRoot::open(dir.path(), DEFAULT_CONTENT_DIR).unwrap();
        assert!(root.workshop_dir().is_dir());
        assert_eq!(
            root.manifest_path(),
            dir.path().join("left4dead2").join("gameinfo.txt")
        );
        assert_eq!(
            root.engine_path(&root.workshop_dir().join("42.vpk")),
            "left4dead2/addons/workshop/42.vpk"
        );
    }

    #[test]
    fn test_invalid_roots() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GameRoot::open(dir.path().join("nope"), DEFAULT_CONTENT_DIR),
            Err(RootError::InvalidRoot { .. })
        ));
        assert!(matches!(
            GameRoot::open(dir.path(), DEFAULT_CONTENT_DIR),
            Err(RootError::InvalidRoot { .. })
        ));
        assert!(matches!(
            GameRoot::open(dir.path(), "../escape"),
            Err(RootError::InvalidRoot { .. })
        ));
    }
}
