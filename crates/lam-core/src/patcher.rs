//! Keeps the engine manifest's addon-owned search paths in sync with the
//! registry.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use lam_schema::{Addon, AddonId};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::io::{StagedFile, write_atomic};
use crate::manifest::{ManagedEntry, Manifest};
use crate::root::GameRoot;

const BACKUP_SUFFIX: &str = ".lam-backup";

/// Why a manifest patch could not be applied.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("manifest '{}' is unreadable: {reason}", path.display())]
    ManifestUnreadable { path: PathBuf, reason: String },

    #[error("writing '{}' failed: {source}", path.display())]
    DiskWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Ids written to the manifest, in order.
    pub written: Vec<AddonId>,
    pub added: Vec<AddonId>,
    pub removed: Vec<AddonId>,
    /// Enabled addons left out because their archive is missing.
    pub skipped_broken: Vec<AddonId>,
    /// Whether the file on disk was rewritten.
    pub changed: bool,
}

/// A computed but unwritten patch.
#[derive(Debug, Clone)]
pub struct PatchPlan {
    pub current: Vec<u8>,
    pub rendered: Vec<u8>,
    pub report: PatchReport,
}

impl PatchPlan {
    /// Whether writing this plan would leave the file unchanged.
    pub fn is_noop(&self) -> bool {
        self.current == self.rendered
    }
}

/// Keeps the managed entries of `gameinfo.txt` in step with the registry.
pub struct ConfigPatcher {
    root: GameRoot,
    lock: Mutex<()>,
}

impl ConfigPatcher {
    pub fn new(root: GameRoot) -> Self {
        Self {
            root,
            lock: Mutex::new(()),
        }
    }

    /// Location of `gameinfo.txt` under the content directory.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.manifest_path()
    }

    /// One-time copy of the manifest taken before the first write.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.manifest_path().into_os_string();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// Computes what [`patch`](Self::patch) would write, without writing.
    pub fn plan<'a>(
        &self,
        addons: impl IntoIterator<Item = &'a Addon>,
    ) -> Result<PatchPlan, PatchError> {
        let path = self.manifest_path();
        let unreadable = |reason: String| PatchError::ManifestUnreadable {
            path: path.clone(),
            reason,
        };
        let current = fs::read(&path).map_err(|e| unreadable(e.to_string()))?;
        let manifest = Manifest::parse(&current).map_err(|e| unreadable(e.to_string()))?;

        let mut report = PatchReport::default();
        let mut entries = Vec::new();
        for addon in addons.into_iter().filter(|a| a.enabled) {
            if addon.is_broken() {
                report.skipped_broken.push(addon.id.clone());
                continue;
            }
            report.written.push(addon.id.clone());
            entries.push(ManagedEntry {
                id: addon.id.clone(),
                path: self.root.engine_path(&addon.archive_path),
            });
        }

        let before: HashSet<AddonId> = manifest.managed_ids().into_iter().collect();
        let after: HashSet<&AddonId> = report.written.iter().collect();
        report.added = report
            .written
            .iter()
            .filter(|id| !before.contains(*id))
            .cloned()
            .collect();
        report.removed = manifest
            .managed_ids()
            .into_iter()
            .filter(|id| !after.contains(id))
            .collect();

        let rendered = manifest.render(&entries);
        report.changed = rendered != current;
        Ok(PatchPlan {
            current,
            rendered,
            report,
        })
    }

    /// Rewrites the manifest so its managed entries are exactly the enabled,
    /// non-broken `addons`, in the given order.
    ///
    /// The file is left untouched when nothing would change, and on any
    /// error.
    #[instrument(skip_all)]
    pub fn patch<'a>(
        &self,
        addons: impl IntoIterator<Item = &'a Addon>,
    ) -> Result<PatchReport, PatchError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let plan = self.plan(addons)?;
        if plan.is_noop() {
            debug!("manifest already up to date");
            return Ok(plan.report);
        }

        self.ensure_backup(&plan.current)?;
        let path = self.manifest_path();
        let write_err = |source: io::Error| PatchError::DiskWriteFailed {
            path: path.clone(),
            source,
        };
        let mut staged = StagedFile::create(&path).map_err(write_err)?;
        staged.write_all(&plan.rendered).map_err(write_err)?;
        staged.commit().map_err(write_err)?;

        info!(
            "patched {}: +{} -{}",
            path.display(),
            plan.report.added.len(),
            plan.report.removed.len()
        );
        Ok(plan.report)
    }

    /// Removes every managed entry.
    pub fn unpatch(&self) -> Result<PatchReport, PatchError> {
        self.patch(std::iter::empty())
    }

    fn ensure_backup(&self, current: &[u8]) -> Result<(), PatchError> {
        let backup = self.backup_path();
        if backup.exists() {
            return Ok(());
        }
        write_atomic(&backup, current).map_err(|source| PatchError::DiskWriteFailed {
            path: backup.clone(),
            source,
        })?;
        debug!("saved manifest backup to {}", backup.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lam_schema::{AddonSource, AddonStatus, MANAGED_MARKER, WorkshopId};

    use crate::root::DEFAULT_CONTENT_DIR;

    const GAMEINFO: &str = "\"GameInfo\"\n{\n\tFileSystem\n\t{\n\t\tSearchPaths\n\t\t{\n\t\t\tGame\tforeign_entry_1\n\t\t\tGame\tforeign_entry_2\n\t\t}\n\t}\n}\n";

    fn setup() -> (tempfile::TempDir, GameRoot) {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join(DEFAULT_CONTENT_DIR);
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("gameinfo.txt"), GAMEINFO).unwrap();
        let root = GameRoot::open(dir.path(), DEFAULT_CONTENT_DIR).unwrap();
        (dir, root)
    }

    fn addon(root: &GameRoot, id: u64, enabled: bool) -> Addon {
        let ws = WorkshopId::new(id);
        let archive_path = root.workshop_dir().join(format!("{id}.vpk"));
        fs::write(&archive_path, b"vpk").unwrap();
        Addon {
            id: AddonId::workshop(ws),
            title: format!("Addon {id}"),
            custom_name: None,
            archive_path,
            size_bytes: 3,
            installed_at: Utc::now(),
            enabled,
            source: AddonSource::Workshop(ws),
            status: AddonStatus::Ok,
        }
    }

    fn search_paths(patcher: &ConfigPatcher) -> Vec<String> {
        let text = fs::read_to_string(patcher.manifest_path()).unwrap();
        let start = text.find("SearchPaths").unwrap();
        let body = &text[start..];
        let open = body.find('{').unwrap();
        let close = body.find('}').unwrap();
        body[open + 1..close]
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.split('\t').take(2).collect::<Vec<_>>().join(" "))
            .collect()
    }

    #[test]
    fn test_enabled_addon_lands_before_foreign_entries() {
        let (_dir, root) = setup();
        let patcher = ConfigPatcher::new(root.clone());
        let x = addon(&root, 42, true);

        let report = patcher.patch([&x]).unwrap();
        assert!(report.changed);
        assert_eq!(report.added, vec![x.id.clone()]);
        assert_eq!(
            search_paths(&patcher),
            vec![
                "Game \"left4dead2/addons/workshop/42.vpk\"",
                "Game foreign_entry_1",
                "Game foreign_entry_2",
            ]
        );
        let text = fs::read_to_string(patcher.manifest_path()).unwrap();
        assert!(text.contains(&format!("{MANAGED_MARKER} 42")));
    }

    #[test]
    fn test_enable_disable_round_trip_restores_bytes() {
        let (_dir, root) = setup();
        let patcher = ConfigPatcher::new(root.clone());
        let mut x = addon(&root, 42, true);

        patcher.patch([&x]).unwrap();
        x.enabled = false;
        let report = patcher.patch([&x]).unwrap();
        assert_eq!(report.removed, vec![x.id.clone()]);
        assert_eq!(fs::read_to_string(patcher.manifest_path()).unwrap(), GAMEINFO);
    }

    #[test]
    fn test_second_patch_is_byte_identical_noop() {
        let (_dir, root) = setup();
        let patcher = ConfigPatcher::new(root.clone());
        let addons = [addon(&root, 1, true), addon(&root, 2, true)];

        patcher.patch(&addons).unwrap();
        let first = fs::read(patcher.manifest_path()).unwrap();
        let report = patcher.patch(&addons).unwrap();
        assert!(!report.changed);
        assert_eq!(fs::read(patcher.manifest_path()).unwrap(), first);
    }

    #[test]
    fn test_broken_addons_are_skipped() {
        let (_dir, root) = setup();
        let patcher = ConfigPatcher::new(root.clone());
        let mut broken = addon(&root, 9, true);
        broken.status = AddonStatus::Broken;

        let report = patcher.patch([&broken]).unwrap();
        assert_eq!(report.skipped_broken, vec![broken.id.clone()]);
        assert!(!report.changed);
    }

    #[test]
    fn test_unreadable_manifest_is_left_untouched() {
        let (_dir, root) = setup();
        let patcher = ConfigPatcher::new(root.clone());
        let corrupt = "\"GameInfo\"\n{\n\tSearchPaths\n\t{\n\t\tGame\tupdate\n";
        fs::write(patcher.manifest_path(), corrupt).unwrap();

        let err = patcher.patch([&addon(&root, 1, true)]).unwrap_err();
        assert!(matches!(err, PatchError::ManifestUnreadable { .. }));
        assert_eq!(fs::read_to_string(patcher.manifest_path()).unwrap(), corrupt);
        assert!(!patcher.backup_path().exists());
    }

    #[test]
    fn test_interrupted_write_keeps_previous_manifest() {
        let (_dir, root) = setup();
        let patcher = ConfigPatcher::new(root.clone());
        let x = addon(&root, 42, true);
        let plan = patcher.plan([&x]).unwrap();

        // Crash after writing part of the new file but before the rename.
        {
            let mut staged = StagedFile::create(&patcher.manifest_path()).unwrap();
            staged
                .write_all(&plan.rendered[..plan.rendered.len() / 2])
                .unwrap();
        }
        assert_eq!(fs::read_to_string(patcher.manifest_path()).unwrap(), GAMEINFO);

        patcher.patch([&x]).unwrap();
        assert_eq!(fs::read(patcher.manifest_path()).unwrap(), plan.rendered);
    }

    #[test]
    fn test_backup_taken_once_and_unpatch() {
        let (_dir, root) = setup();
        let patcher = ConfigPatcher::new(root.clone());
        patcher.patch([&addon(&root, 1, true)]).unwrap();
        patcher.patch([&addon(&root, 2, true)]).unwrap();
        assert_eq!(fs::read_to_string(patcher.backup_path()).unwrap(), GAMEINFO);

        let report = patcher.unpatch().unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(fs::read_to_string(patcher.manifest_path()).unwrap(), GAMEINFO);
    }
}
