//! Persistent record of every addon the tool knows about.
//!
//! Entries keep insertion order, which is also the order enabled addons are
//! written to the engine manifest. The record is a single JSON document
//! replaced atomically on every save.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use lam_schema::{Addon, AddonId, AddonSource, AddonStatus, ItemDescriptor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::io::write_atomic;
use crate::store::ArchiveHandle;

const FORMAT_VERSION: u32 = 1;

/// Registry persistence and lookup failures.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("addon {id} is not installed")]
    NotFound { id: AddonId },

    #[error("reading registry '{}' failed: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("registry '{}' is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("registry '{}' has unsupported format version {version}", path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("writing registry '{}' failed: {source}", path.display())]
    DiskWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    addons: Vec<Addon>,
}

/// Ordering for listings and search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Registry order.
    #[default]
    Installed,
    Name,
    Size,
    Newest,
}

/// The persistent record of known addons and their enabled state.
#[derive(Debug, Clone)]
pub struct AddonRegistry {
    path: Option<PathBuf>,
    addons: Vec<Addon>,
    index: HashMap<AddonId, usize>,
    autosave: bool,
    dirty: bool,
}

impl AddonRegistry {
    /// A registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            addons: Vec::new(),
            index: HashMap::new(),
            autosave: false,
            dirty: false,
        }
    }

    /// Loads the record at `path`, or starts empty if it does not exist.
    ///
    /// Entries whose archive is gone are kept and marked
    /// [`AddonStatus::Broken`]. Saving is automatic after every mutation.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let mut this = Self {
            path: Some(path.to_path_buf()),
            autosave: true,
            ..Self::in_memory()
        };
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(this),
            Err(source) => {
                return Err(RegistryError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let file: RegistryFile =
            serde_json::from_slice(&raw).map_err(|source| RegistryError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        if file.version != FORMAT_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                path: path.to_path_buf(),
                version: file.version,
            });
        }

        for addon in file.addons {
            if this.index.contains_key(&addon.id) {
                warn!("duplicate registry entry {} ignored", addon.id);
                continue;
            }
            this.index.insert(addon.id.clone(), this.addons.len());
            this.addons.push(addon);
        }
        this.refresh_status();
        debug!("loaded {} addons from {}", this.addons.len(), path.display());
        Ok(this)
    }

    /// Turns automatic saving on or off. With it off, call
    /// [`checkpoint`](Self::checkpoint) to persist.
    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the record to disk.
    pub fn checkpoint(&self) -> Result<(), RegistryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write_err = |source: io::Error| RegistryError::DiskWriteFailed {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let file = RegistryFile {
            version: FORMAT_VERSION,
            addons: self.addons.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| write_err(io::Error::other(e)))?;
        write_atomic(path, &json).map_err(write_err)
    }

    /// Re-checks which entries have lost their archive.
    pub fn refresh_status(&mut self) {
        for addon in &mut self.addons {
            addon.status = if addon.archive_path.is_file() {
                AddonStatus::Ok
            } else {
                AddonStatus::Broken
            };
            if addon.is_broken() {
                warn!(
                    "{} is missing its archive at {}",
                    addon.id,
                    addon.archive_path.display()
                );
            }
        }
    }

    /// Records a fetched workshop item.
    ///
    /// A new entry starts disabled. Reinstalling an existing id refreshes its
    /// archive metadata and keeps its enabled flag and custom name.
    pub fn install(
        &mut self,
        descriptor: &ItemDescriptor,
        handle: &ArchiveHandle,
    ) -> Result<Addon, RegistryError> {
        let title = handle.label(descriptor.title.as_deref());
        self.upsert(handle, title, AddonSource::Workshop(descriptor.id))
    }

    /// Records an archive that was placed in the addon directory by hand.
    pub fn register_local(&mut self, handle: &ArchiveHandle) -> Result<Addon, RegistryError> {
        let source = match handle.id.workshop_id() {
            Some(id) => AddonSource::Workshop(id),
            None => AddonSource::Local,
        };
        self.upsert(handle, handle.label(None), source)
    }

    fn upsert(
        &mut self,
        handle: &ArchiveHandle,
        title: String,
        source: AddonSource,
    ) -> Result<Addon, RegistryError> {
        let id = handle.id.clone();
        self.transact(|reg| {
            let (enabled, custom_name) = match reg.get(&id) {
                Some(prev) => (prev.enabled, prev.custom_name.clone()),
                None => (false, None),
            };
            let addon = Addon {
                id: id.clone(),
                title,
                custom_name,
                archive_path: handle.path.clone(),
                size_bytes: handle.size_bytes,
                installed_at: Utc::now(),
                enabled,
                source,
                status: AddonStatus::Ok,
            };
            match reg.index.get(&id) {
                Some(&i) => reg.addons[i] = addon.clone(),
                None => {
                    reg.index.insert(id.clone(), reg.addons.len());
                    reg.addons.push(addon.clone());
                }
            }
            Ok(addon)
        })
    }

    /// Sets the enabled flag. Returns whether it changed.
    pub fn set_enabled(&mut self, id: &AddonId, enabled: bool) -> Result<bool, RegistryError> {
        let i = self.position(id)?;
        if self.addons[i].enabled == enabled {
            return Ok(false);
        }
        self.transact(|reg| {
            reg.addons[i].enabled = enabled;
            Ok(true)
        })
    }

    /// Sets the enabled flag on every entry. Returns how many changed.
    pub fn set_all_enabled(&mut self, enabled: bool) -> Result<usize, RegistryError> {
        let changed = self.addons.iter().filter(|a| a.enabled != enabled).count();
        if changed == 0 {
            return Ok(0);
        }
        self.transact(|reg| {
            for addon in &mut reg.addons {
                addon.enabled = enabled;
            }
            Ok(changed)
        })
    }

    /// Gives an entry a custom label. An empty name clears it.
    pub fn rename(&mut self, id: &AddonId, name: &str) -> Result<(), RegistryError> {
        let i = self.position(id)?;
        let name = name.trim();
        let custom = (!name.is_empty()).then(|| name.to_string());
        self.transact(|reg| {
            reg.addons[i].custom_name = custom;
            Ok(())
        })
    }

    /// Drops the custom label, reverting to the archive title.
    pub fn reset_name(&mut self, id: &AddonId) -> Result<(), RegistryError> {
        self.rename(id, "")
    }

    /// Removes an entry and returns it.
    pub fn uninstall(&mut self, id: &AddonId) -> Result<Addon, RegistryError> {
        let i = self.position(id)?;
        self.transact(|reg| {
            let addon = reg.addons.remove(i);
            reg.reindex();
            Ok(addon)
        })
    }

    pub fn get(&self, id: &AddonId) -> Option<&Addon> {
        self.index.get(id).map(|&i| &self.addons[i])
    }

    pub fn contains(&self, id: &AddonId) -> bool {
        self.index.contains_key(id)
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Addon> {
        self.addons.iter()
    }

    /// Enabled entries in insertion order.
    pub fn enabled(&self) -> impl Iterator<Item = &Addon> {
        self.addons.iter().filter(|a| a.enabled)
    }

    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }

    /// Entries whose display name contains `query`, ignoring case, in
    /// insertion order. An empty query matches everything.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a Addon> + use<'a> {
        let needle = query.to_lowercase();
        self.addons
            .iter()
            .filter(move |a| a.display_name().to_lowercase().contains(&needle))
    }

    /// [`search`](Self::search) ordered by `key`. Ties keep registry order.
    pub fn search_sorted(&self, query: &str, key: SortKey) -> Vec<&Addon> {
        let mut hits: Vec<&Addon> = self.search(query).collect();
        match key {
            SortKey::Installed => {}
            SortKey::Name => {
                hits.sort_by_cached_key(|a| a.display_name().to_lowercase());
            }
            SortKey::Size => hits.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes)),
            SortKey::Newest => hits.sort_by(|a, b| b.installed_at.cmp(&a.installed_at)),
        }
        hits
    }

    /// Whether enabled state changed since the manifest was last patched.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Records that the manifest now reflects the enabled set.
    pub fn mark_patched(&mut self) {
        self.dirty = false;
    }

    fn position(&self, id: &AddonId) -> Result<usize, RegistryError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| RegistryError::NotFound { id: id.clone() })
    }

    fn reindex(&mut self) {
        self.index = self
            .addons
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
    }

    // Applies a mutation and persists it. A failed save rolls the in-memory
    // state back so memory and disk agree.
    fn transact<T>(
        &mut self,
        mutate: impl FnOnce(&mut Self) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let snapshot = self.autosave.then(|| (self.addons.clone(), self.index.clone()));
        let out = mutate(self)?;
        if let Some((addons, index)) = snapshot
            && let Err(e) = self.checkpoint()
        {
            self.addons = addons;
            self.index = index;
            return Err(e);
        }
        self.dirty = true;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lam_schema::WorkshopId;

    fn handle(dir: &Path, id: u64, title: Option<&str>) -> (ItemDescriptor, ArchiveHandle) {
        let path = dir.join(format!("{id}.vpk"));
        fs::write(&path, b"archive").unwrap();
        let desc = ItemDescriptor::item(WorkshopId::new(id), format!("mem://{id}"))
            .with_title(format!("Remote {id}"));
        let handle = ArchiveHandle {
            id: AddonId::workshop(WorkshopId::new(id)),
            path,
            size_bytes: 7,
            title: title.map(str::to_string),
        };
        (desc, handle)
    }

    fn id(n: u64) -> AddonId {
        AddonId::workshop(WorkshopId::new(n))
    }

    #[test]
    fn test_install_starts_disabled_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = AddonRegistry::in_memory();
        for n in [3, 1, 2] {
            let (d, h) = handle(dir.path(), n, None);
            reg.install(&d, &h).unwrap();
        }
        let order: Vec<&str> = reg.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(order, vec!["3", "1", "2"]);
        assert!(reg.iter().all(|a| !a.enabled));
        assert_eq!(reg.get(&id(1)).unwrap().title, "Remote 1");
    }

    #[test]
    fn test_reinstall_preserves_enabled_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = AddonRegistry::in_memory();
        let (d, h) = handle(dir.path(), 42, Some("Witch v1"));
        reg.install(&d, &h).unwrap();
        reg.set_enabled(&id(42), true).unwrap();
        reg.rename(&id(42), "My Witch").unwrap();

        let (d, h) = handle(dir.path(), 42, Some("Witch v2"));
        let addon = reg.install(&d, &h).unwrap();
        assert!(addon.enabled);
        assert_eq!(addon.title, "Witch v2");
        assert_eq!(addon.display_name(), "My Witch");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_rename_missing_id_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = AddonRegistry::in_memory();
        let (d, h) = handle(dir.path(), 1, None);
        reg.install(&d, &h).unwrap();
        let before: Vec<Addon> = reg.iter().cloned().collect();

        let err = reg.rename(&id(99), "x").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
        assert_eq!(reg.iter().cloned().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_reset_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = AddonRegistry::in_memory();
        let (d, h) = handle(dir.path(), 1, Some("Archive Title"));
        reg.install(&d, &h).unwrap();
        reg.rename(&id(1), "Custom").unwrap();
        reg.reset_name(&id(1)).unwrap();
        assert_eq!(reg.get(&id(1)).unwrap().display_name(), "Archive Title");
    }

    #[test]
    fn test_search_is_case_insensitive_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = AddonRegistry::in_memory();
        for (n, title) in [(1, "Better WITCH"), (2, "Tank Sounds"), (3, "witch hud")] {
            let (d, h) = handle(dir.path(), n, Some(title));
            reg.install(&d, &h).unwrap();
        }
        let hits: Vec<&str> = reg.search("Witch").map(|a| a.id.as_str()).collect();
        assert_eq!(hits, vec!["1", "3"]);
        assert_eq!(reg.search("").count(), 3);

        let sorted: Vec<&str> = reg
            .search_sorted("witch", SortKey::Name)
            .into_iter()
            .map(|a| a.title.as_str())
            .collect();
        assert_eq!(sorted, vec!["Better WITCH", "witch hud"]);
    }

    #[test]
    fn test_persist_and_reload_marks_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/registry.json");
        {
            let mut reg = AddonRegistry::load(&path).unwrap();
            for n in [1, 2] {
                let (d, h) = handle(dir.path(), n, None);
                reg.install(&d, &h).unwrap();
            }
            reg.set_enabled(&id(2), true).unwrap();
        }
        fs::remove_file(dir.path().join("1.vpk")).unwrap();

        let reg = AddonRegistry::load(&path).unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.get(&id(1)).unwrap().is_broken());
        assert!(reg.get(&id(2)).unwrap().enabled);
        assert!(!reg.is_dirty());
    }

    #[test]
    fn test_enable_disable_tracks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = AddonRegistry::in_memory();
        let (d, h) = handle(dir.path(), 1, None);
        reg.install(&d, &h).unwrap();
        reg.mark_patched();

        assert!(!reg.set_enabled(&id(1), false).unwrap());
        assert!(!reg.is_dirty());
        assert!(reg.set_enabled(&id(1), true).unwrap());
        assert!(reg.is_dirty());
        assert_eq!(reg.enabled().count(), 1);
        assert_eq!(reg.set_all_enabled(false).unwrap(), 1);
        assert_eq!(reg.enabled().count(), 0);
    }

    #[test]
    fn test_uninstall_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = AddonRegistry::in_memory();
        for n in [1, 2, 3] {
            let (d, h) = handle(dir.path(), n, None);
            reg.install(&d, &h).unwrap();
        }
        reg.uninstall(&id(1)).unwrap();
        assert!(reg.get(&id(1)).is_none());
        assert_eq!(reg.get(&id(3)).unwrap().id, id(3));
        assert!(matches!(reg.uninstall(&id(1)), Err(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            AddonRegistry::load(&path),
            Err(RegistryError::Corrupt { .. })
        ));
    }
}
