//! Owns the addon archives under the game's addon directory.
//!
//! Downloads land in `addons/workshop/<id>.vpk` through a staging file, so a
//! failed or interrupted fetch never leaves a partial archive at its final
//! name. Loose archives the user dropped into `addons/` are only ever read or
//! deleted on request.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use lam_schema::{ARCHIVE_EXTENSION, AddonId, ItemDescriptor, ItemKind, WorkshopId};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::io::{StagedFile, is_staging_file, vpk};
use crate::root::GameRoot;
use crate::transport::Transport;

/// Archive store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("download of {id} failed: {reason}")]
    DownloadFailed { id: AddonId, reason: String },

    #[error("writing '{}' failed: {source}", path.display())]
    DiskWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no archive for {id}")]
    NotFound { id: AddonId },

    #[error("reading '{}' failed: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn download(id: &AddonId, reason: impl Into<String>) -> Self {
        Self::DownloadFailed {
            id: id.clone(),
            reason: reason.into(),
        }
    }
}

/// A stored archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    pub id: AddonId,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Title from the archive's `addoninfo.txt`.
    pub title: Option<String>,
}

impl ArchiveHandle {
    /// Best label for the archive: embedded title, then `fallback`, then the
    /// file name.
    pub fn label(&self, fallback: Option<&str>) -> String {
        self.title
            .as_deref()
            .or(fallback)
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&self.path).unwrap_or_else(|| self.id.to_string()))
    }
}

/// How an archive found on disk relates to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Vpk,
    /// Has the archive extension but not the format.
    Unknown,
}

/// An archive found on disk by [`ArchiveStore::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub id: AddonId,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub kind: ArchiveKind,
}

/// What an uninstall removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uninstalled {
    Removed(PathBuf),
    /// Removed earlier in this session.
    AlreadyRemoved,
}

/// Owns the `.vpk` files under the game's addon directories.
pub struct ArchiveStore {
    root: GameRoot,
    transport: Arc<dyn Transport>,
    removed: Mutex<HashSet<AddonId>>,
}

impl ArchiveStore {
    pub fn new(root: GameRoot, transport: Arc<dyn Transport>) -> Self {
        Self {
            root,
            transport,
            removed: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &GameRoot {
        &self.root
    }

    /// Where a downloaded workshop archive lives.
    pub fn workshop_archive_path(&self, id: WorkshopId) -> PathBuf {
        self.root
            .workshop_dir()
            .join(format!("{id}.{ARCHIVE_EXTENSION}"))
    }

    /// Downloads, validates and stores the archive behind `descriptor`.
    ///
    /// Re-fetching an id replaces its archive in place.
    #[instrument(skip(self, descriptor), fields(id = %descriptor.id))]
    pub async fn fetch(&self, descriptor: &ItemDescriptor) -> Result<ArchiveHandle, StoreError> {
        let id = descriptor.addon_id();
        if descriptor.kind == ItemKind::Collection {
            return Err(StoreError::download(&id, "nested collections are not downloadable"));
        }
        if let Some(reason) = &descriptor.unavailable {
            return Err(StoreError::download(&id, reason.clone()));
        }
        let Some(url) = descriptor.download_url.as_deref() else {
            return Err(StoreError::download(&id, "no download location"));
        };

        debug!("fetching {url}");
        let payload = self
            .transport
            .get_bytes(url)
            .await
            .map_err(|e| StoreError::download(&id, e.to_string()))?;

        if payload.is_empty() {
            return Err(StoreError::download(&id, "empty payload"));
        }
        if let Some(expected) = descriptor.file_size
            && expected != payload.len() as u64
        {
            return Err(StoreError::download(
                &id,
                format!("size mismatch: expected {expected} bytes, got {}", payload.len()),
            ));
        }
        if !vpk::has_signature(&payload) {
            return Err(StoreError::download(&id, "payload is not a VPK archive"));
        }

        let title = match vpk::addon_title(&mut Cursor::new(&payload[..])) {
            Ok(title) => title,
            Err(e) => {
                debug!("no embedded title: {e}");
                None
            }
        };

        let dest = self.workshop_archive_path(descriptor.id);
        let size_bytes = payload.len() as u64;
        let write_dest = dest.clone();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut staged = StagedFile::create(&write_dest)?;
            staged.write_all(&payload)?;
            staged.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::DiskWriteFailed {
            path: dest.clone(),
            source: io::Error::other(e),
        })?
        .map_err(|source| StoreError::DiskWriteFailed {
            path: dest.clone(),
            source,
        })?;

        self.removed_set().remove(&id);
        info!("stored {id} at {}", dest.display());
        Ok(ArchiveHandle {
            id,
            path: dest,
            size_bytes,
            title,
        })
    }

    /// Finds the archive currently stored for `id`.
    pub fn locate(&self, id: &AddonId) -> Option<PathBuf> {
        if let Some(ws) = id.workshop_id() {
            let path = self.workshop_archive_path(ws);
            return path.is_file().then_some(path);
        }
        let stem = id.local_stem()?;
        list_archives(&self.root.addons_dir())
            .ok()?
            .into_iter()
            .find(|p| file_stem(p).is_some_and(|s| s.eq_ignore_ascii_case(stem)))
    }

    /// Deletes the archive for `id`.
    ///
    /// Removing the same id twice in a session reports
    /// [`Uninstalled::AlreadyRemoved`]; an id that never had an archive is
    /// [`StoreError::NotFound`].
    pub fn uninstall(&self, id: &AddonId) -> Result<Uninstalled, StoreError> {
        match self.locate(id) {
            Some(path) => {
                fs::remove_file(&path).map_err(|source| StoreError::DiskWriteFailed {
                    path: path.clone(),
                    source,
                })?;
                self.removed_set().insert(id.clone());
                info!("removed {}", path.display());
                Ok(Uninstalled::Removed(path))
            }
            None if self.removed_set().contains(id) => Ok(Uninstalled::AlreadyRemoved),
            None => Err(StoreError::NotFound { id: id.clone() }),
        }
    }

    /// Every archive in the addon and workshop directories.
    pub fn scan(&self) -> Result<Vec<ArchiveInfo>, StoreError> {
        let mut found = Vec::new();
        for (dir, workshop) in [(self.root.addons_dir(), false), (self.root.workshop_dir(), true)] {
            for path in list_archives(&dir).map_err(|source| StoreError::Read {
                path: dir.clone(),
                source,
            })? {
                let Some(stem) = file_stem(&path) else {
                    continue;
                };
                let id = match stem.parse::<u64>() {
                    Ok(n) if workshop && n != 0 => AddonId::workshop(WorkshopId::new(n)),
                    _ => AddonId::local(&stem),
                };
                let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let kind = classify(&path).unwrap_or(ArchiveKind::Unknown);
                found.push(ArchiveInfo {
                    id,
                    path,
                    size_bytes,
                    kind,
                });
            }
        }
        Ok(found)
    }

    /// Archives on disk that `is_tracked` does not claim.
    pub fn list_orphans(
        &self,
        is_tracked: impl Fn(&AddonId) -> bool,
    ) -> Result<Vec<ArchiveInfo>, StoreError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|info| !is_tracked(&info.id))
            .collect())
    }

    /// Reads an on-disk archive so it can be registered.
    pub fn inspect(&self, info: &ArchiveInfo) -> Result<ArchiveHandle, StoreError> {
        let read_err = |source: io::Error| StoreError::Read {
            path: info.path.clone(),
            source,
        };
        let mut file = File::open(&info.path).map_err(read_err)?;
        let size_bytes = file.metadata().map_err(read_err)?.len();
        let title = match vpk::addon_title(&mut file) {
            Ok(title) => title,
            Err(e) => {
                warn!("{}: {e}", info.path.display());
                None
            }
        };
        Ok(ArchiveHandle {
            id: info.id.clone(),
            path: info.path.clone(),
            size_bytes,
            title,
        })
    }

    /// Deletes staging files left behind by interrupted downloads.
    pub fn clean_staging(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut removed = Vec::new();
        for dir in [self.root.addons_dir(), self.root.workshop_dir()] {
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
            {
                let path = entry.path();
                if !entry.file_type().is_file() || !is_staging_file(path) {
                    continue;
                }
                fs::remove_file(path).map_err(|source| StoreError::DiskWriteFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
                removed.push(path.to_path_buf());
            }
        }
        Ok(removed)
    }

    fn removed_set(&self) -> std::sync::MutexGuard<'_, HashSet<AddonId>> {
        self.removed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Checks the format signature of an archive on disk.
pub fn classify(path: &Path) -> io::Result<ArchiveKind> {
    let mut head = [0u8; 4];
    let mut file = File::open(path)?;
    let kind = match file.read_exact(&mut head) {
        Ok(()) if vpk::has_signature(&head) => ArchiveKind::Vpk,
        Ok(()) => ArchiveKind::Unknown,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => ArchiveKind::Unknown,
        Err(e) => return Err(e),
    };
    Ok(kind)
}

fn list_archives(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() || is_staging_file(path) {
            continue;
        }
        let is_archive = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION));
        if is_archive {
            out.push(path.to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}
