//! Registry records and resolution descriptors.

use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference::{ReferenceError, WorkshopId};

const LOCAL_PREFIX: &str = "local:";

/// Stable registry key for an addon.
///
/// Workshop addons use the decimal item id (`"2945094613"`); archives dropped
/// into the addon directory by hand use a filename-derived key
/// (`"local:my_hud"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddonId(String);

impl AddonId {
    /// Key for a Workshop item.
    pub fn workshop(id: WorkshopId) -> Self {
        Self(id.to_string())
    }

    /// Key for a local archive, derived from its file stem.
    pub fn local(stem: &str) -> Self {
        Self(format!("{LOCAL_PREFIX}{}", stem.to_lowercase()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The Workshop item behind this key, if any.
    pub fn workshop_id(&self) -> Option<WorkshopId> {
        self.0.parse::<u64>().ok().map(WorkshopId::new)
    }

    /// The file stem of a local-archive key.
    pub fn local_stem(&self) -> Option<&str> {
        self.0.strip_prefix(LOCAL_PREFIX)
    }

    /// Whether this key names a local archive.
    pub fn is_local(&self) -> bool {
        self.local_stem().is_some()
    }
}

impl fmt::Display for AddonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AddonId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AddonId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<WorkshopId> for AddonId {
    fn from(id: WorkshopId) -> Self {
        Self::workshop(id)
    }
}

impl FromStr for AddonId {
    type Err = ReferenceError;

    /// Accepts `local:<stem>` or anything [`WorkshopId`] accepts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(stem) = s.strip_prefix(LOCAL_PREFIX) {
            if stem.is_empty() {
                return Err(ReferenceError::Malformed {
                    input: s.to_string(),
                    reason: "local key needs a file stem",
                });
            }
            return Ok(Self::local(stem));
        }
        s.parse::<WorkshopId>().map(Self::workshop)
    }
}

/// Where an addon came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddonSource {
    /// Downloaded from the Steam Workshop.
    Workshop(WorkshopId),
    /// Placed in the addon directory by the user.
    Local,
}

/// Health of a registry entry, computed when the registry is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddonStatus {
    /// The archive is present.
    #[default]
    Ok,
    /// The archive is missing; the entry is kept for repair.
    Broken,
}

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Addon {
    /// Unique registry key.
    pub id: AddonId,
    /// Default label: embedded archive title, remote title, or file name.
    pub title: String,
    /// User-chosen label; survives reinstalls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    /// Location of the archive, owned by the archive store.
    pub archive_path: PathBuf,
    /// Archive size at install time.
    pub size_bytes: u64,
    /// When the archive was installed.
    pub installed_at: DateTime<Utc>,
    /// Whether the manifest should load this addon.
    pub enabled: bool,
    /// Origin of the addon.
    pub source: AddonSource,
    /// Computed on load; never persisted.
    #[serde(skip)]
    pub status: AddonStatus,
}

impl Addon {
    /// The label shown to the user.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.title)
    }

    /// Whether the archive was missing when the registry was loaded.
    pub fn is_broken(&self) -> bool {
        self.status == AddonStatus::Broken
    }
}

/// Kind of a resolved Workshop entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A downloadable addon.
    Item,
    /// A collection found inside a collection; reported, never expanded.
    Collection,
}

/// One concrete Workshop entry produced by reference resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Workshop item id.
    pub id: WorkshopId,
    /// Whether this is an item or a nested collection.
    pub kind: ItemKind,
    /// Title reported by the remote source.
    pub title: Option<String>,
    /// Where the archive can be downloaded from.
    pub download_url: Option<String>,
    /// Advertised archive size in bytes.
    pub file_size: Option<u64>,
    /// Why the item cannot be downloaded (removed, private, ...).
    pub unavailable: Option<String>,
}

impl ItemDescriptor {
    /// A downloadable item.
    pub fn item(id: WorkshopId, download_url: impl Into<String>) -> Self {
        Self {
            id,
            kind: ItemKind::Item,
            title: None,
            download_url: Some(download_url.into()),
            file_size: None,
            unavailable: None,
        }
    }

    /// A nested collection reference.
    pub fn nested_collection(id: WorkshopId) -> Self {
        Self {
            id,
            kind: ItemKind::Collection,
            title: None,
            download_url: None,
            file_size: None,
            unavailable: None,
        }
    }

    /// An item the remote source refuses to serve.
    pub fn unavailable(id: WorkshopId, reason: impl Into<String>) -> Self {
        Self {
            id,
            kind: ItemKind::Item,
            title: None,
            download_url: None,
            file_size: None,
            unavailable: Some(reason.into()),
        }
    }

    /// Sets the remote title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the advertised size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    /// Registry key for this item.
    pub fn addon_id(&self) -> AddonId {
        AddonId::workshop(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addon_id_forms() {
        let ws: AddonId = "https://steamcommunity.com/sharedfiles/filedetails/?id=42"
            .parse()
            .unwrap();
        assert_eq!(ws.as_str(), "42");
        assert_eq!(ws.workshop_id(), Some(WorkshopId::new(42)));
        assert!(!ws.is_local());

        let local: AddonId = "local:My_HUD".parse().unwrap();
        assert_eq!(local.as_str(), "local:my_hud");
        assert_eq!(local.local_stem(), Some("my_hud"));
        assert_eq!(local.workshop_id(), None);

        assert!("local:".parse::<AddonId>().is_err());
    }

    #[test]
    fn test_display_name_prefers_rename() {
        let mut addon = Addon {
            id: AddonId::workshop(WorkshopId::new(7)),
            title: "Original".to_string(),
            custom_name: None,
            archive_path: PathBuf::from("7.vpk"),
            size_bytes: 1,
            installed_at: Utc::now(),
            enabled: false,
            source: AddonSource::Workshop(WorkshopId::new(7)),
            status: AddonStatus::Ok,
        };
        assert_eq!(addon.display_name(), "Original");
        addon.custom_name = Some("Mine".to_string());
        assert_eq!(addon.display_name(), "Mine");
    }

    #[test]
    fn test_status_is_not_persisted() {
        let addon = Addon {
            id: AddonId::local("hud"),
            title: "hud".to_string(),
            custom_name: None,
            archive_path: PathBuf::from("hud.vpk"),
            size_bytes: 1,
            installed_at: Utc::now(),
            enabled: true,
            source: AddonSource::Local,
            status: AddonStatus::Broken,
        };
        let json = serde_json::to_string(&addon).unwrap();
        assert!(!json.contains("status"));
        let back: Addon = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, AddonStatus::Ok);
        assert_eq!(back.source, AddonSource::Local);
    }
}
