//! Registry Actor - serialized access to the addon registry
//!
//! The registry is a plain in-memory structure with file-backed autosave.
//! Parallel fetches must not interleave their mutations, so the registry
//! lives on a dedicated background thread and callers talk to it via
//! message passing.

use std::fmt;
use std::sync::mpsc;
use std::thread;
use thiserror::Error;
use tokio::sync::oneshot;

use lam_core::registry::{AddonRegistry, RegistryError, SortKey};
use lam_core::store::ArchiveHandle;
use lam_schema::{Addon, AddonId, ItemDescriptor};

#[derive(Error, Debug)]
pub enum ActorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("registry actor stopped")]
    ActorDied,
}

type Reply<T> = oneshot::Sender<Result<T, RegistryError>>;

/// Events that can be sent to the registry actor
pub enum RegistryEvent {
    /// Copy of every entry in registry order
    Snapshot { resp: Reply<Vec<Addon>> },
    Get {
        id: AddonId,
        resp: Reply<Option<Addon>>,
    },
    /// Display-name search, ordered by `key`
    Search {
        query: String,
        key: SortKey,
        resp: Reply<Vec<Addon>>,
    },
    /// Record a fetched workshop item
    Install {
        descriptor: ItemDescriptor,
        handle: ArchiveHandle,
        resp: Reply<Addon>,
    },
    /// Record a hand-placed archive
    RegisterLocal {
        handle: ArchiveHandle,
        resp: Reply<Addon>,
    },
    SetEnabled {
        id: AddonId,
        enabled: bool,
        resp: Reply<bool>,
    },
    SetAllEnabled { enabled: bool, resp: Reply<usize> },
    /// `None` restores the archive title
    Rename {
        id: AddonId,
        name: Option<String>,
        resp: Reply<()>,
    },
    Uninstall { id: AddonId, resp: Reply<Addon> },
    /// Whether the manifest is behind the registry
    IsDirty { resp: Reply<bool> },
    MarkPatched { resp: Reply<()> },
    /// Shutdown the actor
    Shutdown,
}

impl fmt::Debug for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot { .. } => write!(f, "Snapshot"),
            Self::Get { id, .. } => f.debug_struct("Get").field("id", id).finish_non_exhaustive(),
            Self::Search { query, key, .. } => f
                .debug_struct("Search")
                .field("query", query)
                .field("key", key)
                .finish_non_exhaustive(),
            Self::Install { handle, .. } => f
                .debug_struct("Install")
                .field("id", &handle.id)
                .finish_non_exhaustive(),
            Self::RegisterLocal { handle, .. } => f
                .debug_struct("RegisterLocal")
                .field("id", &handle.id)
                .finish_non_exhaustive(),
            Self::SetEnabled { id, enabled, .. } => f
                .debug_struct("SetEnabled")
                .field("id", id)
                .field("enabled", enabled)
                .finish_non_exhaustive(),
            Self::SetAllEnabled { enabled, .. } => f
                .debug_struct("SetAllEnabled")
                .field("enabled", enabled)
                .finish_non_exhaustive(),
            Self::Rename { id, name, .. } => f
                .debug_struct("Rename")
                .field("id", id)
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Uninstall { id, .. } => f
                .debug_struct("Uninstall")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::IsDirty { .. } => write!(f, "IsDirty"),
            Self::MarkPatched { .. } => write!(f, "MarkPatched"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// A handle to the registry actor that is Send + Sync and Clone.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryEvent>,
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle").finish_non_exhaustive()
    }
}

impl RegistryHandle {
    /// Move `registry` onto a new actor thread
    pub fn spawn(registry: AddonRegistry) -> Self {
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            run_registry_event_loop(registry, receiver);
        });

        Self { sender }
    }

    /// Helper to send a request and wait for the response
    async fn request<T, F>(&self, f: F) -> Result<T, ActorError>
    where
        F: FnOnce(Reply<T>) -> RegistryEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| ActorError::ActorDied)?;
        Ok(rx.await.map_err(|_| ActorError::ActorDied)??)
    }

    pub async fn snapshot(&self) -> Result<Vec<Addon>, ActorError> {
        self.request(|resp| RegistryEvent::Snapshot { resp }).await
    }

    pub async fn get(&self, id: AddonId) -> Result<Option<Addon>, ActorError> {
        self.request(|resp| RegistryEvent::Get { id, resp }).await
    }

    pub async fn search(&self, query: &str, key: SortKey) -> Result<Vec<Addon>, ActorError> {
        let query = query.to_string();
        self.request(|resp| RegistryEvent::Search { query, key, resp })
            .await
    }

    pub async fn install(
        &self,
        descriptor: ItemDescriptor,
        handle: ArchiveHandle,
    ) -> Result<Addon, ActorError> {
        self.request(|resp| RegistryEvent::Install {
            descriptor,
            handle,
            resp,
        })
        .await
    }

    pub async fn register_local(&self, handle: ArchiveHandle) -> Result<Addon, ActorError> {
        self.request(|resp| RegistryEvent::RegisterLocal { handle, resp })
            .await
    }

    pub async fn set_enabled(&self, id: AddonId, enabled: bool) -> Result<bool, ActorError> {
        self.request(|resp| RegistryEvent::SetEnabled { id, enabled, resp })
            .await
    }

    pub async fn set_all_enabled(&self, enabled: bool) -> Result<usize, ActorError> {
        self.request(|resp| RegistryEvent::SetAllEnabled { enabled, resp })
            .await
    }

    pub async fn rename(&self, id: AddonId, name: Option<String>) -> Result<(), ActorError> {
        self.request(|resp| RegistryEvent::Rename { id, name, resp })
            .await
    }

    pub async fn uninstall(&self, id: AddonId) -> Result<Addon, ActorError> {
        self.request(|resp| RegistryEvent::Uninstall { id, resp })
            .await
    }

    pub async fn is_dirty(&self) -> Result<bool, ActorError> {
        self.request(|resp| RegistryEvent::IsDirty { resp }).await
    }

    pub async fn mark_patched(&self) -> Result<(), ActorError> {
        self.request(|resp| RegistryEvent::MarkPatched { resp })
            .await
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(RegistryEvent::Shutdown);
    }
}

/// The actual event loop running in the background thread
#[allow(clippy::needless_pass_by_value)]
fn run_registry_event_loop(mut registry: AddonRegistry, receiver: mpsc::Receiver<RegistryEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            RegistryEvent::Snapshot { resp } => {
                let _ = resp.send(Ok(registry.iter().cloned().collect()));
            }
            RegistryEvent::Get { id, resp } => {
                let _ = resp.send(Ok(registry.get(&id).cloned()));
            }
            RegistryEvent::Search { query, key, resp } => {
                let hits = registry
                    .search_sorted(&query, key)
                    .into_iter()
                    .cloned()
                    .collect();
                let _ = resp.send(Ok(hits));
            }
            RegistryEvent::Install {
                descriptor,
                handle,
                resp,
            } => {
                let _ = resp.send(registry.install(&descriptor, &handle));
            }
            RegistryEvent::RegisterLocal { handle, resp } => {
                let _ = resp.send(registry.register_local(&handle));
            }
            RegistryEvent::SetEnabled { id, enabled, resp } => {
                let _ = resp.send(registry.set_enabled(&id, enabled));
            }
            RegistryEvent::SetAllEnabled { enabled, resp } => {
                let _ = resp.send(registry.set_all_enabled(enabled));
            }
            RegistryEvent::Rename { id, name, resp } => {
                let result = match name {
                    Some(name) => registry.rename(&id, &name),
                    None => registry.reset_name(&id),
                };
                let _ = resp.send(result);
            }
            RegistryEvent::Uninstall { id, resp } => {
                let _ = resp.send(registry.uninstall(&id));
            }
            RegistryEvent::IsDirty { resp } => {
                let _ = resp.send(Ok(registry.is_dirty()));
            }
            RegistryEvent::MarkPatched { resp } => {
                registry.mark_patched();
                let _ = resp.send(Ok(()));
            }
            RegistryEvent::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lam_schema::WorkshopId;

    fn handle(dir: &std::path::Path, id: u64) -> (ItemDescriptor, ArchiveHandle) {
        let path = dir.join(format!("{id}.vpk"));
        std::fs::write(&path, b"x").unwrap();
        (
            ItemDescriptor::item(WorkshopId::new(id), "mem://x").with_title("Title"),
            ArchiveHandle {
                id: AddonId::workshop(WorkshopId::new(id)),
                path,
                size_bytes: 1,
                title: None,
            },
        )
    }

    #[tokio::test]
    async fn test_actor_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let actor = RegistryHandle::spawn(AddonRegistry::in_memory());
        let (d, h) = handle(dir.path(), 42);
        let id = h.id.clone();

        actor.install(d, h).await.unwrap();
        assert!(actor.set_enabled(id.clone(), true).await.unwrap());
        assert!(actor.is_dirty().await.unwrap());
        actor.mark_patched().await.unwrap();
        assert!(!actor.is_dirty().await.unwrap());

        actor.rename(id.clone(), Some("Mine".into())).await.unwrap();
        let addon = actor.get(id.clone()).await.unwrap().unwrap();
        assert_eq!(addon.display_name(), "Mine");
        let hits = actor.search("mIn", SortKey::Name).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(actor.search("title", SortKey::Name).await.unwrap().is_empty());

        let err = actor
            .set_enabled(AddonId::workshop(WorkshopId::new(7)), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ActorError::Registry(RegistryError::NotFound { .. })
        ));
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_stopped_actor() {
        let actor = RegistryHandle::spawn(AddonRegistry::in_memory());
        actor.shutdown();
        // Give the thread a moment to exit.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(matches!(
            actor.snapshot().await,
            Err(ActorError::ActorDied)
        ));
    }
}
