//! Turns a user-supplied Workshop reference into concrete items.

use std::collections::HashMap;
use std::sync::Arc;

use lam_schema::{ItemDescriptor, ItemKind, ReferenceError, WorkshopId};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::transport::{ItemDetails, ItemState, Transport, TransportError};

/// Why a Workshop reference could not be resolved.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    MalformedReference(#[from] ReferenceError),

    #[error("workshop item {id} not found: {reason}")]
    ReferenceNotFound { id: WorkshopId, reason: String },

    #[error("looking up workshop item {id} failed: {source}")]
    TransientFetchError {
        id: WorkshopId,
        #[source]
        source: TransportError,
    },
}

impl ResolveError {
    /// Whether trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::TransientFetchError { .. })
    }
}

/// Expands references into item descriptors through a [`Transport`].
#[derive(Clone)]
pub struct WorkshopResolver {
    transport: Arc<dyn Transport>,
}

impl WorkshopResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Resolves a reference (bare id, page URL or `steam://` link).
    ///
    /// A single item yields one descriptor. A collection yields one
    /// descriptor per member in collection order; nested collections come
    /// back as [`ItemKind::Collection`] and members the remote refuses to
    /// serve carry an `unavailable` reason instead of a download location.
    pub async fn resolve(&self, reference: &str) -> Result<Vec<ItemDescriptor>, ResolveError> {
        let id: WorkshopId = reference.trim().parse()?;
        self.resolve_id(id).await
    }

    #[instrument(skip(self))]
    pub async fn resolve_id(&self, id: WorkshopId) -> Result<Vec<ItemDescriptor>, ResolveError> {
        let transient = |source: TransportError| ResolveError::TransientFetchError { id, source };

        if let Some(members) = self
            .transport
            .collection_members(id)
            .await
            .map_err(transient)?
        {
            debug!("{id} is a collection of {}", members.len());
            let item_ids: Vec<WorkshopId> = members
                .iter()
                .filter(|m| m.kind == ItemKind::Item)
                .map(|m| m.id)
                .collect();
            let mut details: HashMap<WorkshopId, ItemDetails> = if item_ids.is_empty() {
                HashMap::new()
            } else {
                self.transport
                    .item_details(&item_ids)
                    .await
                    .map_err(transient)?
                    .into_iter()
                    .map(|d| (d.id, d))
                    .collect()
            };

            return Ok(members
                .into_iter()
                .map(|m| match m.kind {
                    ItemKind::Collection => ItemDescriptor::nested_collection(m.id),
                    ItemKind::Item => describe(m.id, details.remove(&m.id)),
                })
                .collect());
        }

        let details = self
            .transport
            .item_details(&[id])
            .await
            .map_err(transient)?
            .into_iter()
            .find(|d| d.id == id);
        if let Some(ItemState::Busy(code)) = details.as_ref().map(|d| d.state) {
            return Err(transient(TransportError::Busy { url: id.url(), code }));
        }
        let descriptor = describe(id, details);
        match descriptor.unavailable {
            Some(reason) => Err(ResolveError::ReferenceNotFound { id, reason }),
            None => Ok(vec![descriptor]),
        }
    }
}

fn describe(id: WorkshopId, details: Option<ItemDetails>) -> ItemDescriptor {
    let Some(details) = details else {
        return ItemDescriptor::unavailable(id, "unknown to the workshop");
    };
    let reason = match details.state {
        ItemState::Available => None,
        ItemState::NotFound => Some("removed from the workshop".to_string()),
        ItemState::Private => Some("private or friends-only".to_string()),
        ItemState::Busy(code) => Some(format!(
            "temporarily unavailable (result code {code}), try again later"
        )),
        ItemState::Failed(code) => Some(format!("workshop returned result code {code}")),
    };
    let mut descriptor = match (reason, details.file_url) {
        (Some(reason), _) => ItemDescriptor::unavailable(id, reason),
        (None, None) => ItemDescriptor::unavailable(id, "no download location"),
        (None, Some(url)) => ItemDescriptor::item(id, url),
    };
    descriptor.title = details.title;
    descriptor.file_size = details.file_size;
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CollectionMember, MemoryTransport};

    fn resolver(transport: MemoryTransport) -> WorkshopResolver {
        WorkshopResolver::new(Arc::new(transport))
    }

    #[tokio::test]
    async fn test_single_item() {
        let r = resolver(MemoryTransport::new().with_item(42, "Better Witch", &b"VPK"[..]));
        let items = r.resolve("42").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, WorkshopId::new(42));
        assert_eq!(items[0].title.as_deref(), Some("Better Witch"));
        assert_eq!(items[0].download_url.as_deref(), Some("mem://items/42.vpk"));
    }

    #[tokio::test]
    async fn test_reference_forms_resolve_identically() {
        let r = resolver(MemoryTransport::new().with_item(42, "Witch", &b"VPK"[..]));
        let a = r.resolve("42").await.unwrap();
        let b = r
            .resolve("https://steamcommunity.com/sharedfiles/filedetails/?id=42")
            .await
            .unwrap();
        let c = r.resolve("steam://url/CommunityFilePage/42").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[tokio::test]
    async fn test_collection_order_and_nested_reported() {
        let transport = MemoryTransport::new()
            .with_item(3, "Three", &b"3"[..])
            .with_item(1, "One", &b"1"[..])
            .with_collection(
                100,
                vec![
                    CollectionMember::item(3),
                    CollectionMember::collection(200),
                    CollectionMember::item(1),
                ],
            );
        let items = resolver(transport).resolve("100").await.unwrap();

        let ids: Vec<u64> = items.iter().map(|d| d.id.get()).collect();
        assert_eq!(ids, vec![3, 200, 1]);
        assert_eq!(items[1].kind, ItemKind::Collection);
        assert!(items[1].download_url.is_none());
    }

    #[tokio::test]
    async fn test_removed_member_is_marked_not_dropped() {
        let transport = MemoryTransport::new()
            .with_item(1, "One", &b"1"[..])
            .with_item(3, "Three", &b"3"[..])
            .with_item_state(2, ItemState::NotFound)
            .with_collection(
                100,
                vec![
                    CollectionMember::item(1),
                    CollectionMember::item(2),
                    CollectionMember::item(3),
                ],
            );
        let items = resolver(transport).resolve("100").await.unwrap();

        assert_eq!(items.len(), 3);
        let downloadable = items.iter().filter(|d| d.unavailable.is_none()).count();
        assert_eq!(downloadable, 2);
        assert!(items[1].unavailable.is_some());
    }

    #[tokio::test]
    async fn test_missing_single_item() {
        let r = resolver(MemoryTransport::new());
        let err = r.resolve("7").await.unwrap_err();
        assert!(matches!(err, ResolveError::ReferenceNotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_reference() {
        let r = resolver(MemoryTransport::new());
        let err = r.resolve("not-a-reference").await.unwrap_err();
        assert!(matches!(err, ResolveError::MalformedReference(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_retryable() {
        let r = resolver(MemoryTransport::new().with_lookup_failure(TransportError::Timeout {
            url: "mem://lookup".into(),
        }));
        let err = r.resolve("42").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_busy_item_is_retryable_not_missing() {
        let r = resolver(MemoryTransport::new().with_item_state(42, ItemState::Busy(16)));
        let err = r.resolve("42").await.unwrap_err();
        assert!(matches!(err, ResolveError::TransientFetchError { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_busy_collection_member_keeps_its_slot() {
        let transport = MemoryTransport::new()
            .with_item(1, "One", &b"1"[..])
            .with_item_state(2, ItemState::Busy(20))
            .with_collection(
                100,
                vec![CollectionMember::item(1), CollectionMember::item(2)],
            );
        let items = resolver(transport).resolve("100").await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].unavailable.is_none());
        let reason = items[1].unavailable.as_deref().unwrap();
        assert!(reason.contains("try again"));
    }
}
