//! The network capability the core depends on.
//!
//! Nothing in the core opens sockets; every remote lookup and download goes
//! through a [`Transport`]. The HTTP implementation lives in
//! [`crate::steam`]; [`MemoryTransport`] serves canned data for offline use
//! and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use lam_schema::{ItemKind, WorkshopId};
use thiserror::Error;

/// Failures talking to the remote.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to '{url}' timed out")]
    Timeout { url: String },

    #[error("request to '{url}' failed: {reason}")]
    Network { url: String, reason: String },

    #[error("'{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response from '{url}': {reason}")]
    Decode { url: String, reason: String },

    #[error("'{url}' is temporarily unavailable (result code {code})")]
    Busy { url: String, code: i32 },
}

/// One entry of a collection, in the order the remote reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionMember {
    pub id: WorkshopId,
    pub kind: ItemKind,
}

impl CollectionMember {
    pub fn item(id: u64) -> Self {
        Self {
            id: WorkshopId::new(id),
            kind: ItemKind::Item,
        }
    }

    pub fn collection(id: u64) -> Self {
        Self {
            id: WorkshopId::new(id),
            kind: ItemKind::Collection,
        }
    }
}

/// Remote availability of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Available,
    NotFound,
    Private,
    /// A result code that may clear up on retry.
    Busy(i32),
    /// Any other remote result code.
    Failed(i32),
}

impl ItemState {
    /// Maps a Steam Web API `EResult` code.
    pub fn from_result_code(code: i32) -> Self {
        match code {
            1 => Self::Available,
            9 => Self::NotFound,
            17 => Self::Private,
            2 | 3 | 10 | 16 | 20 | 25 => Self::Busy(code),
            other => Self::Failed(other),
        }
    }
}

/// Metadata the remote reports for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetails {
    pub id: WorkshopId,
    pub state: ItemState,
    pub title: Option<String>,
    pub file_url: Option<String>,
    pub file_size: Option<u64>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Downloads the body behind `url`.
    async fn get_bytes(&self, url: &str) -> Result<Bytes, TransportError>;

    /// Members of collection `id`, or `None` if `id` is not a collection.
    async fn collection_members(
        &self,
        id: WorkshopId,
    ) -> Result<Option<Vec<CollectionMember>>, TransportError>;

    /// Details for each requested id. Ids the remote does not mention are
    /// simply absent from the result.
    async fn item_details(&self, ids: &[WorkshopId]) -> Result<Vec<ItemDetails>, TransportError>;
}

/// Canned in-memory transport.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    blobs: HashMap<String, Result<Bytes, TransportError>>,
    items: HashMap<WorkshopId, ItemDetails>,
    collections: HashMap<WorkshopId, Vec<CollectionMember>>,
    lookup_failure: Option<TransportError>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// URL under which [`with_item`](Self::with_item) serves an item's payload.
    pub fn item_url(id: u64) -> String {
        format!("mem://items/{id}.vpk")
    }

    /// Registers an available item and its payload.
    pub fn with_item(mut self, id: u64, title: &str, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let url = Self::item_url(id);
        self.items.insert(
            WorkshopId::new(id),
            ItemDetails {
                id: WorkshopId::new(id),
                state: ItemState::Available,
                title: Some(title.to_string()),
                file_url: Some(url.clone()),
                file_size: Some(payload.len() as u64),
            },
        );
        self.blobs.insert(url, Ok(payload));
        self
    }

    /// Registers an item the remote refuses to serve.
    pub fn with_item_state(mut self, id: u64, state: ItemState) -> Self {
        self.items.insert(
            WorkshopId::new(id),
            ItemDetails {
                id: WorkshopId::new(id),
                state,
                title: None,
                file_url: None,
                file_size: None,
            },
        );
        self
    }

    pub fn with_collection(mut self, id: u64, members: Vec<CollectionMember>) -> Self {
        self.collections.insert(WorkshopId::new(id), members);
        self
    }

    /// Serves `payload` at an arbitrary URL.
    pub fn with_blob(mut self, url: &str, payload: impl Into<Bytes>) -> Self {
        self.blobs.insert(url.to_string(), Ok(payload.into()));
        self
    }

    /// Makes downloads of `url` fail with `error`.
    pub fn with_failing_blob(mut self, url: &str, error: TransportError) -> Self {
        self.blobs.insert(url.to_string(), Err(error));
        self
    }

    /// Makes every collection/details lookup fail with `error`.
    pub fn with_lookup_failure(mut self, error: TransportError) -> Self {
        self.lookup_failure = Some(error);
        self
    }

    /// URLs passed to `get_bytes`, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        match self.blobs.get(url) {
            Some(result) => result.clone(),
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    async fn collection_members(
        &self,
        id: WorkshopId,
    ) -> Result<Option<Vec<CollectionMember>>, TransportError> {
        if let Some(err) = &self.lookup_failure {
            return Err(err.clone());
        }
        Ok(self.collections.get(&id).cloned())
    }

    async fn item_details(&self, ids: &[WorkshopId]) -> Result<Vec<ItemDetails>, TransportError> {
        if let Some(err) = &self.lookup_failure {
            return Err(err.clone());
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.items.get(id).cloned())
            .collect())
    }
}
