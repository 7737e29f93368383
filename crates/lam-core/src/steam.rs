//! Steam Web API transport.
//!
//! Collections and item details come from the public `ISteamRemoteStorage`
//! endpoints, which need no API key. Payloads are plain HTTP downloads of the
//! `file_url` those endpoints report.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lam_schema::{ItemKind, WorkshopId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::transport::{CollectionMember, ItemDetails, ItemState, Transport, TransportError};

pub const STEAM_API_BASE: &str = "https://api.steampowered.com";

/// Steam `EWorkshopFileType` of a collection.
const FILE_TYPE_COLLECTION: i32 = 2;

/// [`Transport`] over the Steam Web API.
#[derive(Debug, Clone)]
pub struct SteamTransport {
    client: reqwest::Client,
    api_base: String,
}

impl SteamTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network {
                url: STEAM_API_BASE.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_base: STEAM_API_BASE.to_string(),
        })
    }

    /// Points API lookups somewhere else, e.g. a mock server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(String, String)],
    ) -> Result<T, TransportError> {
        let url = format!("{}/ISteamRemoteStorage/{endpoint}/v1/", self.api_base);
        let resp = self
            .client
            .post(&url)
            .form(form)
            .send()
            .await
            .map_err(|e| map_reqwest(&url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(|e| map_reqwest(&url, e))?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
            url,
            reason: e.to_string(),
        })
    }
}

fn map_reqwest(url: &str, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    collectiondetails: Vec<CollectionDetail>,
}

#[derive(Deserialize)]
struct CollectionDetail {
    publishedfileid: String,
    result: i32,
    #[serde(default)]
    children: Option<Vec<CollectionChild>>,
}

#[derive(Deserialize)]
struct CollectionChild {
    publishedfileid: String,
    #[serde(default)]
    filetype: i32,
}

#[derive(Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    publishedfiledetails: Vec<PublishedFile>,
}

#[derive(Deserialize)]
struct PublishedFile {
    publishedfileid: String,
    result: i32,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    file_size: Option<Lenient>,
}

// The API reports sizes as numbers or as decimal strings depending on the
// endpoint version.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(u64),
    Text(String),
}

impl Lenient {
    fn get(&self) -> Option<u64> {
        match self {
            Lenient::Number(n) => Some(*n),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn parse_id(raw: &str) -> Option<WorkshopId> {
    raw.parse::<u64>().ok().filter(|n| *n != 0).map(WorkshopId::new)
}

#[async_trait]
impl Transport for SteamTransport {
    #[instrument(skip(self))]
    async fn get_bytes(&self, url: &str) -> Result<Bytes, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.bytes().await.map_err(|e| map_reqwest(url, e))
    }

    #[instrument(skip(self))]
    async fn collection_members(
        &self,
        id: WorkshopId,
    ) -> Result<Option<Vec<CollectionMember>>, TransportError> {
        let form = vec![
            ("collectioncount".to_string(), "1".to_string()),
            ("publishedfileids[0]".to_string(), id.to_string()),
        ];
        let envelope: Envelope<CollectionResponse> =
            self.post_form("GetCollectionDetails", &form).await?;

        let Some(detail) = envelope
            .response
            .collectiondetails
            .into_iter()
            .find(|d| parse_id(&d.publishedfileid) == Some(id))
        else {
            return Ok(None);
        };
        // Plain items come back with a non-OK result or without children.
        if detail.result != 1 {
            return Ok(None);
        }
        let Some(children) = detail.children else {
            return Ok(None);
        };

        let members: Vec<CollectionMember> = children
            .into_iter()
            .filter_map(|child| {
                let member_id = parse_id(&child.publishedfileid)?;
                let kind = if child.filetype == FILE_TYPE_COLLECTION {
                    ItemKind::Collection
                } else {
                    ItemKind::Item
                };
                Some(CollectionMember {
                    id: member_id,
                    kind,
                })
            })
            .collect();
        debug!("collection {id} has {} members", members.len());
        Ok(Some(members))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn item_details(&self, ids: &[WorkshopId]) -> Result<Vec<ItemDetails>, TransportError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut form = Vec::with_capacity(ids.len() + 1);
        form.push(("itemcount".to_string(), ids.len().to_string()));
        for (i, id) in ids.iter().enumerate() {
            form.push((format!("publishedfileids[{i}]"), id.to_string()));
        }
        let envelope: Envelope<DetailsResponse> =
            self.post_form("GetPublishedFileDetails", &form).await?;

        let mut by_id: HashMap<WorkshopId, ItemDetails> = HashMap::new();
        for file in envelope.response.publishedfiledetails {
            let Some(file_id) = parse_id(&file.publishedfileid) else {
                continue;
            };
            by_id.insert(
                file_id,
                ItemDetails {
                    id: file_id,
                    state: ItemState::from_result_code(file.result),
                    title: file.title.filter(|t| !t.trim().is_empty()),
                    file_url: file.file_url.filter(|u| !u.trim().is_empty()),
                    file_size: file.file_size.as_ref().and_then(Lenient::get),
                },
            );
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(server: &mockito::Server) -> SteamTransport {
        SteamTransport::new(Duration::from_secs(5))
            .unwrap()
            .with_api_base(server.url())
    }

    #[tokio::test]
    async fn test_collection_members_keep_order_and_kinds() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/ISteamRemoteStorage/GetCollectionDetails/v1/")
            .with_status(200)
            .with_body(
                r#"{"response":{"result":1,"resultcount":1,"collectiondetails":[
                    {"publishedfileid":"100","result":1,"children":[
                        {"publishedfileid":"3","sortorder":0,"filetype":0},
                        {"publishedfileid":"1","sortorder":1,"filetype":0},
                        {"publishedfileid":"200","sortorder":2,"filetype":2}
                    ]}]}}"#,
            )
            .create_async()
            .await;

        let members = transport(&server)
            .collection_members(WorkshopId::new(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            members,
            vec![
                CollectionMember::item(3),
                CollectionMember::item(1),
                CollectionMember::collection(200),
            ]
        );
    }

    #[tokio::test]
    async fn test_plain_item_is_not_a_collection() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/ISteamRemoteStorage/GetCollectionDetails/v1/")
            .with_status(200)
            .with_body(
                r#"{"response":{"result":1,"resultcount":1,"collectiondetails":[
                    {"publishedfileid":"42","result":9}]}}"#,
            )
            .create_async()
            .await;

        let members = transport(&server)
            .collection_members(WorkshopId::new(42))
            .await
            .unwrap();
        assert!(members.is_none());
    }

    #[tokio::test]
    async fn test_item_details_lenient_sizes_and_states() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/ISteamRemoteStorage/GetPublishedFileDetails/v1/")
            .with_status(200)
            .with_body(
                r#"{"response":{"result":1,"resultcount":3,"publishedfiledetails":[
                    {"publishedfileid":"2","result":9},
                    {"publishedfileid":"1","result":1,"title":"Better Witch",
                     "file_url":"https://cdn.example/1.vpk","file_size":"1024"},
                    {"publishedfileid":"3","result":17}
                ]}}"#,
            )
            .create_async()
            .await;

        let ids = [WorkshopId::new(1), WorkshopId::new(2), WorkshopId::new(3)];
        let details = transport(&server).item_details(&ids).await.unwrap();

        assert_eq!(details.len(), 3);
        assert_eq!(details[0].id, WorkshopId::new(1));
        assert_eq!(details[0].state, ItemState::Available);
        assert_eq!(details[0].title.as_deref(), Some("Better Witch"));
        assert_eq!(details[0].file_size, Some(1024));
        assert_eq!(details[1].state, ItemState::NotFound);
        assert_eq!(details[2].state, ItemState::Private);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/file.vpk")
            .with_status(503)
            .create_async()
            .await;

        let err = transport(&server)
            .get_bytes(&format!("{}/file.vpk", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
    }
}
