//! HTTP adapter for the campus REST API.
//!
//! Endpoint layout (relative to the configured base URL):
//!
//! | Call | Request |
//! |------|---------|
//! | list / by id | `GET /buildings`, `GET /buildings/{id}` |
//! | filter | `GET /buildings?category=`, `GET /places?building_id=`, `GET /events?type=` |
//! | search | `GET /buildings/search?q=` (same for places and events) |
//! | event detail | `GET /events/{id}/detail` |
//! | push detail | `PUT /events/{id}/detail`, or `POST /events/details` for new records |
//! | push visit | `POST /visits` |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use campus_core::{HttpRemote, RemoteDataSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = HttpRemote::new("https://campus.example.edu/api", Duration::from_secs(10))?;
//! let buildings = remote.list_buildings().await?;
//! println!("{} buildings", buildings.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use campus_types::{
    Building, EntityId, Event, EventDetailPayload, EventType, PlacePayload, UNSAVED_ID,
    VisitedItem,
};

use crate::error::{Error, Result};
use crate::remote::{RemoteDataSource, RemoteError, RemoteResult};

/// Reqwest-backed [`RemoteDataSource`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    id: EntityId,
}

impl HttpRemote {
    /// Create a client with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("HTTP client: {}", e)))?;
        Self::with_client(base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        // Normalize URL (remove trailing slash)
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        Ok(Self { client, base_url })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ======================================================================
    // Internal HTTP helpers
    // ======================================================================

    async fn send(&self, request: RequestBuilder) -> RemoteResult<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> RemoteResult<Vec<T>> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.send(self.client.get(&url).query(query)).await?;
        handle_response(response).await
    }

    /// GET a single record; 404 is a legitimate "no such record".
    async fn get_one<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<Option<T>> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.send(self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        handle_response(response).await.map(Some)
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> RemoteResult<T> {
    let status = response.status();
    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| RemoteError::Network(format!("Invalid response body: {}", e)))
    } else {
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| status.to_string());

        Err(RemoteError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

async fn expect_success(response: reqwest::Response) -> RemoteResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(RemoteError::Http {
            status: status.as_u16(),
            message: status.to_string(),
        })
    }
}

#[async_trait]
impl RemoteDataSource for HttpRemote {
    async fn list_buildings(&self) -> RemoteResult<Vec<Building>> {
        self.get_list("/buildings", &[]).await
    }

    async fn get_building(&self, id: EntityId) -> RemoteResult<Option<Building>> {
        self.get_one(&format!("/buildings/{}", id)).await
    }

    async fn buildings_by_category(&self, category: &str) -> RemoteResult<Vec<Building>> {
        self.get_list("/buildings", &[("category", category.to_string())])
            .await
    }

    async fn search_buildings(&self, text: &str) -> RemoteResult<Vec<Building>> {
        self.get_list("/buildings/search", &[("q", text.to_string())])
            .await
    }

    async fn list_places(&self) -> RemoteResult<Vec<PlacePayload>> {
        self.get_list("/places", &[]).await
    }

    async fn get_place(&self, id: EntityId) -> RemoteResult<Option<PlacePayload>> {
        self.get_one(&format!("/places/{}", id)).await
    }

    async fn places_by_building(&self, building_id: EntityId) -> RemoteResult<Vec<PlacePayload>> {
        self.get_list("/places", &[("building_id", building_id.to_string())])
            .await
    }

    async fn places_by_category(&self, category: &str) -> RemoteResult<Vec<PlacePayload>> {
        self.get_list("/places", &[("category", category.to_string())])
            .await
    }

    async fn search_places(&self, text: &str) -> RemoteResult<Vec<PlacePayload>> {
        self.get_list("/places/search", &[("q", text.to_string())])
            .await
    }

    async fn list_events(&self) -> RemoteResult<Vec<Event>> {
        self.get_list("/events", &[]).await
    }

    async fn get_event(&self, id: EntityId) -> RemoteResult<Option<Event>> {
        self.get_one(&format!("/events/{}", id)).await
    }

    async fn events_by_type(&self, event_type: EventType) -> RemoteResult<Vec<Event>> {
        self.get_list("/events", &[("type", event_type.as_str().to_string())])
            .await
    }

    async fn search_events(&self, text: &str) -> RemoteResult<Vec<Event>> {
        self.get_list("/events/search", &[("q", text.to_string())])
            .await
    }

    async fn get_event_detail(&self, id: EntityId) -> RemoteResult<Option<EventDetailPayload>> {
        self.get_one(&format!("/events/{}/detail", id)).await
    }

    async fn push_event_detail(&self, detail: &EventDetailPayload) -> RemoteResult<EntityId> {
        let request = if detail.event.id == UNSAVED_ID {
            self.client.post(self.url("/events/details"))
        } else {
            self.client
                .put(self.url(&format!("/events/{}/detail", detail.event.id)))
        };

        let response = self.send(request.json(detail)).await?;
        let confirmed: PushResponse = handle_response(response).await?;
        Ok(confirmed.id)
    }

    async fn push_visit(&self, visit: &VisitedItem) -> RemoteResult<()> {
        let response = self
            .send(self.client.post(self.url("/visits")).json(visit))
            .await?;
        expect_success(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let remote = HttpRemote::new("http://localhost:8080", Duration::from_secs(5)).unwrap();
        assert_eq!(remote.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_normalizes_url() {
        let remote =
            HttpRemote::new("https://campus.example/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(remote.base_url(), "https://campus.example/api");
        assert_eq!(remote.url("/buildings/3"), "https://campus.example/api/buildings/3");
    }

    #[test]
    fn test_client_invalid_url() {
        let result = HttpRemote::new("campus.example", Duration::from_secs(5));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let remote = HttpRemote::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            remote.list_buildings().await,
            Err(RemoteError::Network(_))
        ));
    }
}
