//! Reverse geocoding client.
//!
//! Resolves a coordinate to a human-readable address through the mapping
//! provider's geocode endpoint. Results are cached per coordinate for the
//! lifetime of the client; the UI re-requests the same point every render,
//! and the address for a fixed coordinate does not change mid-session.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::timeout;

use super::{Geocoder, RemoteError};
use crate::model::Coordinate;

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    results: Vec<GeocodeResult>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

struct CacheEntry {
    position: Coordinate,
    address: String,
}

/// HTTP reverse geocoder with a one-entry coordinate cache.
pub struct HttpGeocoder {
    base_url: String,
    api_key: String,
    timeout_seconds: u32,
    client: reqwest::Client,
    cache: Mutex<Option<CacheEntry>>,
}

impl HttpGeocoder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_seconds: u32) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_seconds,
            client: reqwest::Client::new(),
            cache: Mutex::new(None),
        }
    }

    fn build_url(&self, position: Coordinate) -> String {
        let latlng = format!("{},{}", position.lat, position.lng);
        format!(
            "{}?latlng={}&key={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&latlng),
            self.api_key
        )
    }

    fn cached(&self, position: Coordinate) -> Option<String> {
        let guard = self.cache.lock().ok()?;
        guard
            .as_ref()
            .filter(|entry| entry.position == position)
            .map(|entry| entry.address.clone())
    }

    fn remember(&self, position: Coordinate, address: &str) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = Some(CacheEntry {
                position,
                address: address.to_string(),
            });
        }
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn reverse(&self, position: Coordinate) -> Result<String, RemoteError> {
        if let Some(address) = self.cached(position) {
            debug!("reverse geocode cache hit for {},{}", position.lat, position.lng);
            return Ok(address);
        }

        let url = self.build_url(position);
        let send = self.client.get(&url).send();
        let response = timeout(Duration::from_secs(self.timeout_seconds as u64), send)
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout_seconds))?
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        if body.status != "OK" {
            return Err(RemoteError::Decode(format!(
                "geocoder status {}",
                body.status
            )));
        }
        let address = body
            .results
            .into_iter()
            .next()
            .map(|r| r.formatted_address)
            .ok_or_else(|| RemoteError::Decode("empty geocoder result set".to_string()))?;

        self.remember(position, &address);
        Ok(address)
    }
}
