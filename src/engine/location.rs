//! Location acquisition.
//!
//! A single best-effort attempt against a [`LocationSource`] with a timeout.
//! Denial, timeout, or the absence of any positioning capability all resolve
//! to the configured fallback coordinate plus a warning string the UI can
//! show as a banner; acquisition never fails the overall flow and is never
//! retried automatically. A later user-initiated location search re-enters
//! the engine through the same resolved-coordinate path.

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::LocationConfig;
use crate::model::Coordinate;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("no positioning capability available")]
    Unavailable,

    #[error("position lookup failed: {0}")]
    Lookup(String),
}

/// A positioning capability: platform service, IP lookup, or fixed config.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, LocationError>;
}

/// The outcome of an acquisition attempt. Always carries a usable
/// coordinate; `warning` is set when the fallback had to be used.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub position: Coordinate,
    pub warning: Option<String>,
}

/// Fixed coordinate from configuration.
pub struct StaticLocationSource {
    position: Coordinate,
}

impl StaticLocationSource {
    pub fn new(position: Coordinate) -> Self {
        Self { position }
    }
}

#[async_trait]
impl LocationSource for StaticLocationSource {
    async fn current_position(&self) -> Result<Coordinate, LocationError> {
        Ok(self.position)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

/// Best-effort IP geolocation.
pub struct IpLocationSource {
    endpoint: String,
    client: reqwest::Client,
}

impl IpLocationSource {
    pub fn new() -> Self {
        Self::with_endpoint("http://ip-api.com/json")
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for IpLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationSource for IpLocationSource {
    async fn current_position(&self) -> Result<Coordinate, LocationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| LocationError::Lookup(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LocationError::Lookup(format!(
                "status {}",
                response.status()
            )));
        }
        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| LocationError::Lookup(e.to_string()))?;
        match (body.status.as_str(), body.lat, body.lon) {
            ("success", Some(lat), Some(lon)) => Ok(Coordinate::new(lat, lon)),
            _ => Err(LocationError::Lookup(format!("lookup status {}", body.status))),
        }
    }
}

/// Acquires the session's starting coordinate exactly once.
pub struct LocationProvider {
    source: Box<dyn LocationSource>,
    fallback: Coordinate,
    attempt_timeout: Duration,
}

impl LocationProvider {
    pub fn new(source: Box<dyn LocationSource>, fallback: Coordinate, attempt_timeout: Duration) -> Self {
        Self {
            source,
            fallback,
            attempt_timeout,
        }
    }

    /// Build from configuration: "static" uses the configured coordinate,
    /// anything else attempts IP geolocation.
    pub fn from_config(config: &LocationConfig) -> Self {
        let source: Box<dyn LocationSource> = match config.source.as_str() {
            "ip" => Box::new(IpLocationSource::new()),
            _ => Box::new(StaticLocationSource::new(config.static_coordinate())),
        };
        Self::new(
            source,
            config.fallback_coordinate(),
            Duration::from_secs(config.timeout_seconds as u64),
        )
    }

    /// One best-effort attempt. Never errors; degraded outcomes carry a
    /// warning for the UI banner.
    pub async fn acquire(&self) -> LocationFix {
        match timeout(self.attempt_timeout, self.source.current_position()).await {
            Ok(Ok(position)) => {
                debug!("location resolved to {},{}", position.lat, position.lng);
                LocationFix {
                    position,
                    warning: None,
                }
            }
            Ok(Err(e)) => {
                warn!("location acquisition failed: {e}; using fallback");
                LocationFix {
                    position: self.fallback,
                    warning: Some(format!("Could not determine your location ({e}); showing results near the default area.")),
                }
            }
            Err(_) => {
                warn!(
                    "location acquisition timed out after {:?}; using fallback",
                    self.attempt_timeout
                );
                LocationFix {
                    position: self.fallback,
                    warning: Some(
                        "Location lookup timed out; showing results near the default area."
                            .to_string(),
                    ),
                }
            }
        }
    }
}
