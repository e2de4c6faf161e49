//! # Configuration Management Module
//!
//! Centralized configuration for the discovery engine: quest-generation API
//! endpoint, location acquisition, debounce and map tuning, storage paths,
//! and logging. Values load from a TOML file with sensible defaults and are
//! validated before the engine starts.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000/api"
//! timeout_seconds = 15
//!
//! [location]
//! source = "static"
//! lat = 43.2557
//! lng = -79.8711
//! fallback_lat = 43.2557
//! fallback_lng = -79.8711
//! timeout_seconds = 5
//!
//! [discovery]
//! radius_debounce_ms = 300
//! min_radius_km = 0.0
//! max_radius_km = 10.0
//! map_zoom = 13
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::model::Coordinate;

/// Quest-generation collaborator endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the quest-generation service, without a trailing slash.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_seconds: 15,
        }
    }
}

/// How the session's starting coordinate is acquired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// "static" (use `lat`/`lng` below) or "ip" (best-effort IP geolocation).
    pub source: String,
    pub lat: f64,
    pub lng: f64,
    /// Fallback coordinate used when acquisition fails or times out.
    pub fallback_lat: f64,
    pub fallback_lng: f64,
    /// Acquisition timeout in seconds.
    pub timeout_seconds: u32,
}

impl Default for LocationConfig {
    fn default() -> Self {
        // Hamilton, ON, the original deployment's home turf.
        Self {
            source: "static".to_string(),
            lat: 43.2557,
            lng: -79.8711,
            fallback_lat: 43.2557,
            fallback_lng: -79.8711,
            timeout_seconds: 5,
        }
    }
}

impl LocationConfig {
    pub fn static_coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }

    pub fn fallback_coordinate(&self) -> Coordinate {
        Coordinate::new(self.fallback_lat, self.fallback_lng)
    }
}

/// Tuning for the discovery pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Quiet window for radius/category fetch-hint changes (ms).
    pub radius_debounce_ms: u64,
    /// Default radius range in kilometers.
    pub min_radius_km: f64,
    pub max_radius_km: f64,
    /// Initial map zoom level.
    pub map_zoom: u8,
    /// Default category hints sent with the first fetch (empty = all).
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            radius_debounce_ms: 300,
            min_radius_km: 0.0,
            max_radius_km: 10.0,
            map_zoom: 13,
            categories: Vec::new(),
        }
    }
}

/// Optional reverse-geocoding collaborator for the "near ..." heading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Disabled by default; the engine works fine without an address.
    pub enabled: bool,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub timeout_seconds: u32,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            api_key: String::new(),
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file and validate it.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(anyhow!("api.base_url must not be empty"));
        }
        if self.api.timeout_seconds == 0 {
            return Err(anyhow!("api.timeout_seconds must be positive"));
        }
        match self.location.source.as_str() {
            "static" | "ip" => {}
            other => return Err(anyhow!("location.source must be 'static' or 'ip', got '{other}'")),
        }
        if self.discovery.min_radius_km < 0.0 || self.discovery.max_radius_km < 0.0 {
            return Err(anyhow!("discovery radius values must be non-negative"));
        }
        if self.geocode.enabled && self.geocode.api_key.is_empty() {
            return Err(anyhow!("geocode.api_key is required when geocode.enabled"));
        }
        if self.discovery.min_radius_km > self.discovery.max_radius_km {
            return Err(anyhow!(
                "discovery.min_radius_km ({}) exceeds max_radius_km ({})",
                self.discovery.min_radius_km,
                self.discovery.max_radius_km
            ));
        }
        Ok(())
    }

    /// Default radius range as the `[min, max]` pair used by query parameters.
    pub fn default_radius_range(&self) -> [f64; 2] {
        [self.discovery.min_radius_km, self.discovery.max_radius_km]
    }
}
