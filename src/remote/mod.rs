//! # Remote Collaborators
//!
//! Trait boundaries for the external services the engine orchestrates but
//! does not implement: the quest-generation service, the mapping library,
//! and reverse geocoding. Each is consumed as an opaque async call; failures
//! surface as [`RemoteError`] values, never as panics.

pub mod geocode;
pub mod map;
pub mod quests;

pub use geocode::HttpGeocoder;
pub use map::{
    HeadlessCanvas, HeadlessMapLibrary, InfoPanelContent, MapCanvas, MapError, MapLibrary,
    MarkerId,
};
pub use quests::QuestApiClient;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::model::{Coordinate, Quest, QueryParameters};

/// Errors from a remote collaborator call.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request timed out after {0}s")]
    Timeout(u32),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned status {0}")]
    Status(u16),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Generation hints nested under `preferences` on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationPreferences {
    pub min_radius_km: f64,
}

/// Request body for the quest-generation collaborator.
///
/// `categories` is `None` (not an empty list) when the caller wants the full
/// generation breadth.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateQuestsRequest {
    pub location: Coordinate,
    pub radius_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    pub preferences: GenerationPreferences,
}

impl From<&QueryParameters> for GenerateQuestsRequest {
    fn from(params: &QueryParameters) -> Self {
        let categories = if params.categories.is_empty() {
            None
        } else {
            Some(params.categories.iter().cloned().collect())
        };
        Self {
            location: params.location,
            radius_km: params.max_radius_km(),
            categories,
            preferences: GenerationPreferences {
                min_radius_km: params.min_radius_km(),
            },
        }
    }
}

/// The quest-generation collaborator.
#[async_trait]
pub trait QuestService: Send + Sync {
    async fn generate(&self, request: GenerateQuestsRequest) -> Result<Vec<Quest>, RemoteError>;
}

/// Reverse geocoding: turn a coordinate into a display string.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, position: Coordinate) -> Result<String, RemoteError>;
}
