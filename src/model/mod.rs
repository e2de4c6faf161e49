//! # Data Model
//!
//! Core value types shared across the discovery engine: coordinates, quests
//! and their steps, settled query parameters, filter/sort state, and favorite
//! records. Field names follow the quest-generation service's wire format via
//! serde renames, so the engine can decode responses without a translation
//! layer.
//!
//! Quests are produced entirely by the remote generation collaborator and are
//! treated as read-only here, with one exception: when the server omits
//! `distance`, the engine attaches a haversine distance from the fetch origin
//! (see [`haversine_km`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Mean Earth radius in kilometers, used by [`haversine_km`].
const EARTH_RADIUS_KM: f64 = 6371.0;

/// An immutable latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Whether a quest step points at a fixed place or a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Place,
    Event,
}

/// A single stop within a quest.
///
/// Steps are 1-based, dense, and unique within a quest; the collection is
/// kept sorted by `order`. The first step anchors the quest's map marker and
/// the last step is the route destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestStep {
    pub order: u32,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Minutes expected at this stop.
    #[serde(
        rename = "estimated_time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_time_minutes: Option<u32>,
    pub location: Coordinate,
}

/// A location-anchored multi-stop activity plan returned by the generation
/// service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    #[serde(rename = "quest_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Difficulty tag (e.g. `low_energy`, `medium_energy`, `high_energy`).
    pub difficulty: String,
    /// Total minutes across all steps.
    #[serde(rename = "estimated_time")]
    pub estimated_time_minutes: u32,
    pub estimated_cost: f64,
    pub steps: Vec<QuestStep>,
    pub tags: Vec<String>,
    /// Suggested time of day (morning/afternoon/evening/night).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_time: Option<String>,
    /// Kilometers from the query origin. Attached client-side when omitted.
    #[serde(rename = "distance", default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Quest {
    /// The marker anchor: the first step's location.
    pub fn anchor(&self) -> Option<Coordinate> {
        self.steps.first().map(|s| s.location)
    }

    /// The route destination: the last step's location.
    pub fn destination(&self) -> Option<Coordinate> {
        self.steps.last().map(|s| s.location)
    }

    /// Restore the step-order invariant after decoding an untrusted payload.
    pub fn normalize_steps(&mut self) {
        self.steps.sort_by_key(|s| s.order);
    }
}

/// The debounced, settled input to a remote quest fetch.
///
/// Compared by structural equality to decide whether a refetch is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameters {
    pub location: Coordinate,
    /// `[min, max]` kilometers, `min <= max`, both non-negative.
    pub radius_range_km: [f64; 2],
    /// Empty means "all categories".
    pub categories: BTreeSet<String>,
}

impl QueryParameters {
    pub fn new(location: Coordinate, radius_range_km: [f64; 2]) -> Self {
        Self {
            location,
            radius_range_km,
            categories: BTreeSet::new(),
        }
    }

    pub fn min_radius_km(&self) -> f64 {
        self.radius_range_km[0]
    }

    pub fn max_radius_km(&self) -> f64 {
        self.radius_range_km[1]
    }
}

/// Sort order applied by the filter/sort pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    DistanceAsc,
    DistanceDesc,
    NameAsc,
    NameDesc,
    PriceAsc,
    PriceDesc,
    TimeAsc,
    TimeDesc,
}

impl SortKey {
    /// Parse from a CLI/user string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "distance" | "distance-asc" => Some(SortKey::DistanceAsc),
            "distance-desc" => Some(SortKey::DistanceDesc),
            "name" | "name-asc" => Some(SortKey::NameAsc),
            "name-desc" => Some(SortKey::NameDesc),
            "price" | "price-asc" => Some(SortKey::PriceAsc),
            "price-desc" => Some(SortKey::PriceDesc),
            "time" | "time-asc" => Some(SortKey::TimeAsc),
            "time-desc" => Some(SortKey::TimeDesc),
            _ => None,
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::DistanceAsc
    }
}

/// UI-owned filter state consumed by the filter/sort pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    pub search_text: String,
    /// Empty means "all categories".
    pub selected_categories: BTreeSet<String>,
    pub sort_key: SortKey,
}

/// A persisted favorite: snapshot of the quest plus ownership metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub user_id: String,
    pub item_id: String,
    /// Discriminator kept for compatibility with the wider store schema.
    pub item_type: String,
    pub quest_data: Quest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl FavoriteRecord {
    /// Store key: favorites are keyed by owner and item.
    pub fn key(user_id: &str, item_id: &str) -> String {
        format!("{}_{}", user_id, item_id)
    }
}
