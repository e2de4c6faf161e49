//! # Sidequest - Location-Anchored Quest Discovery
//!
//! Sidequest is the client-side engine behind a "what should I do nearby"
//! experience: it asks a remote generation service for multi-step quests
//! anchored around a coordinate, keeps a filtered and sorted view of the
//! results, and mirrors that view onto an interactive map.
//!
//! ## Features
//!
//! - **Debounced Discovery**: Radius and category changes coalesce in a quiet
//!   window so slider drags cost one fetch, not dozens.
//! - **Stale-Response Safety**: Every fetch carries a monotonic epoch; late
//!   responses from superseded fetches are discarded, never rendered.
//! - **Graceful Location Fallback**: Denied, failed, or slow positioning
//!   resolves to a configured fallback coordinate plus a warning banner.
//! - **Map Reconciliation**: Markers are diffed against the visible list by
//!   quest id, with lazy surface loading and list-only degradation when the
//!   mapping library fails to load.
//! - **Optimistic Favorites**: Favorite toggles flip instantly and roll back
//!   only if the persistence write fails, one in-flight write per item.
//! - **Saved Preferences**: A signed-in user's settled radius, categories,
//!   and sort key persist across sessions through the document store.
//! - **Async Design**: Built with Tokio; one event loop per session, spawned
//!   work re-enters as resolution events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sidequest::config::Config;
//! use sidequest::engine::{start_engine, EngineDeps};
//! use sidequest::engine::location::LocationProvider;
//! use sidequest::remote::{HeadlessMapLibrary, QuestApiClient};
//! use sidequest::storage::SledDocumentStoreBuilder;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let deps = EngineDeps {
//!         service: Arc::new(QuestApiClient::new(config.api.clone())),
//!         library: Arc::new(HeadlessMapLibrary),
//!         store: Arc::new(SledDocumentStoreBuilder::new(&config.storage.data_dir).open()?),
//!         location: LocationProvider::from_config(&config.location),
//!         geocoder: None,
//!         user_id: None,
//!     };
//!     let handle = start_engine(config.discovery.clone(), deps);
//!     let view = handle.snapshot().await;
//!     println!("{view:#?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - The discovery event loop and its components
//! - [`model`] - Quest, coordinate, and filter-state types
//! - [`remote`] - Trait boundaries to the generation, mapping, and geocoding collaborators
//! - [`storage`] - Favorite persistence and the session quest cache
//! - [`config`] - Configuration management and validation
//! - [`metrics`] - Process-wide counters for the discovery pipeline

pub mod config;
pub mod engine;
pub mod logutil;
pub mod metrics;
pub mod model;
pub mod remote;
pub mod storage;
