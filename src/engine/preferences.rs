//! Saved discovery preferences.
//!
//! The signed-in user's settled radius range, category hints, and sort key
//! are mirrored into the `preferences` collection so the next session starts
//! where this one left off. Writes are fire-and-forget: losing one costs a
//! stale default on the next start, nothing a rollback would improve.
//! Guest sessions neither read nor write the store.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::SortKey;
use crate::storage::{DocumentStore, StoreError};

const COLLECTION_PREFERENCES: &str = "preferences";

/// One user's persisted discovery settings, keyed by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPreferences {
    pub user_id: String,
    pub radius_range_km: [f64; 2],
    pub categories: Vec<String>,
    pub sort_key: SortKey,
    pub updated_at: DateTime<Utc>,
}

pub struct PreferenceStore {
    store: Arc<dyn DocumentStore>,
    user_id: Option<String>,
}

impl PreferenceStore {
    pub fn new(store: Arc<dyn DocumentStore>, user_id: Option<String>) -> Self {
        Self { store, user_id }
    }

    /// Load the signed-in user's saved preferences, if any. Malformed
    /// documents are skipped; with several surviving rows the most recently
    /// updated one wins.
    pub async fn hydrate(&self) -> Result<Option<SavedPreferences>, StoreError> {
        let Some(user_id) = &self.user_id else {
            return Ok(None);
        };
        let documents = self
            .store
            .query_by_field(COLLECTION_PREFERENCES, "user_id", user_id)
            .await?;
        let mut latest: Option<SavedPreferences> = None;
        for doc in documents {
            match serde_json::from_value::<SavedPreferences>(doc) {
                Ok(saved) => {
                    if latest.as_ref().map_or(true, |l| saved.updated_at > l.updated_at) {
                        latest = Some(saved);
                    }
                }
                Err(e) => warn!("skipping malformed preference document: {e}"),
            }
        }
        if let Some(saved) = &latest {
            debug!(
                "hydrated preferences for {}: radius=[{},{}] categories={}",
                saved.user_id,
                saved.radius_range_km[0],
                saved.radius_range_km[1],
                saved.categories.len()
            );
        }
        Ok(latest)
    }

    /// Persist the current settings in the background. A no-op for guests.
    pub fn save(&self, radius_range_km: [f64; 2], categories: &BTreeSet<String>, sort_key: SortKey) {
        let Some(user_id) = self.user_id.clone() else {
            return;
        };
        let record = SavedPreferences {
            user_id,
            radius_range_km,
            categories: categories.iter().cloned().collect(),
            sort_key,
            updated_at: Utc::now(),
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = persist(store.as_ref(), &record).await {
                warn!("preference write for {} failed: {e}", record.user_id);
            }
        });
    }
}

async fn persist(store: &dyn DocumentStore, record: &SavedPreferences) -> Result<(), StoreError> {
    let value = serde_json::to_value(record)?;
    store
        .put(COLLECTION_PREFERENCES, &record.user_id, value)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SledDocumentStoreBuilder;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> Arc<dyn DocumentStore> {
        Arc::new(
            SledDocumentStoreBuilder::new(dir.path())
                .open()
                .expect("store"),
        )
    }

    #[tokio::test]
    async fn guest_session_reads_and_writes_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        let prefs = PreferenceStore::new(Arc::clone(&store), None);
        assert!(prefs.hydrate().await.expect("hydrate").is_none());

        prefs.save([0.0, 25.0], &BTreeSet::new(), SortKey::PriceAsc);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let rows = store
            .query_by_field("preferences", "user_id", "")
            .await
            .expect("query");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn save_then_hydrate_round_trips() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        let mut categories = BTreeSet::new();
        categories.insert("food".to_string());

        let record = SavedPreferences {
            user_id: "u1".to_string(),
            radius_range_km: [2.0, 25.0],
            categories: categories.iter().cloned().collect(),
            sort_key: SortKey::PriceDesc,
            updated_at: Utc::now(),
        };
        persist(store.as_ref(), &record).await.expect("persist");

        let prefs = PreferenceStore::new(store, Some("u1".to_string()));
        let saved = prefs.hydrate().await.expect("hydrate").expect("saved");
        assert_eq!(saved.radius_range_km, [2.0, 25.0]);
        assert_eq!(saved.categories, vec!["food".to_string()]);
        assert_eq!(saved.sort_key, SortKey::PriceDesc);
    }

    #[tokio::test]
    async fn second_save_overwrites_the_first() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);
        let early = SavedPreferences {
            user_id: "u1".to_string(),
            radius_range_km: [0.0, 5.0],
            categories: Vec::new(),
            sort_key: SortKey::DistanceAsc,
            updated_at: Utc::now(),
        };
        persist(store.as_ref(), &early).await.expect("persist");
        let late = SavedPreferences {
            radius_range_km: [0.0, 40.0],
            updated_at: Utc::now(),
            ..early
        };
        persist(store.as_ref(), &late).await.expect("persist");

        let prefs = PreferenceStore::new(store, Some("u1".to_string()));
        let saved = prefs.hydrate().await.expect("hydrate").expect("saved");
        assert_eq!(saved.radius_range_km, [0.0, 40.0]);
    }
}
