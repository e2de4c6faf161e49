//! Optimistic favorite toggling.
//!
//! The in-memory favorite set is the UI's source of truth and flips
//! immediately on toggle; persistence runs in the background and the flip is
//! rolled back only if the write comes back failed. One persistence write
//! per item may be in flight at a time: a second toggle on the same item
//! while the first is unresolved is rejected rather than queued, which keeps
//! the rollback unambiguous. Toggles across different items proceed
//! concurrently.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::EngineEvent;
use crate::metrics;
use crate::model::{FavoriteRecord, Quest};
use crate::storage::DocumentStore;

const COLLECTION_FAVORITES: &str = "favorites";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToggleError {
    #[error("sign in to save favorites")]
    Unauthenticated,

    #[error("a save for this quest is already in progress")]
    AlreadyPending,
}

/// The persistence work a toggle produced, plus what undoing it means.
#[derive(Debug, Clone)]
pub enum ToggleOp {
    /// Record was added optimistically; rollback removes it.
    Add(FavoriteRecord),
    /// Record was removed optimistically; rollback reinserts it.
    Remove(FavoriteRecord),
}

impl ToggleOp {
    pub fn item_id(&self) -> &str {
        match self {
            ToggleOp::Add(r) | ToggleOp::Remove(r) => &r.item_id,
        }
    }
}

pub struct FavoriteStore {
    store: Arc<dyn DocumentStore>,
    user_id: Option<String>,
    favorites: HashMap<String, FavoriteRecord>,
    /// Item ids with an unresolved write, mapped to their rollback op.
    in_flight: HashMap<String, ToggleOp>,
}

impl FavoriteStore {
    pub fn new(store: Arc<dyn DocumentStore>, user_id: Option<String>) -> Self {
        Self {
            store,
            user_id,
            favorites: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn is_favorite(&self, item_id: &str) -> bool {
        self.favorites.contains_key(item_id)
    }

    pub fn count(&self) -> usize {
        self.favorites.len()
    }

    /// The quest snapshot stored with a favorite, for quests absent from
    /// the current fetch.
    pub fn quest_snapshot(&self, item_id: &str) -> Option<&Quest> {
        self.favorites.get(item_id).map(|r| &r.quest_data)
    }

    /// Current favorites, most recently added first.
    pub fn records(&self) -> Vec<&FavoriteRecord> {
        let mut records: Vec<&FavoriteRecord> = self.favorites.values().collect();
        records.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        records
    }

    /// Load the signed-in user's favorites from the store. A signed-out
    /// session hydrates to an empty set without touching the store.
    pub async fn hydrate(&mut self) -> Result<usize, crate::storage::StoreError> {
        let Some(user_id) = self.user_id.clone() else {
            return Ok(0);
        };
        let documents = self
            .store
            .query_by_field(COLLECTION_FAVORITES, "user_id", &user_id)
            .await?;
        self.favorites.clear();
        for doc in documents {
            match serde_json::from_value::<FavoriteRecord>(doc) {
                Ok(record) => {
                    self.favorites.insert(record.item_id.clone(), record);
                }
                Err(e) => warn!("skipping malformed favorite document: {e}"),
            }
        }
        debug!("hydrated {} favorite(s) for {}", self.favorites.len(), user_id);
        Ok(self.favorites.len())
    }

    /// Flip the favorite state for `quest` optimistically and return the
    /// persistence op to run. Pure with respect to the store; the async side
    /// lives in [`toggle`](Self::toggle).
    pub fn begin_toggle(&mut self, quest: &Quest) -> Result<ToggleOp, ToggleError> {
        let user_id = self.user_id.clone().ok_or(ToggleError::Unauthenticated)?;
        if self.in_flight.contains_key(&quest.id) {
            return Err(ToggleError::AlreadyPending);
        }

        let op = match self.favorites.remove(&quest.id) {
            Some(existing) => ToggleOp::Remove(existing),
            None => {
                let record = FavoriteRecord {
                    user_id,
                    item_id: quest.id.clone(),
                    item_type: "quest".to_string(),
                    quest_data: quest.clone(),
                    notes: None,
                    added_at: chrono::Utc::now(),
                };
                self.favorites.insert(quest.id.clone(), record.clone());
                ToggleOp::Add(record)
            }
        };
        self.in_flight.insert(quest.id.clone(), op.clone());
        metrics::inc_favorite_toggle();
        debug!(
            "favorite toggle for {}: now {}",
            quest.id,
            if matches!(op, ToggleOp::Add(_)) { "on" } else { "off" }
        );
        Ok(op)
    }

    /// Toggle and run the persistence write in the background, reporting the
    /// outcome through `events`.
    pub fn toggle(
        &mut self,
        quest: &Quest,
        events: &mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), ToggleError> {
        let op = self.begin_toggle(quest)?;
        let item_id = op.item_id().to_string();
        let store = Arc::clone(&self.store);
        let tx = events.clone();
        tokio::spawn(async move {
            let result = persist(store.as_ref(), &op).await;
            let _ = tx.send(EngineEvent::FavoriteResolved { item_id, result });
        });
        Ok(())
    }

    /// Settle an in-flight toggle. A failed write undoes the optimistic
    /// flip; a success just releases the per-item slot.
    pub fn resolve(&mut self, item_id: &str, outcome: Result<(), String>) {
        let Some(op) = self.in_flight.remove(item_id) else {
            warn!("favorite resolution for {item_id} with no pending toggle");
            return;
        };
        if let Err(message) = outcome {
            warn!("favorite write for {item_id} failed, rolling back: {message}");
            match op {
                ToggleOp::Add(record) => {
                    self.favorites.remove(&record.item_id);
                }
                ToggleOp::Remove(record) => {
                    self.favorites.insert(record.item_id.clone(), record);
                }
            }
            metrics::inc_favorite_rollback();
        }
    }
}

async fn persist(store: &dyn DocumentStore, op: &ToggleOp) -> Result<(), String> {
    match op {
        ToggleOp::Add(record) => {
            let key = FavoriteRecord::key(&record.user_id, &record.item_id);
            let value = serde_json::to_value(record).map_err(|e| e.to_string())?;
            store
                .put(COLLECTION_FAVORITES, &key, value)
                .await
                .map_err(|e| e.to_string())
        }
        ToggleOp::Remove(record) => {
            let key = FavoriteRecord::key(&record.user_id, &record.item_id);
            store
                .delete(COLLECTION_FAVORITES, &key)
                .await
                .map_err(|e| e.to_string())
        }
    }
}
