//! # Storage Module
//!
//! Two very different stores live here:
//!
//! - [`DocumentStore`] - the keyed CRUD boundary to the durable persistence
//!   collaborator (favorites, preferences). The engine only mirrors state
//!   into it; quest data is never queried from here. [`SledDocumentStore`]
//!   is the embedded implementation, storing JSON documents so
//!   `query_by_field` can introspect fields without a schema.
//! - [`QuestCache`] - the session-local snapshot of the most recently
//!   fetched quest collection, written through on every successful fetch so
//!   a detail view can resolve a single quest by id without a live round
//!   trip. In-memory only; it dies with the session.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::Quest;

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around JSON serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote-side rejection surfaced by a non-embedded implementation.
    #[error("store rejected operation: {0}")]
    Rejected(String),
}

/// Keyed CRUD over named collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// All documents in `collection` whose top-level `field` equals `value`.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError>;
}

/// Helper builder so tests can easily create throwaway stores.
pub struct SledDocumentStoreBuilder {
    path: PathBuf,
}

impl SledDocumentStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<SledDocumentStore, StoreError> {
        SledDocumentStore::open(self.path)
    }
}

/// Sled-backed document store. Collections are key prefixes within one tree.
pub struct SledDocumentStore {
    _db: sled::Db,
    documents: sled::Tree,
}

const TREE_DOCUMENTS: &str = "documents";

impl SledDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let documents = db.open_tree(TREE_DOCUMENTS)?;
        Ok(Self { _db: db, documents })
    }

    fn document_key(collection: &str, key: &str) -> Vec<u8> {
        format!("{collection}:{key}").into_bytes()
    }

    fn collection_prefix(collection: &str) -> Vec<u8> {
        format!("{collection}:").into_bytes()
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&value)?;
        self.documents
            .insert(Self::document_key(collection, key), bytes)?;
        self.documents.flush()?;
        debug!("stored document {}:{}", collection, key);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.documents.remove(Self::document_key(collection, key))?;
        self.documents.flush()?;
        debug!("deleted document {}:{}", collection, key);
        Ok(())
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let mut matches = Vec::new();
        for entry in self.documents.scan_prefix(Self::collection_prefix(collection)) {
            let (_key, bytes) = entry?;
            let doc: Value = serde_json::from_slice(&bytes)?;
            if doc.get(field).and_then(Value::as_str) == Some(value) {
                matches.push(doc);
            }
        }
        Ok(matches)
    }
}

/// Session-local snapshot of the most recently fetched quest collection.
#[derive(Debug, Default)]
pub struct QuestCache {
    quests: HashMap<String, Quest>,
}

impl QuestCache {
    /// Replace the snapshot with a freshly fetched collection.
    pub fn replace(&mut self, quests: &[Quest]) {
        self.quests = quests.iter().map(|q| (q.id.clone(), q.clone())).collect();
    }

    /// Resolve a single quest by id without a live round trip.
    pub fn get(&self, id: &str) -> Option<&Quest> {
        self.quests.get(id)
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }
}
