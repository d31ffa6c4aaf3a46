//! In-process persistence
//!
//! Behaves like the HTTP API for a single user. Clones share state, so a test
//! can hand one copy to the engine and inspect another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AnnotationRecord, NewAnnotation, PersistenceApi, PositionRecord, PositionUpdate};
use crate::error::{ReaderError, ReaderResult};

#[derive(Debug, Default)]
struct Store {
    positions: HashMap<String, PositionRecord>,
    annotations: Vec<(String, AnnotationRecord)>,
    position_writes: usize,
    offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    store: Arc<Mutex<Store>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `PersistenceUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.store.lock().offline = offline;
    }

    pub fn position(&self, document_id: &str) -> Option<PositionRecord> {
        self.store.lock().positions.get(document_id).cloned()
    }

    /// Seed a position as if another device had saved it
    pub fn insert_position(&self, document_id: &str, record: PositionRecord) {
        self.store.lock().positions.insert(document_id.to_string(), record);
    }

    pub fn position_writes(&self) -> usize {
        self.store.lock().position_writes
    }

    pub fn annotation_count(&self) -> usize {
        self.store.lock().annotations.len()
    }

    fn check_online(store: &Store) -> ReaderResult<()> {
        if store.offline {
            Err(ReaderError::PersistenceUnavailable("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistenceApi for InMemoryPersistence {
    async fn get_position(&self, document_id: &str) -> ReaderResult<Option<PositionRecord>> {
        let store = self.store.lock();
        Self::check_online(&store)?;
        Ok(store.positions.get(document_id).cloned())
    }

    async fn put_position(&self, update: &PositionUpdate) -> ReaderResult<PositionRecord> {
        let mut store = self.store.lock();
        Self::check_online(&store)?;
        let record = PositionRecord {
            address: update.address.clone(),
            percentage: update.percentage,
            updated_at: Utc::now(),
        };
        store.positions.insert(update.document_id.clone(), record.clone());
        store.position_writes += 1;
        Ok(record)
    }

    async fn list_annotations(&self, document_id: &str) -> ReaderResult<Vec<AnnotationRecord>> {
        let store = self.store.lock();
        Self::check_online(&store)?;
        Ok(store
            .annotations
            .iter()
            .filter(|(doc, _)| doc == document_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn create_annotation(&self, annotation: &NewAnnotation) -> ReaderResult<AnnotationRecord> {
        let mut store = self.store.lock();
        Self::check_online(&store)?;
        let record = AnnotationRecord {
            id: Uuid::new_v4().to_string(),
            range_address: annotation.range_address.clone(),
            text: annotation.text.clone(),
            kind: annotation.kind,
            color: annotation.color.clone(),
            created_at: Utc::now(),
        };
        store
            .annotations
            .push((annotation.document_id.clone(), record.clone()));
        Ok(record)
    }

    async fn delete_annotation(&self, id: &str) -> ReaderResult<()> {
        let mut store = self.store.lock();
        Self::check_online(&store)?;
        let before = store.annotations.len();
        store.annotations.retain(|(_, record)| record.id != id);
        if store.annotations.len() == before {
            return Err(ReaderError::AnnotationNotFound(id.to_string()));
        }
        Ok(())
    }
}
