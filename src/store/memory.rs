use crate::gateway::{DocumentStore, SortSpec};
use crate::matcher::Predicate;
use crate::{StoreError, StoredDocument};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

pub(crate) type SharedDocs = Arc<RwLock<Vec<StoredDocument>>>;

/// Volatile document store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: SharedDocs,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, doc: StoredDocument) -> Result<(), StoreError> {
        self.docs.write().push(doc);
        Ok(())
    }

    async fn find(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        find_blocking(&self.docs, predicate, sort).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.docs.read().len() as u64)
    }
}

/// Scan, clone and sort matches on the blocking pool; regex evaluation over
/// the whole collection is too slow for an async worker.
pub(crate) async fn find_blocking(
    docs: &SharedDocs,
    predicate: &Predicate,
    sort: SortSpec,
) -> Result<Vec<StoredDocument>, StoreError> {
    let docs = Arc::clone(docs);
    let predicate = predicate.clone();

    tokio::task::spawn_blocking(move || {
        let mut matched: Vec<_> = docs
            .read()
            .iter()
            .filter(|doc| predicate.matches(doc))
            .cloned()
            .collect();
        sort.apply(&mut matched);
        matched
    })
    .await
    .map_err(|e| StoreError::Backend(format!("find task failed: {}", e)))
}
