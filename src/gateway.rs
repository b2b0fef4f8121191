//! Storage gateway
//!
//! [`DocumentStore`] is the seam to whatever actually persists documents.
//! [`StorageGateway`] owns the single shared store handle and puts a fixed
//! deadline on every call made through it.

use crate::matcher::Predicate;
use crate::{StoreError, StoredDocument};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_INSERT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FIND_TIMEOUT: Duration = Duration::from_secs(30);

/// Result ordering requested from a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortSpec {
    /// Descending by each document's largest sample timestamp
    NewestSampleFirst,
    /// Order in which documents were inserted
    Insertion,
}

impl SortSpec {
    /// Stable in-place sort used by stores that filter in memory
    pub fn apply(self, docs: &mut [StoredDocument]) {
        if self == SortSpec::NewestSampleFirst {
            docs.sort_by(|a, b| b.max_timestamp().cmp(&a.max_timestamp()));
        }
    }
}

/// Backend that persists documents. Implementations are shared across
/// concurrent requests and must synchronize internally.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn insert(&self, doc: StoredDocument) -> Result<(), StoreError>;

    async fn find(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub insert: Duration,
    pub find: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            insert: DEFAULT_INSERT_TIMEOUT,
            find: DEFAULT_FIND_TIMEOUT,
        }
    }
}

/// Documents produced by a find, in the order the store returned them
#[derive(Debug)]
pub struct DocumentCursor {
    docs: std::vec::IntoIter<StoredDocument>,
}

impl DocumentCursor {
    pub fn new(docs: Vec<StoredDocument>) -> Self {
        Self {
            docs: docs.into_iter(),
        }
    }
}

impl Iterator for DocumentCursor {
    type Item = StoredDocument;

    fn next(&mut self) -> Option<Self::Item> {
        self.docs.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.docs.size_hint()
    }
}

impl ExactSizeIterator for DocumentCursor {}

#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn DocumentStore>,
    deadlines: Deadlines,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn DocumentStore>, deadlines: Deadlines) -> Self {
        Self { store, deadlines }
    }

    pub fn deadlines(&self) -> Deadlines {
        self.deadlines
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Insert one document. A store call that outlives the deadline is
    /// reported as a timeout; it may still complete inside the store.
    pub async fn insert(&self, doc: StoredDocument) -> Result<(), StoreError> {
        match timeout(self.deadlines.insert, self.store.insert(doc)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation: "insert",
                after: self.deadlines.insert,
            }),
        }
    }

    pub async fn find(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
    ) -> Result<DocumentCursor, StoreError> {
        match timeout(self.deadlines.find, self.store.find(predicate, sort)).await {
            Ok(result) => result.map(DocumentCursor::new),
            Err(_) => Err(StoreError::Timeout {
                operation: "find",
                after: self.deadlines.find,
            }),
        }
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        match timeout(self.deadlines.find, self.store.count()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation: "count",
                after: self.deadlines.find,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatcherCompiler, Query};
    use crate::{Label, MemoryStore, Sample};

    /// Store that never answers within any reasonable deadline
    struct StalledStore;

    #[async_trait]
    impl DocumentStore for StalledStore {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn insert(&self, _doc: StoredDocument) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn find(
            &self,
            _predicate: &Predicate,
            _sort: SortSpec,
        ) -> Result<Vec<StoredDocument>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn doc_at(timestamps: &[i64]) -> StoredDocument {
        StoredDocument {
            labels: vec![Label::new("ts", format!("{:?}", timestamps))],
            samples: timestamps.iter().map(|t| Sample::new(*t, 0.0)).collect(),
        }
    }

    #[test]
    fn test_default_deadlines() {
        let d = Deadlines::default();
        assert_eq!(d.insert, Duration::from_secs(10));
        assert_eq!(d.find, Duration::from_secs(30));
    }

    #[test]
    fn test_newest_sample_first_is_stable() {
        let mut docs = vec![
            doc_at(&[10, 20]),
            doc_at(&[50]),
            doc_at(&[5, 20]),
            doc_at(&[]),
            doc_at(&[40, 1]),
        ];
        SortSpec::NewestSampleFirst.apply(&mut docs);

        let order: Vec<Option<i64>> = docs.iter().map(|d| d.max_timestamp()).collect();
        assert_eq!(order, vec![Some(50), Some(40), Some(20), Some(20), None]);
        // equal maxima keep insertion order
        assert_eq!(docs[2].samples[0].timestamp, 10);
        assert_eq!(docs[3].samples[0].timestamp, 5);
    }

    #[tokio::test]
    async fn test_insert_timeout() {
        let gateway = StorageGateway::new(
            Arc::new(StalledStore),
            Deadlines {
                insert: Duration::from_millis(20),
                find: Duration::from_millis(20),
            },
        );

        let err = gateway.insert(doc_at(&[1])).await.unwrap_err();
        match err {
            StoreError::Timeout { operation, after } => {
                assert_eq!(operation, "insert");
                assert_eq!(after, Duration::from_millis(20));
            }
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_find_timeout() {
        let gateway = StorageGateway::new(
            Arc::new(StalledStore),
            Deadlines {
                insert: Duration::from_millis(20),
                find: Duration::from_millis(20),
            },
        );
        let predicate = MatcherCompiler::default()
            .compile(&Query::new(0, 10, vec![]))
            .unwrap();

        let err = gateway
            .find(&predicate, SortSpec::NewestSampleFirst)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_cursor_yields_matches() {
        let gateway = StorageGateway::new(Arc::new(MemoryStore::new()), Deadlines::default());
        gateway.insert(doc_at(&[1])).await.unwrap();
        gateway.insert(doc_at(&[100])).await.unwrap();
        gateway.insert(doc_at(&[7])).await.unwrap();

        let predicate = MatcherCompiler::default()
            .compile(&Query::new(0, 10, vec![]))
            .unwrap();
        let cursor = gateway
            .find(&predicate, SortSpec::NewestSampleFirst)
            .await
            .unwrap();

        assert_eq!(cursor.len(), 2);
        let maxima: Vec<_> = cursor.map(|d| d.max_timestamp()).collect();
        assert_eq!(maxima, vec![Some(7), Some(1)]);
        assert_eq!(gateway.count().await.unwrap(), 3);
    }
}
