//! Segmented append-only document log
//!
//! Durable [`DocumentStore`] backed by a directory of log segments:
//! - 000001.log (64MB, sealed)
//! - 000002.log (12MB, active) ← current inserts
//!
//! ## Record format
//!
//! `crc32 (u32 LE) | length (u32 LE) | bincode(StoredDocument)`, where the
//! checksum covers the length and the payload.
//!
//! ## Recovery
//!
//! Opening replays every segment in order into memory. The first append
//! afterwards starts a fresh segment, so a torn tail is never appended to.
//! A checksum mismatch or truncated record ends replay of that segment.
//!
//! A failed append cuts the active segment back to its last complete record.
//! If that fails too the segment is abandoned and the next append rotates.

use super::memory::{find_blocking, SharedDocs};
use crate::gateway::{DocumentStore, SortSpec};
use crate::matcher::Predicate;
use crate::{ConnectError, StoreError, StoredDocument};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc32fast::Hasher;
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_SEGMENT_SIZE: u64 = 64 * 1024 * 1024; // 64MB
const HEADER_LEN: usize = 8;
const SEGMENT_EXTENSION: &str = "log";

pub struct LogStore {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    log: Mutex<DocumentLog>,
    docs: SharedDocs,
}

struct DocumentLog {
    dir: PathBuf,
    /// None until the first append after open, and after an abandoned segment
    segment: Option<Segment>,
    segment_number: u64,
    segment_size_limit: u64,
}

struct Segment {
    file: File,
    bytes_written: u64,
    #[cfg(test)]
    fail_next_after: Option<usize>,
}

enum Replay {
    Document(StoredDocument),
    End,
    Corrupt(String),
}

impl LogStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ConnectError> {
        Self::open_with_segment_size(dir, DEFAULT_SEGMENT_SIZE)
    }

    pub fn open_with_segment_size(
        dir: impl AsRef<Path>,
        segment_size_limit: u64,
    ) -> Result<Self, ConnectError> {
        let dir = dir.as_ref().to_path_buf();
        let open_err = |source| ConnectError::Open {
            path: dir.clone(),
            source,
        };

        std::fs::create_dir_all(&dir).map_err(open_err)?;

        let segments = list_segments(&dir).map_err(open_err)?;
        let mut docs = Vec::new();
        for (number, path) in &segments {
            let recovered = replay_segment(path).map_err(open_err)?;
            tracing::debug!(segment = number, documents = recovered.len(), "replayed segment");
            docs.extend(recovered);
        }

        let segment_number = segments.last().map(|(n, _)| *n).unwrap_or(0);

        tracing::info!(
            dir = %dir.display(),
            segments = segments.len(),
            documents = docs.len(),
            "opened document log"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                dir: dir.clone(),
                log: Mutex::new(DocumentLog {
                    dir,
                    segment: None,
                    segment_number,
                    segment_size_limit,
                }),
                docs: Arc::new(RwLock::new(docs)),
            }),
        })
    }

    /// Number of segment files currently on disk
    pub fn segment_count(&self) -> std::io::Result<usize> {
        Ok(list_segments(&self.inner.dir)?.len())
    }
}

impl Inner {
    fn append(&self, doc: StoredDocument) -> Result<(), StoreError> {
        let record = encode_record(&doc)?;

        // Holding the log lock while publishing keeps memory order equal to
        // log order.
        let mut log = self.log.lock();
        log.append(&record)?;
        self.docs.write().push(doc);

        Ok(())
    }
}

impl DocumentLog {
    fn append(&mut self, record: &[u8]) -> std::io::Result<()> {
        let segment = match self.segment.take() {
            Some(segment) if segment.bytes_written < self.segment_size_limit => segment,
            _ => self.rotate()?,
        };
        let segment = self.segment.insert(segment);

        let Err(e) = segment.append(record) else {
            return Ok(());
        };

        if let Err(truncate_err) = segment.discard_tail() {
            tracing::error!(
                segment = self.segment_number,
                "abandoning segment after failed append: {}",
                truncate_err
            );
            self.segment = None;
        }
        Err(e)
    }

    fn rotate(&mut self) -> std::io::Result<Segment> {
        let segment = Segment::create(&self.dir, self.segment_number + 1)?;
        self.segment_number += 1;

        tracing::info!(segment = self.segment_number, "started log segment");
        Ok(segment)
    }
}

impl Segment {
    fn create(dir: &Path, number: u64) -> std::io::Result<Self> {
        let path = dir.join(format!("{:06}.{}", number, SEGMENT_EXTENSION));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_written = file.metadata()?.len();

        Ok(Self {
            file,
            bytes_written,
            #[cfg(test)]
            fail_next_after: None,
        })
    }

    fn append(&mut self, record: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(written) = self.fail_next_after.take() {
            self.file.write_all(&record[..written.min(record.len())])?;
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no space left on device",
            ));
        }

        self.file.write_all(record)?;
        self.file.sync_data()?;
        self.bytes_written += record.len() as u64;
        Ok(())
    }

    /// Drop bytes past the last complete record
    fn discard_tail(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.bytes_written)?;
        self.file.sync_data()
    }
}

#[async_trait]
impl DocumentStore for LogStore {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn insert(&self, doc: StoredDocument) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.append(doc))
            .await
            .map_err(|e| StoreError::Backend(format!("insert task failed: {}", e)))?
    }

    async fn find(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        find_blocking(&self.inner.docs, predicate, sort).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.docs.read().len() as u64)
    }
}

fn list_segments(dir: &Path) -> std::io::Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some(SEGMENT_EXTENSION) {
            continue;
        }
        if let Some(number) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            segments.push((number, path));
        }
    }

    segments.sort_by_key(|(number, _)| *number);
    Ok(segments)
}

fn replay_segment(path: &Path) -> std::io::Result<Vec<StoredDocument>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut docs = Vec::new();

    loop {
        match read_record(&mut reader)? {
            Replay::Document(doc) => docs.push(doc),
            Replay::End => break,
            Replay::Corrupt(reason) => {
                tracing::warn!(
                    segment = %path.display(),
                    recovered = docs.len(),
                    "stopping replay at corrupt record: {}",
                    reason
                );
                break;
            }
        }
    }

    Ok(docs)
}

fn encode_record(doc: &StoredDocument) -> Result<Bytes, StoreError> {
    let payload = bincode::serialize(doc)?;
    if payload.len() > u32::MAX as usize {
        return Err(StoreError::Backend("document too large for log record".into()));
    }
    let length = payload.len() as u32;

    let mut hasher = Hasher::new();
    hasher.update(&length.to_le_bytes());
    hasher.update(&payload);
    let checksum = hasher.finalize();

    let mut record = BytesMut::with_capacity(HEADER_LEN + payload.len());
    record.put_u32_le(checksum);
    record.put_u32_le(length);
    record.put_slice(&payload);

    Ok(record.freeze())
}

fn read_record(reader: &mut impl Read) -> std::io::Result<Replay> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(Replay::End),
        Err(e) => return Err(e),
    }

    let mut buf = &header[..];
    let checksum = buf.get_u32_le();
    let length = buf.get_u32_le();

    let mut payload = vec![0u8; length as usize];
    match reader.read_exact(&mut payload) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(Replay::Corrupt(format!("truncated record of {} bytes", length)));
        }
        Err(e) => return Err(e),
    }

    let mut hasher = Hasher::new();
    hasher.update(&length.to_le_bytes());
    hasher.update(&payload);
    let computed = hasher.finalize();

    if computed != checksum {
        return Ok(Replay::Corrupt(format!(
            "checksum mismatch: expected {}, got {}",
            checksum, computed
        )));
    }

    match bincode::deserialize(&payload) {
        Ok(doc) => Ok(Replay::Document(doc)),
        Err(e) => Ok(Replay::Corrupt(format!("undecodable document: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{Matcher, MatcherCompiler, Query};
    use crate::{Label, Sample};
    use tempfile::tempdir;

    fn doc(i: i64) -> StoredDocument {
        StoredDocument {
            labels: vec![
                Label::new("__name__", "requests_total"),
                Label::new("instance", format!("host-{}", i)),
            ],
            samples: vec![Sample::new(1000 + i, i as f64)],
        }
    }

    fn last_segment(dir: &Path) -> PathBuf {
        list_segments(dir)
            .unwrap()
            .into_iter()
            .filter(|(_, p)| std::fs::metadata(p).unwrap().len() > 0)
            .last()
            .unwrap()
            .1
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = LogStore::open(dir.path()).unwrap();
            for i in 0..10 {
                store.insert(doc(i)).await.unwrap();
            }
            assert_eq!(store.count().await.unwrap(), 10);
        }

        let store = LogStore::open(dir.path()).unwrap();
        assert_eq!(store.count().await.unwrap(), 10);

        let predicate = MatcherCompiler::default()
            .compile(&Query::new(1003, 1003, vec![Matcher::eq("instance", "host-3")]))
            .unwrap();
        let found = store.find(&predicate, SortSpec::Insertion).await.unwrap();
        assert_eq!(found, vec![doc(3)]);
    }

    #[tokio::test]
    async fn test_recovery_keeps_insertion_order_across_segments() {
        let dir = tempdir().unwrap();

        {
            let store = LogStore::open_with_segment_size(dir.path(), 256).unwrap();
            for i in 0..20 {
                store.insert(doc(i)).await.unwrap();
            }
            assert!(store.segment_count().unwrap() > 2);
        }

        let store = LogStore::open(dir.path()).unwrap();
        let predicate = MatcherCompiler::default()
            .compile(&Query::new(0, i64::MAX, vec![]))
            .unwrap();
        let found = store.find(&predicate, SortSpec::Insertion).await.unwrap();

        let expected: Vec<_> = (0..20).map(doc).collect();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_torn_tail_is_dropped() {
        let dir = tempdir().unwrap();

        {
            let store = LogStore::open(dir.path()).unwrap();
            for i in 0..3 {
                store.insert(doc(i)).await.unwrap();
            }
        }

        let path = last_segment(dir.path());
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let store = LogStore::open(dir.path()).unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        // the reopened store keeps accepting inserts in a fresh segment
        store.insert(doc(9)).await.unwrap();
        drop(store);
        let store = LogStore::open(dir.path()).unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_stops_segment_replay() {
        let dir = tempdir().unwrap();

        {
            let store = LogStore::open(dir.path()).unwrap();
            for i in 0..2 {
                store.insert(doc(i)).await.unwrap();
            }
        }

        let path = last_segment(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let store = LogStore::open(dir.path()).unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_keeps_later_records_replayable() {
        let dir = tempdir().unwrap();

        {
            let store = LogStore::open(dir.path()).unwrap();
            store.insert(doc(0)).await.unwrap();

            // the next write stops five bytes into its record
            if let Some(segment) = store.inner.log.lock().segment.as_mut() {
                segment.fail_next_after = Some(5);
            }
            assert!(store.insert(doc(1)).await.is_err());

            for i in 2..4 {
                store.insert(doc(i)).await.unwrap();
            }
            assert_eq!(store.count().await.unwrap(), 3);
        }

        let store = LogStore::open(dir.path()).unwrap();
        let predicate = MatcherCompiler::default()
            .compile(&Query::new(0, i64::MAX, vec![]))
            .unwrap();
        let found = store.find(&predicate, SortSpec::Insertion).await.unwrap();

        assert_eq!(found, vec![doc(0), doc(2), doc(3)]);
    }

    #[tokio::test]
    async fn test_reopen_without_writes_adds_no_segment() {
        let dir = tempdir().unwrap();

        let store = LogStore::open(dir.path()).unwrap();
        assert_eq!(store.segment_count().unwrap(), 0);
        store.insert(doc(0)).await.unwrap();
        drop(store);

        for _ in 0..3 {
            let store = LogStore::open(dir.path()).unwrap();
            assert_eq!(store.count().await.unwrap(), 1);
        }

        let store = LogStore::open(dir.path()).unwrap();
        assert_eq!(store.segment_count().unwrap(), 1);

        // writes after a restart still go to a new segment
        store.insert(doc(1)).await.unwrap();
        assert_eq!(store.segment_count().unwrap(), 2);
    }

    #[test]
    fn test_record_layout() {
        let record = encode_record(&doc(1)).unwrap();
        let mut header = &record[..HEADER_LEN];
        let _checksum = header.get_u32_le();
        let length = header.get_u32_le() as usize;

        assert_eq!(record.len(), HEADER_LEN + length);

        match read_record(&mut &record[..]).unwrap() {
            Replay::Document(decoded) => assert_eq!(decoded, doc(1)),
            _ => panic!("Expected a document"),
        }
    }

    #[test]
    fn test_open_fails_on_file_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"x").unwrap();

        let err = LogStore::open(&file_path).err().unwrap();
        assert!(matches!(err, ConnectError::Open { .. }));
    }
}
