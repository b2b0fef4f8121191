pub mod cli;
pub mod codec;
pub mod error;
pub mod gateway;
pub mod http_server;
pub mod matcher;
pub mod metrics;
pub mod prompb;
pub mod read;
pub mod store;
pub mod write;

pub use error::{AdapterError, CompileError, ConnectError, DecodeError, EncodeError, Result, StoreError};
pub use gateway::{Deadlines, DocumentCursor, DocumentStore, SortSpec, StorageGateway};
pub use matcher::{Matcher, MatcherCompiler, MatcherKind, MissingLabel, Predicate, Query};
pub use read::{QueryResult, ReadTranslator};
pub use store::{LogStore, MemoryStore, StoreLocation};
pub use write::{WriteAck, WriteTranslator};

use serde::{Deserialize, Serialize};

// Core types that everything uses
pub type TimestampMs = i64; // Unix timestamp in milliseconds

/// A single name/value pair identifying a series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Label {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: TimestampMs,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: TimestampMs, value: f64) -> Self {
        Sample { timestamp, value }
    }
}

/// A series as it arrives on (or leaves through) the wire
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new(labels: Vec<Label>, samples: Vec<Sample>) -> Self {
        TimeSeries { labels, samples }
    }
}

/// Persisted form of one written series.
///
/// Every write appends a fresh document, so the same label set written
/// twice produces two documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl StoredDocument {
    /// Largest sample timestamp in the document, if it has any samples
    pub fn max_timestamp(&self) -> Option<TimestampMs> {
        self.samples.iter().map(|s| s.timestamp).max()
    }

    pub fn into_series(self) -> TimeSeries {
        TimeSeries {
            labels: self.labels,
            samples: self.samples,
        }
    }
}
