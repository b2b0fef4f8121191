use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Inbound payload could not be turned into a request
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid snappy data: {0}")]
    Decompress(#[from] snap::Error),

    #[error("payload is not a valid protobuf message: {0}")]
    Message(#[from] prost::DecodeError),

    #[error("unknown label matcher type: {0}")]
    UnknownMatcherType(i32),
}

/// A query's matchers could not be compiled into a predicate
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("invalid regular expression {pattern:?} for label {label:?}: {source}")]
    InvalidPattern {
        label: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("label matcher has an empty label name")]
    EmptyLabelName,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Startup-time failure to reach or open the store
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("unsupported store url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid store url: {0}")]
    InvalidUrl(String),

    #[error("cannot open store at {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("snappy compression failed: {0}")]
    Compress(#[from] snap::Error),
}

/// Everything a single write or read request can fail with
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("insert failed after {persisted} of {total} series were persisted: {source}")]
    BatchAborted {
        persisted: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
}

impl AdapterError {
    /// Client-caused errors are not worth retrying
    pub fn is_client_error(&self) -> bool {
        matches!(self, AdapterError::Decode(_) | AdapterError::Compile(_))
    }

    /// The store error behind this failure, if there is one
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            AdapterError::Store(e) => Some(e),
            AdapterError::BatchAborted { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
