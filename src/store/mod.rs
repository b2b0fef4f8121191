//! Document store backends
//!
//! The store is picked at startup from a URL:
//! - `memory://` keeps documents in process memory
//! - `file://<dir>` (or a bare path) keeps them in a segmented log under
//!   `<dir>/<database>/<collection>/`

pub mod log;
pub mod memory;

pub use log::LogStore;
pub use memory::MemoryStore;

use crate::gateway::DocumentStore;
use crate::ConnectError;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    Log(PathBuf),
}

impl FromStr for StoreLocation {
    type Err = ConnectError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        // Connection options are not meaningful for the bundled stores
        let url = match url.split_once('?') {
            Some((base, _)) => base,
            None => url,
        };

        match url.split_once("://") {
            Some(("memory", _)) => Ok(StoreLocation::Memory),
            Some(("file", "")) => Err(ConnectError::InvalidUrl(url.to_string())),
            Some(("file", path)) => Ok(StoreLocation::Log(PathBuf::from(path))),
            Some((scheme, _)) => Err(ConnectError::UnsupportedScheme(scheme.to_string())),
            None if url.is_empty() => Err(ConnectError::InvalidUrl(url.to_string())),
            None => Ok(StoreLocation::Log(PathBuf::from(url))),
        }
    }
}

fn check_namespace(kind: &str, name: &str) -> Result<(), ConnectError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c| c == '/' || c == '\\');

    if valid {
        Ok(())
    } else {
        Err(ConnectError::InvalidUrl(format!("invalid {} name {:?}", kind, name)))
    }
}

/// Open the store once at startup. The returned handle is shared by every
/// request for the lifetime of the process.
pub fn connect(
    location: &StoreLocation,
    database: &str,
    collection: &str,
) -> Result<Arc<dyn DocumentStore>, ConnectError> {
    check_namespace("database", database)?;
    check_namespace("collection", collection)?;

    match location {
        StoreLocation::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreLocation::Log(base) => {
            let store = LogStore::open(base.join(database).join(collection))?;
            Ok(Arc::new(store))
        }
    }
}
