//! Command-line interface definitions
//!
//! Every flag can also be supplied through its environment variable.

use crate::gateway::Deadlines;
use crate::matcher::MissingLabel;
use clap::Parser;
use std::time::Duration;

/// remote-docstore - remote read/write storage adapter backed by a document store
#[derive(Parser, Debug)]
#[command(name = "remote-docstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Store URL: memory:// or file://<dir> (a bare path also works)
    #[arg(long, short = 'm', env = "STORE_URL", default_value = "file://./data")]
    pub store_url: String,

    /// Database name, used as a namespace inside the store
    #[arg(long, short = 'd', env = "DATABASE_NAME", default_value = "prometheus")]
    pub database: String,

    /// Collection that holds the series documents
    #[arg(long, short = 'c', env = "COLLECTION_NAME", default_value = "prometheus")]
    pub collection: String,

    /// Address to listen on (host:port)
    #[arg(long, short = 'a', env = "LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub address: String,

    /// Deadline for a single document insert, in seconds
    #[arg(long, default_value = "10")]
    pub insert_timeout_secs: u64,

    /// Deadline for a single find, in seconds
    #[arg(long, default_value = "30")]
    pub find_timeout_secs: u64,

    /// How NEQ and NRE matchers treat series without the label
    #[arg(long, value_enum, default_value_t = MissingLabel::AsEmpty)]
    pub missing_label: MissingLabel,

    /// Largest accepted request body in bytes
    #[arg(long, default_value = "33554432")]
    pub max_body_bytes: usize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn deadlines(&self) -> Deadlines {
        Deadlines {
            insert: Duration::from_secs(self.insert_timeout_secs),
            find: Duration::from_secs(self.find_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cli = Cli::parse_from(&["remote-docstore"]);

        assert_eq!(cli.store_url, "file://./data");
        assert_eq!(cli.database, "prometheus");
        assert_eq!(cli.collection, "prometheus");
        assert_eq!(cli.address, "0.0.0.0:8080");
        assert_eq!(cli.missing_label, MissingLabel::AsEmpty);
        assert_eq!(cli.max_body_bytes, 32 * 1024 * 1024);
        assert_eq!(cli.deadlines(), Deadlines::default());
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(&[
            "remote-docstore",
            "-m",
            "memory://",
            "-d",
            "metrics",
            "-c",
            "series",
            "-a",
            "127.0.0.1:9201",
        ]);

        assert_eq!(cli.store_url, "memory://");
        assert_eq!(cli.database, "metrics");
        assert_eq!(cli.collection, "series");
        assert_eq!(cli.address, "127.0.0.1:9201");
    }

    #[test]
    fn test_timeouts_and_policy() {
        let cli = Cli::parse_from(&[
            "remote-docstore",
            "--insert-timeout-secs",
            "2",
            "--find-timeout-secs",
            "5",
            "--missing-label",
            "strict",
        ]);

        assert_eq!(
            cli.deadlines(),
            Deadlines {
                insert: Duration::from_secs(2),
                find: Duration::from_secs(5),
            }
        );
        assert_eq!(cli.missing_label, MissingLabel::Strict);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = Cli::try_parse_from(&["remote-docstore", "--missing-label", "sometimes"]);
        assert!(result.is_err());
    }
}
