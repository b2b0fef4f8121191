//! Read path: queries → predicates → reassembled series

use crate::gateway::{SortSpec, StorageGateway};
use crate::matcher::{MatcherCompiler, Query};
use crate::metrics::metrics;
use crate::{Result, TimeSeries};

/// Series matched by one query, one per stored document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub series: Vec<TimeSeries>,
}

#[derive(Clone)]
pub struct ReadTranslator {
    gateway: StorageGateway,
    compiler: MatcherCompiler,
}

impl ReadTranslator {
    pub fn new(gateway: StorageGateway, compiler: MatcherCompiler) -> Self {
        Self { gateway, compiler }
    }

    pub async fn execute(&self, query: &Query) -> Result<QueryResult> {
        let predicate = self.compiler.compile(query)?;
        tracing::debug!(filter = %predicate.to_filter(), "finding documents");

        let cursor = self
            .gateway
            .find(&predicate, SortSpec::NewestSampleFirst)
            .await?;
        let series: Vec<TimeSeries> = cursor.map(|doc| doc.into_series()).collect();

        metrics().queries_executed.inc();
        metrics().series_returned.add(series.len() as u64);

        Ok(QueryResult { series })
    }

    /// Run every query in request order. Any failure fails the whole read.
    pub async fn run(&self, queries: &[Query]) -> Result<Vec<QueryResult>> {
        let mut results = Vec::with_capacity(queries.len());
        for (idx, query) in queries.iter().enumerate() {
            let result = self.execute(query).await.map_err(|e| {
                tracing::error!(query = idx, "read query failed: {}", e);
                e
            })?;
            results.push(result);
        }
        Ok(results)
    }
}
