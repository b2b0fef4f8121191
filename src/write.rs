//! Write path: incoming series → stored documents
//!
//! Series are inserted one at a time in request order. The first failed
//! insert stops the batch; documents inserted before it stay persisted and
//! the error says how many there were.

use crate::gateway::StorageGateway;
use crate::metrics::metrics;
use crate::{AdapterError, Result, StoredDocument, TimeSeries};

/// Summary of a fully persisted batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteAck {
    pub documents: usize,
    pub samples: usize,
}

/// Verbatim copy of a series into its persisted form
pub fn translate(series: TimeSeries) -> StoredDocument {
    StoredDocument {
        labels: series.labels,
        samples: series.samples,
    }
}

#[derive(Clone)]
pub struct WriteTranslator {
    gateway: StorageGateway,
}

impl WriteTranslator {
    pub fn new(gateway: StorageGateway) -> Self {
        Self { gateway }
    }

    pub async fn write_batch(&self, batch: Vec<TimeSeries>) -> Result<WriteAck> {
        let total = batch.len();
        let mut ack = WriteAck::default();

        for series in batch {
            let doc = translate(series);
            let samples = doc.samples.len();
            tracing::debug!(labels = ?doc.labels, samples, "inserting document");

            if let Err(source) = self.gateway.insert(doc).await {
                tracing::error!(
                    persisted = ack.documents,
                    total,
                    "aborting write batch: {}",
                    source
                );
                return Err(AdapterError::BatchAborted {
                    persisted: ack.documents,
                    total,
                    source,
                });
            }

            ack.documents += 1;
            ack.samples += samples;
            metrics().documents_written.inc();
            metrics().samples_written.add(samples as u64);
        }

        Ok(ack)
    }
}
