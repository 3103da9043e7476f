//! Columnar bulk loader.
//!
//! Turns one resolved channel into fixed-shape point batches and appends
//! them to the points table, one atomic insert per chunk. There is no
//! transaction across chunks: when a chunk fails, the chunks before it stay
//! committed and the failure names the row offset of the failing chunk.

use crate::addressing::{Positions, ResolvedChannel};
use crate::config::IngestionConfig;
use crate::error::{Error, Result};
use crate::storage::{StorageBackend, POINTS_SCHEMA, POINTS_TABLE};
use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, RecordBatch, StringBuilder, UInt64Builder,
    UInt8Builder,
};
use futures::stream::{self, StreamExt};
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Bulk loader for sensor points
#[derive(Clone)]
pub struct ColumnarLoader {
    backend: Arc<dyn StorageBackend>,
    chunk_rows: usize,
    workers: usize,
}

impl ColumnarLoader {
    pub fn new(backend: Arc<dyn StorageBackend>, config: &IngestionConfig) -> Self {
        Self {
            backend,
            chunk_rows: config.chunk_rows.max(1),
            workers: config.effective_workers(),
        }
    }

    pub fn chunk_rows(&self) -> usize {
        self.chunk_rows
    }

    /// Load every row of `channel`, returning the number of rows written.
    ///
    /// `label` names the channel in the error when a chunk fails.
    pub async fn load_channel(
        &self,
        dataset_id: Uuid,
        channel_id: Uuid,
        label: &str,
        channel: &ResolvedChannel,
    ) -> Result<u64> {
        let n = channel.len();
        if channel.positions.len() != n {
            return Err(Error::InvalidData(format!(
                "channel {label}: {} positions for {} values",
                channel.positions.len(),
                n
            )));
        }

        let dataset = dataset_id.hyphenated().to_string();
        let channel_key = channel_id.hyphenated().to_string();
        let concurrency = if self.backend.supports_concurrent_writes() {
            self.workers.max(1)
        } else {
            1
        };

        let ranges = (0..n).step_by(self.chunk_rows).map(|start| start..(start + self.chunk_rows).min(n));

        // `buffered` yields in submission order, so the first error seen is
        // the earliest failing chunk.
        let mut writes = stream::iter(ranges)
            .map(|range| {
                let backend = self.backend.clone();
                let batch = build_chunk(&dataset, &channel_key, channel, range.clone());
                async move {
                    let result = match batch {
                        Ok(batch) => backend.insert_batch(POINTS_TABLE, batch).await,
                        Err(e) => Err(e),
                    };
                    (range, result)
                }
            })
            .buffered(concurrency);

        let mut written = 0u64;
        while let Some((range, result)) = writes.next().await {
            if let Err(e) = result {
                return Err(Error::Ingestion {
                    channel: label.to_owned(),
                    row_offset: range.start as u64,
                    reason: e.to_string(),
                });
            }
            debug!(channel = label, offset = range.start, rows = range.len(), "Chunk written");
            written += range.len() as u64;
        }

        Ok(written)
    }
}

/// Build one points batch for `rows` of `channel`.
///
/// The position column the channel does not use is zero-filled.
pub fn build_chunk(
    dataset_id: &str,
    channel_id: &str,
    channel: &ResolvedChannel,
    rows: Range<usize>,
) -> Result<RecordBatch> {
    let len = rows.len();
    let mut dataset_col = StringBuilder::with_capacity(len, len * dataset_id.len());
    let mut channel_col = StringBuilder::with_capacity(len, len * channel_id.len());
    let mut ts_col = Int64Builder::with_capacity(len);
    let mut idx_col = UInt64Builder::with_capacity(len);
    let mut value_col = Float64Builder::with_capacity(len);
    let mut flag_col = UInt8Builder::with_capacity(len);

    for _ in 0..len {
        dataset_col.append_value(dataset_id);
        channel_col.append_value(channel_id);
    }
    value_col.append_slice(&channel.values[rows.clone()]);

    match &channel.positions {
        Positions::Time(us) => {
            ts_col.append_slice(&us[rows]);
            idx_col.append_slice(&vec![0; len]);
            flag_col.append_slice(&vec![1; len]);
        }
        Positions::Index(idx) => {
            ts_col.append_slice(&vec![0; len]);
            idx_col.append_slice(&idx[rows]);
            flag_col.append_slice(&vec![0; len]);
        }
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(dataset_col.finish()),
        Arc::new(channel_col.finish()),
        Arc::new(ts_col.finish()),
        Arc::new(idx_col.finish()),
        Arc::new(value_col.finish()),
        Arc::new(flag_col.finish()),
    ];
    Ok(RecordBatch::try_new(POINTS_SCHEMA.clone(), columns)?)
}
