//! File → dataset ingestion.
//!
//! One call ingests one file synchronously: the dataset row is written
//! first, then each channel is extracted, addressed, registered and loaded.
//! Channels that cannot be extracted are skipped; a storage write failure
//! aborts the file.

use crate::addressing;
use crate::catalog::Catalog;
use crate::config::IngestionConfig;
use crate::error::{Error, Result};
use crate::extract::{ChannelKey, InstrumentReader};
use crate::loader::ColumnarLoader;
use crate::storage::StorageBackend;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Summary of one loaded channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub channel_id: Uuid,
    pub group: String,
    pub name: String,
    pub unit: String,
    pub has_time: bool,
    pub rows: u64,
}

/// A channel left out of the dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedChannel {
    pub group: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub dataset_id: Uuid,
    pub filename: String,
    pub owner_id: Option<String>,
    pub channels: Vec<ChannelSummary>,
    pub skipped: Vec<SkippedChannel>,
    pub total_points: u64,
    pub elapsed_secs: f64,
}

/// Ingests instrument files into the store
#[derive(Clone)]
pub struct Ingestor {
    catalog: Catalog,
    loader: ColumnarLoader,
}

impl Ingestor {
    pub fn new(backend: Arc<dyn StorageBackend>, config: &IngestionConfig) -> Self {
        Self {
            catalog: Catalog::new(backend.clone()),
            loader: ColumnarLoader::new(backend, config),
        }
    }

    pub async fn ingest(
        &self,
        reader: &dyn InstrumentReader,
        filename: &str,
        owner: Option<&str>,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let dataset = self.catalog.create_dataset(filename, owner).await?;
        let dataset_id = dataset.dataset_id;
        info!(%dataset_id, filename, "Ingesting");

        let mut channels = Vec::new();
        let mut skipped = Vec::new();
        let mut total_points = 0u64;

        for key in reader.channel_keys() {
            let label = key.to_string();
            let (resolved, unit) = match extract(reader, &key, &label) {
                Ok(extracted) => extracted,
                Err(e) => {
                    warn!(channel = %label, error = %e, "Skipping channel");
                    skipped.push(SkippedChannel {
                        group: key.group.clone(),
                        name: key.channel.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let rows = resolved.len() as u64;
            let channel = self
                .catalog
                .create_channel(dataset_id, &key, &unit, resolved.has_time(), rows)
                .await?;
            let written = self
                .loader
                .load_channel(dataset_id, channel.channel_id, &label, &resolved)
                .await?;

            info!(
                channel = %label,
                channel_id = %channel.channel_id,
                rows = written,
                has_time = channel.has_time,
                "Channel loaded"
            );
            total_points += written;
            channels.push(ChannelSummary {
                channel_id: channel.channel_id,
                group: key.group,
                name: key.channel,
                unit,
                has_time: channel.has_time,
                rows: written,
            });
        }

        if channels.is_empty() {
            self.catalog.delete_dataset(dataset_id).await?;
            return Err(Error::InvalidData(format!(
                "{filename}: no valid channels ({} skipped)",
                skipped.len()
            )));
        }

        self.catalog.finalize_dataset(dataset_id, total_points).await?;

        let elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            %dataset_id,
            channels = channels.len(),
            skipped = skipped.len(),
            total_points,
            elapsed_secs,
            "Ingestion complete"
        );

        Ok(IngestReport {
            dataset_id,
            filename: filename.to_owned(),
            owner_id: dataset.owner_id,
            channels,
            skipped,
            total_points,
            elapsed_secs,
        })
    }
}

fn extract(
    reader: &dyn InstrumentReader,
    key: &ChannelKey,
    label: &str,
) -> Result<(addressing::ResolvedChannel, String)> {
    let samples = reader.read_samples(key)?;
    let track = reader.read_time_track(key).unwrap_or_else(|e| {
        warn!(channel = label, error = %e, "Time track unreadable, using sample index");
        None
    });
    let unit = reader.unit(key)?;
    let resolved = addressing::resolve(label, samples, track.as_ref())?;
    Ok((resolved, unit))
}
