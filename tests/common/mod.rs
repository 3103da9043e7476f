//! Common test utilities: in-memory store, small query limits, channel builders.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tdms_analytics_core::{
    catalog::Catalog,
    config::{IngestionConfig, QueryLimits},
    extract::{MemoryChannel, MemoryReader},
    ingest::Ingestor,
    storage::{DuckDbBackend, StorageBackend},
    window::WindowEngine,
    SampleArray, TimeTrack,
};

pub struct Harness {
    pub backend: Arc<dyn StorageBackend>,
    pub catalog: Catalog,
    pub ingestor: Ingestor,
    pub engine: WindowEngine,
}

pub fn limits() -> QueryLimits {
    QueryLimits {
        points_min: 2,
        points_max: 5_000,
        default_points: 100,
        limit_min: 1,
        limit_max: 20_000,
        default_limit: 1_000,
    }
}

pub fn ingestion(chunk_rows: usize) -> IngestionConfig {
    IngestionConfig {
        chunk_rows,
        workers: 4,
    }
}

pub async fn harness_with(pool_size: usize, chunk_rows: usize) -> Harness {
    let backend = DuckDbBackend::new(":memory:", HashMap::new(), pool_size)
        .expect("open in-memory DuckDB");
    backend.init().await.expect("create schema");
    let backend: Arc<dyn StorageBackend> = Arc::new(backend);
    Harness {
        catalog: Catalog::new(backend.clone()),
        ingestor: Ingestor::new(backend.clone(), &ingestion(chunk_rows)),
        engine: WindowEngine::new(backend.clone(), limits()),
        backend,
    }
}

pub async fn harness() -> Harness {
    harness_with(1, 1_000).await
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Waveform channel sampled every millisecond from `t0()`
pub fn time_channel(group: &str, name: &str, n: usize) -> MemoryChannel {
    MemoryChannel::new(group, name, SampleArray::Float64(ramp(n)))
        .with_time(TimeTrack::Waveform {
            start: t0(),
            increment_secs: 0.001,
        })
        .with_unit("V")
}

pub fn index_channel(group: &str, name: &str, n: usize) -> MemoryChannel {
    MemoryChannel::new(group, name, SampleArray::Float64(ramp(n)))
}

pub fn ramp(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

pub fn reader(channels: Vec<MemoryChannel>) -> MemoryReader {
    channels
        .into_iter()
        .fold(MemoryReader::new(), |r, c| r.with_channel(c))
}
