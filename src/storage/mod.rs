//! Storage seam between the engine and the columnar store.
//!
//! The store is treated as a black box: an append-only, partition-aware
//! table store reachable through the `StorageBackend` trait. Components
//! receive an `Arc<dyn StorageBackend>` at construction time; nothing in the
//! engine holds a process-global handle.
//!
//! - `duckdb`: embedded DuckDB backend with a small connection pool

pub mod duckdb;

use crate::error::{Error, Result};
use arrow::array::{Array, ArrayRef, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::sync::Arc;

pub use self::duckdb::DuckDbBackend;

pub const DATASETS_TABLE: &str = "datasets";
pub const CHANNELS_TABLE: &str = "channels";
pub const POINTS_TABLE: &str = "sensor_points";

/// Column holding the partition key of the points table
pub const PARTITION_COLUMN: &str = "dataset_id";

lazy_static! {
    /// Fixed shape of one bulk-loaded points chunk.
    ///
    /// Exactly one of `timestamp_us` / `sample_index` is meaningful per row,
    /// selected by `is_time_series`; the other is zero-filled.
    pub static ref POINTS_SCHEMA: SchemaRef = Arc::new(Schema::new(vec![
        Field::new("dataset_id", DataType::Utf8, false),
        Field::new("channel_id", DataType::Utf8, false),
        Field::new("timestamp_us", DataType::Int64, false),
        Field::new("sample_index", DataType::UInt64, false),
        Field::new("value", DataType::Float64, false),
        Field::new("is_time_series", DataType::UInt8, false),
    ]));
}

/// DDL for the three tables, in creation order
pub fn schema_statements() -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {DATASETS_TABLE} (
                dataset_id   VARCHAR NOT NULL,
                owner_id     VARCHAR,
                filename     VARCHAR NOT NULL,
                created_at   BIGINT NOT NULL,
                total_points UBIGINT NOT NULL DEFAULT 0
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {CHANNELS_TABLE} (
                channel_id   VARCHAR NOT NULL,
                dataset_id   VARCHAR NOT NULL,
                group_name   VARCHAR NOT NULL,
                channel_name VARCHAR NOT NULL,
                unit         VARCHAR NOT NULL,
                has_time     BOOLEAN NOT NULL,
                n_rows       UBIGINT NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {POINTS_TABLE} (
                dataset_id     VARCHAR NOT NULL,
                channel_id     VARCHAR NOT NULL,
                timestamp_us   BIGINT NOT NULL DEFAULT 0,
                sample_index   UBIGINT NOT NULL DEFAULT 0,
                value          DOUBLE NOT NULL,
                is_time_series UTINYINT NOT NULL DEFAULT 0
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_points_order ON {POINTS_TABLE}
                (dataset_id, channel_id, is_time_series, timestamp_us, sample_index)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_channels_dataset ON {CHANNELS_TABLE} (dataset_id)"),
    ]
}

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Storage backend trait for the columnar store.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Create tables and indexes if missing.
    async fn init(&self) -> Result<()>;

    /// Append one batch as a single atomic write.
    async fn insert_batch(&self, table: &str, batch: RecordBatch) -> Result<()>;

    /// Run a parameterized query and return all result batches.
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<RecordBatch>>;

    /// Run a parameterized statement and return the affected row count.
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<usize>;

    /// Remove every row of `table` belonging to one partition key.
    async fn drop_partition(&self, table: &str, key: &str) -> Result<()>;

    /// Whether independent writes may run concurrently against this store.
    fn supports_concurrent_writes(&self) -> bool {
        false
    }
}

/// Helper functions for working with result batches
pub trait RecordBatchExt {
    /// Get a column by name cast to `data_type`
    fn typed_column(&self, name: &str, data_type: &DataType) -> Result<ArrayRef>;
}

impl RecordBatchExt for RecordBatch {
    fn typed_column(&self, name: &str, data_type: &DataType) -> Result<ArrayRef> {
        let col = self
            .column_by_name(name)
            .ok_or_else(|| Error::Storage(format!("Column {} not found", name)))?;
        if col.data_type() == data_type {
            return Ok(col.clone());
        }
        Ok(cast(col, data_type)?)
    }
}

/// Extract a column from every batch as a flat vector.
///
/// `extract` receives the column already cast to `data_type` and must
/// downcast it; nulls are skipped.
pub fn collect_column<T, F>(
    batches: &[RecordBatch],
    name: &str,
    data_type: &DataType,
    mut extract: F,
) -> Result<Vec<T>>
where
    F: FnMut(&ArrayRef, usize) -> Option<T>,
{
    let total: usize = batches.iter().map(|b| b.num_rows()).sum();
    let mut out = Vec::with_capacity(total);
    for batch in batches {
        let col = batch.typed_column(name, data_type)?;
        for row in 0..col.len() {
            if col.is_null(row) {
                continue;
            }
            match extract(&col, row) {
                Some(v) => out.push(v),
                None => {
                    return Err(Error::Storage(format!(
                        "Column {} has unexpected type {:?}",
                        name,
                        col.data_type()
                    )))
                }
            }
        }
    }
    Ok(out)
}

/// Like [`collect_column`] but keeps nulls as `None`, preserving row alignment.
pub fn collect_optional_column<T, F>(
    batches: &[RecordBatch],
    name: &str,
    data_type: &DataType,
    mut extract: F,
) -> Result<Vec<Option<T>>>
where
    F: FnMut(&ArrayRef, usize) -> Option<T>,
{
    let mut out = Vec::new();
    for batch in batches {
        let col = batch.typed_column(name, data_type)?;
        for row in 0..col.len() {
            if col.is_null(row) {
                out.push(None);
                continue;
            }
            let v = extract(&col, row).ok_or_else(|| {
                Error::Storage(format!("Column {} has unexpected type {:?}", name, col.data_type()))
            })?;
            out.push(Some(v));
        }
    }
    Ok(out)
}

/// Read a single scalar from the first row of a result.
pub fn first_value<T, F>(
    batches: &[RecordBatch],
    name: &str,
    data_type: &DataType,
    extract: F,
) -> Result<Option<T>>
where
    F: FnMut(&ArrayRef, usize) -> Option<T>,
{
    let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(None);
    };
    let first = batch.slice(0, 1);
    Ok(collect_column(std::slice::from_ref(&first), name, data_type, extract)?
        .into_iter()
        .next())
}

pub(crate) fn as_i64(col: &ArrayRef, row: usize) -> Option<i64> {
    col.as_any()
        .downcast_ref::<arrow::array::Int64Array>()
        .map(|a| a.value(row))
}

pub(crate) fn as_u64(col: &ArrayRef, row: usize) -> Option<u64> {
    col.as_any()
        .downcast_ref::<arrow::array::UInt64Array>()
        .map(|a| a.value(row))
}

pub(crate) fn as_f64(col: &ArrayRef, row: usize) -> Option<f64> {
    col.as_any()
        .downcast_ref::<arrow::array::Float64Array>()
        .map(|a| a.value(row))
}

pub(crate) fn as_bool(col: &ArrayRef, row: usize) -> Option<bool> {
    col.as_any()
        .downcast_ref::<arrow::array::BooleanArray>()
        .map(|a| a.value(row))
}

pub(crate) fn as_string(col: &ArrayRef, row: usize) -> Option<String> {
    col.as_any()
        .downcast_ref::<arrow::array::StringArray>()
        .map(|a| a.value(row).to_owned())
}
