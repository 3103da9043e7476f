//! Dataset and channel metadata.
//!
//! A dataset row is written before its channels and a channel row before its
//! points. Deletion runs the other way: points partition, channels, dataset.

use crate::addressing::Position;
use crate::error::{Error, Result};
use crate::extract::ChannelKey;
use crate::storage::{
    as_bool, as_i64, as_string, as_u64, collect_column, collect_optional_column, first_value,
    SqlValue, StorageBackend, CHANNELS_TABLE, DATASETS_TABLE, POINTS_TABLE,
};
use arrow::array::RecordBatch;
use arrow::datatypes::DataType;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One ingested file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub dataset_id: Uuid,
    /// `None` for single-tenant deployments
    pub owner_id: Option<String>,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub total_points: u64,
}

/// One channel of a dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub channel_id: Uuid,
    pub dataset_id: Uuid,
    pub group_name: String,
    pub channel_name: String,
    pub unit: String,
    pub has_time: bool,
    pub n_rows: u64,
}

impl Channel {
    /// Stored column holding this channel's positions
    pub fn position_column(&self) -> &'static str {
        position_column(self.has_time)
    }
}

pub(crate) fn position_column(has_time: bool) -> &'static str {
    if has_time {
        "timestamp_us"
    } else {
        "sample_index"
    }
}

/// Extent of one channel in its native unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub channel_id: Uuid,
    pub has_time: bool,
    pub min: Option<Position>,
    pub max: Option<Position>,
    /// ISO-8601 form of `min`, time channels only
    pub min_iso: Option<String>,
    /// ISO-8601 form of `max`, time channels only
    pub max_iso: Option<String>,
    pub total_points: u64,
}

const DATASET_COLUMNS: &str = "dataset_id, owner_id, filename, created_at, total_points";
const CHANNEL_COLUMNS: &str =
    "channel_id, dataset_id, group_name, channel_name, unit, has_time, n_rows";

/// Metadata access over the storage backend
#[derive(Clone)]
pub struct Catalog {
    backend: Arc<dyn StorageBackend>,
}

impl Catalog {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn create_dataset(&self, filename: &str, owner: Option<&str>) -> Result<Dataset> {
        let dataset = Dataset {
            dataset_id: Uuid::new_v4(),
            owner_id: owner.map(str::to_owned),
            filename: filename.to_owned(),
            created_at: Utc::now(),
            total_points: 0,
        };
        let sql = format!("INSERT INTO {DATASETS_TABLE} ({DATASET_COLUMNS}) VALUES (?, ?, ?, ?, ?)");
        self.backend
            .execute(
                &sql,
                vec![
                    id_param(&dataset.dataset_id),
                    dataset.owner_id.clone().into(),
                    dataset.filename.clone().into(),
                    dataset.created_at.timestamp_micros().into(),
                    0u64.into(),
                ],
            )
            .await?;
        Ok(dataset)
    }

    /// Record the dataset's point total once ingestion has finished.
    pub async fn finalize_dataset(&self, dataset_id: Uuid, total_points: u64) -> Result<()> {
        let sql = format!("UPDATE {DATASETS_TABLE} SET total_points = ? WHERE dataset_id = ?");
        let updated = self
            .backend
            .execute(&sql, vec![total_points.into(), id_param(&dataset_id)])
            .await?;
        if updated == 0 {
            return Err(Error::dataset_not_found(dataset_id));
        }
        Ok(())
    }

    pub async fn get_dataset(&self, dataset_id: Uuid) -> Result<Dataset> {
        let sql = format!("SELECT {DATASET_COLUMNS} FROM {DATASETS_TABLE} WHERE dataset_id = ?");
        let batches = self.backend.query(&sql, vec![id_param(&dataset_id)]).await?;
        datasets_from(&batches)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::dataset_not_found(dataset_id))
    }

    /// Datasets newest first. `Some(owner)` restricts to that owner's datasets.
    pub async fn list_datasets(&self, owner: Option<&str>) -> Result<Vec<Dataset>> {
        let (filter, params) = match owner {
            Some(owner) => ("WHERE owner_id = ?", vec![SqlValue::from(owner)]),
            None => ("", vec![]),
        };
        let sql = format!(
            "SELECT {DATASET_COLUMNS} FROM {DATASETS_TABLE} {filter} ORDER BY created_at DESC"
        );
        let batches = self.backend.query(&sql, params).await?;
        datasets_from(&batches)
    }

    pub async fn create_channel(
        &self,
        dataset_id: Uuid,
        key: &ChannelKey,
        unit: &str,
        has_time: bool,
        n_rows: u64,
    ) -> Result<Channel> {
        let channel = Channel {
            channel_id: Uuid::new_v4(),
            dataset_id,
            group_name: key.group.clone(),
            channel_name: key.channel.clone(),
            unit: unit.to_owned(),
            has_time,
            n_rows,
        };
        let sql =
            format!("INSERT INTO {CHANNELS_TABLE} ({CHANNEL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)");
        self.backend
            .execute(
                &sql,
                vec![
                    id_param(&channel.channel_id),
                    id_param(&channel.dataset_id),
                    channel.group_name.clone().into(),
                    channel.channel_name.clone().into(),
                    channel.unit.clone().into(),
                    has_time.into(),
                    n_rows.into(),
                ],
            )
            .await?;
        Ok(channel)
    }

    pub async fn get_channel(&self, channel_id: Uuid) -> Result<Channel> {
        let sql = format!("SELECT {CHANNEL_COLUMNS} FROM {CHANNELS_TABLE} WHERE channel_id = ?");
        let batches = self.backend.query(&sql, vec![id_param(&channel_id)]).await?;
        channels_from(&batches)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::channel_not_found(channel_id))
    }

    pub async fn list_channels(&self, dataset_id: Uuid) -> Result<Vec<Channel>> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM {CHANNELS_TABLE} WHERE dataset_id = ?
             ORDER BY group_name, channel_name"
        );
        let batches = self.backend.query(&sql, vec![id_param(&dataset_id)]).await?;
        channels_from(&batches)
    }

    /// Min, max and count of the channel's stored positions.
    pub async fn channel_time_range(&self, channel: &Channel) -> Result<TimeRange> {
        let col = channel.position_column();
        let sql = format!(
            "SELECT min({col}) AS lo, max({col}) AS hi, count(*) AS n FROM {POINTS_TABLE}
             WHERE dataset_id = ? AND channel_id = ? AND is_time_series = ?"
        );
        let batches = self
            .backend
            .query(
                &sql,
                vec![
                    id_param(&channel.dataset_id),
                    id_param(&channel.channel_id),
                    SqlValue::UInt(u64::from(channel.has_time)),
                ],
            )
            .await?;

        let (min, max) = if channel.has_time {
            (
                first_value(&batches, "lo", &DataType::Int64, as_i64)?.map(Position::Time),
                first_value(&batches, "hi", &DataType::Int64, as_i64)?.map(Position::Time),
            )
        } else {
            (
                first_value(&batches, "lo", &DataType::UInt64, as_u64)?.map(Position::Index),
                first_value(&batches, "hi", &DataType::UInt64, as_u64)?.map(Position::Index),
            )
        };
        let total_points = first_value(&batches, "n", &DataType::UInt64, as_u64)?.unwrap_or(0);

        Ok(TimeRange {
            channel_id: channel.channel_id,
            has_time: channel.has_time,
            min,
            max,
            min_iso: min.and_then(|p| iso(&p)),
            max_iso: max.and_then(|p| iso(&p)),
            total_points,
        })
    }

    /// Remove a dataset: points partition, then channels, then the dataset row.
    pub async fn delete_dataset(&self, dataset_id: Uuid) -> Result<()> {
        let id = dataset_id.hyphenated().to_string();
        self.backend.drop_partition(POINTS_TABLE, &id).await?;
        self.backend
            .execute(
                &format!("DELETE FROM {CHANNELS_TABLE} WHERE dataset_id = ?"),
                vec![SqlValue::Text(id.clone())],
            )
            .await?;
        let removed = self
            .backend
            .execute(
                &format!("DELETE FROM {DATASETS_TABLE} WHERE dataset_id = ?"),
                vec![SqlValue::Text(id)],
            )
            .await?;
        info!(%dataset_id, removed, "Dataset deleted");
        Ok(())
    }
}

pub(crate) fn id_param(id: &Uuid) -> SqlValue {
    SqlValue::Text(id.hyphenated().to_string())
}

fn iso(p: &Position) -> Option<String> {
    p.to_datetime()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Storage(format!("Stored id {s:?} is not a UUID: {e}")))
}

fn datasets_from(batches: &[RecordBatch]) -> Result<Vec<Dataset>> {
    let ids = collect_column(batches, "dataset_id", &DataType::Utf8, as_string)?;
    let owners = collect_optional_column(batches, "owner_id", &DataType::Utf8, as_string)?;
    let filenames = collect_column(batches, "filename", &DataType::Utf8, as_string)?;
    let created = collect_column(batches, "created_at", &DataType::Int64, as_i64)?;
    let totals = collect_column(batches, "total_points", &DataType::UInt64, as_u64)?;

    ids.iter()
        .zip(owners)
        .zip(filenames)
        .zip(created)
        .zip(totals)
        .map(|((((id, owner_id), filename), created_at), total_points)| {
            Ok(Dataset {
                dataset_id: parse_uuid(id)?,
                owner_id,
                filename,
                created_at: DateTime::from_timestamp_micros(created_at).ok_or_else(|| {
                    Error::Storage(format!("created_at {created_at} out of range"))
                })?,
                total_points,
            })
        })
        .collect()
}

fn channels_from(batches: &[RecordBatch]) -> Result<Vec<Channel>> {
    let ids = collect_column(batches, "channel_id", &DataType::Utf8, as_string)?;
    let datasets = collect_column(batches, "dataset_id", &DataType::Utf8, as_string)?;
    let groups = collect_column(batches, "group_name", &DataType::Utf8, as_string)?;
    let names = collect_column(batches, "channel_name", &DataType::Utf8, as_string)?;
    let units = collect_column(batches, "unit", &DataType::Utf8, as_string)?;
    let has_time = collect_column(batches, "has_time", &DataType::Boolean, as_bool)?;
    let n_rows = collect_column(batches, "n_rows", &DataType::UInt64, as_u64)?;

    let mut out = Vec::with_capacity(ids.len());
    for i in 0..ids.len() {
        out.push(Channel {
            channel_id: parse_uuid(&ids[i])?,
            dataset_id: parse_uuid(&datasets[i])?,
            group_name: groups[i].clone(),
            channel_name: names[i].clone(),
            unit: units[i].clone(),
            has_time: has_time[i],
            n_rows: n_rows[i],
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DuckDbBackend;

    async fn catalog() -> Catalog {
        let backend = DuckDbBackend::new_in_memory().unwrap();
        backend.init().await.unwrap();
        Catalog::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn test_dataset_lifecycle() {
        let catalog = catalog().await;
        let ds = catalog.create_dataset("run1.tdms", Some("alice")).await.unwrap();
        catalog.finalize_dataset(ds.dataset_id, 42).await.unwrap();

        let loaded = catalog.get_dataset(ds.dataset_id).await.unwrap();
        assert_eq!(loaded.owner_id.as_deref(), Some("alice"));
        assert_eq!(loaded.filename, "run1.tdms");
        assert_eq!(loaded.total_points, 42);
        assert_eq!(loaded.created_at.timestamp_micros(), ds.created_at.timestamp_micros());

        catalog.delete_dataset(ds.dataset_id).await.unwrap();
        assert!(catalog.get_dataset(ds.dataset_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_datasets_by_owner() {
        let catalog = catalog().await;
        catalog.create_dataset("a.tdms", Some("alice")).await.unwrap();
        catalog.create_dataset("b.tdms", Some("bob")).await.unwrap();
        catalog.create_dataset("c.tdms", None).await.unwrap();

        let alice = catalog.list_datasets(Some("alice")).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].filename, "a.tdms");

        let all = catalog.list_datasets(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert!(all.iter().any(|d| d.owner_id.is_none()));
    }

    #[tokio::test]
    async fn test_channels_and_empty_range() {
        let catalog = catalog().await;
        let ds = catalog.create_dataset("a.tdms", None).await.unwrap();
        let ch = catalog
            .create_channel(ds.dataset_id, &ChannelKey::new("g", "v"), "V", true, 0)
            .await
            .unwrap();

        assert_eq!(catalog.get_channel(ch.channel_id).await.unwrap(), ch);
        assert_eq!(catalog.list_channels(ds.dataset_id).await.unwrap(), vec![ch.clone()]);

        let range = catalog.channel_time_range(&ch).await.unwrap();
        assert_eq!(range.total_points, 0);
        assert!(range.min.is_none() && range.max_iso.is_none());

        let missing = catalog.get_channel(Uuid::new_v4()).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_finalize_missing_dataset() {
        let catalog = catalog().await;
        let err = catalog.finalize_dataset(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
