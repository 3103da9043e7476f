use crate::error::{Error, Result};
use crate::storage::{schema_statements, SqlValue, StorageBackend, PARTITION_COLUMN};
use arrow::array::RecordBatch;
use async_trait::async_trait;
use duckdb::types::Value;
use duckdb::{params_from_iter, Config, Connection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Rows DuckDB accepts per appended data chunk
const VECTOR_SIZE: usize = 2048;

/// DuckDB-based storage backend.
///
/// Holds `pool_size` connections to one database, each behind its own
/// mutex. Calls are spread round-robin over the pool.
#[derive(Clone)]
pub struct DuckDbBackend {
    pool: Vec<Arc<Mutex<Connection>>>,
    next: Arc<AtomicUsize>,
}

impl DuckDbBackend {
    pub fn new(
        connection_string: &str,
        options: HashMap<String, String>,
        pool_size: usize,
    ) -> Result<Self> {
        let mut config = Config::default();
        if let Some(threads) = options.get("threads") {
            let threads = threads
                .parse::<i64>()
                .map_err(|e| Error::Config(format!("Invalid threads option: {e}")))?;
            config = config.threads(threads)?;
        }

        let conn = Connection::open_with_flags(connection_string, config).map_err(|e| {
            Error::Connection(format!("Failed to open {connection_string}: {e}"))
        })?;

        let mut pool = Vec::with_capacity(pool_size.max(1));
        for _ in 1..pool_size {
            let clone = conn
                .try_clone()
                .map_err(|e| Error::Connection(format!("Failed to clone connection: {e}")))?;
            pool.push(Arc::new(Mutex::new(clone)));
        }
        pool.insert(0, Arc::new(Mutex::new(conn)));

        debug!(connection = connection_string, pool_size = pool.len(), "Opened DuckDB");

        Ok(Self {
            pool,
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::new(":memory:", HashMap::new(), 1)
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    fn conn(&self) -> &Arc<Mutex<Connection>> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        &self.pool[idx]
    }
}

fn to_values(params: Vec<SqlValue>) -> Vec<Value> {
    params
        .into_iter()
        .map(|p| match p {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(v) => Value::Boolean(v),
            SqlValue::Int(v) => Value::BigInt(v),
            SqlValue::UInt(v) => Value::UBigInt(v),
            SqlValue::Float(v) => Value::Double(v),
            SqlValue::Text(v) => Value::Text(v),
        })
        .collect()
}

#[async_trait]
impl StorageBackend for DuckDbBackend {
    async fn init(&self) -> Result<()> {
        let conn = self.conn().lock().await;
        for sql in schema_statements() {
            conn.execute_batch(&sql)
                .map_err(|e| Error::Storage(format!("Failed to create schema: {e}")))?;
        }
        Ok(())
    }

    async fn insert_batch(&self, table: &str, batch: RecordBatch) -> Result<()> {
        let mut conn = self.conn().lock().await;
        let tx = conn.transaction()?;
        {
            let mut appender = tx.appender(table)?;
            let rows = batch.num_rows();
            let mut offset = 0;
            while offset < rows {
                let len = VECTOR_SIZE.min(rows - offset);
                appender.append_record_batch(batch.slice(offset, len))?;
                offset += len;
            }
            appender.flush()?;
        }
        tx.commit()?;
        debug!(table, rows = batch.num_rows(), "Inserted batch");
        Ok(())
    }

    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<RecordBatch>> {
        debug!(sql, "query");
        let conn = self.conn().lock().await;
        let mut stmt = conn.prepare(sql)?;
        let batches = stmt.query_arrow(params_from_iter(to_values(params)))?.collect();
        Ok(batches)
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<usize> {
        debug!(sql, "execute");
        let conn = self.conn().lock().await;
        Ok(conn.execute(sql, params_from_iter(to_values(params)))?)
    }

    async fn drop_partition(&self, table: &str, key: &str) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE {PARTITION_COLUMN} = ?");
        let removed = self.execute(&sql, vec![SqlValue::from(key)]).await?;
        debug!(table, key, removed, "Dropped partition");
        Ok(())
    }

    fn supports_concurrent_writes(&self) -> bool {
        self.pool.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{as_i64, as_string, collect_column, POINTS_SCHEMA, POINTS_TABLE};
    use arrow::array::{Float64Array, Int64Array, StringArray, UInt64Array, UInt8Array};
    use arrow::datatypes::DataType;

    fn points(dataset: &str, n: usize) -> RecordBatch {
        RecordBatch::try_new(
            POINTS_SCHEMA.clone(),
            vec![
                Arc::new(StringArray::from(vec![dataset; n])),
                Arc::new(StringArray::from(vec!["c"; n])),
                Arc::new(Int64Array::from((0..n as i64).collect::<Vec<_>>())),
                Arc::new(UInt64Array::from(vec![0u64; n])),
                Arc::new(Float64Array::from(vec![1.0; n])),
                Arc::new(UInt8Array::from(vec![1u8; n])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_query_and_drop() {
        let backend = DuckDbBackend::new_in_memory().unwrap();
        backend.init().await.unwrap();

        // Larger than one DuckDB vector to exercise slicing
        backend.insert_batch(POINTS_TABLE, points("a", 5000)).await.unwrap();
        backend.insert_batch(POINTS_TABLE, points("b", 10)).await.unwrap();

        let batches = backend
            .query(
                "SELECT count(*) AS n FROM sensor_points WHERE dataset_id = ?",
                vec!["a".into()],
            )
            .await
            .unwrap();
        let n = collect_column(&batches, "n", &DataType::Int64, as_i64).unwrap();
        assert_eq!(n, vec![5000]);

        backend.drop_partition(POINTS_TABLE, "a").await.unwrap();
        let batches = backend
            .query("SELECT DISTINCT dataset_id FROM sensor_points", vec![])
            .await
            .unwrap();
        let ids = collect_column(&batches, "dataset_id", &DataType::Utf8, as_string).unwrap();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_pool_shares_database() {
        let backend = DuckDbBackend::new(":memory:", HashMap::new(), 3).unwrap();
        assert!(backend.supports_concurrent_writes());
        backend.init().await.unwrap();
        for _ in 0..3 {
            backend.insert_batch(POINTS_TABLE, points("a", 4)).await.unwrap();
        }
        let batches = backend
            .query("SELECT count(*) AS n FROM sensor_points", vec![])
            .await
            .unwrap();
        let n = collect_column(&batches, "n", &DataType::Int64, as_i64).unwrap();
        assert_eq!(n, vec![12]);
    }

    #[test]
    fn test_single_connection_is_serial() {
        let backend = DuckDbBackend::new_in_memory().unwrap();
        assert!(!backend.supports_concurrent_writes());
        assert_eq!(backend.pool_size(), 1);
    }
}
