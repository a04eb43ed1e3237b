//! Record store adapter.
//!
//! Lap records are written one document at a time and read back with a full
//! scan. There is no pagination and no transaction: a failed write leaves the
//! records written before it in place.

use crate::config::DatabaseConfig;
use crate::error::{PipelineError, Result};
use crate::model::FlatLapRecord;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use parking_lot::Mutex;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

/// Store for flat lap records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write a single record
    async fn put(&self, record: &FlatLapRecord) -> Result<()>;

    /// Write all records of one document, stopping at the first failure.
    ///
    /// The default issues one `put` per record, in order.
    async fn put_all(&self, records: &[FlatLapRecord]) -> Result<usize> {
        for (index, record) in records.iter().enumerate() {
            self.put(record).await.map_err(|e| match e {
                PipelineError::StoreWrite { message, .. } => {
                    PipelineError::StoreWrite { index, message }
                }
                other => PipelineError::StoreWrite {
                    index,
                    message: other.to_string(),
                },
            })?;
        }
        Ok(records.len())
    }

    /// Return every stored record
    async fn scan_all(&self) -> Result<Vec<FlatLapRecord>>;
}

#[derive(Debug, FromRow)]
struct LapRecordRow {
    race_id: String,
    lap_timestamp: i64,
    race_name: String,
    track_name: String,
    race_notes: String,
    driver_name: String,
    lap_number: i64,
    lap_time: i64,
    lap_date_time: String,
}

impl From<LapRecordRow> for FlatLapRecord {
    fn from(row: LapRecordRow) -> Self {
        Self {
            race_id: row.race_id,
            lap_timestamp: row.lap_timestamp,
            race_name: row.race_name,
            track_name: row.track_name,
            race_notes: row.race_notes,
            driver_name: row.driver_name,
            lap_number: row.lap_number,
            lap_time: row.lap_time,
            lap_date_time: row.lap_date_time,
        }
    }
}

const COLUMNS: &str = "race_id, lap_timestamp, race_name, track_name, race_notes, \
                       driver_name, lap_number, lap_time, lap_date_time";

/// PostgreSQL-backed record store. Rows are keyed by race, driver and lap
/// number, and a repeated write replaces the stored row.
pub struct PgRecordStore {
    pool: PgPool,
    table: String,
    batch_size: usize,
}

impl PgRecordStore {
    /// Connect to the database described by `config`
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .map_err(|e| PipelineError::StoreRead(format!("Failed to connect to PostgreSQL: {}", e)))?;

        info!(table = %config.table, "Connected to PostgreSQL record store");

        Ok(Self {
            pool,
            table: config.table.clone(),
            batch_size: config.write_batch_size.max(1),
        })
    }

    /// Create the record table if it is missing
    pub async fn ensure_table(&self) -> Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                race_id TEXT NOT NULL,
                lap_timestamp BIGINT NOT NULL,
                race_name TEXT NOT NULL,
                track_name TEXT NOT NULL,
                race_notes TEXT NOT NULL DEFAULT '',
                driver_name TEXT NOT NULL,
                lap_number BIGINT NOT NULL,
                lap_time BIGINT NOT NULL,
                lap_date_time TEXT NOT NULL,
                PRIMARY KEY (race_id, driver_name, lap_number)
            )
            "#,
            table = self.table
        );

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreWrite {
                index: 0,
                message: format!("Failed to create table {}: {}", self.table, e),
            })?;

        info!(table = %self.table, "Record table ready");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn insert_builder(&self) -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", self.table, COLUMNS))
    }

    fn push_upsert_clause(builder: &mut QueryBuilder<'static, Postgres>) {
        builder.push(
            " ON CONFLICT (race_id, driver_name, lap_number) DO UPDATE SET \
             lap_timestamp = EXCLUDED.lap_timestamp, \
             race_name = EXCLUDED.race_name, \
             track_name = EXCLUDED.track_name, \
             race_notes = EXCLUDED.race_notes, \
             lap_time = EXCLUDED.lap_time, \
             lap_date_time = EXCLUDED.lap_date_time",
        );
    }

    async fn insert_chunk(&self, chunk: &[FlatLapRecord]) -> std::result::Result<(), sqlx::Error> {
        let mut builder = self.insert_builder();
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(record.race_id.clone())
                .push_bind(record.lap_timestamp)
                .push_bind(record.race_name.clone())
                .push_bind(record.track_name.clone())
                .push_bind(record.race_notes.clone())
                .push_bind(record.driver_name.clone())
                .push_bind(record.lap_number)
                .push_bind(record.lap_time)
                .push_bind(record.lap_date_time.clone());
        });
        Self::push_upsert_clause(&mut builder);

        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, record), fields(race_id = %record.race_id, lap = record.lap_number))]
    async fn put(&self, record: &FlatLapRecord) -> Result<()> {
        self.insert_chunk(std::slice::from_ref(record))
            .await
            .map_err(|e| PipelineError::StoreWrite {
                index: 0,
                message: e.to_string(),
            })?;

        metrics::counter!("laptimes.records.written").increment(1);
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn put_all(&self, records: &[FlatLapRecord]) -> Result<usize> {
        let mut written = 0;

        for chunk in records.chunks(self.batch_size) {
            if let Err(e) = self.insert_chunk(chunk).await {
                warn!(
                    error = %e,
                    written = written,
                    remaining = records.len() - written,
                    "Record batch rejected, aborting remaining writes"
                );
                return Err(PipelineError::StoreWrite {
                    index: written,
                    message: e.to_string(),
                });
            }

            written += chunk.len();
            metrics::counter!("laptimes.records.written").increment(chunk.len() as u64);
            debug!(written = written, "Record batch written");
        }

        Ok(written)
    }

    #[instrument(skip(self))]
    async fn scan_all(&self) -> Result<Vec<FlatLapRecord>> {
        let sql = format!("SELECT {} FROM {}", COLUMNS, self.table);

        let rows = sqlx::query_as::<_, LapRecordRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::StoreRead(e.to_string()))?;

        debug!(count = rows.len(), "Scanned lap records");
        Ok(rows.into_iter().map(FlatLapRecord::from).collect())
    }
}

/// In-process record store, used for local runs and tests.
///
/// Keeps insertion order and replaces records with the same identity.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<FlatLapRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<FlatLapRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, record: &FlatLapRecord) -> Result<()> {
        let mut records = self.records.lock();

        let existing = records.iter_mut().find(|r| {
            r.race_id == record.race_id
                && r.driver_name == record.driver_name
                && r.lap_number == record.lap_number
        });
        match existing {
            Some(slot) => *slot = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<FlatLapRecord>> {
        Ok(self.records.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(driver: &str, lap: i64) -> FlatLapRecord {
        FlatLapRecord {
            race_id: "race-1".to_string(),
            lap_timestamp: 1_682_935_200_000 + lap * 60_000,
            race_name: "Heat 1".to_string(),
            track_name: "Lelystad".to_string(),
            race_notes: String::new(),
            driver_name: driver.to_string(),
            lap_number: lap,
            lap_time: 6000 + lap,
            lap_date_time: "2023-05-01T10:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_put_and_scan() {
        let store = InMemoryRecordStore::new();
        let written = store
            .put_all(&[record("Max", 1), record("Max", 2), record("Lewis", 1)])
            .await
            .unwrap();

        assert_eq!(written, 3);
        let scanned = store.scan_all().await.unwrap();
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[2].driver_name, "Lewis");
    }

    #[tokio::test]
    async fn test_in_memory_replaces_same_identity() {
        let store = InMemoryRecordStore::new();
        store.put(&record("Max", 1)).await.unwrap();

        let mut faster = record("Max", 1);
        faster.lap_time = 5900;
        store.put(&faster).await.unwrap();

        let scanned = store.scan_all().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].lap_time, 5900);
    }

    #[tokio::test]
    async fn test_in_memory_store_usable_after_panic_under_lock() {
        let store = InMemoryRecordStore::with_records(vec![record("Max", 1)]);

        let result = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = store.records.lock();
                    panic!("writer crashed");
                })
                .join()
        });
        assert!(result.is_err());

        assert_eq!(store.len(), 1);
        store.put(&record("Max", 2)).await.unwrap();
        assert_eq!(store.scan_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_default_put_all_stops_at_first_failure() {
        let mut store = MockRecordStore::new();
        let mut calls = 0;
        store.expect_put().times(2).returning(move |_| {
            calls += 1;
            if calls == 2 {
                Err(PipelineError::StoreWrite {
                    index: 0,
                    message: "throttled".to_string(),
                })
            } else {
                Ok(())
            }
        });

        // The mock overrides put_all too, so drive the provided method explicitly.
        let records = [record("Max", 1), record("Max", 2), record("Max", 3)];
        let err = sequential_put_all(&store, &records).await.unwrap_err();
        match err {
            PipelineError::StoreWrite { index, message } => {
                assert_eq!(index, 1);
                assert_eq!(message, "throttled");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    async fn sequential_put_all(
        store: &MockRecordStore,
        records: &[FlatLapRecord],
    ) -> Result<usize> {
        struct Sequential<'a>(&'a MockRecordStore);

        #[async_trait]
        impl<'a> RecordStore for Sequential<'a> {
            async fn put(&self, record: &FlatLapRecord) -> Result<()> {
                self.0.put(record).await
            }

            async fn scan_all(&self) -> Result<Vec<FlatLapRecord>> {
                self.0.scan_all().await
            }
        }

        Sequential(store).put_all(records).await
    }
}
