use std::collections::{hash_map::Entry, HashMap};

use rust_decimal::Decimal;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Postgres, QueryBuilder,
};
use time::OffsetDateTime;

use crate::{
    db::schema::{INSERT_COLUMNS, ON_CONFLICT_UPDATE, SCHEMA_STATEMENTS},
    domain::{Reading, DEFAULT_UNIT},
    error::StoreError,
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Parameters bound per row by the multi-row insert.
const BIND_PARAMS_PER_ROW: usize = 6;

/// Largest chunk that stays within Postgres's 65535 bind parameters per statement.
pub const MAX_BATCH_SIZE: usize = u16::MAX as usize / BIND_PARAMS_PER_ROW;

/// Clamp a requested chunk size to `1..=MAX_BATCH_SIZE`.
pub fn effective_batch_size(requested: usize) -> usize {
    let size = requested.clamp(1, MAX_BATCH_SIZE);
    if size != requested {
        tracing::warn!(requested, effective = size, "batch size out of range, clamping");
    }
    size
}

/// Idempotent persistence of readings keyed on `(meter_point_id, meter_serial, interval_start)`.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Create the table and its indexes if absent.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert or update one reading, returning it with `storage_id` and `created_at` filled in.
    async fn upsert(&self, reading: &Reading) -> Result<Reading, StoreError>;

    /// Upsert every reading; returns the number of distinct keys written.
    async fn upsert_batch(&self, readings: &[Reading]) -> Result<u64, StoreError>;

    /// Maximum `interval_end` stored for a meter point.
    ///
    /// Fails with [`StoreError::TableMissing`] before the first sync.
    async fn latest_interval_end(
        &self,
        meter_point_id: &str,
    ) -> Result<Option<OffsetDateTime>, StoreError>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ReadingRow {
    id: i64,
    mpan: String,
    meter_sn: String,
    consumption: Decimal,
    interval_start: OffsetDateTime,
    interval_end: OffsetDateTime,
    unit: Option<String>,
    created_at: Option<OffsetDateTime>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            meter_point_id: row.mpan,
            meter_serial: row.meter_sn,
            consumption: row.consumption,
            interval_start: row.interval_start,
            interval_end: row.interval_end,
            unit: row.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            storage_id: Some(row.id),
            created_at: row.created_at,
        }
    }
}

/// Keep the last occurrence of each key, in first-seen order.
///
/// Postgres rejects a multi-row `ON CONFLICT DO UPDATE` that hits the same row twice.
pub(crate) fn collapse_duplicate_keys(readings: &[Reading]) -> Vec<&Reading> {
    let mut positions = HashMap::with_capacity(readings.len());
    let mut out: Vec<&Reading> = Vec::with_capacity(readings.len());

    for reading in readings {
        match positions.entry(reading.key()) {
            Entry::Occupied(slot) => out[*slot.get()] = reading,
            Entry::Vacant(slot) => {
                slot.insert(out.len());
                out.push(reading);
            }
        }
    }

    out
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: effective_batch_size(batch_size),
        }
    }

    /// Open a pool and verify the server is reachable.
    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "unable to connect to PostgreSQL");
                StoreError::Database(e)
            })?;
        tracing::info!("connected to PostgreSQL");
        Ok(Self::new(pool, DEFAULT_BATCH_SIZE))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = effective_batch_size(batch_size);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_chunk(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        chunk: &[&Reading],
    ) -> Result<u64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(INSERT_COLUMNS);
        builder.push_values(chunk, |mut b, r| {
            b.push_bind(&r.meter_point_id)
                .push_bind(&r.meter_serial)
                .push_bind(r.consumption)
                .push_bind(r.interval_start)
                .push_bind(r.interval_end)
                .push_bind(&r.unit);
        });
        builder.push(ON_CONFLICT_UPDATE);

        let done = builder.build().execute(&mut **tx).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        tracing::debug!("creating database tables");
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!("database schema ready");
        Ok(())
    }

    async fn upsert(&self, reading: &Reading) -> Result<Reading, StoreError> {
        tracing::debug!(
            mpan = %reading.meter_point_id,
            meter_sn = %reading.meter_serial,
            interval_start = %reading.interval_start,
            "upserting consumption record"
        );

        let sql = format!("{INSERT_COLUMNS}VALUES ($1, $2, $3, $4, $5, $6){ON_CONFLICT_UPDATE} RETURNING id, created_at");
        let (id, created_at): (i64, Option<OffsetDateTime>) = sqlx::query_as(&sql)
            .bind(&reading.meter_point_id)
            .bind(&reading.meter_serial)
            .bind(reading.consumption)
            .bind(reading.interval_start)
            .bind(reading.interval_end)
            .bind(&reading.unit)
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(id, "consumption record stored");

        let mut stored = reading.clone();
        stored.storage_id = Some(id);
        stored.created_at = created_at;
        Ok(stored)
    }

    async fn upsert_batch(&self, readings: &[Reading]) -> Result<u64, StoreError> {
        if readings.is_empty() {
            tracing::debug!("no consumption records provided for batch upsert");
            return Ok(0);
        }

        let distinct = collapse_duplicate_keys(readings);
        if distinct.len() < readings.len() {
            tracing::warn!(
                received = readings.len(),
                distinct = distinct.len(),
                "batch contained repeated keys, keeping the last occurrence"
            );
        }

        let mut tx = self.pool.begin().await?;
        let mut written: u64 = 0;
        for chunk in distinct.chunks(self.batch_size) {
            written += self.insert_chunk(&mut tx, chunk).await?;
        }
        tx.commit().await?;

        metrics::counter!("consumption_upserted_records_total").increment(written);
        tracing::info!(records = written, "inserted/updated consumption records");

        Ok(written)
    }

    async fn latest_interval_end(
        &self,
        meter_point_id: &str,
    ) -> Result<Option<OffsetDateTime>, StoreError> {
        let latest: Option<OffsetDateTime> = sqlx::query_scalar(
            "SELECT MAX(interval_end) FROM electricity_consumption WHERE mpan = $1",
        )
        .bind(meter_point_id)
        .fetch_one(&self.pool)
        .await?;

        match latest {
            Some(ts) => tracing::debug!(mpan = meter_point_id, latest = %ts, "latest stored interval"),
            None => tracing::debug!(mpan = meter_point_id, "no consumption data stored"),
        }

        Ok(latest)
    }
}
