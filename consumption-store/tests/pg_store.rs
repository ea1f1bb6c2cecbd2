//! Store behaviour against a live Postgres.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p consumption-store -- --ignored`.
//! Each test works on its own MPAN so runs do not interfere.

use anyhow::Result;
use consumption_store::{db::consumption_queries, PgStore, Reading, ReadingStore};
use rust_decimal_macros::dec;
use time::{macros::datetime, Duration, OffsetDateTime};

async fn store() -> Result<PgStore> {
    let uri = std::env::var("DATABASE_URL")?;
    let store = PgStore::connect(&uri, 2).await?;
    store.ensure_schema().await?;
    Ok(store)
}

async fn reset(store: &PgStore, mpan: &str) -> Result<()> {
    sqlx::query("DELETE FROM electricity_consumption WHERE mpan = $1")
        .bind(mpan)
        .execute(store.pool())
        .await?;
    Ok(())
}

fn half_hour(mpan: &str, start: OffsetDateTime, kwh: rust_decimal::Decimal) -> Reading {
    Reading::new(mpan, "TESTMETER", kwh, start, start + Duration::minutes(30)).unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn upsert_twice_keeps_one_row_with_original_identity() -> Result<()> {
    let store = store().await?;
    let mpan = "9900000000001";
    reset(&store, mpan).await?;

    let start = datetime!(2023-01-15 23:30:00 UTC);
    let first = store.upsert(&half_hour(mpan, start, dec!(0.5))).await?;
    let second = store.upsert(&half_hour(mpan, start, dec!(0.75))).await?;

    assert_eq!(first.storage_id, second.storage_id);
    assert_eq!(first.created_at, second.created_at);

    let rows = consumption_queries::by_meter_point(store.pool(), mpan).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].consumption, dec!(0.750));
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn batch_upsert_collapses_shared_keys() -> Result<()> {
    let store = store().await?;
    let mpan = "9900000000002";
    reset(&store, mpan).await?;

    let start = datetime!(2023-01-15 23:30:00 UTC);
    let batch = vec![
        half_hour(mpan, start, dec!(0.5)),
        half_hour(mpan, start + Duration::minutes(30), dec!(0.1)),
        half_hour(mpan, start, dec!(0.75)),
    ];
    let written = store.upsert_batch(&batch).await?;
    assert_eq!(written, 2);

    // replaying the same page is a no-op on row count
    store.upsert_batch(&batch).await?;
    let rows = consumption_queries::by_meter_point(store.pool(), mpan).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].interval_start, start);
    assert_eq!(rows[1].consumption, dec!(0.750));

    assert_eq!(store.upsert_batch(&[]).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn round_trip_by_id_preserves_fields() -> Result<()> {
    let store = store().await?;
    let mpan = "9900000000003";
    reset(&store, mpan).await?;

    let original = half_hour(mpan, datetime!(2023-01-16 00:30:00 +01:00), dec!(0.074));
    let stored = store.upsert(&original).await?;
    let id = stored.storage_id.expect("id assigned on insert");

    let loaded = consumption_queries::by_id(store.pool(), id)
        .await?
        .expect("row exists");
    assert_eq!(loaded.meter_point_id, original.meter_point_id);
    assert_eq!(loaded.meter_serial, original.meter_serial);
    assert_eq!(loaded.consumption, dec!(0.074));
    assert_eq!(loaded.interval_start, original.interval_start);
    assert_eq!(loaded.interval_end, original.interval_end);
    assert_eq!(loaded.unit, "kWh");
    assert_eq!(loaded.created_at, stored.created_at);

    assert!(consumption_queries::delete(store.pool(), id).await?);
    assert!(!consumption_queries::delete(store.pool(), id).await?);
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn latest_interval_end_and_period_queries() -> Result<()> {
    let store = store().await?;
    let mpan = "9900000000004";
    reset(&store, mpan).await?;

    assert_eq!(store.latest_interval_end(mpan).await?, None);

    let start = datetime!(2023-01-15 23:00:00 UTC);
    let batch: Vec<_> = (0..4)
        .map(|i| half_hour(mpan, start + Duration::minutes(30 * i), dec!(0.25)))
        .collect();
    store.upsert_batch(&batch).await?;

    assert_eq!(
        store.latest_interval_end(mpan).await?,
        Some(datetime!(2023-01-16 01:00:00 UTC))
    );

    let window = consumption_queries::by_period(
        store.pool(),
        mpan,
        datetime!(2023-01-15 23:30:00 UTC),
        datetime!(2023-01-16 00:30:00 UTC),
    )
    .await?;
    assert_eq!(window.len(), 2);
    assert!(window[0].interval_start > window[1].interval_start);

    let daily = consumption_queries::daily_aggregation(store.pool(), mpan).await?;
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].date, time::macros::date!(2023-01-16));
    assert_eq!(daily[0].reading_count, 2);
    assert_eq!(daily[0].total_consumption, dec!(0.500));
    assert_eq!(daily[1].reading_count, 2);
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn oversized_batch_size_is_split_under_parameter_limit() -> Result<()> {
    let store = store().await?.with_batch_size(20_000);
    assert_eq!(store.batch_size(), consumption_store::db::MAX_BATCH_SIZE);
    let mpan = "9900000000005";
    reset(&store, mpan).await?;

    let start = datetime!(2020-01-01 00:00:00 UTC);
    let batch: Vec<Reading> = (0..12_000)
        .map(|i| half_hour(mpan, start + Duration::minutes(30 * i), dec!(0.1)))
        .collect();

    assert_eq!(store.upsert_batch(&batch).await?, 12_000);
    let rows = consumption_queries::by_meter_point(store.pool(), mpan).await?;
    assert_eq!(rows.len(), 12_000);
    Ok(())
}
