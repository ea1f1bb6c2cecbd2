use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
    db::{schema::SELECT_COLUMNS, store::ReadingRow},
    domain::{DailyConsumption, Reading},
    error::StoreError,
};

/// Fetch one stored reading by its surrogate id.
pub async fn by_id(pool: &PgPool, id: i64) -> Result<Option<Reading>, StoreError> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
    let row = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Reading::from))
}

pub async fn all(pool: &PgPool) -> Result<Vec<Reading>, StoreError> {
    let sql = format!("{SELECT_COLUMNS} ORDER BY interval_start DESC");
    let rows = sqlx::query_as::<_, ReadingRow>(&sql).fetch_all(pool).await?;

    Ok(rows.into_iter().map(Reading::from).collect())
}

/// Every reading for a meter point, newest interval first.
pub async fn by_meter_point(pool: &PgPool, meter_point_id: &str) -> Result<Vec<Reading>, StoreError> {
    let sql = format!("{SELECT_COLUMNS} WHERE mpan = $1 ORDER BY interval_start DESC");
    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(meter_point_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Reading::from).collect())
}

/// Readings whose `interval_start` falls in `[from, to)`, newest first.
pub async fn by_period(
    pool: &PgPool,
    meter_point_id: &str,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<Vec<Reading>, StoreError> {
    let sql = format!(
        "{SELECT_COLUMNS} WHERE mpan = $1 AND interval_start >= $2 AND interval_start < $3 \
         ORDER BY interval_start DESC"
    );
    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(meter_point_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Reading::from).collect())
}

/// Sum consumption per UTC calendar day of `interval_start` and unit.
pub async fn daily_aggregation(
    pool: &PgPool,
    meter_point_id: &str,
) -> Result<Vec<DailyConsumption>, StoreError> {
    let rows = sqlx::query_as::<_, DailyConsumption>(
        r#"
        SELECT
            (interval_start AT TIME ZONE 'UTC')::date AS date,
            unit,
            SUM(consumption)                          AS total_consumption,
            COUNT(*)                                  AS reading_count,
            MIN(interval_start)                       AS first_reading,
            MAX(interval_end)                         AS last_reading
        FROM electricity_consumption
        WHERE mpan = $1
        GROUP BY (interval_start AT TIME ZONE 'UTC')::date, unit
        ORDER BY date DESC
        "#,
    )
    .bind(meter_point_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Administrative removal by surrogate id. Returns whether a row was deleted.
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, StoreError> {
    let done = sqlx::query("DELETE FROM electricity_consumption WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    let deleted = done.rows_affected() > 0;
    if deleted {
        tracing::debug!(id, "consumption record deleted");
    } else {
        tracing::debug!(id, "consumption record not found");
    }
    Ok(deleted)
}
