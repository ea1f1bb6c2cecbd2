use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};

/// Consumption summed per UTC calendar day and unit.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DailyConsumption {
    pub date: Date,
    pub unit: Option<String>,
    pub total_consumption: Decimal,
    pub reading_count: i64,
    pub first_reading: OffsetDateTime,
    pub last_reading: OffsetDateTime,
}
