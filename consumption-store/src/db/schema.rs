pub const TABLE_NAME: &str = "electricity_consumption";

/// DDL applied by `ensure_schema`, one statement per entry.
///
/// Every statement is `IF NOT EXISTS` so the whole set can be replayed on each run.
pub const SCHEMA_STATEMENTS: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS electricity_consumption (
        id BIGSERIAL PRIMARY KEY,
        mpan VARCHAR(13) NOT NULL,
        meter_sn VARCHAR(50) NOT NULL,
        consumption DECIMAL(10, 3) NOT NULL,
        interval_start TIMESTAMPTZ NOT NULL,
        interval_end TIMESTAMPTZ NOT NULL,
        unit VARCHAR(10) DEFAULT 'kWh',
        created_at TIMESTAMPTZ DEFAULT NOW(),
        CONSTRAINT unique_reading UNIQUE (mpan, meter_sn, interval_start)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_mpan_interval ON electricity_consumption (mpan, interval_start DESC)",
    "CREATE INDEX IF NOT EXISTS idx_meter_interval ON electricity_consumption (meter_sn, interval_start DESC)",
    "CREATE INDEX IF NOT EXISTS idx_interval_start ON electricity_consumption (interval_start DESC)",
];

pub const INSERT_COLUMNS: &str =
    "INSERT INTO electricity_consumption (mpan, meter_sn, consumption, interval_start, interval_end, unit) ";

pub const ON_CONFLICT_UPDATE: &str = " ON CONFLICT (mpan, meter_sn, interval_start) DO UPDATE SET \
    consumption = EXCLUDED.consumption, \
    interval_end = EXCLUDED.interval_end, \
    unit = EXCLUDED.unit";

pub const SELECT_COLUMNS: &str =
    "SELECT id, mpan, meter_sn, consumption, interval_start, interval_end, unit, created_at FROM electricity_consumption";
