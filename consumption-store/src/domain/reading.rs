use rust_decimal::Decimal;
use time::{OffsetDateTime, UtcOffset};

pub const DEFAULT_UNIT: &str = "kWh";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadingError {
    #[error("interval_end {end} is not after interval_start {start}")]
    EmptyInterval {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    #[error("consumption must be non-negative, got {0}")]
    NegativeConsumption(Decimal),
}

/// One consumption interval for one meter.
///
/// `(meter_point_id, meter_serial, interval_start)` is the natural key; the
/// store assigns `storage_id` and `created_at` on first insert and never
/// changes them afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub meter_point_id: String,
    pub meter_serial: String,
    pub consumption: Decimal,
    pub interval_start: OffsetDateTime,
    pub interval_end: OffsetDateTime,
    pub unit: String,
    pub storage_id: Option<i64>,
    pub created_at: Option<OffsetDateTime>,
}

/// Borrowed identity of a [`Reading`], normalized to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadingKey<'a> {
    pub meter_point_id: &'a str,
    pub meter_serial: &'a str,
    pub interval_start: OffsetDateTime,
}

impl Reading {
    /// Build an unsaved reading in the default unit.
    pub fn new(
        meter_point_id: impl Into<String>,
        meter_serial: impl Into<String>,
        consumption: Decimal,
        interval_start: OffsetDateTime,
        interval_end: OffsetDateTime,
    ) -> Result<Self, ReadingError> {
        let reading = Reading {
            meter_point_id: meter_point_id.into(),
            meter_serial: meter_serial.into(),
            consumption,
            interval_start,
            interval_end,
            unit: DEFAULT_UNIT.to_string(),
            storage_id: None,
            created_at: None,
        };
        reading.validate()?;
        Ok(reading)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Check the interval and consumption invariants.
    pub fn validate(&self) -> Result<(), ReadingError> {
        if self.interval_end <= self.interval_start {
            return Err(ReadingError::EmptyInterval {
                start: self.interval_start,
                end: self.interval_end,
            });
        }
        if self.consumption.is_sign_negative() && !self.consumption.is_zero() {
            return Err(ReadingError::NegativeConsumption(self.consumption));
        }
        Ok(())
    }

    pub fn key(&self) -> ReadingKey<'_> {
        ReadingKey {
            meter_point_id: &self.meter_point_id,
            meter_serial: &self.meter_serial,
            interval_start: self.interval_start.to_offset(UtcOffset::UTC),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.storage_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::{datetime, offset};

    fn sample() -> Reading {
        Reading::new(
            "1234567890123",
            "METER123456",
            dec!(0.5),
            datetime!(2023-01-15 23:30:00 UTC),
            datetime!(2023-01-16 00:00:00 UTC),
        )
        .unwrap()
    }

    #[test]
    fn new_reading_defaults_to_kwh_and_is_unsaved() {
        let r = sample();
        assert_eq!(r.unit, "kWh");
        assert_eq!(r.consumption, dec!(0.5));
        assert!(r.storage_id.is_none());
        assert!(r.created_at.is_none());
        assert!(!r.is_persisted());
    }

    #[test]
    fn rejects_interval_end_not_after_start() {
        let res = Reading::new(
            "1234567890123",
            "METER123456",
            dec!(0.5),
            datetime!(2023-01-16 00:00:00 UTC),
            datetime!(2023-01-16 00:00:00 UTC),
        );
        assert!(matches!(res, Err(ReadingError::EmptyInterval { .. })));
    }

    #[test]
    fn rejects_negative_consumption_but_accepts_zero() {
        let start = datetime!(2023-01-15 23:30:00 UTC);
        let end = datetime!(2023-01-16 00:00:00 UTC);

        let neg = Reading::new("m", "s", dec!(-0.001), start, end);
        assert!(matches!(neg, Err(ReadingError::NegativeConsumption(_))));

        let zero = Reading::new("m", "s", dec!(0.000), start, end);
        assert!(zero.is_ok());
    }

    #[test]
    fn key_ignores_offset_representation() {
        let a = sample();
        let mut b = sample();
        b.interval_start = datetime!(2023-01-16 00:30:00 +01:00);
        b.interval_end = b.interval_end.to_offset(offset!(+01:00));
        b.consumption = dec!(0.75);

        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn with_unit_overrides_default() {
        let r = sample().with_unit("Wh");
        assert_eq!(r.unit, "Wh");
    }
}
