pub mod daily_consumption;
pub mod reading;

pub use daily_consumption::DailyConsumption;
pub use reading::{Reading, ReadingError, ReadingKey, DEFAULT_UNIT};
