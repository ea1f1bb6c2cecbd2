pub mod db;
pub mod domain;
pub mod error;

pub use db::{PgStore, ReadingStore};
pub use domain::{DailyConsumption, Reading, ReadingError, ReadingKey};
pub use error::StoreError;
