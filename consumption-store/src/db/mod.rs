pub mod consumption_queries;
pub mod schema;
pub mod store;

pub use store::{effective_batch_size, PgStore, ReadingStore, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
