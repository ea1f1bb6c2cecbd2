pub mod config;
pub mod observability;
pub mod octopus;
pub mod sync;
pub mod timefmt;

#[cfg(test)]
mod test_support;

pub use sync::{SyncError, SyncReport, SyncRequest};
