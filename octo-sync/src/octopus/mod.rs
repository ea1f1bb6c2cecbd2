//! Client for the Octopus Energy consumption API.
//!
//! The [`Fetcher`] owns the pagination protocol; the HTTP call itself goes
//! through an injected [`ApiTransport`] so auth and the response hook live in
//! one place.

pub mod error;
pub mod fetcher;
pub mod transport;

pub use error::FetchError;
pub use fetcher::{
    FetchSummary, Fetcher, PageHandler, SyncWindow, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE,
    DEFAULT_PERIOD_FROM,
};
pub use transport::{ApiResponse, ApiTransport, HttpTransport};
