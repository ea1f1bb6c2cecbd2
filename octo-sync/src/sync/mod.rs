//! One fetch/store cycle: resolve the window, walk the API, write pages through.

pub mod window;

use consumption_store::{Reading, ReadingStore, StoreError};
use time::OffsetDateTime;

use crate::{
    octopus::{ApiTransport, FetchError, Fetcher, PageHandler, SyncWindow},
    timefmt::format_api_timestamp,
};

pub use window::resolve_window;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("this run needs a database connection but none was opened")]
    StoreRequired,
}

impl SyncError {
    /// Surface a store failure raised inside the page callback as a store error.
    fn from_fetch(e: FetchError) -> Self {
        match e {
            FetchError::PageHandler(inner) => match inner.downcast::<StoreError>() {
                Ok(store) => SyncError::Store(store),
                Err(other) => SyncError::Fetch(FetchError::PageHandler(other)),
            },
            other => SyncError::Fetch(other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    pub period_start: Option<OffsetDateTime>,
    pub period_end: Option<OffsetDateTime>,
    pub infer: bool,
    pub verify_only: bool,
    /// Rows to display in verify-only mode; `None` or zero shows everything.
    pub limit: Option<usize>,
}

impl SyncRequest {
    /// Whether this run has to open the database.
    pub fn needs_store(&self) -> bool {
        !self.verify_only || (self.infer && self.period_start.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReport {
    /// The window held no readings. Not an error.
    NoData,
    Verified { fetched: usize, displayed: usize },
    Committed { records: usize, pages: usize, skipped: usize },
}

/// Writes each page through to the store and keeps a running total.
struct StorePageHandler<'a, S: ?Sized> {
    store: &'a S,
    total: usize,
}

#[async_trait::async_trait]
impl<S> PageHandler for StorePageHandler<'_, S>
where
    S: ReadingStore + ?Sized,
{
    async fn on_page(&mut self, readings: &[Reading]) -> anyhow::Result<()> {
        self.total += readings.len();
        tracing::info!(
            page_records = readings.len(),
            total_so_far = self.total,
            "inserting consumption records from this page"
        );
        self.store.upsert_batch(readings).await?;
        Ok(())
    }
}

/// One display row in verify-only mode.
pub fn display_line(index: usize, r: &Reading) -> String {
    format!(
        "[{index:4}] MPAN: {} | Meter: {} | Consumption: {:>6.3} {} | Interval: {} → {}",
        r.meter_point_id,
        r.meter_serial,
        r.consumption,
        r.unit,
        format_api_timestamp(r.interval_start),
        format_api_timestamp(r.interval_end),
    )
}

/// Fetch the whole window and display up to `limit` rows. Nothing is written.
pub async fn verify<T: ApiTransport>(
    fetcher: &Fetcher<T>,
    window: &SyncWindow,
    limit: Option<usize>,
) -> Result<SyncReport, SyncError> {
    let readings = fetcher.fetch(window, None).await?;

    if readings.is_empty() {
        tracing::warn!("no consumption data received from Octopus API");
        return Ok(SyncReport::NoData);
    }

    let fetched = readings.len();
    tracing::info!(
        fetched,
        from = %window.describe_from(),
        to = %window.describe_to(),
        "fetched consumption records"
    );
    tracing::info!("verify-only mode: displaying records without database storage");

    let displayed = limit.filter(|&l| l > 0).map_or(fetched, |l| l.min(fetched));
    for (i, r) in readings.iter().take(displayed).enumerate() {
        tracing::info!("{}", display_line(i + 1, r));
    }

    if displayed < fetched {
        tracing::info!("showing {displayed} of {fetched} records (use --limit to adjust)");
    } else {
        tracing::info!(displayed, "total records displayed");
    }

    Ok(SyncReport::Verified { fetched, displayed })
}

/// Ensure the schema, then stream every page into the store.
pub async fn commit<T, S>(
    fetcher: &Fetcher<T>,
    store: &S,
    window: &SyncWindow,
) -> Result<SyncReport, SyncError>
where
    T: ApiTransport,
    S: ReadingStore + ?Sized,
{
    store.ensure_schema().await?;

    tracing::info!("fetching and storing consumption records");
    let mut handler = StorePageHandler { store, total: 0 };
    let summary = fetcher
        .fetch_streaming(window, &mut handler)
        .await
        .map_err(SyncError::from_fetch)?;

    if summary.records == 0 {
        tracing::warn!("no consumption data received from Octopus API");
        return Ok(SyncReport::NoData);
    }

    tracing::info!(
        records = handler.total,
        pages = summary.pages,
        skipped = summary.skipped,
        from = %window.describe_from(),
        to = %window.describe_to(),
        "successfully stored all consumption data"
    );

    Ok(SyncReport::Committed {
        records: handler.total,
        pages: summary.pages,
        skipped: summary.skipped,
    })
}

/// Run one cycle for `request`.
///
/// `store` may be `None` only when [`SyncRequest::needs_store`] is false.
pub async fn run<T, S>(
    request: &SyncRequest,
    fetcher: &Fetcher<T>,
    store: Option<&S>,
) -> Result<SyncReport, SyncError>
where
    T: ApiTransport,
    S: ReadingStore + ?Sized,
{
    let window = resolve_window(request, fetcher.meter_point_id(), store).await?;
    tracing::debug!(
        from = %window.describe_from(),
        to = %window.describe_to(),
        "fetching consumption"
    );

    if request.verify_only {
        verify(fetcher, &window, request.limit).await
    } else {
        let store = store.ok_or(SyncError::StoreRequired)?;
        commit(fetcher, store, &window).await
    }
}
