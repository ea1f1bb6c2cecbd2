use consumption_store::{domain::DEFAULT_UNIT, Reading};
use reqwest::{StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use time::{macros::datetime, OffsetDateTime};

use crate::{
    octopus::{ApiTransport, FetchError},
    timefmt::format_api_timestamp,
};

pub const DEFAULT_BASE_URL: &str = "https://api.octopus.energy/v1/";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_PERIOD_FROM: OffsetDateTime = datetime!(1970-01-01 00:00:00 UTC);

/// Bounds of one sync. `None` means "since epoch" / "through now".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
}

impl SyncWindow {
    pub fn new(from: Option<OffsetDateTime>, to: Option<OffsetDateTime>) -> Self {
        Self { from, to }
    }

    /// Start bound actually sent to the API.
    pub fn effective_from(&self) -> OffsetDateTime {
        self.from.unwrap_or(DEFAULT_PERIOD_FROM)
    }

    pub fn describe_from(&self) -> String {
        self.from.map(format_api_timestamp).unwrap_or_else(|| "start".to_string())
    }

    pub fn describe_to(&self) -> String {
        self.to.map(format_api_timestamp).unwrap_or_else(|| "now".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ConsumptionPage {
    count: u64,
    next: Option<String>,
    results: Vec<IncomingReading>,
}

#[derive(Debug, Deserialize)]
struct IncomingReading {
    #[serde(with = "rust_decimal::serde::float")]
    consumption: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    interval_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    interval_end: OffsetDateTime,
    #[serde(default)]
    unit: Option<String>,
}

/// Receives each non-empty page before the next one is requested.
#[async_trait::async_trait]
pub trait PageHandler: Send {
    async fn on_page(&mut self, readings: &[Reading]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub pages: usize,
    pub records: usize,
    pub skipped: usize,
    /// `count` from the first page, as reported by the server.
    pub reported_count: Option<u64>,
}

/// Walks the consumption endpoint for one meter, page by page.
#[derive(Debug, Clone)]
pub struct Fetcher<T> {
    transport: T,
    base_url: Url,
    meter_point_id: String,
    meter_serial: String,
    page_size: u32,
}

impl<T: ApiTransport> Fetcher<T> {
    pub fn new(
        transport: T,
        meter_point_id: impl Into<String>,
        meter_serial: impl Into<String>,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            transport,
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            meter_point_id: meter_point_id.into(),
            meter_serial: meter_serial.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, FetchError> {
        // join() drops the last path segment unless the base ends in '/'
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        self.base_url = Url::parse(&base)?;
        Ok(self)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn meter_point_id(&self) -> &str {
        &self.meter_point_id
    }

    pub fn meter_serial(&self) -> &str {
        &self.meter_serial
    }

    /// URL of the first page for `window`.
    pub fn consumption_url(&self, window: &SyncWindow) -> Result<Url, FetchError> {
        let from = match window.from {
            Some(from) => from,
            None => {
                tracing::info!(
                    period_from = %format_api_timestamp(DEFAULT_PERIOD_FROM),
                    "no period_from provided, defaulting to epoch"
                );
                DEFAULT_PERIOD_FROM
            }
        };

        let mut url = self.base_url.join(&format!(
            "electricity-meter-points/{}/meters/{}/consumption/",
            self.meter_point_id, self.meter_serial
        ))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("period_from", &format_api_timestamp(from));
            if let Some(to) = window.to {
                query.append_pair("period_to", &format_api_timestamp(to));
            }
            query.append_pair("page_size", &self.page_size.to_string());
            query.append_pair("order_by", "period");
        }
        Ok(url)
    }

    /// Fetch every reading in `window`, returning all of them in page order.
    ///
    /// `on_page` still sees each page as it arrives.
    pub async fn fetch(
        &self,
        window: &SyncWindow,
        on_page: Option<&mut dyn PageHandler>,
    ) -> Result<Vec<Reading>, FetchError> {
        let mut all = Vec::new();
        self.walk(window, on_page, Some(&mut all)).await?;
        Ok(all)
    }

    /// Fetch every reading in `window`, handing pages to `on_page` without retaining them.
    pub async fn fetch_streaming(
        &self,
        window: &SyncWindow,
        on_page: &mut dyn PageHandler,
    ) -> Result<FetchSummary, FetchError> {
        self.walk(window, Some(on_page), None).await
    }

    async fn walk(
        &self,
        window: &SyncWindow,
        mut on_page: Option<&mut dyn PageHandler>,
        mut retained: Option<&mut Vec<Reading>>,
    ) -> Result<FetchSummary, FetchError> {
        tracing::debug!(
            from = %window.describe_from(),
            to = %window.describe_to(),
            mpan = %self.meter_point_id,
            "fetching consumption"
        );

        let mut summary = FetchSummary::default();
        let mut cursor = Some(self.consumption_url(window)?);

        while let Some(url) = cursor.take() {
            let page = self.get_page(&url).await?;
            summary.pages += 1;
            summary.reported_count.get_or_insert(page.count);

            let (readings, skipped) = self.map_page(page.results);
            summary.records += readings.len();
            summary.skipped += skipped;

            if !readings.is_empty() {
                if let Some(handler) = on_page.as_deref_mut() {
                    handler
                        .on_page(&readings)
                        .await
                        .map_err(FetchError::PageHandler)?;
                }
            }

            if let Some(all) = retained.as_deref_mut() {
                all.extend(readings);
            }

            if let Some(next) = page.next.filter(|n| !n.is_empty()) {
                tracing::debug!(next = %next, "fetching next page of consumption data");
                cursor = Some(url.join(&next)?);
            }
        }

        tracing::debug!(
            pages = summary.pages,
            records = summary.records,
            skipped = summary.skipped,
            "consumption fetch complete"
        );
        Ok(summary)
    }

    async fn get_page(&self, url: &Url) -> Result<ConsumptionPage, FetchError> {
        tracing::debug!(url = %url, "Octopus API request: GET");
        metrics::counter!("octopus_api_requests_total").increment(1);

        let resp = self.transport.get(url).await?;
        tracing::debug!(
            status = resp.status,
            request_timestamp = %resp.request_timestamp,
            "Octopus API response"
        );

        if !resp.is_success() {
            let reason = StatusCode::from_u16(resp.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown");
            tracing::error!(status = resp.status, reason, "Octopus API error");
            metrics::counter!("octopus_api_errors_total").increment(1);

            let payload = if resp.is_json() {
                serde_json::from_slice::<serde_json::Value>(&resp.body).ok()
            } else {
                None
            };
            if let Some(p) = &payload {
                tracing::error!(payload = %p, "error response");
            }

            return Err(FetchError::Status {
                status: resp.status,
                reason,
                payload,
            });
        }

        let page: ConsumptionPage = serde_json::from_slice(&resp.body)?;
        metrics::counter!("octopus_api_pages_total").increment(1);

        match (page.results.first(), page.results.last()) {
            (Some(first), Some(last)) => tracing::debug!(
                count = page.count,
                from = %first.interval_start,
                to = %last.interval_end,
                "got consumption page"
            ),
            _ => tracing::debug!(
                count = page.count,
                "API response has no results in this page"
            ),
        }

        Ok(page)
    }

    /// Inject the meter identifiers the API does not echo, dropping invalid readings.
    fn map_page(&self, results: Vec<IncomingReading>) -> (Vec<Reading>, usize) {
        let mut readings = Vec::with_capacity(results.len());
        let mut skipped = 0;

        for incoming in results {
            let unit = incoming.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string());
            match Reading::new(
                self.meter_point_id.as_str(),
                self.meter_serial.as_str(),
                incoming.consumption,
                incoming.interval_start,
                incoming.interval_end,
            ) {
                Ok(r) => readings.push(r.with_unit(unit)),
                Err(e) => {
                    skipped += 1;
                    metrics::counter!("octopus_readings_rejected_total").increment(1);
                    tracing::warn!(
                        error = %e,
                        interval_start = %incoming.interval_start,
                        "skipping invalid reading"
                    );
                }
            }
        }

        (readings, skipped)
    }
}
