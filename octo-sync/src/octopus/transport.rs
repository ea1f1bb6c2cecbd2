use std::time::Duration;

use reqwest::{
    header::{CONTENT_TYPE, DATE},
    Url,
};
use time::OffsetDateTime;

use crate::{octopus::FetchError, timefmt::parse_http_date};

/// A response as seen by the fetcher, after the post-response hook has run.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Server `Date` header, or local clock time if absent or malformed.
    pub request_timestamp: OffsetDateTime,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }
}

/// Authenticated GET against the metering API.
#[async_trait::async_trait]
pub trait ApiTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<ApiResponse, FetchError>;
}

/// Derive the request timestamp from a `Date` header value.
pub fn request_timestamp(date_header: Option<&str>) -> OffsetDateTime {
    match date_header.and_then(parse_http_date) {
        Some(ts) => ts,
        None => {
            tracing::debug!(header = ?date_header, "no usable Date header, using local clock");
            OffsetDateTime::now_utc()
        }
    }
}

/// `reqwest` transport with Basic auth (API key, empty password) on every request.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("octo-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }
}

#[async_trait::async_trait]
impl ApiTransport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<ApiResponse, FetchError> {
        let resp = self
            .client
            .get(url.clone())
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let headers = resp.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let request_timestamp = request_timestamp(headers.get(DATE).and_then(|v| v.to_str().ok()));

        let body = resp.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            content_type,
            body,
            request_timestamp,
        })
    }
}
