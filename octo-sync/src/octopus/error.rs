#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Non-2xx response. `payload` holds the decoded body when the server sent JSON.
    #[error("Octopus API error {status} {reason}")]
    Status {
        status: u16,
        reason: &'static str,
        payload: Option<serde_json::Value>,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
    #[error("page handler failed: {0}")]
    PageHandler(#[source] anyhow::Error),
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
