//! Blocking HTTP helpers shared by the API-backed probes

use reqwest::blocking::{Client, Response};
use std::time::Duration;
use thiserror::Error;

/// Timeout for a single API request; well under the per-check budget
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Why an HTTP call did not yield a usable body
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout
        } else if let Some(status) = err.status() {
            HttpError::Status(status.as_u16())
        } else if err.is_connect() {
            HttpError::Connect(root_cause(&err))
        } else if err.is_decode() {
            HttpError::Decode(root_cause(&err))
        } else {
            HttpError::Other(root_cause(&err))
        }
    }
}

fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

/// Build a client with the given timeout.
///
/// `accept_invalid_certs` is for appliances with self-signed certificates.
pub fn client(timeout: Duration, accept_invalid_certs: bool) -> Result<Client, HttpError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("daily-hud/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(HttpError::from)
}

/// Turn non-2xx responses into `HttpError::Status`
pub fn check_status(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(HttpError::Status(status.as_u16()))
    }
}

/// Decode a successful response body as JSON
pub fn json_body(response: Response) -> Result<serde_json::Value, HttpError> {
    check_status(response)?
        .json::<serde_json::Value>()
        .map_err(|e| HttpError::Decode(e.to_string()))
}
