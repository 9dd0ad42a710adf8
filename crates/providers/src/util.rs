//! Shared utility functions for provider adapters.

use sa_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type (§7 taxonomy).
pub(crate) fn from_reqwest(e: reqwest::Error, path: &str) -> Error {
    if e.is_timeout() {
        Error::UpstreamTimeout(e.to_string())
    } else if e.is_connect() {
        Error::UpstreamNetwork(e.to_string())
    } else if let Some(status) = e.status() {
        Error::UpstreamHttp {
            status: status.as_u16(),
            body: e.to_string(),
            attempt: 1,
            path: path.to_string(),
        }
    } else {
        Error::UpstreamNetwork(e.to_string())
    }
}
