/// Shared error taxonomy used across every control-plane crate.
///
/// Variants map onto the error kinds named by the HTTP surface, not onto
/// individual collaborator types — `sa-gateway::error` carries the
/// `IntoResponse` mapping onto status codes.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream http {status} on {path} (attempt {attempt}): {body}")]
    UpstreamHttp {
        status: u16,
        body: String,
        attempt: u32,
        path: String,
    },

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream network error: {0}")]
    UpstreamNetwork(String),

    #[error("provider failure: {0}")]
    ProviderFailure(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the queue/callback retry policy should treat this as retryable
    /// (§5 Cancellation & timeouts, §7 Propagation).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::UpstreamTimeout(_) | Error::UpstreamNetwork(_)
        ) || matches!(self, Error::UpstreamHttp { status, .. } if *status >= 500)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
