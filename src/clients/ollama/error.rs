use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Every way a call to the inference backend can fail.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Request timeout after {timeout_ms}ms. The model may be taking too long to respond. Try using a smaller model or shorter prompt.")]
    Timeout { timeout_ms: u128 },

    #[error("Ollama API Error: {status} - {detail}")]
    Status { status: u16, detail: String },

    #[error("Ollama service is not running. Please start Ollama first.")]
    ConnectionRefused,

    #[error("Network Error: {0}")]
    Network(String),

    #[error("Failed to fetch models: {0}")]
    FetchModels(String),
}

impl UpstreamError {
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Timeout { .. } => "timeout",
            UpstreamError::Status { .. } => "upstream_error",
            UpstreamError::ConnectionRefused => "connection_refused",
            UpstreamError::Network(_) => "network_error",
            UpstreamError::FetchModels(_) => "fetch_models_error",
        }
    }

    /// Classifies a transport failure. Responses with an error status never
    /// reach here; the caller turns those into `Status` itself.
    pub(crate) fn from_transport(err: &reqwest::Error, timeout: Duration) -> Self {
        Self::classify(err, err.is_timeout(), timeout)
    }

    // reqwest also reports an OS-level `TimedOut` (e.g. an unreachable host) as a
    // timeout. Only the per-request deadline elapsing counts as `Timeout`.
    fn classify(err: &(dyn StdError + 'static), timed_out: bool, timeout: Duration) -> Self {
        if timed_out && !has_io_kind(err, io::ErrorKind::TimedOut) {
            UpstreamError::Timeout {
                timeout_ms: timeout.as_millis(),
            }
        } else if has_io_kind(err, io::ErrorKind::ConnectionRefused) {
            UpstreamError::ConnectionRefused
        } else {
            UpstreamError::Network(error_chain(err))
        }
    }
}

fn has_io_kind(err: &(dyn StdError + 'static), kind: io::ErrorKind) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if io_err.kind() == kind {
                return true;
            }
        }
        source = current.source();
    }
    false
}

/// reqwest's top-level message omits the cause, so append the whole chain.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
