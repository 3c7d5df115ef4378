use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(#[source] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl RemoteError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Prefer the backend's `{"detail": ...}` message over the raw body.
    fn message(body: &str) -> String {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .map(|b| match b.detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
        Self::truncate_body(detail.as_deref().unwrap_or(body))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::message(body);
        match status.as_u16() {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::AccessDenied(message),
            404 => RemoteError::NotFound(message),
            429 => RemoteError::RateLimited,
            code @ 500..=599 => RemoteError::ServerError { status: code, message },
            _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// HTTP status behind this error, when there was a response at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Unauthorized => Some(401),
            RemoteError::AccessDenied(_) => Some(403),
            RemoteError::NotFound(_) => Some(404),
            RemoteError::RateLimited => Some(429),
            RemoteError::ServerError { status, .. } => Some(*status),
            RemoteError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            RemoteError::Timeout | RemoteError::InvalidResponse(_) => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_decode() {
            RemoteError::InvalidResponse(e.to_string())
        } else {
            RemoteError::NetworkError(e)
        }
    }
}
