use crate::redact::redact_secrets;
use crate::store::StoreError;
use reqwest::StatusCode;
use thiserror::Error;

const NETWORK_MESSAGE: &str = "Could not reach the server. Check your connection and try again.";
const MALFORMED_MESSAGE: &str = "The server sent an unexpected response.";
const EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

/// Coarse classification used by screens to pick how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Rejected,
    Network,
    Malformed,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// 401. The persisted session is already cleared when this is returned.
    #[error("unauthorized: {}", message.as_deref().unwrap_or("session expired"))]
    Unauthorized { message: Option<String> },
    #[error("request failed with status {status}: {}", message.as_deref().unwrap_or("no message"))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("response from {path} does not match the expected schema: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// Empty or dot-segment ids, or a path the base url cannot join.
    #[error("invalid request path {path:?}")]
    InvalidPath {
        path: String,
        #[source]
        source: Option<url::ParseError>,
    },
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e)
        }
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Status { .. } => ErrorKind::Rejected,
            Self::Timeout | Self::Network(_) => ErrorKind::Network,
            Self::Decode { .. } | Self::InvalidPath { .. } | Self::Store(_) => ErrorKind::Malformed,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text to put in front of the user. Server messages are passed through
    /// verbatim; transport failures get a generic sentence.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { message } => message
                .clone()
                .unwrap_or_else(|| EXPIRED_MESSAGE.to_string()),
            Self::Status { status, message } => message.clone().unwrap_or_else(|| {
                format!(
                    "Request failed ({}).",
                    status.canonical_reason().unwrap_or("error")
                )
            }),
            Self::Timeout | Self::Network(_) => NETWORK_MESSAGE.to_string(),
            Self::Decode { .. } | Self::InvalidPath { .. } | Self::Store(_) => {
                MALFORMED_MESSAGE.to_string()
            }
        }
    }

    /// `to_string` with bearer tokens masked, for logs.
    pub fn redacted(&self) -> String {
        redact_secrets(&self.to_string()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_is_passed_through_verbatim() {
        let err = ApiError::Status {
            status: StatusCode::BAD_REQUEST,
            message: Some("Email already registered".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert_eq!(err.user_message(), "Email already registered");
    }

    #[test]
    fn rejection_without_message_uses_reason_phrase() {
        let err = ApiError::Status {
            status: StatusCode::NOT_FOUND,
            message: None,
        };
        assert_eq!(err.user_message(), "Request failed (Not Found).");
    }

    #[test]
    fn network_failures_get_generic_text() {
        assert_eq!(ApiError::Timeout.kind(), ErrorKind::Network);
        assert_eq!(ApiError::Timeout.user_message(), NETWORK_MESSAGE);
    }

    #[test]
    fn unauthorized_reports_401() {
        let err = ApiError::Unauthorized { message: None };
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.user_message(), EXPIRED_MESSAGE);
    }
}
