use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Raw failure from a transport operation, before classification.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No data received")]
    NoData,

    #[error("Server error: {code}")]
    ServerError { code: u16 },

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decoding(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    InvalidResponse,
    NoData,
    ServerError(u16),
    DecodingError,
    Timeout,
    Cancelled,
    /// The server accepted the job and later reported it as failed.
    JobFailed,
}

impl ErrorKind {
    pub fn classify(error: &TransportError) -> Self {
        match error {
            TransportError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            TransportError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            TransportError::NoData => ErrorKind::NoData,
            TransportError::ServerError { code } => ErrorKind::ServerError(*code),
            TransportError::Decoding(_) => ErrorKind::DecodingError,
            TransportError::Timeout => ErrorKind::Timeout,
            TransportError::Cancelled => ErrorKind::Cancelled,
            TransportError::Network(e) => Self::classify_network(e),
            // the result could not be materialized locally
            TransportError::Storage(_) => ErrorKind::NoData,
        }
    }

    fn classify_network(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_decode() {
            ErrorKind::DecodingError
        } else if error.is_builder() {
            ErrorKind::InvalidUrl
        } else if let Some(status) = error.status() {
            ErrorKind::ServerError(status.as_u16())
        } else {
            ErrorKind::InvalidResponse
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ErrorKind::Cancelled)
    }

    pub fn friendly_message(&self) -> String {
        match self {
            ErrorKind::InvalidUrl => "The app is pointed at an invalid server address.".to_string(),
            ErrorKind::InvalidResponse => {
                "Couldn't reach the server. Check your connection and try again.".to_string()
            }
            ErrorKind::NoData => "The server didn't send anything back. Please try again.".to_string(),
            ErrorKind::ServerError(code) if *code >= 500 => {
                format!("The server ran into a problem ({}). Please try again later.", code)
            }
            ErrorKind::ServerError(404) => "That job no longer exists on the server.".to_string(),
            ErrorKind::ServerError(413) => "This video is too large to upload.".to_string(),
            ErrorKind::ServerError(code) => format!("The server rejected the request ({}).", code),
            ErrorKind::DecodingError => "The server sent a reply we couldn't understand.".to_string(),
            ErrorKind::Timeout => "The server took too long to respond.".to_string(),
            ErrorKind::Cancelled => "Processing was cancelled.".to_string(),
            ErrorKind::JobFailed => "We couldn't create a highlight from this video.".to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidUrl => f.write_str("invalid_url"),
            ErrorKind::InvalidResponse => f.write_str("invalid_response"),
            ErrorKind::NoData => f.write_str("no_data"),
            ErrorKind::ServerError(code) => write!(f, "server_error({})", code),
            ErrorKind::DecodingError => f.write_str("decoding_error"),
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::JobFailed => f.write_str("job_failed"),
        }
    }
}

/// A failure reduced to its kind, keeping the raw text for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ClassifiedError {
    pub fn job_failed(detail: Option<String>) -> Self {
        Self {
            kind: ErrorKind::JobFailed,
            detail: detail.unwrap_or_else(|| "Processing failed".to_string()),
        }
    }

    pub fn friendly_message(&self) -> String {
        self.kind.friendly_message()
    }
}

impl From<&TransportError> for ClassifiedError {
    fn from(error: &TransportError) -> Self {
        Self {
            kind: ErrorKind::classify(error),
            detail: error.to_string(),
        }
    }
}

impl From<TransportError> for ClassifiedError {
    fn from(error: TransportError) -> Self {
        ClassifiedError::from(&error)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for ClassifiedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_transport_variant() {
        assert_eq!(
            ErrorKind::classify(&TransportError::InvalidUrl("x".into())),
            ErrorKind::InvalidUrl
        );
        assert_eq!(
            ErrorKind::classify(&TransportError::ServerError { code: 500 }),
            ErrorKind::ServerError(500)
        );
        assert_eq!(ErrorKind::classify(&TransportError::NoData), ErrorKind::NoData);
        assert_eq!(
            ErrorKind::classify(&TransportError::Decoding("eof".into())),
            ErrorKind::DecodingError
        );
        assert_eq!(ErrorKind::classify(&TransportError::Timeout), ErrorKind::Timeout);
        assert!(ErrorKind::classify(&TransportError::Cancelled).is_cancellation());
    }

    #[test]
    fn storage_failure_means_result_not_materialized() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(ErrorKind::classify(&TransportError::Storage(io)), ErrorKind::NoData);
    }

    #[test]
    fn json_errors_become_decoding_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let classified = ClassifiedError::from(TransportError::from(err));
        assert_eq!(classified.kind, ErrorKind::DecodingError);
    }

    #[test]
    fn friendly_message_depends_only_on_kind() {
        let a = ClassifiedError {
            kind: ErrorKind::ServerError(503),
            detail: "upstream gone".into(),
        };
        let b = ClassifiedError {
            kind: ErrorKind::ServerError(503),
            detail: "something else entirely".into(),
        };
        assert_eq!(a.friendly_message(), b.friendly_message());
        assert!(a.friendly_message().contains("503"));
    }

    #[test]
    fn job_failure_keeps_server_detail_verbatim() {
        let err = ClassifiedError::job_failed(Some("decode error".into()));
        assert_eq!(err.detail, "decode error");
        assert_ne!(err.friendly_message(), err.detail);
        assert_eq!(
            ClassifiedError::job_failed(None).detail,
            "Processing failed"
        );
    }
}
