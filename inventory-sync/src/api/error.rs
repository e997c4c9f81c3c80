//! Backend failure taxonomy and HTTP response classification

use super::resilience::RetryableError;

/// A failed backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network error, timeout, throttling or 5xx. Worth retrying.
    Transient { message: String },
    /// Validation, auth or other 4xx. Retrying will not help.
    Permanent {
        status: Option<u16>,
        message: String,
    },
    /// The record a create targeted is already there
    AlreadyExists { message: String },
    /// The record an update targeted does not exist
    NotFound { raw_id: String },
    /// The run was cancelled while the call was waiting to be retried
    Cancelled,
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Permanent {
            status,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: u16, body: &str, raw_id: Option<&str>) -> Self {
        let message = format!("HTTP {}: {}", status, truncate(body, 300));
        match status {
            408 | 429 => Self::transient(message),
            409 => Self::AlreadyExists { message },
            404 => match raw_id {
                Some(id) => Self::NotFound {
                    raw_id: id.to_string(),
                },
                None => Self::permanent(Some(status), message),
            },
            500..=599 => Self::transient(message),
            _ => {
                if mentions_already_exists(body) {
                    Self::AlreadyExists { message }
                } else {
                    Self::permanent(Some(status), message)
                }
            }
        }
    }

    /// Classify an error reported inside a 200 response body
    pub fn from_error_body(message: &str, raw_id: Option<&str>) -> Self {
        let lowered = message.to_lowercase();
        if mentions_already_exists(&lowered) {
            Self::AlreadyExists {
                message: message.to_string(),
            }
        } else if lowered.contains("not found") {
            match raw_id {
                Some(id) => Self::NotFound {
                    raw_id: id.to_string(),
                },
                None => Self::permanent(None, message),
            }
        } else {
            Self::permanent(None, message)
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::transient(err.to_string());
        }
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), &err.to_string(), None),
            // Body decoding and builder errors are not going to fix themselves
            None => Self::permanent(None, err.to_string()),
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Transient { message } => write!(f, "transient backend error: {}", message),
            BackendError::Permanent { message, .. } => write!(f, "backend rejected request: {}", message),
            BackendError::AlreadyExists { message } => write!(f, "record already exists: {}", message),
            BackendError::NotFound { raw_id } => write!(f, "record '{}' not found", raw_id),
            BackendError::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for BackendError {}

impl RetryableError for BackendError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn cancelled() -> Self {
        BackendError::Cancelled
    }
}

fn mentions_already_exists(body: &str) -> bool {
    body.to_lowercase().contains("already exists")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(BackendError::from_status(503, "busy", None).is_transient());
        assert!(BackendError::from_status(429, "slow down", None).is_transient());
        assert!(BackendError::from_status(408, "", None).is_transient());
        assert!(matches!(
            BackendError::from_status(409, "dup", None),
            BackendError::AlreadyExists { .. }
        ));
        assert_eq!(
            BackendError::from_status(404, "", Some("abc")),
            BackendError::NotFound {
                raw_id: "abc".to_string()
            }
        );
        assert!(matches!(
            BackendError::from_status(401, "bad token", None),
            BackendError::Permanent {
                status: Some(401),
                ..
            }
        ));
        assert!(matches!(
            BackendError::from_status(400, "item_id already exists", None),
            BackendError::AlreadyExists { .. }
        ));
    }

    #[test]
    fn test_error_body_classification() {
        assert!(matches!(
            BackendError::from_error_body("Container Already Exists", None),
            BackendError::AlreadyExists { .. }
        ));
        assert!(matches!(
            BackendError::from_error_body("container not found", Some("12")),
            BackendError::NotFound { .. }
        ));
        assert!(matches!(
            BackendError::from_error_body("invalid unit", None),
            BackendError::Permanent { status: None, .. }
        ));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(BackendError::transient("timeout").is_retryable());
        assert!(!BackendError::permanent(Some(400), "bad").is_retryable());
        assert!(!BackendError::Cancelled.is_retryable());
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = BackendError::from_status(400, &body, None);
        assert!(err.to_string().len() < 400);
    }
}
