// src/error.rs
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Everything that can go wrong while talking to the portfolio backend.
///
/// Variants carry owned strings so a single failure can be shared between
/// every holding that referenced the same symbol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Transport failure: DNS, refused connection, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The credential was missing or rejected (401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The backend (or local input checks) rejected the request payload.
    #[error("{0}")]
    Validation(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A quote could not be fetched. Never surfaced from a load cycle; the
    /// affected holding is zero-filled and flagged instead.
    #[error("quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("token storage error: {0}")]
    Storage(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Detail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Detail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Deserialize)]
struct FieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

impl ApiError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        });

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited(message),
            s if s.is_client_error() => ApiError::Validation(message),
            s => ApiError::Server {
                status: s.as_u16(),
                message,
            },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    pub fn quote_unavailable(symbol: &str, cause: &ApiError) -> Self {
        ApiError::QuoteUnavailable {
            symbol: symbol.to_string(),
            reason: cause.to_string(),
        }
    }
}

/// Best-effort extraction of a human readable message from an error body.
///
/// Understands `{"detail": "..."}` and the list-of-field-errors shape, and
/// falls back to the trimmed raw body.
pub fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(ErrorBody {
            detail: Detail::Message(message),
        }) => Some(message),
        Ok(ErrorBody {
            detail: Detail::Fields(fields),
        }) if !fields.is_empty() => Some(
            fields
                .iter()
                .map(|f| match f.loc.last() {
                    Some(serde_json::Value::String(field)) => format!("{}: {}", field, f.msg),
                    Some(other) => format!("{}: {}", other, f.msg),
                    None => f.msg.clone(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => Some(trimmed.to_string()),
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::from_status(status, "")
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Auth(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, ""),
            ApiError::Auth(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, ""),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited(_)
        ));
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::Server {
                status: 502,
                message: "Bad Gateway".to_string()
            }
        );
    }

    #[test]
    fn extracts_detail_string() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"detail": "Insufficient holdings. Current: 2, Requested: 5"}"#,
        );
        assert_eq!(
            err,
            ApiError::Validation("Insufficient holdings. Current: 2, Requested: 5".to_string())
        );
    }

    #[test]
    fn extracts_field_errors() {
        let body = r#"{"detail":[{"loc":["body","quantity"],"msg":"field required","type":"value_error.missing"}]}"#;
        assert_eq!(
            extract_message(body).as_deref(),
            Some("quantity: field required")
        );
    }

    #[test]
    fn falls_back_to_raw_body_then_reason() {
        assert_eq!(extract_message("  upstream down ").as_deref(), Some("upstream down"));
        assert_eq!(extract_message("   "), None);
        assert_eq!(
            ApiError::from_status(StatusCode::NOT_FOUND, "").to_string(),
            "not found: Not Found"
        );
    }
}
