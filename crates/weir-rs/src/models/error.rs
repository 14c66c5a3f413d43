use actix_web::HttpResponse;
use serde_json::json;

/// Errors raised inside the rate-limit core.
///
/// Request-path callers never surface these as HTTP 5xx: store failures
/// fail open, payload problems degrade to the next identifier source, and
/// a full queue is an ordinary rejection.
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("rule refresh failed: {0}")]
    RuleRefreshFailed(String),
    #[error("queue full for {key}")]
    QueueFull { key: String },
    #[error("request cancelled")]
    Cancelled,
}

/// Errors returned by the admin API; these propagate normally as 4xx/5xx
/// since the admin surface is not on the hot path.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("rule already exists: {0}")]
    RuleExists(String),
    #[error("store error: {0}")]
    Store(String),
}

impl actix_web::error::ResponseError for AdminError {
    fn error_response(&self) -> HttpResponse {
        let error_message = self.to_string();
        match self {
            AdminError::RuleNotFound(_) => HttpResponse::NotFound().json(json!({
                "error": error_message,
                "type": "not_found"
            })),
            AdminError::InvalidRule(_) => HttpResponse::BadRequest().json(json!({
                "error": error_message,
                "type": "invalid"
            })),
            AdminError::RuleExists(_) => HttpResponse::Conflict().json(json!({
                "error": error_message,
                "type": "conflict"
            })),
            AdminError::Store(_) => HttpResponse::InternalServerError().json(json!({
                "error": error_message,
                "type": "store"
            })),
        }
    }
}
