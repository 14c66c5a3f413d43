use crate::models::rule::{IdentifierSource, LimitMode, Rule};
use crate::services::body;
use ahash::HashMap as AHashMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::debug;
use serde_json::Value;

/// Request features the resolver works on, extracted once by the HTTP
/// layer. Header and cookie names are stored lowercase; lookups are
/// case-insensitive as HTTP header names are.
#[derive(Debug, Clone, Default)]
pub struct RequestFeatures {
    pub path: String,
    pub method: String,
    pub host: String,
    /// Transport-level peer address, without port.
    pub remote_addr: Option<String>,
    pub headers: AHashMap<String, String>,
    pub cookies: AHashMap<String, String>,
    /// Full `Content-Type` header value, boundary parameters included.
    pub content_type: Option<String>,
    /// Body bytes cached by the buffer stage, when a rule asked for them.
    pub body: Option<Vec<u8>>,
}

impl RequestFeatures {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Computes the client IP: the first `X-Forwarded-For` element when that
/// header is trusted and present, otherwise the transport peer address.
pub fn client_ip(features: &RequestFeatures, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(xff) = features.header("x-forwarded-for") {
            if let Some(first) = xff.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    features
        .remote_addr
        .clone()
        .unwrap_or_else(|| "unknown".to_string())
}

/// Resolves the rate-limit identifier for a matched rule.
///
/// Sources are consulted in the rule's precedence order; the first one
/// producing a non-empty value wins. An enabled source that fails is
/// logged at debug and silently skipped, so resolution always lands on
/// the client IP in the worst case.
pub fn resolve(rule: &Rule, features: &RequestFeatures, trust_forwarded: bool) -> String {
    let ip = client_ip(features, trust_forwarded);

    for source in rule.identifier_sources() {
        let (value, mode) = match &source {
            IdentifierSource::Header { name, mode } => {
                (features.header(name).map(str::to_string), Some(*mode))
            }
            IdentifierSource::Cookie { name, mode } => {
                (features.cookie(name).map(str::to_string), Some(*mode))
            }
            IdentifierSource::Body {
                path,
                mode,
                content_type,
            } => {
                let effective_type = content_type
                    .as_deref()
                    .or(features.content_type.as_deref());
                let value = match (features.body.as_deref(), effective_type) {
                    (Some(bytes), Some(ct)) => body::extract_field(bytes, ct, path),
                    _ => None,
                };
                (value, Some(*mode))
            }
            IdentifierSource::Jwt { claims, separator } => (
                jwt_identifier(features.header("authorization"), claims, separator),
                None,
            ),
            IdentifierSource::ClientIp => return ip,
        };

        match value {
            Some(v) if !v.is_empty() => {
                return match mode {
                    Some(LimitMode::CombineWithIp) => format!("{}:{}", ip, v),
                    _ => v,
                };
            }
            _ => debug!("identifier source {:?} empty for {}", source, features.path),
        }
    }

    ip
}

/// Builds an identifier from JWT claims.
///
/// The payload is the second dot segment of the bearer value, base64url
/// decoded and parsed as JSON. Claims are joined in configured order; a
/// missing claim anywhere invalidates the whole source.
///
/// The signature is deliberately not verified: authentication happens
/// upstream, and this code only needs a stable grouping key. Treat the
/// result as untrusted input, never as an authenticated principal.
fn jwt_identifier(
    authorization: Option<&str>,
    claims: &[String],
    separator: &str,
) -> Option<String> {
    let auth = authorization?.trim();
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?;

    let payload_b64 = token.split('.').nth(1)?;
    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64.trim_end_matches('=')).ok()?;
    let payload: Value = serde_json::from_slice(&payload_bytes).ok()?;

    let mut parts = Vec::with_capacity(claims.len());
    for claim in claims {
        let value = match payload.get(claim)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        if value.is_empty() {
            return None;
        }
        parts.push(value);
    }
    Some(parts.join(separator))
}
