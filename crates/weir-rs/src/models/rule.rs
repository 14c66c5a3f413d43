use serde::{Deserialize, Serialize};

/// How a resolved identifier value is combined with the client IP.
///
/// `ReplaceIp` counts requests under the extracted value alone, while
/// `CombineWithIp` scopes the value to the calling address so that the
/// same token used from two networks gets two separate budgets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LimitMode {
    /// The extracted value is the identifier.
    ReplaceIp,
    /// Identifier is `<clientIp>:<value>`.
    CombineWithIp,
}

impl Default for LimitMode {
    fn default() -> Self {
        Self::ReplaceIp
    }
}

/// One identifier source in precedence order.
///
/// Rules configure sources through boolean toggles; the resolver works on
/// this tagged form instead so that precedence is a plain iteration over
/// `Rule::identifier_sources()`.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierSource {
    Header { name: String, mode: LimitMode },
    Cookie { name: String, mode: LimitMode },
    Body { path: String, mode: LimitMode, content_type: Option<String> },
    Jwt { claims: Vec<String>, separator: String },
    ClientIp,
}

/// A named rate-limiting policy.
///
/// A rule selects requests by path pattern, names the identifier sources
/// used to key the counter, and carries the fixed-window quota plus an
/// optional leaky-bucket queue for excess traffic.
///
/// # Examples
///
/// ```json
/// {
///   "id": "5f1c…",
///   "pathPattern": "/api/**",
///   "allowedRequests": 100,
///   "windowSeconds": 60,
///   "active": true,
///   "priority": 10,
///   "queueEnabled": true,
///   "maxQueueSize": 25,
///   "delayPerRequestMs": 200,
///   "headerLimitEnabled": true,
///   "headerName": "X-API-Key",
///   "headerLimitType": "combine_with_ip"
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Opaque unique identifier. Assigned by the admin API when empty on create.
    #[serde(default)]
    pub id: String,

    /// Glob-like pattern over request paths. `*` matches one path segment,
    /// `**` matches zero or more segments; everything else is literal and
    /// case-sensitive.
    pub path_pattern: String,

    /// Requests admitted per window before the quota is exhausted.
    pub allowed_requests: u32,

    /// Fixed-window length in seconds; doubles as the counter TTL.
    pub window_seconds: u64,

    /// Only active rules participate in matching.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Higher priority wins when several patterns match a path.
    #[serde(default)]
    pub priority: i32,

    // Queue configuration
    #[serde(default)]
    pub queue_enabled: bool,
    #[serde(default)]
    pub max_queue_size: u32,
    #[serde(default)]
    pub delay_per_request_ms: u64,

    // JWT claim configuration
    #[serde(default)]
    pub jwt_enabled: bool,
    #[serde(default)]
    pub jwt_claims: Vec<String>,
    #[serde(default = "default_claim_separator")]
    pub jwt_claim_separator: String,

    // Body field configuration
    #[serde(default)]
    pub body_limit_enabled: bool,
    #[serde(default)]
    pub body_field_path: String,
    #[serde(default)]
    pub body_limit_type: LimitMode,
    /// Overrides the request `Content-Type` when deciding how to parse the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_content_type: Option<String>,

    // Header configuration
    #[serde(default)]
    pub header_limit_enabled: bool,
    #[serde(default)]
    pub header_name: String,
    #[serde(default)]
    pub header_limit_type: LimitMode,

    // Cookie configuration
    #[serde(default)]
    pub cookie_limit_enabled: bool,
    #[serde(default)]
    pub cookie_name: String,
    #[serde(default)]
    pub cookie_limit_type: LimitMode,
}

fn default_active() -> bool {
    true
}

fn default_claim_separator() -> String {
    ":".to_string()
}

impl Rule {
    /// Validates the rule configuration.
    ///
    /// # Errors
    ///
    /// Returns a descriptive message when:
    /// - the path pattern is empty or does not start with `/`
    /// - `allowedRequests` or `windowSeconds` is zero
    /// - queueing is enabled without a queue size or per-request delay
    /// - JWT limiting is enabled with an empty claim list
    /// - body/header/cookie limiting is enabled without its source name
    pub fn validate(&self) -> Result<(), String> {
        if self.path_pattern.is_empty() || !self.path_pattern.starts_with('/') {
            return Err("pathPattern must start with '/'".to_string());
        }

        if self.allowed_requests == 0 {
            return Err("allowedRequests must be at least 1".to_string());
        }

        if self.window_seconds == 0 {
            return Err("windowSeconds must be at least 1".to_string());
        }

        if self.queue_enabled {
            if self.max_queue_size == 0 {
                return Err("maxQueueSize must be at least 1 when queueing is enabled".to_string());
            }
            if self.delay_per_request_ms == 0 {
                return Err(
                    "delayPerRequestMs must be at least 1 when queueing is enabled".to_string(),
                );
            }
        }

        if self.jwt_enabled && self.jwt_claims.is_empty() {
            return Err("jwtClaims must be non-empty when JWT limiting is enabled".to_string());
        }

        if self.body_limit_enabled && self.body_field_path.is_empty() {
            return Err("bodyFieldPath is required when body limiting is enabled".to_string());
        }

        if self.header_limit_enabled && self.header_name.is_empty() {
            return Err("headerName is required when header limiting is enabled".to_string());
        }

        if self.cookie_limit_enabled && self.cookie_name.is_empty() {
            return Err("cookieName is required when cookie limiting is enabled".to_string());
        }

        Ok(())
    }

    /// Returns the identifier sources enabled on this rule, in precedence
    /// order: header, cookie, body, JWT, client IP. The client IP source is
    /// always present as the final fallback.
    pub fn identifier_sources(&self) -> Vec<IdentifierSource> {
        let mut sources = Vec::with_capacity(5);

        if self.header_limit_enabled {
            sources.push(IdentifierSource::Header {
                name: self.header_name.clone(),
                mode: self.header_limit_type,
            });
        }

        if self.cookie_limit_enabled {
            sources.push(IdentifierSource::Cookie {
                name: self.cookie_name.clone(),
                mode: self.cookie_limit_type,
            });
        }

        if self.body_limit_enabled {
            sources.push(IdentifierSource::Body {
                path: self.body_field_path.clone(),
                mode: self.body_limit_type,
                content_type: self.body_content_type.clone(),
            });
        }

        if self.jwt_enabled {
            sources.push(IdentifierSource::Jwt {
                claims: self.jwt_claims.clone(),
                separator: self.jwt_claim_separator.clone(),
            });
        }

        sources.push(IdentifierSource::ClientIp);
        sources
    }

    /// Whether resolving this rule's identifier may need the request body.
    pub fn needs_body(&self) -> bool {
        self.body_limit_enabled
    }
}

/// Builder-style convenience used by tests and the gateway bootstrap.
impl Default for Rule {
    fn default() -> Self {
        Self {
            id: String::new(),
            path_pattern: "/**".to_string(),
            allowed_requests: 100,
            window_seconds: 60,
            active: true,
            priority: 0,
            queue_enabled: false,
            max_queue_size: 0,
            delay_per_request_ms: 0,
            jwt_enabled: false,
            jwt_claims: Vec::new(),
            jwt_claim_separator: default_claim_separator(),
            body_limit_enabled: false,
            body_field_path: String::new(),
            body_limit_type: LimitMode::ReplaceIp,
            body_content_type: None,
            header_limit_enabled: false,
            header_name: String::new(),
            header_limit_type: LimitMode::ReplaceIp,
            cookie_limit_enabled: false,
            cookie_name: String::new(),
            cookie_limit_type: LimitMode::ReplaceIp,
        }
    }
}
