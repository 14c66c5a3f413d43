use serde::{Deserialize, Serialize};

/// Gateway runtime configuration.
///
/// Loaded from a JSON file (see [`crate::config::settings::load_settings`])
/// with environment overrides for the listener addresses and the store URL.
///
/// # Configuration File Format
///
/// ```json
/// {
///   "version": 1,
///   "host": "0.0.0.0",
///   "port": 5900,
///   "adminHost": "127.0.0.1",
///   "adminPort": 5910,
///   "redisUrl": "redis://127.0.0.1:6379",
///   "trustXForwardedFor": true
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Configuration schema version for compatibility checking.
    #[serde(default = "default_version")]
    pub version: u8,

    /// Public listener bind address.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Admin listener; local-only by default since it carries rule CRUD.
    #[serde(default = "default_admin_host")]
    pub admin_host: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// Shared store URL. When absent the gateway runs on the in-process
    /// store, which keeps counters local to one instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    /// Whether the first `X-Forwarded-For` element is trusted as the
    /// client address. Enable only behind a trusted proxy.
    #[serde(default)]
    pub trust_x_forwarded_for: bool,

    /// Per-call budget for shared store operations, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Queue-depth sweeper interval in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub queue_sweep_interval_secs: u64,

    /// Broadcast channel capacity for the decision event stream.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Number of recent decision events replayed to new subscribers.
    #[serde(default = "default_snapshot_events")]
    pub snapshot_events: usize,

    /// Upper bound on buffered request-body bytes for body-based limiting.
    #[serde(default = "default_body_buffer_max_bytes")]
    pub body_buffer_max_bytes: usize,
}

fn default_version() -> u8 {
    1
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5900
}

fn default_admin_host() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    5910
}

fn default_store_timeout_ms() -> u64 {
    1000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    256
}

fn default_snapshot_events() -> usize {
    100
}

fn default_body_buffer_max_bytes() -> usize {
    256 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            host: default_host(),
            port: default_port(),
            admin_host: default_admin_host(),
            admin_port: default_admin_port(),
            redis_url: None,
            trust_x_forwarded_for: false,
            store_timeout_ms: default_store_timeout_ms(),
            queue_sweep_interval_secs: default_sweep_interval_secs(),
            event_buffer: default_event_buffer(),
            snapshot_events: default_snapshot_events(),
            body_buffer_max_bytes: default_body_buffer_max_bytes(),
        }
    }
}

impl Settings {
    /// Validates the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a descriptive message.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }

        if self.admin_port == 0 {
            return Err("adminPort must be between 1 and 65535".to_string());
        }

        if self.port == self.admin_port && self.host == self.admin_host {
            return Err("adminPort must differ from the public port".to_string());
        }

        if self.store_timeout_ms == 0 {
            return Err("storeTimeoutMs must be at least 1".to_string());
        }

        if self.event_buffer == 0 {
            return Err("eventBuffer must be at least 1".to_string());
        }

        if self.snapshot_events == 0 {
            return Err("snapshotEvents must be at least 1".to_string());
        }

        if let Some(url) = &self.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err("redisUrl must start with redis:// or rediss://".to_string());
            }
        }

        Ok(())
    }
}
