//! Settings loading for the gateway.
//!
//! Configuration comes from a JSON file (`WEIR_CONFIG_PATH`, default
//! `./config.json`) with environment variables overriding the listener
//! addresses and the store URL. A missing file yields default settings so
//! the gateway can boot in development with no setup at all.

use crate::models::settings::Settings;
use log::{info, warn};
use std::path::Path;

/// Loads and validates settings from the configured path plus environment
/// overrides.
///
/// # Errors
///
/// Returns a descriptive message when the file exists but cannot be
/// parsed, or when the merged configuration fails validation.
pub fn load_settings() -> Result<Settings, String> {
    let path =
        std::env::var("WEIR_CONFIG_PATH").unwrap_or_else(|_| "./config.json".to_string());
    let mut settings = load_settings_from_path(&path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Loads settings from an explicit path; a missing file is not an error.
pub fn load_settings_from_path(path: &str) -> Result<Settings, String> {
    if !Path::new(path).exists() {
        warn!("config file {} not found, using defaults", path);
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file {}: {}", path, e))?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse config file {}: {}", path, e))?;

    info!("loaded configuration from {}", path);
    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(host) = std::env::var("WEIR_HOST") {
        settings.host = host;
    }
    if let Ok(port) = std::env::var("WEIR_PORT") {
        match port.parse() {
            Ok(port) => settings.port = port,
            Err(_) => warn!("ignoring invalid WEIR_PORT: {}", port),
        }
    }
    if let Ok(host) = std::env::var("WEIR_ADMIN_HOST") {
        settings.admin_host = host;
    }
    if let Ok(port) = std::env::var("WEIR_ADMIN_PORT") {
        match port.parse() {
            Ok(port) => settings.admin_port = port,
            Err(_) => warn!("ignoring invalid WEIR_ADMIN_PORT: {}", port),
        }
    }
    if let Ok(url) = std::env::var("REDIS_URL") {
        settings.redis_url = Some(url);
    }
}
