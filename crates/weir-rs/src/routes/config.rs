//! System configuration endpoints.
//!
//! Simple string key/value pairs stored in the shared `system_config`
//! hash. Served on the admin listener alongside rule management.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::error::AdminError;
use crate::storage::SharedStore;

/// Shared state for config operations.
#[derive(Clone)]
pub struct ConfigAdmin {
    store: Arc<dyn SharedStore>,
}

impl ConfigAdmin {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<HashMap<String, String>>,
}

/// Read the full system configuration hash.
#[get("/config")]
pub async fn get_config(admin: web::Data<ConfigAdmin>) -> Result<impl Responder, AdminError> {
    let config = admin
        .store
        .get_config()
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;

    Ok(HttpResponse::Ok().json(ConfigResponse {
        success: true,
        message: format!("{} entries", config.len()),
        config: Some(config),
    }))
}

/// Set one configuration key. The request body is the raw string value.
#[post("/config/{key}")]
pub async fn set_config(
    admin: web::Data<ConfigAdmin>,
    path: web::Path<String>,
    value: String,
) -> Result<impl Responder, AdminError> {
    let key = path.into_inner();
    admin
        .store
        .set_config(&key, &value)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;

    Ok(HttpResponse::Ok().json(ConfigResponse {
        success: true,
        message: format!("Config key '{}' updated", key),
        config: None,
    }))
}

/// Configure system config endpoints.
pub fn configure_config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_config).service(set_config);
}
