//! Rule management API endpoints.
//!
//! CRUD over the rule store plus a forced cache refresh. Every mutation
//! refreshes the in-memory rule cache before responding, so a successful
//! call means the matcher already uses the new state. These endpoints are
//! served on the local-only admin listener, never on the public port.

use actix_web::{delete, get, patch, post, put, web, HttpResponse, Responder};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::error::AdminError;
use crate::models::rule::{LimitMode, Rule};
use crate::services::rule_cache::RuleCache;
use crate::storage::SharedStore;

/// Shared state for rule management operations.
#[derive(Clone)]
pub struct RuleAdmin {
    store: Arc<dyn SharedStore>,
    cache: Arc<RuleCache>,
}

impl RuleAdmin {
    pub fn new(store: Arc<dyn SharedStore>, cache: Arc<RuleCache>) -> Self {
        Self { store, cache }
    }

    /// Refresh after a mutation. The store already holds the new state,
    /// so a refresh failure is logged but does not fail the request; the
    /// next refresh picks the change up.
    async fn refresh_after_mutation(&self) {
        if let Err(e) = self.cache.refresh().await {
            warn!("{}; matcher keeps the previous rule list", e);
        }
    }
}

/// Uniform response envelope for rule operations.
#[derive(Serialize, Deserialize)]
pub struct RuleResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
}

impl RuleResponse {
    fn one(message: impl Into<String>, rule: Rule) -> Self {
        Self {
            success: true,
            message: message.into(),
            rule: Some(rule),
            rules: None,
        }
    }

    fn many(message: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            success: true,
            message: message.into(),
            rule: None,
            rules: Some(rules),
        }
    }
}

/// Partial update payload for `PATCH /rules/{id}/queue`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePatch {
    pub queue_enabled: bool,
    pub max_queue_size: u32,
    pub delay_per_request_ms: u64,
}

/// Partial update payload for `PATCH /rules/{id}/body-limit`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyLimitPatch {
    pub body_limit_enabled: bool,
    pub body_field_path: String,
    pub body_limit_type: LimitMode,
}

/// List all rules, active or not.
#[get("/rules")]
pub async fn list_rules(admin: web::Data<RuleAdmin>) -> Result<impl Responder, AdminError> {
    let rules = admin
        .store
        .list_rules()
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;

    Ok(HttpResponse::Ok().json(RuleResponse::many(
        format!("Found {} rules", rules.len()),
        rules,
    )))
}

/// List only active rules.
#[get("/rules/active")]
pub async fn list_active_rules(
    admin: web::Data<RuleAdmin>,
) -> Result<impl Responder, AdminError> {
    let rules: Vec<Rule> = admin
        .store
        .list_rules()
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?
        .into_iter()
        .filter(|r| r.active)
        .collect();

    Ok(HttpResponse::Ok().json(RuleResponse::many(
        format!("Found {} active rules", rules.len()),
        rules,
    )))
}

/// Fetch one rule by id.
#[get("/rules/{id}")]
pub async fn get_rule(
    admin: web::Data<RuleAdmin>,
    path: web::Path<String>,
) -> Result<impl Responder, AdminError> {
    let id = path.into_inner();
    let rule = admin
        .store
        .get_rule(&id)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?
        .ok_or(AdminError::RuleNotFound(id))?;

    Ok(HttpResponse::Ok().json(RuleResponse::one("Rule found", rule)))
}

/// Create a rule. The server assigns a UUID when the payload carries no id.
#[post("/rules")]
pub async fn create_rule(
    admin: web::Data<RuleAdmin>,
    rule: web::Json<Rule>,
) -> Result<impl Responder, AdminError> {
    let mut rule = rule.into_inner();
    if rule.id.is_empty() {
        rule.id = Uuid::new_v4().to_string();
    }

    rule.validate().map_err(AdminError::InvalidRule)?;

    if admin
        .store
        .get_rule(&rule.id)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?
        .is_some()
    {
        return Err(AdminError::RuleExists(rule.id));
    }

    admin
        .store
        .put_rule(&rule)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;
    admin.refresh_after_mutation().await;

    Ok(HttpResponse::Created().json(RuleResponse::one("Rule created", rule)))
}

/// Replace a rule.
#[put("/rules/{id}")]
pub async fn update_rule(
    admin: web::Data<RuleAdmin>,
    path: web::Path<String>,
    rule: web::Json<Rule>,
) -> Result<impl Responder, AdminError> {
    let id = path.into_inner();
    let mut rule = rule.into_inner();

    if rule.id.is_empty() {
        rule.id = id.clone();
    } else if rule.id != id {
        return Err(AdminError::InvalidRule(
            "rule id must match the URL parameter".to_string(),
        ));
    }

    rule.validate().map_err(AdminError::InvalidRule)?;

    if admin
        .store
        .get_rule(&id)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?
        .is_none()
    {
        return Err(AdminError::RuleNotFound(id));
    }

    admin
        .store
        .put_rule(&rule)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;
    admin.refresh_after_mutation().await;

    Ok(HttpResponse::Ok().json(RuleResponse::one("Rule updated", rule)))
}

/// Update only the queue settings of a rule.
#[patch("/rules/{id}/queue")]
pub async fn patch_queue(
    admin: web::Data<RuleAdmin>,
    path: web::Path<String>,
    body: web::Json<QueuePatch>,
) -> Result<impl Responder, AdminError> {
    let id = path.into_inner();
    let mut rule = admin
        .store
        .get_rule(&id)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?
        .ok_or(AdminError::RuleNotFound(id))?;

    let patch = body.into_inner();
    rule.queue_enabled = patch.queue_enabled;
    rule.max_queue_size = patch.max_queue_size;
    rule.delay_per_request_ms = patch.delay_per_request_ms;

    rule.validate().map_err(AdminError::InvalidRule)?;

    admin
        .store
        .put_rule(&rule)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;
    admin.refresh_after_mutation().await;

    Ok(HttpResponse::Ok().json(RuleResponse::one("Queue settings updated", rule)))
}

/// Update only the body-limit settings of a rule.
#[patch("/rules/{id}/body-limit")]
pub async fn patch_body_limit(
    admin: web::Data<RuleAdmin>,
    path: web::Path<String>,
    body: web::Json<BodyLimitPatch>,
) -> Result<impl Responder, AdminError> {
    let id = path.into_inner();
    let mut rule = admin
        .store
        .get_rule(&id)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?
        .ok_or(AdminError::RuleNotFound(id))?;

    let patch = body.into_inner();
    rule.body_limit_enabled = patch.body_limit_enabled;
    rule.body_field_path = patch.body_field_path;
    rule.body_limit_type = patch.body_limit_type;

    rule.validate().map_err(AdminError::InvalidRule)?;

    admin
        .store
        .put_rule(&rule)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;
    admin.refresh_after_mutation().await;

    Ok(HttpResponse::Ok().json(RuleResponse::one("Body limit settings updated", rule)))
}

/// Delete a rule.
#[delete("/rules/{id}")]
pub async fn delete_rule(
    admin: web::Data<RuleAdmin>,
    path: web::Path<String>,
) -> Result<impl Responder, AdminError> {
    let id = path.into_inner();
    let removed = admin
        .store
        .delete_rule(&id)
        .await
        .map_err(|e| AdminError::Store(e.to_string()))?;

    if !removed {
        return Err(AdminError::RuleNotFound(id));
    }
    admin.refresh_after_mutation().await;

    Ok(HttpResponse::Ok().json(RuleResponse {
        success: true,
        message: "Rule deleted".to_string(),
        rule: None,
        rules: None,
    }))
}

/// Response for a forced cache reload.
#[derive(Serialize, Deserialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub version: Option<u64>,
}

/// Force a rule cache reload from the store.
#[post("/rules/refresh")]
pub async fn refresh_rules(admin: web::Data<RuleAdmin>) -> impl Responder {
    match admin.cache.refresh().await {
        Ok(version) => HttpResponse::Ok().json(RefreshResponse {
            success: true,
            message: "Rule cache refreshed".to_string(),
            version: Some(version),
        }),
        Err(e) => HttpResponse::InternalServerError().json(RefreshResponse {
            success: false,
            message: e.to_string(),
            version: None,
        }),
    }
}

/// Configure rule management endpoints.
pub fn configure_admin(cfg: &mut web::ServiceConfig) {
    cfg.service(list_active_rules)
        .service(refresh_rules)
        .service(list_rules)
        .service(create_rule)
        .service(get_rule)
        .service(update_rule)
        .service(patch_queue)
        .service(patch_body_limit)
        .service(delete_rule);
}
