//! Operational metrics endpoint.
//!
//! One JSON snapshot for operators: the running traffic summary
//! (including the fail-open tally, so a limiter running blind against an
//! unreachable store is visible), the rule cache version and size, and
//! the number of queue keys currently tracked. Served on the admin
//! listener.

use actix_web::{get, web, HttpResponse, Responder};
use serde_json::json;
use std::sync::Arc;

use crate::services::events::DecisionHub;
use crate::services::queue::QueueManager;
use crate::services::rule_cache::RuleCache;

/// Shared state for the metrics read.
#[derive(Clone)]
pub struct MetricsState {
    hub: Arc<DecisionHub>,
    cache: Arc<RuleCache>,
    queue: Arc<QueueManager>,
}

impl MetricsState {
    pub fn new(hub: Arc<DecisionHub>, cache: Arc<RuleCache>, queue: Arc<QueueManager>) -> Self {
        Self { hub, cache, queue }
    }
}

/// Current gateway metrics snapshot.
#[get("/metrics")]
pub async fn get_metrics(state: web::Data<MetricsState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "summary": state.hub.summary(),
        "ruleCache": {
            "version": state.cache.version(),
            "activeRules": state.cache.snapshot().len(),
        },
        "queue": {
            "trackedKeys": state.queue.tracked_keys(),
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Configure the metrics endpoint.
pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.service(get_metrics);
}
