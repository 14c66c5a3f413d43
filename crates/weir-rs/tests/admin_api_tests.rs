//! Admin API integration tests: rule CRUD, refresh observability, and
//! system config, exercised through the actix test harness.

use std::sync::Arc;

use actix_web::{test, web, App};
use weir_rs::models::decision::DecisionEvent;
use weir_rs::models::rule::Rule;
use weir_rs::routes::admin::{configure_admin, RuleAdmin};
use weir_rs::routes::config::{configure_config, ConfigAdmin};
use weir_rs::routes::metrics::{configure_metrics, MetricsState};
use weir_rs::services::events::DecisionHub;
use weir_rs::services::queue::QueueManager;
use weir_rs::services::rule_cache::RuleCache;
use weir_rs::storage::memory::MemoryStore;
use weir_rs::storage::SharedStore;

struct Ctx {
    store: Arc<dyn SharedStore>,
    cache: Arc<RuleCache>,
}

fn ctx() -> Ctx {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let cache = Arc::new(RuleCache::new(store.clone()));
    Ctx { store, cache }
}

macro_rules! admin_app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(RuleAdmin::new(
                    $ctx.store.clone(),
                    $ctx.cache.clone(),
                )))
                .app_data(web::Data::new(ConfigAdmin::new($ctx.store.clone())))
                .configure(configure_admin)
                .configure(configure_config),
        )
        .await
    };
}

fn sample_rule(pattern: &str) -> serde_json::Value {
    serde_json::json!({
        "pathPattern": pattern,
        "allowedRequests": 5,
        "windowSeconds": 60,
        "active": true,
        "priority": 1
    })
}

#[actix_web::test]
async fn rule_crud_round_trip_is_shape_exact() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    // Create; the server assigns an id.
    let req = test::TestRequest::post()
        .uri("/rules")
        .set_json(sample_rule("/api/**"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let created: Rule = serde_json::from_value(body["rule"].clone()).unwrap();
    assert!(!created.id.is_empty());
    assert_eq!(created.path_pattern, "/api/**");

    // List contains exactly the created rule.
    let req = test::TestRequest::get().uri("/rules").to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let listed: Vec<Rule> = serde_json::from_value(body["rules"].clone()).unwrap();
    assert_eq!(listed, vec![created.clone()]);

    // Get returns the same shape bit-exactly.
    let req = test::TestRequest::get()
        .uri(&format!("/rules/{}", created.id))
        .to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let fetched: Rule = serde_json::from_value(body["rule"].clone()).unwrap();
    assert_eq!(fetched, created);

    // Update.
    let mut updated = created.clone();
    updated.allowed_requests = 9;
    let req = test::TestRequest::put()
        .uri(&format!("/rules/{}", created.id))
        .set_json(&updated)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/rules/{}", created.id))
        .to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let fetched: Rule = serde_json::from_value(body["rule"].clone()).unwrap();
    assert_eq!(fetched.allowed_requests, 9);

    // Delete, then a get is 404.
    let req = test::TestRequest::delete()
        .uri(&format!("/rules/{}", created.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/rules/{}", created.id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn active_listing_filters_inactive_rules() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    let mut inactive = sample_rule("/off/**");
    inactive["active"] = serde_json::Value::Bool(false);

    for rule in [sample_rule("/on/**"), inactive] {
        let req = test::TestRequest::post()
            .uri("/rules")
            .set_json(rule)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get().uri("/rules/active").to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let active: Vec<Rule> = serde_json::from_value(body["rules"].clone()).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].path_pattern, "/on/**");

    let req = test::TestRequest::get().uri("/rules").to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let all: Vec<Rule> = serde_json::from_value(body["rules"].clone()).unwrap();
    assert_eq!(all.len(), 2);
}

#[actix_web::test]
async fn mutations_refresh_the_matcher() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    assert!(ctx.cache.find_match("/api/x").is_none());

    let req = test::TestRequest::post()
        .uri("/rules")
        .set_json(sample_rule("/api/**"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    // The matcher sees the rule as soon as the create returns.
    assert!(ctx.cache.find_match("/api/x").is_some());
}

#[actix_web::test]
async fn forced_refresh_picks_up_out_of_band_changes() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    // Rule written behind the API's back, e.g. by another instance.
    ctx.store
        .put_rule(&Rule {
            id: "external".to_string(),
            path_pattern: "/ext/**".to_string(),
            allowed_requests: 1,
            window_seconds: 60,
            ..Rule::default()
        })
        .await
        .unwrap();
    assert!(ctx.cache.find_match("/ext/a").is_none());

    let req = test::TestRequest::post().uri("/rules/refresh").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["version"].as_u64().unwrap() >= 1);

    assert!(ctx.cache.find_match("/ext/a").is_some());
}

#[actix_web::test]
async fn queue_patch_updates_only_queue_fields() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/rules")
        .set_json(sample_rule("/api/**"))
        .to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let id = body["rule"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::patch()
        .uri(&format!("/rules/{}/queue", id))
        .set_json(serde_json::json!({
            "queueEnabled": true,
            "maxQueueSize": 7,
            "delayPerRequestMs": 250
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/rules/{}", id))
        .to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let rule: Rule = serde_json::from_value(body["rule"].clone()).unwrap();
    assert!(rule.queue_enabled);
    assert_eq!(rule.max_queue_size, 7);
    assert_eq!(rule.delay_per_request_ms, 250);
    // Untouched fields survive.
    assert_eq!(rule.allowed_requests, 5);
    assert_eq!(rule.path_pattern, "/api/**");
}

#[actix_web::test]
async fn body_limit_patch_validates_the_result() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/rules")
        .set_json(sample_rule("/api/**"))
        .to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    let id = body["rule"]["id"].as_str().unwrap().to_string();

    // Enabling body limiting with an empty field path is rejected.
    let req = test::TestRequest::patch()
        .uri(&format!("/rules/{}/body-limit", id))
        .set_json(serde_json::json!({
            "bodyLimitEnabled": true,
            "bodyFieldPath": "",
            "bodyLimitType": "replace_ip"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::patch()
        .uri(&format!("/rules/{}/body-limit", id))
        .set_json(serde_json::json!({
            "bodyLimitEnabled": true,
            "bodyFieldPath": "user.id",
            "bodyLimitType": "combine_with_ip"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn invalid_rules_are_rejected_with_400() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    let mut bad = sample_rule("/api/**");
    bad["allowedRequests"] = serde_json::json!(0);

    let req = test::TestRequest::post()
        .uri("/rules")
        .set_json(bad)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn metrics_snapshot_surfaces_fail_open_tally() {
    let ctx = ctx();
    ctx.store
        .put_rule(&Rule {
            id: "r1".to_string(),
            path_pattern: "/**".to_string(),
            allowed_requests: 1,
            window_seconds: 60,
            ..Rule::default()
        })
        .await
        .unwrap();
    ctx.cache.refresh().await.unwrap();

    let hub = Arc::new(DecisionHub::new(16, 10));
    hub.publish(DecisionEvent {
        timestamp_ms: 0,
        path: "/a".to_string(),
        method: "GET".to_string(),
        host: "t".to_string(),
        identifier: "1.2.3.4".to_string(),
        rule_id: Some("r1".to_string()),
        status_code: 200,
        allowed: true,
        queued: false,
    });
    hub.record_fail_open();
    hub.record_fail_open();

    let queue = Arc::new(QueueManager::new());
    queue.try_enqueue("r1:1.2.3.4", 5, 100);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(MetricsState::new(
                hub,
                ctx.cache.clone(),
                queue,
            )))
            .configure(configure_metrics),
    )
    .await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;

    assert_eq!(body["summary"]["failOpen"], 2);
    assert_eq!(body["summary"]["total"], 1);
    assert_eq!(body["summary"]["allowed"], 1);
    assert_eq!(body["ruleCache"]["version"], 1);
    assert_eq!(body["ruleCache"]["activeRules"], 1);
    assert_eq!(body["queue"]["trackedKeys"], 1);
}

#[actix_web::test]
async fn config_round_trip() {
    let ctx = ctx();
    let app = admin_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/config/maintenance_mode")
        .set_payload("on")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get().uri("/config").to_request();
    let body: serde_json::Value =
        test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["config"]["maintenance_mode"], "on");
}
