//! End-to-end decision pipeline scenarios over the in-process store.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use weir_rs::models::rule::{LimitMode, Rule};
use weir_rs::services::counter::CounterEngine;
use weir_rs::services::events::{DecisionHub, StreamMessage};
use weir_rs::services::identifier::RequestFeatures;
use weir_rs::services::pipeline::RateLimitService;
use weir_rs::services::queue::QueueManager;
use weir_rs::services::rule_cache::RuleCache;
use weir_rs::storage::memory::MemoryStore;
use weir_rs::storage::SharedStore;

struct Harness {
    service: RateLimitService,
    store: Arc<MemoryStore>,
}

async fn harness(rules: Vec<Rule>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    for rule in &rules {
        store.put_rule(rule).await.unwrap();
    }
    let shared: Arc<dyn SharedStore> = store.clone();

    let cache = Arc::new(RuleCache::new(shared.clone()));
    cache.refresh().await.unwrap();

    let service = RateLimitService::new(
        cache,
        Arc::new(CounterEngine::new(shared)),
        Arc::new(QueueManager::new()),
        Arc::new(DecisionHub::new(64, 100)),
        false,
    );

    Harness { service, store }
}

fn request(path: &str, ip: &str) -> RequestFeatures {
    RequestFeatures {
        path: path.to_string(),
        method: "GET".to_string(),
        host: "gateway.local".to_string(),
        remote_addr: Some(ip.to_string()),
        ..RequestFeatures::default()
    }
}

fn bearer(payload: &str) -> String {
    format!("Bearer head.{}.sig", URL_SAFE_NO_PAD.encode(payload.as_bytes()))
}

#[tokio::test]
async fn pure_ip_limit_allows_three_then_rejects() {
    let h = harness(vec![Rule {
        id: "ip-rule".to_string(),
        path_pattern: "/**".to_string(),
        allowed_requests: 3,
        window_seconds: 10,
        ..Rule::default()
    }])
    .await;

    let f = request("/anything", "1.2.3.4");
    let mut outcomes = Vec::new();
    for _ in 0..4 {
        let rule = h.service.rule_for_path(&f.path);
        let eval = h.service.evaluate(&f, rule).await;
        outcomes.push(eval.decision.allowed);
    }

    assert_eq!(outcomes, vec![true, true, true, false]);
}

#[tokio::test]
async fn jwt_multi_claim_builds_joined_identifier() {
    let h = harness(vec![Rule {
        id: "jwt-rule".to_string(),
        path_pattern: "/**".to_string(),
        allowed_requests: 10,
        window_seconds: 60,
        jwt_enabled: true,
        jwt_claims: vec!["sub".to_string(), "tenant_id".to_string()],
        ..Rule::default()
    }])
    .await;

    let mut f = request("/api/data", "9.9.9.9");
    f.headers.insert(
        "authorization".to_string(),
        bearer(r#"{"sub":"u1","tenant_id":"t1"}"#),
    );

    let rule = h.service.rule_for_path(&f.path);
    let eval = h.service.evaluate(&f, rule).await;

    assert!(eval.decision.allowed);
    assert_eq!(eval.identifier, "u1:t1");
    // The counter key carries the joined identifier as its suffix.
    assert_eq!(h.store.counter_count("jwt-rule", "u1:t1").await, Some(1));
}

#[tokio::test]
async fn body_field_combines_with_client_ip() {
    let h = harness(vec![Rule {
        id: "body-rule".to_string(),
        path_pattern: "/**".to_string(),
        allowed_requests: 10,
        window_seconds: 60,
        body_limit_enabled: true,
        body_field_path: "user_id".to_string(),
        body_limit_type: LimitMode::CombineWithIp,
        ..Rule::default()
    }])
    .await;

    let mut f = request("/submit", "10.0.0.1");
    f.method = "POST".to_string();
    f.content_type = Some("application/json".to_string());
    f.body = Some(br#"{"user_id":"u9"}"#.to_vec());

    let rule = h.service.rule_for_path(&f.path);
    let eval = h.service.evaluate(&f, rule).await;

    assert_eq!(eval.identifier, "10.0.0.1:u9");
    assert_eq!(
        h.store.counter_count("body-rule", "10.0.0.1:u9").await,
        Some(1)
    );
}

#[tokio::test]
async fn queueing_delays_scale_with_position_then_reject() {
    let h = harness(vec![Rule {
        id: "q-rule".to_string(),
        path_pattern: "/**".to_string(),
        allowed_requests: 1,
        window_seconds: 60,
        queue_enabled: true,
        max_queue_size: 2,
        delay_per_request_ms: 500,
        ..Rule::default()
    }])
    .await;

    let f = request("/burst", "1.2.3.4");
    let mut results = Vec::new();
    for _ in 0..4 {
        let rule = h.service.rule_for_path(&f.path);
        let eval = h.service.evaluate(&f, rule).await;
        results.push((eval.decision.allowed, eval.decision.queued, eval.decision.delay_ms));
    }

    assert_eq!(
        results,
        vec![
            (true, false, 0),
            (true, true, 500),
            (true, true, 1000),
            (false, false, 0),
        ]
    );
}

#[tokio::test]
async fn header_takes_precedence_over_body_source() {
    let h = harness(vec![Rule {
        id: "multi-rule".to_string(),
        path_pattern: "/**".to_string(),
        allowed_requests: 10,
        window_seconds: 60,
        header_limit_enabled: true,
        header_name: "X-API-Key".to_string(),
        body_limit_enabled: true,
        body_field_path: "user_id".to_string(),
        ..Rule::default()
    }])
    .await;

    let mut f = request("/submit", "1.2.3.4");
    f.method = "POST".to_string();
    f.headers
        .insert("x-api-key".to_string(), "key-abc".to_string());
    f.content_type = Some("application/json".to_string());
    f.body = Some(br#"{"user_id":"u9"}"#.to_vec());

    let rule = h.service.rule_for_path(&f.path);
    let eval = h.service.evaluate(&f, rule).await;

    assert_eq!(eval.identifier, "key-abc");
}

#[tokio::test]
async fn missing_header_falls_back_to_ip_everywhere() {
    let h = harness(vec![Rule {
        id: "hdr-rule".to_string(),
        path_pattern: "/**".to_string(),
        allowed_requests: 10,
        window_seconds: 60,
        header_limit_enabled: true,
        header_name: "X-API-Key".to_string(),
        ..Rule::default()
    }])
    .await;

    let (_, mut rx) = h.service.hub().subscribe();

    let f = request("/api", "1.2.3.4");
    let rule = h.service.rule_for_path(&f.path);
    let eval = h.service.evaluate(&f, rule).await;
    h.service.publish(&f, &eval, 200);

    // Decision and the published event agree on the fallback identifier.
    assert_eq!(eval.identifier, "1.2.3.4");
    match rx.recv().await.unwrap() {
        StreamMessage::Traffic(event) => {
            assert_eq!(event.identifier, "1.2.3.4");
            assert_eq!(event.rule_id.as_deref(), Some("hdr-rule"));
            assert!(event.allowed);
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn malformed_inputs_never_error_the_pipeline() {
    let h = harness(vec![Rule {
        id: "strict-rule".to_string(),
        path_pattern: "/**".to_string(),
        allowed_requests: 10,
        window_seconds: 60,
        jwt_enabled: true,
        jwt_claims: vec!["sub".to_string()],
        body_limit_enabled: true,
        body_field_path: "user.id".to_string(),
        body_content_type: Some("application/json".to_string()),
        ..Rule::default()
    }])
    .await;

    // Empty body, broken JSON, missing Authorization: all degrade to IP.
    for body in [None, Some(b"{broken".to_vec()), Some(Vec::new())] {
        let mut f = request("/x", "7.7.7.7");
        f.method = "POST".to_string();
        f.content_type = Some("application/json".to_string());
        f.body = body;

        let rule = h.service.rule_for_path(&f.path);
        let eval = h.service.evaluate(&f, rule).await;
        assert_eq!(eval.identifier, "7.7.7.7");
        assert!(eval.decision.allowed);
    }
}
