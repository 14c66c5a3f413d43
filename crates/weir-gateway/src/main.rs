//! Weir API Gateway Server
//!
//! Binary entry point wiring the rate-limit core: shared store, rule
//! cache, counter engine, queue manager, decision hub, and two HTTP
//! listeners. The public listener runs the admission filter in front of
//! the upstream dispatch point; the admin listener, bound local-only by
//! default, serves rule CRUD, system config, and the cache refresh hook.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use log::{info, warn};

use weir_rs::config::settings::load_settings;
use weir_rs::logs::logger::configure_logger;
use weir_rs::middleware::rate_limit::RateLimitFilter;
use weir_rs::models::settings::Settings;
use weir_rs::routes::admin::{configure_admin, RuleAdmin};
use weir_rs::routes::config::{configure_config, ConfigAdmin};
use weir_rs::routes::metrics::{configure_metrics, MetricsState};
use weir_rs::routes::{health, stream};
use weir_rs::services::counter::CounterEngine;
use weir_rs::services::events::DecisionHub;
use weir_rs::services::pipeline::RateLimitService;
use weir_rs::services::queue::QueueManager;
use weir_rs::services::rule_cache::RuleCache;
use weir_rs::storage::memory::MemoryStore;
use weir_rs::storage::redis::RedisStore;
use weir_rs::storage::SharedStore;

/// Placeholder upstream dispatch: the seam where proxying to the actual
/// backend attaches. Requests only reach this point once the admission
/// filter has let them through.
async fn upstream_placeholder() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "admitted",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn build_store(config: &Settings) -> Arc<dyn SharedStore> {
    match &config.redis_url {
        Some(url) => {
            let timeout = Duration::from_millis(config.store_timeout_ms);
            match RedisStore::connect(url, timeout).await {
                Ok(store) => {
                    info!("connected to shared store at {}", url);
                    return Arc::new(store);
                }
                Err(e) => {
                    warn!("shared store unavailable ({}); using in-process store", e);
                }
            }
            Arc::new(MemoryStore::new())
        }
        None => {
            info!("no store configured; counters are local to this instance");
            Arc::new(MemoryStore::new())
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let config = match load_settings() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("starting weir gateway v{}", env!("CARGO_PKG_VERSION"));

    let store = build_store(&config).await;

    let rule_cache = Arc::new(RuleCache::new(store.clone()));
    rule_cache.refresh_lossy().await;

    let queue = Arc::new(QueueManager::new());
    let _sweeper = queue.start_sweeper(Duration::from_secs(config.queue_sweep_interval_secs));

    let hub = Arc::new(DecisionHub::new(config.event_buffer, config.snapshot_events));
    let counter = Arc::new(CounterEngine::new(store.clone()));

    let core = Arc::new(RateLimitService::new(
        rule_cache.clone(),
        counter,
        queue.clone(),
        hub.clone(),
        config.trust_x_forwarded_for,
    ));

    let filter = RateLimitFilter::new(core.clone(), config.body_buffer_max_bytes);
    let rule_admin = RuleAdmin::new(store.clone(), rule_cache.clone());
    let config_admin = ConfigAdmin::new(store);
    let metrics_state = MetricsState::new(hub.clone(), rule_cache, queue);

    info!(
        "public listener on {}:{}, admin listener on {}:{}",
        config.host, config.port, config.admin_host, config.admin_port
    );

    let public_hub = hub.clone();
    let public_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(public_hub.clone()))
            .wrap(filter.clone())
            .wrap(Logger::new(r#"%a "%r" %s %b %T"#))
            .configure(health::configure_health)
            .configure(stream::configure_stream)
            .default_service(web::route().to(upstream_placeholder))
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    let admin_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(rule_admin.clone()))
            .app_data(web::Data::new(config_admin.clone()))
            .app_data(web::Data::new(metrics_state.clone()))
            .wrap(Logger::new(r#"%a "%r" %s %b %T"#))
            .configure(configure_admin)
            .configure(configure_config)
            .configure(configure_metrics)
            .configure(health::configure_health)
    })
    .bind((config.admin_host.as_str(), config.admin_port))?
    .run();

    futures::future::try_join(public_server, admin_server)
        .await
        .map(|_| ())
}
