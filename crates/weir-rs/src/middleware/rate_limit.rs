//! Request-path rate limiting middleware.
//!
//! Runs the decision pipeline on every request: rule match, optional body
//! buffering, identifier resolution, window counting, queueing. Applies
//! the outcome as either a pass-through (with an optional leaky-bucket
//! delay and `X-RateLimit-*` headers) or an empty `429`.
//!
//! The core never turns its own failures into 5xx responses; anything
//! catastrophic on this path degrades to an admission.

use crate::models::decision::DecisionReason;
use crate::services::body::BodyFamily;
use crate::services::identifier::RequestFeatures;
use crate::services::pipeline::RateLimitService;
use actix_http::h1;
use actix_web::{
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    web, Error as ActixError, HttpMessage, HttpResponse,
};
use ahash::HashMap as AHashMap;
use futures_util::future::{ok, LocalBoxFuture, Ready};
use futures_util::StreamExt;
use log::debug;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

fn queued_header() -> HeaderName {
    HeaderName::from_static("x-ratelimit-queued")
}

fn delay_header() -> HeaderName {
    HeaderName::from_static("x-ratelimit-delay-ms")
}

/// Middleware factory wrapping the decision pipeline.
#[derive(Clone)]
pub struct RateLimitFilter {
    core: Arc<RateLimitService>,
    body_cap: usize,
}

impl RateLimitFilter {
    pub fn new(core: Arc<RateLimitService>, body_cap: usize) -> Self {
        Self { core, body_cap }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Transform = RateLimitFilterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitFilterMiddleware {
            inner: Rc::new(service),
            core: self.core.clone(),
            body_cap: self.body_cap,
        })
    }
}

pub struct RateLimitFilterMiddleware<S> {
    inner: Rc<S>,
    core: Arc<RateLimitService>,
    body_cap: usize,
}

impl<S, B> Service<ServiceRequest> for RateLimitFilterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let inner = self.inner.clone();
        let core = self.core.clone();
        let body_cap = self.body_cap;

        Box::pin(async move {
            let mut features = extract_features(&req);
            let rule = core.rule_for_path(&features.path);

            if let Some(rule) = &rule {
                if needs_body_buffer(rule, &features) {
                    features.body = buffer_body(&mut req, body_cap).await;
                }
            }

            let eval = core.evaluate(&features, rule).await;

            if !eval.decision.allowed {
                let mut builder = HttpResponse::TooManyRequests();
                if eval.decision.reason == DecisionReason::QueueFull {
                    builder.insert_header((queued_header(), "true"));
                }
                core.publish(&features, &eval, 429);
                let response = builder.finish().map_into_right_body();
                return Ok(req.into_response(response));
            }

            if eval.decision.queued {
                tokio::time::sleep(Duration::from_millis(eval.decision.delay_ms)).await;
            }

            match inner.call(req).await {
                Ok(mut res) => {
                    if eval.decision.queued {
                        res.headers_mut()
                            .insert(queued_header(), HeaderValue::from_static("true"));
                        if let Ok(delay) =
                            HeaderValue::from_str(&eval.decision.delay_ms.to_string())
                        {
                            res.headers_mut().insert(delay_header(), delay);
                        }
                    }
                    core.publish(&features, &eval, res.status().as_u16());
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    core.publish(&features, &eval, 500);
                    Err(e)
                }
            }
        })
    }
}

/// Pulls the request features the resolver works on out of the actix
/// request. Header names are lowercased for case-insensitive lookup.
fn extract_features(req: &ServiceRequest) -> RequestFeatures {
    let mut headers = AHashMap::default();
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
        }
    }

    let cookies = req
        .cookies()
        .map(|jar| {
            jar.iter()
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect()
        })
        .unwrap_or_default();

    let content_type = headers.get("content-type").cloned();
    let host = req.connection_info().host().to_string();

    RequestFeatures {
        path: req.path().to_string(),
        method: req.method().as_str().to_string(),
        host,
        remote_addr: req.peer_addr().map(|addr| addr.ip().to_string()),
        headers,
        cookies,
        content_type,
        body: None,
    }
}

/// Body buffering is warranted only for mutating methods on rules that
/// key on a body field, and only for payload formats the extractor can
/// read.
fn needs_body_buffer(rule: &crate::models::rule::Rule, features: &RequestFeatures) -> bool {
    if !rule.needs_body() {
        return false;
    }
    if !matches!(features.method.as_str(), "POST" | "PUT" | "PATCH") {
        return false;
    }

    rule.body_content_type
        .as_deref()
        .or(features.content_type.as_deref())
        .and_then(BodyFamily::from_content_type)
        .is_some()
}

/// Reads the full payload once and re-injects it so the upstream dispatch
/// sees the body unchanged. Returns `None` on read errors or when the
/// body exceeds the cap; resolution then falls back to the next source.
async fn buffer_body(req: &mut ServiceRequest, cap: usize) -> Option<Vec<u8>> {
    let mut payload = req.take_payload();
    let mut buf = web::BytesMut::new();
    let mut failed = false;

    while let Some(chunk) = payload.next().await {
        match chunk {
            Ok(bytes) => buf.extend_from_slice(&bytes),
            Err(e) => {
                debug!("body read failed, skipping body extraction: {}", e);
                failed = true;
                break;
            }
        }
    }

    let bytes = buf.freeze();
    let (_, mut restored) = h1::Payload::create(true);
    restored.unread_data(bytes.clone());
    req.set_payload(actix_web::dev::Payload::from(restored));

    if failed {
        return None;
    }
    if bytes.len() > cap {
        debug!("body of {} bytes exceeds buffer cap {}", bytes.len(), cap);
        return None;
    }
    Some(bytes.to_vec())
}
