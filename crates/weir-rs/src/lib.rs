//! # weir-rs
//!
//! Rate-limiting core for the Weir API gateway.
//!
//! For every incoming request the core selects a matching policy, resolves
//! an identifier from one of several request features (header, cookie,
//! body field, JWT claims, client IP), maintains per-identifier
//! fixed-window counters in a shared store, and either admits, delays
//! (leaky bucket), or rejects the request. A small admin surface manages
//! rules, and a broadcast stream publishes every decision to observers.
//!
//! ## Components
//!
//! - [`services::rule_cache`] - ordered in-memory rule list, hot-reloaded
//! - [`services::identifier`] - identifier precedence chain with silent
//!   fallback down to the client IP
//! - [`services::counter`] - fixed-window counters in the shared store,
//!   fail-open on store trouble
//! - [`services::queue`] - per-key leaky bucket smoothing excess traffic
//! - [`services::pipeline`] - the per-request decision pipeline
//! - [`middleware::rate_limit`] - actix-web filter applying decisions
//!
//! ## Trust model
//!
//! JWT claims are extracted structurally, without signature verification:
//! authentication is assumed to happen upstream, and the claims only key
//! counters. Never treat a resolved identifier as an authenticated
//! principal.

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod utils;
