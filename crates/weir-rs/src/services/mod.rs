//! Core services of the rate-limit engine.
//!
//! # Module Organization
//!
//! - [`rule_cache`] - Swap-pointer cache of active rules with hot reload
//! - [`body`] - Request-body field extraction (JSON, form, XML, multipart)
//! - [`identifier`] - Identifier resolution precedence chain
//! - [`counter`] - Fixed-window counter over the shared store
//! - [`queue`] - Per-key leaky-bucket depth tracking and delay scheduling
//! - [`events`] - Broadcast hub for decision events
//! - [`pipeline`] - The per-request decision pipeline composing the rest
//!
//! Dependency order is leaves first: counter and queue are independent,
//! the resolver reads the body buffer, and the pipeline composes all of
//! them per request.

pub mod body;
pub mod counter;
pub mod events;
pub mod identifier;
pub mod pipeline;
pub mod queue;
pub mod rule_cache;
