//! Shared store abstraction for rules, counters, and system config.
//!
//! The core treats the store as a black box behind the [`SharedStore`]
//! trait. Two implementations are provided:
//!
//! - [`redis::RedisStore`] - networked store shared across gateway
//!   instances; the fixed-window counter step runs as a server-side script
//!   so concurrent callers on one key are linearized.
//! - [`memory::MemoryStore`] - in-process store used by tests and by
//!   single-instance deployments without Redis.
//!
//! # Key layout
//!
//! - `rate_limit_rules:<id>` - one rule, JSON
//! - `rate_limit_rules` - index set of rule ids
//! - `request_counter:<ruleId>:<identifier>` - `{count, windowStart}`, TTL
//! - `system_config` - hash of string -> string

pub mod memory;
pub mod redis;

use crate::models::rule::Rule;
use async_trait::async_trait;
use std::collections::HashMap;

/// Prefix for per-rule keys.
pub const RULE_KEY_PREFIX: &str = "rate_limit_rules:";
/// Index set holding every stored rule id.
pub const RULE_INDEX_KEY: &str = "rate_limit_rules";
/// Prefix for fixed-window counter keys.
pub const COUNTER_KEY_PREFIX: &str = "request_counter:";
/// Hash holding system configuration entries.
pub const CONFIG_KEY: &str = "system_config";

/// Store key for one rule.
pub fn rule_key(id: &str) -> String {
    format!("{}{}", RULE_KEY_PREFIX, id)
}

/// Store key for the fixed-window counter of `(rule, identifier)`.
pub fn counter_key(rule_id: &str, identifier: &str) -> String {
    format!("{}{}:{}", COUNTER_KEY_PREFIX, rule_id, identifier)
}

/// Errors from the shared store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store operation timed out")]
    Timeout,
    #[error("malformed stored value: {0}")]
    Corrupt(String),
}

/// Result of the atomic fixed-window counter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterVerdict {
    /// The count was advanced; `count` is the value after the increment.
    WithinQuota { count: u32 },
    /// The quota is exhausted; the count was not advanced.
    Exceeded,
}

/// Contract presented by the rule/counter/config store.
///
/// `counter_admit` must be atomic with respect to concurrent callers on
/// the same key: fetch the window, reset it when absent or elapsed,
/// increment while under the limit, refuse otherwise, all in one step.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get_rule(&self, id: &str) -> Result<Option<Rule>, StoreError>;
    async fn put_rule(&self, rule: &Rule) -> Result<(), StoreError>;
    /// Returns every stored rule; the rule cache filters on `active`.
    async fn list_rules(&self) -> Result<Vec<Rule>, StoreError>;
    /// Returns whether a rule was actually removed.
    async fn delete_rule(&self, id: &str) -> Result<bool, StoreError>;

    /// Atomic fixed-window admit on `key` with TTL `window_seconds`.
    async fn counter_admit(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
        now_epoch_secs: i64,
    ) -> Result<CounterVerdict, StoreError>;

    async fn get_config(&self) -> Result<HashMap<String, String>, StoreError>;
    async fn set_config(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
