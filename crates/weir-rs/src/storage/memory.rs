use super::{counter_key, CounterVerdict, SharedStore, StoreError};
use crate::models::rule::Rule;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Fixed-window counter state for one key.
#[derive(Debug, Clone, Copy)]
struct CounterWindow {
    count: u32,
    window_start: i64,
    window_seconds: u64,
}

#[derive(Default)]
struct MemoryInner {
    rules: HashMap<String, Rule>,
    counters: HashMap<String, CounterWindow>,
    config: HashMap<String, String>,
}

/// In-process [`SharedStore`].
///
/// Counters are only shared within one gateway instance; window expiry is
/// evaluated lazily against the caller-supplied clock, which also makes
/// window-boundary behavior directly testable.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for `(rule, identifier)`, if a live window exists.
    /// Test helper; the request path only goes through `counter_admit`.
    pub async fn counter_count(&self, rule_id: &str, identifier: &str) -> Option<u32> {
        let inner = self.inner.lock().await;
        inner
            .counters
            .get(&counter_key(rule_id, identifier))
            .map(|w| w.count)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get_rule(&self, id: &str) -> Result<Option<Rule>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.rules.get(id).cloned())
    }

    async fn put_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.rules.values().cloned().collect())
    }

    async fn delete_rule(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.rules.remove(id).is_some())
    }

    async fn counter_admit(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
        now_epoch_secs: i64,
    ) -> Result<CounterVerdict, StoreError> {
        let mut inner = self.inner.lock().await;

        // Lazy TTL: drop windows whose expiry has passed so the map does
        // not accumulate dead keys between hits.
        inner
            .counters
            .retain(|_, w| now_epoch_secs - w.window_start < w.window_seconds as i64);

        if let Some(window) = inner.counters.get_mut(key) {
            if now_epoch_secs - window.window_start >= window_seconds as i64 {
                window.count = 1;
                window.window_start = now_epoch_secs;
                window.window_seconds = window_seconds;
                return Ok(CounterVerdict::WithinQuota { count: 1 });
            }
            if window.count < limit {
                window.count += 1;
                return Ok(CounterVerdict::WithinQuota {
                    count: window.count,
                });
            }
            return Ok(CounterVerdict::Exceeded);
        }

        inner.counters.insert(
            key.to_string(),
            CounterWindow {
                count: 1,
                window_start: now_epoch_secs,
                window_seconds,
            },
        );
        Ok(CounterVerdict::WithinQuota { count: 1 })
    }

    async fn get_config(&self) -> Result<HashMap<String, String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.config.clone())
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.config.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
