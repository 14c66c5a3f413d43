use crate::models::rule::Rule;
use crate::storage::{counter_key, CounterVerdict, SharedStore};
use log::{debug, warn};
use std::sync::Arc;

/// Outcome of the fixed-window admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The window counter was advanced; the request is inside quota.
    WithinQuota,
    /// The quota for the current window is exhausted.
    Exceeded,
    /// The store failed; the request is admitted without counting.
    FailOpen,
}

/// Fixed-window counter per `(rule, identifier)`, backed by the shared
/// store's atomic admit operation.
///
/// Store failures and timeouts fail open: an unreachable store must slow
/// nothing down and reject nobody. `FailOpen` is a distinct admission
/// variant so the pipeline can tally such requests in the decision hub,
/// where operators see them as `failOpen` in the summary payload and the
/// admin metrics read.
pub struct CounterEngine {
    store: Arc<dyn SharedStore>,
}

impl CounterEngine {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Runs the window check for one request.
    pub async fn admit(&self, rule: &Rule, identifier: &str) -> Admission {
        let key = counter_key(&rule.id, identifier);
        let now = chrono::Utc::now().timestamp();

        match self
            .store
            .counter_admit(&key, rule.allowed_requests, rule.window_seconds, now)
            .await
        {
            Ok(CounterVerdict::WithinQuota { count }) => {
                debug!("{} at {}/{}", key, count, rule.allowed_requests);
                Admission::WithinQuota
            }
            Ok(CounterVerdict::Exceeded) => Admission::Exceeded,
            Err(e) => {
                warn!("counter store failure for {}: {}; admitting fail-open", key, e);
                Admission::FailOpen
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::StoreError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct DownStore;

    #[async_trait]
    impl SharedStore for DownStore {
        async fn get_rule(&self, _: &str) -> Result<Option<Rule>, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn put_rule(&self, _: &Rule) -> Result<(), StoreError> {
            Err(StoreError::Timeout)
        }
        async fn list_rules(&self) -> Result<Vec<Rule>, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn delete_rule(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn counter_admit(
            &self,
            _: &str,
            _: u32,
            _: u64,
            _: i64,
        ) -> Result<CounterVerdict, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn get_config(&self) -> Result<HashMap<String, String>, StoreError> {
            Err(StoreError::Timeout)
        }
        async fn set_config(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Timeout)
        }
    }

    fn rule(limit: u32, window: u64) -> Rule {
        Rule {
            id: "r1".to_string(),
            allowed_requests: limit,
            window_seconds: window,
            ..Rule::default()
        }
    }

    #[tokio::test]
    async fn admits_until_quota_then_refuses() {
        let engine = CounterEngine::new(Arc::new(MemoryStore::new()));
        let rule = rule(3, 60);

        for _ in 0..3 {
            assert_eq!(engine.admit(&rule, "1.2.3.4").await, Admission::WithinQuota);
        }
        assert_eq!(engine.admit(&rule, "1.2.3.4").await, Admission::Exceeded);
        // A different identifier has its own window.
        assert_eq!(engine.admit(&rule, "5.6.7.8").await, Admission::WithinQuota);
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let engine = CounterEngine::new(Arc::new(DownStore));
        let rule = rule(1, 60);

        // Every request is admitted while the store is down, flagged so
        // the pipeline can tally it.
        for _ in 0..5 {
            assert_eq!(engine.admit(&rule, "1.2.3.4").await, Admission::FailOpen);
        }
    }
}
