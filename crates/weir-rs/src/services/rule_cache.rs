use crate::models::error::LimitError;
use crate::models::rule::Rule;
use crate::storage::SharedStore;
use crate::utils::pattern::PathPattern;
use log::{debug, error, warn};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// One active rule with its pre-compiled path pattern.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Arc<Rule>,
    pattern: PathPattern,
}

impl CompiledRule {
    pub fn matches(&self, path: &str) -> bool {
        self.pattern.matches(path)
    }
}

/// In-memory ordered list of active rules, hot-reloaded from the store.
///
/// The list is held behind a swap pointer: `refresh()` builds a complete
/// new list and installs it with one short write-lock, and readers take a
/// snapshot `Arc` once per request, so neither side ever observes a torn
/// state and no lock is held across I/O.
///
/// Match order is priority descending, then pattern specificity (longer
/// literal prefix first), then insertion order.
pub struct RuleCache {
    store: Arc<dyn SharedStore>,
    rules: RwLock<Arc<Vec<CompiledRule>>>,
    version: AtomicU64,
}

impl RuleCache {
    /// Creates an empty cache; call [`RuleCache::refresh`] to populate it.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            rules: RwLock::new(Arc::new(Vec::new())),
            version: AtomicU64::new(0),
        }
    }

    /// Reloads active rules from the store and atomically replaces the
    /// in-memory list. On failure the previous list stays installed.
    ///
    /// Returns the new cache version.
    pub async fn refresh(&self) -> Result<u64, LimitError> {
        let rules = self
            .store
            .list_rules()
            .await
            .map_err(|e| LimitError::RuleRefreshFailed(e.to_string()))?;

        let mut compiled: Vec<CompiledRule> = Vec::with_capacity(rules.len());
        for rule in rules.into_iter().filter(|r| r.active) {
            if let Err(e) = rule.validate() {
                warn!("skipping invalid rule {}: {}", rule.id, e);
                continue;
            }
            match PathPattern::compile(&rule.path_pattern) {
                Ok(pattern) => compiled.push(CompiledRule {
                    rule: Arc::new(rule),
                    pattern,
                }),
                Err(e) => warn!("skipping rule {} with bad pattern: {}", rule.id, e),
            }
        }

        // Stable sort keeps insertion order as the final tie-break.
        compiled.sort_by_key(|c| (Reverse(c.rule.priority), Reverse(c.pattern.specificity())));

        let count = compiled.len();
        let installed = Arc::new(compiled);
        match self.rules.write() {
            Ok(mut guard) => *guard = installed,
            Err(poisoned) => *poisoned.into_inner() = installed,
        }

        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("rule cache refreshed: {} active rules (v{})", count, version);
        Ok(version)
    }

    /// Same as [`RuleCache::refresh`] but never fails the caller; used at
    /// startup where an unreachable store should not abort the gateway.
    pub async fn refresh_lossy(&self) {
        if let Err(e) = self.refresh().await {
            error!("{}; keeping previous rule list", e);
        }
    }

    /// Snapshot of the current list; cheap, one `Arc` clone.
    pub fn snapshot(&self) -> Arc<Vec<CompiledRule>> {
        match self.rules.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// First rule matching `path` in cache order.
    pub fn find_match(&self, path: &str) -> Option<Arc<Rule>> {
        self.snapshot()
            .iter()
            .find(|c| c.matches(path))
            .map(|c| Arc::clone(&c.rule))
    }

    /// Monotonic version, bumped on every successful refresh.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn rule(id: &str, pattern: &str, priority: i32) -> Rule {
        Rule {
            id: id.to_string(),
            path_pattern: pattern.to_string(),
            allowed_requests: 10,
            window_seconds: 60,
            priority,
            ..Rule::default()
        }
    }

    async fn cache_with(rules: Vec<Rule>) -> RuleCache {
        let store = Arc::new(MemoryStore::new());
        for r in &rules {
            store.put_rule(r).await.unwrap();
        }
        let cache = RuleCache::new(store);
        cache.refresh().await.unwrap();
        cache
    }

    #[tokio::test]
    async fn highest_priority_wins() {
        let cache = cache_with(vec![
            rule("wide", "/**", 0),
            rule("narrow", "/api/**", 5),
        ])
        .await;

        assert_eq!(cache.find_match("/api/users").unwrap().id, "narrow");
        assert_eq!(cache.find_match("/other").unwrap().id, "wide");
    }

    #[tokio::test]
    async fn specificity_breaks_priority_ties() {
        let cache = cache_with(vec![
            rule("wide", "/**", 1),
            rule("narrow", "/api/users/**", 1),
        ])
        .await;

        assert_eq!(cache.find_match("/api/users/7").unwrap().id, "narrow");
    }

    #[tokio::test]
    async fn inactive_rules_are_excluded() {
        let mut inactive = rule("off", "/**", 100);
        inactive.active = false;
        let cache = cache_with(vec![inactive, rule("on", "/**", 0)]).await;

        assert_eq!(cache.find_match("/x").unwrap().id, "on");
    }

    #[tokio::test]
    async fn refresh_observes_store_changes() {
        let store = Arc::new(MemoryStore::new());
        store.put_rule(&rule("r1", "/a/**", 0)).await.unwrap();

        let cache = RuleCache::new(store.clone());
        cache.refresh().await.unwrap();
        assert!(cache.find_match("/a/x").is_some());
        assert!(cache.find_match("/b/x").is_none());

        store.put_rule(&rule("r2", "/b/**", 0)).await.unwrap();
        // Not visible until refreshed.
        assert!(cache.find_match("/b/x").is_none());

        let v = cache.refresh().await.unwrap();
        assert_eq!(v, 2);
        assert!(cache.find_match("/b/x").is_some());
    }

    #[tokio::test]
    async fn invalid_rules_are_skipped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.put_rule(&rule("good", "/**", 0)).await.unwrap();
        store
            .put_rule(&Rule {
                id: "bad".to_string(),
                path_pattern: "no-leading-slash".to_string(),
                ..Rule::default()
            })
            .await
            .unwrap();

        let cache = RuleCache::new(store);
        cache.refresh().await.unwrap();
        assert_eq!(cache.snapshot().len(), 1);
    }
}
