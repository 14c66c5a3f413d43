use super::{rule_key, CounterVerdict, SharedStore, StoreError, CONFIG_KEY, RULE_INDEX_KEY};
use crate::models::rule::Rule;
use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Fixed-window admit, executed server-side so steps 1-4 of the counter
/// algorithm are atomic per key. Returns `{allowed, count}`.
///
/// The TTL is set once, when the window is created, so the key expires
/// `windowSeconds` after `windowStart` regardless of later increments.
static COUNTER_ADMIT_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
        local limit = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])
        local now = tonumber(ARGV[3])
        local state = redis.call('HMGET', KEYS[1], 'count', 'window_start')
        local count = tonumber(state[1])
        local start = tonumber(state[2])
        if (not count) or (not start) or (now - start >= window) then
            redis.call('HSET', KEYS[1], 'count', 1, 'window_start', now)
            redis.call('EXPIRE', KEYS[1], window)
            return {1, 1}
        end
        if count < limit then
            count = redis.call('HINCRBY', KEYS[1], 'count', 1)
            return {1, count}
        end
        return {0, count}
        "#,
    )
});

/// Redis-backed [`SharedStore`].
///
/// Every operation is bounded by a per-call timeout; callers decide what a
/// timeout means (the counter engine fails open, the admin API reports it).
pub struct RedisStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    /// Connects to the store and starts the managed connection, which
    /// reconnects in the background on broken links.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { conn, timeout })
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result.map_err(|e| StoreError::Backend(e.to_string())),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get_rule(&self, id: &str) -> Result<Option<Rule>, StoreError> {
        let mut conn = self.conn.clone();
        let key = rule_key(id);
        let raw: Option<String> = self.bounded(conn.get(&key)).await?;

        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e))),
        }
    }

    async fn put_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(rule).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let mut conn = self.conn.clone();
        let key = rule_key(&rule.id);

        self.bounded(async {
            redis::pipe()
                .atomic()
                .set(&key, &json)
                .sadd(RULE_INDEX_KEY, &rule.id)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = self.bounded(conn.smembers(RULE_INDEX_KEY)).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // MGET explicitly: `get` with a one-element key list degenerates
        // to GET and changes the reply shape.
        let mut mget = redis::cmd("MGET");
        for id in &ids {
            mget.arg(rule_key(id));
        }
        let raw: Vec<Option<String>> = self.bounded(mget.query_async(&mut conn)).await?;

        let mut rules = Vec::with_capacity(raw.len());
        for (id, entry) in ids.iter().zip(raw) {
            match entry {
                Some(json) => match serde_json::from_str::<Rule>(&json) {
                    Ok(rule) => rules.push(rule),
                    Err(e) => {
                        // A corrupt entry must not take every other rule
                        // down with it.
                        debug!("skipping corrupt rule {}: {}", id, e);
                    }
                },
                None => {
                    // Index entry without a value; prune it.
                    let _: Result<(), _> = self.bounded(conn.srem(RULE_INDEX_KEY, id)).await;
                }
            }
        }
        Ok(rules)
    }

    async fn delete_rule(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let key = rule_key(id);

        let (removed, _): (i64, i64) = self
            .bounded(async {
                redis::pipe()
                    .atomic()
                    .del(&key)
                    .srem(RULE_INDEX_KEY, id)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn counter_admit(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
        now_epoch_secs: i64,
    ) -> Result<CounterVerdict, StoreError> {
        let mut conn = self.conn.clone();

        let reply: Vec<i64> = self
            .bounded(
                COUNTER_ADMIT_SCRIPT
                    .key(key)
                    .arg(limit)
                    .arg(window_seconds)
                    .arg(now_epoch_secs)
                    .invoke_async(&mut conn),
            )
            .await?;

        match reply.as_slice() {
            [1, count] => Ok(CounterVerdict::WithinQuota {
                count: *count as u32,
            }),
            [0, _] => Ok(CounterVerdict::Exceeded),
            other => Err(StoreError::Corrupt(format!(
                "unexpected admit reply: {:?}",
                other
            ))),
        }
    }

    async fn get_config(&self) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.hgetall(CONFIG_KEY)).await
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.hset(CONFIG_KEY, key, value)).await
    }
}
