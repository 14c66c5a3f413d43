use dashmap::DashMap;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Per-key leaky-bucket state.
///
/// `retired` marks a slot the sweeper has removed from the map; an
/// enqueue that raced the removal rolls its increment back and retries
/// on a fresh slot, so the depth bound holds across the swap.
#[derive(Default)]
struct QueueSlot {
    depth: AtomicU32,
    idle_sweeps: AtomicU32,
    retired: AtomicBool,
}

enum Acquire {
    Position(u32),
    Full,
    Retired,
}

impl QueueSlot {
    fn try_acquire(&self, max: u32) -> Acquire {
        loop {
            if self.retired.load(Ordering::Acquire) {
                return Acquire::Retired;
            }

            let depth = self.depth.load(Ordering::Acquire);
            if depth >= max {
                return Acquire::Full;
            }

            if self
                .depth
                .compare_exchange(depth, depth + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if self.retired.load(Ordering::Acquire) {
                    self.release();
                    return Acquire::Retired;
                }
                self.idle_sweeps.store(0, Ordering::Release);
                return Acquire::Position(depth + 1);
            }
        }
    }

    fn release(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
                Some(d.saturating_sub(1))
            });
    }
}

/// Outcome of offering an over-quota request to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Admitted with a delay of `position * delayPerRequestMs`.
    Queued { position: u32, delay_ms: u64 },
    /// Depth already at the configured maximum.
    Full,
}

/// In-process leaky-bucket depth tracker and delay scheduler.
///
/// Queued admissions do not consume fixed-window quota; the bucket smooths
/// excess into a delayed flow instead. Depth is tracked per
/// `<ruleId>:<identifier>` inside this gateway instance only; instances
/// queue independently by design.
pub struct QueueManager {
    slots: DashMap<String, Arc<QueueSlot>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Queue key for `(rule, identifier)`.
    pub fn queue_key(rule_id: &str, identifier: &str) -> String {
        format!("{}:{}", rule_id, identifier)
    }

    /// Atomically claims a queue position, or reports the queue full.
    ///
    /// On success a background timer is scheduled to release the position
    /// after the computed delay; it fires whether or not the request is
    /// still around (client disconnects do not leak depth).
    pub fn try_enqueue(&self, key: &str, max: u32, delay_per_request_ms: u64) -> QueueOutcome {
        loop {
            let slot = self
                .slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(QueueSlot::default()))
                .clone();

            match slot.try_acquire(max) {
                Acquire::Retired => continue,
                Acquire::Full => {
                    debug!("queue {} full at {}", key, max);
                    return QueueOutcome::Full;
                }
                Acquire::Position(position) => {
                    let delay_ms = position as u64 * delay_per_request_ms;
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        slot.release();
                    });
                    trace!("queued {} at position {} ({} ms)", key, position, delay_ms);
                    return QueueOutcome::Queued { position, delay_ms };
                }
            }
        }
    }

    /// Current depth for a key; zero when the key is unknown.
    pub fn depth(&self, key: &str) -> u32 {
        self.slots
            .get(key)
            .map(|s| s.depth.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.slots.len()
    }

    /// One sweep: drop entries that have sat at depth zero for more than
    /// one consecutive cycle.
    pub fn sweep(&self) {
        self.slots.retain(|key, slot| {
            if slot.depth.load(Ordering::Acquire) != 0 {
                slot.idle_sweeps.store(0, Ordering::Release);
                return true;
            }

            let idle = slot.idle_sweeps.fetch_add(1, Ordering::AcqRel) + 1;
            if idle <= 1 {
                return true;
            }

            slot.retired.store(true, Ordering::Release);
            // An enqueue may have slipped in between the depth check and
            // the retire flag; keep the slot alive in that case.
            if slot.depth.load(Ordering::Acquire) != 0 {
                slot.retired.store(false, Ordering::Release);
                slot.idle_sweeps.store(0, Ordering::Release);
                return true;
            }
            trace!("queue entry {} garbage-collected", key);
            false
        });
    }

    /// Spawns the periodic sweeper.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh manager
            // is not swept before it has seen traffic.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep();
            }
        })
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}
