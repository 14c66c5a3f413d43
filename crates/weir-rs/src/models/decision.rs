use serde::{Deserialize, Serialize};

/// Why a decision came out the way it did.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// No active rule matched the request path; nothing was counted.
    NoMatchingRule,
    /// The fixed-window counter admitted the request.
    WithinQuota,
    /// The quota was exhausted and the request was absorbed by the queue.
    Queued,
    /// The quota was exhausted and the rule has no queue.
    QuotaExceeded,
    /// The quota was exhausted and the queue was at capacity.
    QueueFull,
    /// The shared store failed; the request was admitted fail-open.
    FailOpen,
}

/// Outcome of evaluating a request against the rate-limit core.
///
/// Invariants, enforced by the constructors below:
/// - `allowed == false` implies `delay_ms == 0`
/// - `queued == true` implies `allowed == true` and `delay_ms > 0`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub queued: bool,
    pub delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub reason: DecisionReason,
}

impl Decision {
    /// Plain admission with no delay.
    pub fn allow(rule_id: Option<String>, reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            queued: false,
            delay_ms: 0,
            rule_id,
            reason,
        }
    }

    /// Admission through the leaky bucket with a positive delay.
    pub fn queued(rule_id: String, delay_ms: u64) -> Self {
        debug_assert!(delay_ms > 0);
        Self {
            allowed: true,
            queued: true,
            delay_ms,
            rule_id: Some(rule_id),
            reason: DecisionReason::Queued,
        }
    }

    /// Rejection; `reason` distinguishes quota exhaustion from a full queue.
    pub fn reject(rule_id: String, reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            queued: false,
            delay_ms: 0,
            rule_id: Some(rule_id),
            reason,
        }
    }
}

/// Record published to event-stream subscribers for every decision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEvent {
    /// Wall-clock time of the decision, milliseconds since the epoch.
    pub timestamp_ms: i64,
    pub path: String,
    pub method: String,
    pub host: String,
    /// The identifier the request was counted under.
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub status_code: u16,
    pub allowed: bool,
    pub queued: bool,
}
