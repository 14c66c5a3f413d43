use crate::models::decision::{Decision, DecisionEvent, DecisionReason};
use crate::models::rule::Rule;
use crate::services::counter::{Admission, CounterEngine};
use crate::services::events::DecisionHub;
use crate::services::identifier::{self, RequestFeatures};
use crate::services::queue::{QueueManager, QueueOutcome};
use crate::services::rule_cache::RuleCache;
use std::sync::Arc;

/// A decision plus the identifier it was counted under; the HTTP layer
/// needs both to publish the decision event once the response status is
/// known.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub identifier: String,
}

/// Orchestrates rule matching, identifier resolution, window counting,
/// and queueing for every request, and feeds the decision event stream.
///
/// All state lives behind atomics or the store; evaluating a request
/// never holds a lock across an await point.
pub struct RateLimitService {
    rules: Arc<RuleCache>,
    counter: Arc<CounterEngine>,
    queue: Arc<QueueManager>,
    hub: Arc<DecisionHub>,
    trust_forwarded: bool,
}

impl RateLimitService {
    pub fn new(
        rules: Arc<RuleCache>,
        counter: Arc<CounterEngine>,
        queue: Arc<QueueManager>,
        hub: Arc<DecisionHub>,
        trust_forwarded: bool,
    ) -> Self {
        Self {
            rules,
            counter,
            queue,
            hub,
            trust_forwarded,
        }
    }

    /// First matching rule for a path; exposed so the HTTP layer can
    /// decide whether the body needs buffering before evaluation.
    pub fn rule_for_path(&self, path: &str) -> Option<Arc<Rule>> {
        self.rules.find_match(path)
    }

    /// Evaluates one request against the matched rule.
    ///
    /// With no rule the request passes untouched and uncounted. Otherwise
    /// the identifier is resolved, the fixed window consulted, and excess
    /// traffic queued when the rule allows it.
    pub async fn evaluate(
        &self,
        features: &RequestFeatures,
        rule: Option<Arc<Rule>>,
    ) -> Evaluation {
        let rule = match rule {
            Some(rule) => rule,
            None => {
                return Evaluation {
                    decision: Decision::allow(None, DecisionReason::NoMatchingRule),
                    identifier: identifier::client_ip(features, self.trust_forwarded),
                }
            }
        };

        let id = identifier::resolve(&rule, features, self.trust_forwarded);

        let decision = match self.counter.admit(&rule, &id).await {
            Admission::WithinQuota => {
                Decision::allow(Some(rule.id.clone()), DecisionReason::WithinQuota)
            }
            Admission::FailOpen => {
                self.hub.record_fail_open();
                Decision::allow(Some(rule.id.clone()), DecisionReason::FailOpen)
            }
            Admission::Exceeded if rule.queue_enabled => {
                let key = QueueManager::queue_key(&rule.id, &id);
                match self.queue.try_enqueue(
                    &key,
                    rule.max_queue_size,
                    rule.delay_per_request_ms,
                ) {
                    QueueOutcome::Queued { delay_ms, .. } => {
                        Decision::queued(rule.id.clone(), delay_ms)
                    }
                    QueueOutcome::Full => {
                        Decision::reject(rule.id.clone(), DecisionReason::QueueFull)
                    }
                }
            }
            Admission::Exceeded => {
                Decision::reject(rule.id.clone(), DecisionReason::QuotaExceeded)
            }
        };

        Evaluation {
            decision,
            identifier: id,
        }
    }

    /// Publishes the decision event once the response status is known.
    pub fn publish(&self, features: &RequestFeatures, eval: &Evaluation, status_code: u16) {
        self.hub.publish(DecisionEvent {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            path: features.path.clone(),
            method: features.method.clone(),
            host: features.host.clone(),
            identifier: eval.identifier.clone(),
            rule_id: eval.decision.rule_id.clone(),
            status_code,
            allowed: eval.decision.allowed,
            queued: eval.decision.queued,
        });
    }

    pub fn rule_cache(&self) -> &Arc<RuleCache> {
        &self.rules
    }

    pub fn hub(&self) -> &Arc<DecisionHub> {
        &self.hub
    }
}
