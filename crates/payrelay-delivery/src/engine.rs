use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use payrelay_core::events::DeliveryEvent;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::registry::ConnectionRegistry;

/// Retry configuration for one delivery invocation.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the given 1-indexed attempt:
    /// `base_delay * factor^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let millis = self.base_delay.as_millis() as f64 * exp;
        Duration::from_millis(millis as u64)
    }
}

/// Terminal result of one delivery invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every attempted send of one attempt succeeded.
    Delivered,
    /// A group existed at some point, but every member was already
    /// closed whenever we looked; nothing was ever transmitted.
    NoRecipients,
    /// Sends were attempted but at least one failed on every attempt.
    PartialFailure,
    /// Nothing was ever attempted: the retry budget ran out with no
    /// listeners present, or the event could not be serialized and was
    /// dropped up front.
    Exhausted,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::NoRecipients => "no_recipients",
            Self::PartialFailure => "partial_failure",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Pushes webhook-derived events to the connection group for an order,
/// retrying with exponential backoff while the peer has not yet
/// (re)connected.
///
/// Best-effort by design: a failed attempt is superseded by the next
/// attempt's fresh snapshot, which re-sends to the whole group —
/// including peers that already received the event. Past the final
/// attempt the event is dropped and the outcome reported to the caller.
pub struct DeliveryEngine {
    registry: Arc<ConnectionRegistry>,
    policy: RetryPolicy,
    total_retries: AtomicU64,
}

impl DeliveryEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, policy: RetryPolicy) -> Self {
        Self {
            registry,
            policy,
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(registry: Arc<ConnectionRegistry>) -> Self {
        Self::new(registry, RetryPolicy::default())
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Backoff sleeps performed across all deliveries, for diagnostics.
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Deliver `event` to every connection registered under `key` using
    /// the engine's policy.
    pub async fn deliver(&self, key: &str, event: &DeliveryEvent) -> DeliveryOutcome {
        self.deliver_with_policy(key, event, &self.policy).await
    }

    /// Deliver with an explicit policy. The backoff sleep is the only
    /// suspension point and never holds the registry lock, so other
    /// keys' registrations and concurrent deliveries proceed freely.
    pub async fn deliver_with_policy<E: Serialize>(
        &self,
        key: &str,
        event: &E,
        policy: &RetryPolicy,
    ) -> DeliveryOutcome {
        // Serialize once; every recipient gets the identical frame. An
        // unserializable event is dropped without consuming the retry
        // budget: no snapshot was taken and no send was attempted.
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(client_key = %key, error = %e, "failed to serialize delivery event, dropping");
                return DeliveryOutcome::Exhausted;
            }
        };

        let mut saw_group = false;
        let mut attempted_any = false;

        for attempt in 1..=policy.max_attempts {
            let snapshot = self.registry.snapshot(key);

            if snapshot.is_empty() {
                debug!(client_key = %key, attempt, "no recipients connected");
            } else {
                saw_group = true;
                let mut attempted = 0u32;
                let mut failed = 0u32;

                for conn in &snapshot {
                    // Half-closed members are skipped, not failures.
                    if !conn.is_open() {
                        continue;
                    }
                    attempted += 1;
                    if let Err(e) = conn.send(&payload) {
                        failed += 1;
                        warn!(
                            client_key = %key,
                            connection_id = %conn.id(),
                            attempt,
                            error = %e,
                            "send failed"
                        );
                    }
                }

                if attempted > 0 {
                    attempted_any = true;
                    if failed == 0 {
                        info!(
                            client_key = %key,
                            attempt,
                            recipients = attempted,
                            "event delivered"
                        );
                        return DeliveryOutcome::Delivered;
                    }
                }
            }

            let delay = policy.backoff_delay(attempt);
            self.total_retries.fetch_add(1, Ordering::Relaxed);
            debug!(
                client_key = %key,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "delivery attempt unsuccessful, backing off"
            );
            tokio::time::sleep(delay).await;
        }

        let outcome = if attempted_any {
            DeliveryOutcome::PartialFailure
        } else if saw_group {
            DeliveryOutcome::NoRecipients
        } else {
            DeliveryOutcome::Exhausted
        };

        warn!(
            client_key = %key,
            outcome = outcome.as_str(),
            max_attempts = policy.max_attempts,
            "delivery retry budget exhausted, dropping event"
        );
        outcome
    }
}
