//! Observability hooks for the core.
//!
//! The core reports what it does through a [`TelemetrySink`]. Sinks are
//! fire-and-forget: nothing they do can change a fetch result.

use crate::endpoint::Endpoint;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    CacheHit {
        signature: String,
    },
    CacheMiss {
        signature: String,
    },
    KeyRotated {
        from: String,
        to: String,
        reason: RotationReason,
    },
    KeysExhausted {
        endpoint: Endpoint,
    },
    QuotaIncrement {
        key_id: String,
        endpoint: Endpoint,
        cost: u64,
        key_total: u64,
    },
    RequestStart {
        endpoint: Endpoint,
        key_id: String,
        attempt: usize,
    },
    RequestEnd {
        endpoint: Endpoint,
        key_id: String,
        status: Option<u16>,
        latency: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    Transport,
    Exhausted,
}

impl RotationReason {
    fn as_str(&self) -> &'static str {
        match self {
            RotationReason::Transport => "transport",
            RotationReason::Exhausted => "exhausted",
        }
    }
}

impl TelemetryEvent {
    pub fn category(&self) -> &'static str {
        match self {
            TelemetryEvent::CacheHit { .. } | TelemetryEvent::CacheMiss { .. } => "cache",
            TelemetryEvent::KeyRotated { .. } | TelemetryEvent::KeysExhausted { .. } => "keys",
            TelemetryEvent::QuotaIncrement { .. } => "quota",
            TelemetryEvent::RequestStart { .. } | TelemetryEvent::RequestEnd { .. } => "request",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            TelemetryEvent::CacheHit { signature } | TelemetryEvent::CacheMiss { signature } => {
                json!({ "signature": signature })
            }
            TelemetryEvent::KeyRotated { from, to, reason } => {
                json!({ "from": from, "to": to, "reason": reason.as_str() })
            }
            TelemetryEvent::KeysExhausted { endpoint } => json!({ "endpoint": endpoint }),
            TelemetryEvent::QuotaIncrement {
                key_id,
                endpoint,
                cost,
                key_total,
            } => json!({
                "keyId": key_id,
                "endpoint": endpoint,
                "cost": cost,
                "keyTotal": key_total,
            }),
            TelemetryEvent::RequestStart {
                endpoint,
                key_id,
                attempt,
            } => json!({ "endpoint": endpoint, "keyId": key_id, "attempt": attempt }),
            TelemetryEvent::RequestEnd {
                endpoint,
                key_id,
                status,
                latency,
            } => json!({
                "endpoint": endpoint,
                "keyId": key_id,
                "status": status,
                "latencyMs": latency.as_millis() as u64,
            }),
        }
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEvent::CacheHit { signature } => write!(f, "Cache HIT {}", signature),
            TelemetryEvent::CacheMiss { signature } => write!(f, "Cache MISS {}", signature),
            TelemetryEvent::KeyRotated { from, to, reason } => {
                write!(f, "Rotated key {} -> {} ({})", from, to, reason.as_str())
            }
            TelemetryEvent::KeysExhausted { endpoint } => {
                write!(f, "All keys exhausted, skipping {}", endpoint)
            }
            TelemetryEvent::QuotaIncrement {
                key_id,
                endpoint,
                cost,
                key_total,
            } => write!(
                f,
                "Quota +{} on {} for {} (total {})",
                cost, key_id, endpoint, key_total
            ),
            TelemetryEvent::RequestStart {
                endpoint,
                key_id,
                attempt,
            } => write!(f, "Request {} with {} (attempt {})", endpoint, key_id, attempt),
            TelemetryEvent::RequestEnd {
                endpoint,
                key_id,
                status,
                latency,
            } => match status {
                Some(code) => write!(
                    f,
                    "Request {} with {} finished with {} in {:?}",
                    endpoint, key_id, code, latency
                ),
                None => write!(
                    f,
                    "Request {} with {} failed in transport after {:?}",
                    endpoint, key_id, latency
                ),
            },
        }
    }
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

#[derive(Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Forwards events to `tracing` with the payload as a structured field.
#[derive(Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        let category = event.category();
        let payload = event.payload();
        match &event {
            TelemetryEvent::KeyRotated { .. } | TelemetryEvent::KeysExhausted { .. } => {
                tracing::warn!(category, %payload, "{}", event)
            }
            TelemetryEvent::QuotaIncrement { .. } | TelemetryEvent::RequestEnd { .. } => {
                tracing::info!(category, %payload, "{}", event)
            }
            _ => tracing::debug!(category, %payload, "{}", event),
        }
    }
}

// Keeps every event in memory for assertions
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, category: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.category() == category)
            .count()
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
