//! In-flight event claims.
//!
//! Channels redeliver webhooks. An event id is claimed for the duration of
//! its turn so a concurrent duplicate is skipped; the claim is released when
//! the turn ends, so a later redelivery is processed again.

use std::sync::Arc;

use dashmap::DashSet;

/// A set of event ids currently being processed.
pub trait EventClaims: Send + Sync {
    /// Claim `event_id`. Returns `false` if it is already claimed.
    fn try_claim(&self, event_id: &str) -> bool;
    fn release(&self, event_id: &str);
}

/// Process-local claim set.
#[derive(Debug, Default)]
pub struct PendingGuard {
    in_flight: DashSet<String>,
}

impl PendingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.in_flight.contains(event_id)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

impl EventClaims for PendingGuard {
    fn try_claim(&self, event_id: &str) -> bool {
        self.in_flight.insert(event_id.to_string())
    }

    fn release(&self, event_id: &str) {
        self.in_flight.remove(event_id);
    }
}

/// Held for the whole turn; dropping it releases the event id.
#[must_use = "the claim is released as soon as it is dropped"]
pub struct Claim {
    claims: Arc<dyn EventClaims>,
    event_id: String,
}

impl Claim {
    pub fn acquire(claims: Arc<dyn EventClaims>, event_id: &str) -> Option<Self> {
        claims.try_claim(event_id).then(|| Self {
            claims,
            event_id: event_id.to_string(),
        })
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.claims.release(&self.event_id);
    }
}
