//! Inbound event processing: the glue between channels and agents.
//!
//! Flow: claim event id → resolve session → escalation gate → build user
//! content → agent turn with knowledge tools → persist history → deliver via
//! channel outbound → record run.

pub mod attachments;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod prompt;

pub use {
    dispatcher::{DispatcherBuilder, SessionDispatcher},
    error::{Error, Result},
    guard::{Claim, EventClaims, PendingGuard},
};
