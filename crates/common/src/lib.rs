//! Shared types, error definitions, and utilities used across all supportdesk crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, Result},
    types::{
        Attachment, AttachmentSource, ChannelKind, DispatchOutcome, DispatchResult,
        EscalationDecision, InboundEvent,
    },
};
