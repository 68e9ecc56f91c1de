//! Outbound side of the support channels.
//!
//! Chat and ticket adapters implement [`ChannelOutbound`]; the dispatcher
//! looks the right one up in an [`OutboundRegistry`] by [`ChannelKind`].
//!
//! [`ChannelKind`]: supportdesk_common::ChannelKind

pub mod error;
pub mod outbound;
pub mod registry;

pub use {
    error::{Error, Result},
    outbound::{ChannelOutbound, LogOutbound, RecordingOutbound, ReplyTarget, SentReply},
    registry::OutboundRegistry,
};
