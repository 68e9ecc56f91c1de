use std::{collections::HashMap, sync::Arc};

use supportdesk_common::ChannelKind;

use crate::{
    error::{Error, Result},
    outbound::ChannelOutbound,
};

/// Outbound adapter per channel kind.
#[derive(Clone, Default)]
pub struct OutboundRegistry {
    outbounds: HashMap<ChannelKind, Arc<dyn ChannelOutbound>>,
}

impl OutboundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same adapter for every channel kind.
    pub fn uniform(outbound: Arc<dyn ChannelOutbound>) -> Self {
        let mut registry = Self::new();
        registry.register(ChannelKind::Chat, Arc::clone(&outbound));
        registry.register(ChannelKind::Ticket, outbound);
        registry
    }

    pub fn register(&mut self, kind: ChannelKind, outbound: Arc<dyn ChannelOutbound>) {
        self.outbounds.insert(kind, outbound);
    }

    pub fn get(&self, kind: ChannelKind) -> Result<Arc<dyn ChannelOutbound>> {
        self.outbounds
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::unknown_channel(kind))
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<ChannelKind> = self.outbounds.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
