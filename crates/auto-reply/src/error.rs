use supportdesk_agents::AgentRunError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("agent produced no reply")]
    NoAssistantReply,

    #[error(transparent)]
    Session(#[from] supportdesk_sessions::Error),

    #[error(transparent)]
    Channel(#[from] supportdesk_channels::Error),

    #[error(transparent)]
    Agent(#[from] AgentRunError),
}

pub type Result<T> = std::result::Result<T, Error>;
