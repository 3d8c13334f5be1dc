use querydesk_core::ids::MessageId;

/// Conversation store rejections. Reaching the user with one of these is a
/// defect; the orchestrator guards every call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("conversation is empty")]
    EmptyStore,

    /// The conversation was cleared after the stream started.
    #[error("stale stream ticket for {0}")]
    StaleTicket(MessageId),

    #[error("a message is still streaming")]
    StreamActive,

    #[error("message not found: {0}")]
    NotFound(MessageId),

    #[error("tail message is not streaming")]
    NotInProgress,
}

impl StoreError {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleTicket(_))
    }
}
