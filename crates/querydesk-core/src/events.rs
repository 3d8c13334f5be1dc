use serde::{Deserialize, Serialize};

use crate::ids::MessageId;
use crate::messages::{Action, Message};

/// Conversation changes, published after each store mutation so views can
/// re-render without polling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "message_appended")]
    MessageAppended { message: Message },

    /// Text typed into the in-progress tail.
    #[serde(rename = "tail_delta")]
    TailDelta { message_id: MessageId, delta: String },

    /// The in-progress tail finished streaming.
    #[serde(rename = "stream_finished")]
    StreamFinished { message_id: MessageId, chars: usize },

    /// The in-progress tail was dropped after a failure.
    #[serde(rename = "stream_discarded")]
    StreamDiscarded { message_id: MessageId },

    #[serde(rename = "action_cleared")]
    ActionCleared { message_id: MessageId, action: Action },

    #[serde(rename = "tail_updated")]
    TailUpdated { message: Message },

    #[serde(rename = "cleared")]
    Cleared { generation: u64 },
}

impl ChatEvent {
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::MessageAppended { message } | Self::TailUpdated { message } => Some(&message.id),
            Self::TailDelta { message_id, .. }
            | Self::StreamFinished { message_id, .. }
            | Self::StreamDiscarded { message_id }
            | Self::ActionCleared { message_id, .. } => Some(message_id),
            Self::Cleared { .. } => None,
        }
    }
}
