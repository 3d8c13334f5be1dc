//! Shared types for querydesk: message records, result payloads, the backend
//! contract and the error taxonomy surfaced to the conversation.

pub mod api;
pub mod backend;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod payload;

pub use backend::{Backend, ByteStream};
pub use errors::ChatError;
pub use events::ChatEvent;
pub use ids::MessageId;
pub use messages::{Action, Actions, Message, MessageContent, MessageKind, Origin};
pub use payload::{QueryResult, Scalar, Table};
