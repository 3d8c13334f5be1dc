//! Conversation engine: the message store, typed streaming of summaries and
//! the ask / execute / summarize flows that drive them.

pub mod catalog;
pub mod chart;
pub mod error;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod store;
pub mod typing;

pub use catalog::Catalog;
pub use chart::{ChartKind, ChartSpec};
pub use error::StoreError;
pub use orchestrator::{ActionOutcome, ChatConfig, Orchestrator, Rejection};
pub use render::{project, Fragment, Grid};
pub use session::StreamSession;
pub use store::{ConversationStore, StoreHandle, StreamTicket};
pub use typing::{DrainOutcome, TypingQueue, TypingSink};
