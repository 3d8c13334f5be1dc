//! The conversation: an append-only list of messages whose only mutable
//! element is a tail that is still streaming.
//!
//! [`ConversationStore`] holds the invariants. [`StoreHandle`] shares it
//! between the orchestrator and the typing worker and publishes a
//! [`ChatEvent`] after every change.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use querydesk_core::events::ChatEvent;
use querydesk_core::ids::MessageId;
use querydesk_core::messages::{Action, Message, MessageContent};

use crate::error::StoreError;

const EVENT_CAPACITY: usize = 1024;

/// Write permission for one streaming tail. Invalidated by `clear()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamTicket {
    generation: u64,
    message_id: MessageId,
}

impl StreamTicket {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
    generation: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn tail(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_streaming(&self) -> bool {
        self.tail().is_some_and(|m| m.in_progress)
    }

    /// Append a settled message. Refused while the tail is streaming.
    pub fn append(&mut self, mut message: Message) -> Result<&Message, StoreError> {
        if self.is_streaming() {
            return Err(StoreError::StreamActive);
        }
        message.in_progress = false;
        self.messages.push(message);
        self.messages.last().ok_or(StoreError::EmptyStore)
    }

    /// Append `message` as the streaming tail and hand out its ticket.
    pub fn begin_stream(&mut self, mut message: Message) -> Result<StreamTicket, StoreError> {
        if self.is_streaming() {
            return Err(StoreError::StreamActive);
        }
        message.in_progress = true;
        let ticket = StreamTicket {
            generation: self.generation,
            message_id: message.id.clone(),
        };
        self.messages.push(message);
        Ok(ticket)
    }

    /// Edit the content of the streaming tail. Identity, flags and settled
    /// messages stay out of reach.
    pub fn mutate_tail<R>(&mut self, f: impl FnOnce(&mut MessageContent) -> R) -> Result<R, StoreError> {
        let tail = self.messages.last_mut().ok_or(StoreError::EmptyStore)?;
        if !tail.in_progress {
            return Err(StoreError::NotInProgress);
        }
        Ok(f(&mut tail.content))
    }

    /// Append streamed text to the tail the ticket was issued for.
    pub fn push_tail_text(&mut self, ticket: &StreamTicket, delta: &str) -> Result<(), StoreError> {
        let tail = self.streaming_tail(ticket)?;
        tail.push_text(delta);
        Ok(())
    }

    /// Settle the streaming tail. Returns its length in characters.
    pub fn finish_stream(&mut self, ticket: &StreamTicket) -> Result<usize, StoreError> {
        let tail = self.streaming_tail(ticket)?;
        tail.in_progress = false;
        Ok(tail.text().map_or(0, |t| t.chars().count()))
    }

    /// Drop the streaming tail.
    pub fn discard_stream(&mut self, ticket: &StreamTicket) -> Result<Message, StoreError> {
        self.streaming_tail(ticket)?;
        self.messages.pop().ok_or(StoreError::EmptyStore)
    }

    /// Clear an affordance on any message. Returns whether it was set.
    pub fn clear_action(&mut self, id: &MessageId, action: Action) -> Result<bool, StoreError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let was_set = message.actions.is_set(action);
        message.actions.clear(action);
        Ok(was_set)
    }

    /// Empty the conversation and invalidate outstanding tickets.
    pub fn clear(&mut self) -> u64 {
        self.messages.clear();
        self.generation += 1;
        self.generation
    }

    fn streaming_tail(&mut self, ticket: &StreamTicket) -> Result<&mut Message, StoreError> {
        if ticket.generation != self.generation {
            return Err(StoreError::StaleTicket(ticket.message_id.clone()));
        }
        let tail = self.messages.last_mut().ok_or(StoreError::EmptyStore)?;
        if tail.id != ticket.message_id {
            return Err(StoreError::StaleTicket(ticket.message_id.clone()));
        }
        if !tail.in_progress {
            return Err(StoreError::NotInProgress);
        }
        Ok(tail)
    }
}

/// Shared, observable conversation store.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<ConversationStore>>,
    events: broadcast::Sender<ChatEvent>,
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreHandle {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(ConversationStore::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().messages().to_vec()
    }

    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.inner.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.lock().is_streaming()
    }

    pub fn in_progress_count(&self) -> usize {
        self.inner.lock().messages().iter().filter(|m| m.in_progress).count()
    }

    /// Append a settled message and return its id.
    pub fn append(&self, message: Message) -> Result<MessageId, StoreError> {
        let appended = {
            let mut store = self.inner.lock();
            store.append(message)?.clone()
        };
        let id = appended.id.clone();
        self.publish(ChatEvent::MessageAppended { message: appended });
        Ok(id)
    }

    /// Append, only if no reset happened since `generation` was read.
    pub fn append_at(&self, generation: u64, message: Message) -> Result<Option<MessageId>, StoreError> {
        let appended = {
            let mut store = self.inner.lock();
            if store.generation() != generation {
                debug!(message_id = %message.id, "dropping late message after reset");
                return Ok(None);
            }
            store.append(message)?.clone()
        };
        let id = appended.id.clone();
        self.publish(ChatEvent::MessageAppended { message: appended });
        Ok(Some(id))
    }

    pub fn begin_stream(&self, message: Message) -> Result<StreamTicket, StoreError> {
        let ticket = {
            let mut store = self.inner.lock();
            store.begin_stream(message)?
        };
        self.publish_tail();
        Ok(ticket)
    }

    /// Like [`begin_stream`](Self::begin_stream), scoped to a generation.
    pub fn begin_stream_at(
        &self,
        generation: u64,
        message: Message,
    ) -> Result<Option<StreamTicket>, StoreError> {
        let ticket = {
            let mut store = self.inner.lock();
            if store.generation() != generation {
                debug!(message_id = %message.id, "dropping late stream after reset");
                return Ok(None);
            }
            store.begin_stream(message)?
        };
        self.publish_tail();
        Ok(Some(ticket))
    }

    pub fn mutate_tail<R>(&self, f: impl FnOnce(&mut MessageContent) -> R) -> Result<R, StoreError> {
        let (out, tail) = {
            let mut store = self.inner.lock();
            let out = store.mutate_tail(f)?;
            (out, store.tail().cloned())
        };
        if let Some(message) = tail {
            self.publish(ChatEvent::TailUpdated { message });
        }
        Ok(out)
    }

    pub fn push_tail_text(&self, ticket: &StreamTicket, delta: &str) -> Result<(), StoreError> {
        self.inner.lock().push_tail_text(ticket, delta)?;
        self.publish(ChatEvent::TailDelta {
            message_id: ticket.message_id.clone(),
            delta: delta.to_string(),
        });
        Ok(())
    }

    pub fn finish_stream(&self, ticket: &StreamTicket) -> Result<usize, StoreError> {
        let chars = self.inner.lock().finish_stream(ticket)?;
        self.publish(ChatEvent::StreamFinished {
            message_id: ticket.message_id.clone(),
            chars,
        });
        Ok(chars)
    }

    pub fn discard_stream(&self, ticket: &StreamTicket) -> Result<Message, StoreError> {
        let removed = self.inner.lock().discard_stream(ticket)?;
        self.publish(ChatEvent::StreamDiscarded {
            message_id: removed.id.clone(),
        });
        Ok(removed)
    }

    pub fn clear_action(&self, id: &MessageId, action: Action) -> Result<bool, StoreError> {
        let was_set = self.inner.lock().clear_action(id, action)?;
        if was_set {
            self.publish(ChatEvent::ActionCleared {
                message_id: id.clone(),
                action,
            });
        }
        Ok(was_set)
    }

    pub fn clear(&self) -> u64 {
        let generation = self.inner.lock().clear();
        self.publish(ChatEvent::Cleared { generation });
        generation
    }

    fn publish_tail(&self) {
        let tail = self.inner.lock().tail().cloned();
        if let Some(message) = tail {
            self.publish(ChatEvent::MessageAppended { message });
        }
    }

    fn publish(&self, event: ChatEvent) {
        // No subscribers is fine: nothing is rendering.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querydesk_core::messages::MessageKind;
    use querydesk_core::payload::QueryResult;

    fn placeholder() -> Message {
        Message::streaming_placeholder(Some("p".into()), MessageId::new())
    }

    fn push(content: &mut MessageContent, delta: &str) {
        if let MessageContent::Text { text } = content {
            text.push_str(delta);
        }
    }

    #[test]
    fn mutate_tail_on_empty_store_fails() {
        let mut store = ConversationStore::new();
        let err = store.mutate_tail(|c| push(c, "x")).unwrap_err();
        assert_eq!(err, StoreError::EmptyStore);
    }

    #[test]
    fn mutate_tail_refuses_settled_messages() {
        let mut store = ConversationStore::new();
        store.append(Message::sql("SELECT 1", "q")).unwrap();
        let err = store.mutate_tail(|c| push(c, " -- edited")).unwrap_err();
        assert_eq!(err, StoreError::NotInProgress);
        assert_eq!(store.tail().unwrap().text(), Some("SELECT 1"));
        assert!(store.tail().unwrap().actions.execute);
    }

    #[test]
    fn append_keeps_order() {
        let mut store = ConversationStore::new();
        store.append(Message::user("q")).unwrap();
        store.append(Message::sql("SELECT 1", "q")).unwrap();
        let kinds: Vec<_> = store.messages().iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MessageKind::PlainText, MessageKind::GeneratedSql]);
    }

    #[test]
    fn append_refused_while_streaming() {
        let mut store = ConversationStore::new();
        let ticket = store.begin_stream(placeholder()).unwrap();
        assert_eq!(store.append(Message::user("q")).unwrap_err(), StoreError::StreamActive);
        assert_eq!(store.begin_stream(placeholder()).unwrap_err(), StoreError::StreamActive);

        store.finish_stream(&ticket).unwrap();
        assert!(store.append(Message::user("q")).is_ok());
    }

    #[test]
    fn append_never_adds_a_second_in_progress_message() {
        let mut store = ConversationStore::new();
        let mut msg = Message::user("q");
        msg.in_progress = true;
        store.append(msg).unwrap();
        assert!(!store.is_streaming());
    }

    #[test]
    fn stream_lifecycle() {
        let mut store = ConversationStore::new();
        let ticket = store.begin_stream(placeholder()).unwrap();
        store.push_tail_text(&ticket, "hé").unwrap();
        store.push_tail_text(&ticket, "llo").unwrap();
        assert_eq!(store.finish_stream(&ticket).unwrap(), 5);
        assert_eq!(store.tail().unwrap().text(), Some("héllo"));
        assert!(!store.tail().unwrap().in_progress);
        assert_eq!(store.push_tail_text(&ticket, "!").unwrap_err(), StoreError::NotInProgress);
    }

    #[test]
    fn clear_makes_tickets_stale() {
        let mut store = ConversationStore::new();
        let ticket = store.begin_stream(placeholder()).unwrap();
        assert_eq!(store.clear(), 1);
        let err = store.push_tail_text(&ticket, "late").unwrap_err();
        assert!(err.is_stale());
        assert!(store.is_empty());
    }

    #[test]
    fn stale_ticket_cannot_touch_a_new_stream() {
        let mut store = ConversationStore::new();
        let old = store.begin_stream(placeholder()).unwrap();
        store.clear();
        let fresh = store.begin_stream(placeholder()).unwrap();
        assert!(store.push_tail_text(&old, "x").unwrap_err().is_stale());
        assert!(store.discard_stream(&old).unwrap_err().is_stale());
        store.push_tail_text(&fresh, "y").unwrap();
        assert_eq!(store.tail().unwrap().text(), Some("y"));
    }

    #[test]
    fn discard_removes_only_the_streaming_tail() {
        let mut store = ConversationStore::new();
        store.append(Message::user("q")).unwrap();
        let ticket = store.begin_stream(placeholder()).unwrap();
        store.discard_stream(&ticket).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.discard_stream(&ticket).unwrap_err(), StoreError::StaleTicket(ticket.message_id().clone()));
    }

    #[test]
    fn clear_action_by_id() {
        let mut store = ConversationStore::new();
        store.append(Message::sql("SELECT 1", "q")).unwrap();
        let id = store.tail().unwrap().id.clone();
        store
            .append(Message::executed(QueryResult::text("1"), None, id.clone()))
            .unwrap();

        assert!(store.clear_action(&id, Action::Execute).unwrap());
        assert!(!store.clear_action(&id, Action::Execute).unwrap());
        assert!(!store.get(&id).unwrap().actions.execute);

        let missing = MessageId::new();
        assert_eq!(
            store.clear_action(&missing, Action::Summarize).unwrap_err(),
            StoreError::NotFound(missing)
        );
    }

    #[tokio::test]
    async fn handle_publishes_events() {
        let handle = StoreHandle::new();
        let mut rx = handle.subscribe();

        handle.append(Message::user("q")).unwrap();
        let ticket = handle.begin_stream(placeholder()).unwrap();
        handle.push_tail_text(&ticket, "a").unwrap();
        handle.finish_stream(&ticket).unwrap();
        handle.clear();

        assert!(matches!(rx.recv().await.unwrap(), ChatEvent::MessageAppended { .. }));
        match rx.recv().await.unwrap() {
            ChatEvent::MessageAppended { message } => assert!(message.in_progress),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), ChatEvent::TailDelta { ref delta, .. } if delta == "a"));
        assert!(matches!(rx.recv().await.unwrap(), ChatEvent::StreamFinished { chars: 1, .. }));
        assert!(matches!(rx.recv().await.unwrap(), ChatEvent::Cleared { generation: 1 }));
    }

    #[test]
    fn append_at_drops_late_messages() {
        let handle = StoreHandle::new();
        let generation = handle.generation();
        handle.clear();
        assert_eq!(handle.append_at(generation, Message::user("late")).unwrap(), None);
        assert!(handle.is_empty());
        assert!(handle.append_at(handle.generation(), Message::user("now")).unwrap().is_some());
    }

    #[test]
    fn mutate_tail_through_handle() {
        let handle = StoreHandle::new();
        assert_eq!(handle.mutate_tail(|_| ()).unwrap_err(), StoreError::EmptyStore);
        let ticket = handle.begin_stream(placeholder()).unwrap();
        handle.mutate_tail(|c| push(c, "ab")).unwrap();
        assert_eq!(handle.snapshot()[0].text(), Some("ab"));

        handle.finish_stream(&ticket).unwrap();
        assert_eq!(handle.mutate_tail(|c| push(c, "c")).unwrap_err(), StoreError::NotInProgress);
        assert_eq!(handle.snapshot()[0].text(), Some("ab"));
    }
}
