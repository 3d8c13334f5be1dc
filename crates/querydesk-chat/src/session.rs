use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use querydesk_client::sentinel::SentinelDetector;

use crate::store::{StoreHandle, StreamTicket};
use crate::typing::{DrainOutcome, TypingQueue, TypingSink};

/// Types into the streaming tail named by a ticket.
struct TailSink {
    store: StoreHandle,
    ticket: StreamTicket,
}

impl TypingSink for TailSink {
    fn type_char(&self, ch: char) -> bool {
        let mut buf = [0u8; 4];
        match self.store.push_tail_text(&self.ticket, ch.encode_utf8(&mut buf)) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "dropping typed character");
                false
            }
        }
    }

    fn complete(&self) {
        match self.store.finish_stream(&self.ticket) {
            Ok(chars) => debug!(message_id = %self.ticket.message_id(), chars, "stream finished"),
            Err(e) => debug!(error = %e, "stream finished after reset"),
        }
    }
}

/// State of one streaming call: sentinel scanning, the text seen so far and
/// the typing queue draining it into the conversation.
pub struct StreamSession {
    detector: SentinelDetector,
    queue: TypingQueue,
    accumulated: String,
    ticket: StreamTicket,
    fallback: Option<String>,
}

impl StreamSession {
    pub fn open(
        store: StoreHandle,
        ticket: StreamTicket,
        sentinel: &str,
        typing_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let sink = TailSink {
            store,
            ticket: ticket.clone(),
        };
        Self {
            detector: SentinelDetector::new(sentinel),
            queue: TypingQueue::spawn(sink, typing_interval, cancel),
            accumulated: String::new(),
            ticket,
            fallback: None,
        }
    }

    /// Text typed instead when the stream closes without any content.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn ticket(&self) -> &StreamTicket {
        &self.ticket
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_terminated(&self) -> bool {
        self.detector.is_terminated()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.pending_len()
    }

    /// Feed one decoded chunk. Returns true once the sentinel was seen.
    pub fn feed(&mut self, chunk: &str) -> bool {
        let detection = self.detector.scan(chunk);
        self.push(&detection.content);
        if detection.terminal {
            debug!(chars = self.accumulated.chars().count(), "sentinel detected");
            self.seal();
        }
        detection.terminal
    }

    /// The body ended. Held-back text is released and the queue sealed.
    pub fn end_of_body(&mut self) {
        if !self.detector.is_terminated() {
            let rest = self.detector.finish();
            self.push(&rest);
            debug!("body ended without sentinel");
        }
        self.seal();
    }

    /// Wait for the typing worker to drain everything.
    pub async fn finish(self) -> DrainOutcome {
        self.queue.finished().await
    }

    /// Stop typing. The tail is left in progress for the caller to discard.
    pub async fn abort(self) -> DrainOutcome {
        self.queue.abort();
        self.queue.finished().await
    }

    fn seal(&mut self) {
        if self.accumulated.is_empty() {
            if let Some(fallback) = self.fallback.take() {
                warn!(error_kind = "empty_response", "completion carried no text");
                self.push(&fallback);
            }
        }
        self.queue.seal();
    }

    fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.accumulated.push_str(text);
        self.queue.enqueue(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querydesk_core::ids::MessageId;
    use querydesk_core::messages::Message;

    const TICK: Duration = Duration::from_millis(10);

    fn open(store: &StoreHandle) -> StreamSession {
        let ticket = store
            .begin_stream(Message::streaming_placeholder(None, MessageId::new()))
            .unwrap();
        StreamSession::open(store.clone(), ticket, "end_of_stream", TICK, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn sentinel_terminates_and_trims() {
        let store = StoreHandle::new();
        let mut session = open(&store);

        assert!(!session.feed("Enrollment rose 4%. end_of"));
        assert!(session.feed("_stream{\"junk\":1}"));
        assert_eq!(session.accumulated(), "Enrollment rose 4%. ");

        let outcome = session.finish().await;
        assert_eq!(outcome, DrainOutcome::Completed { chars: 20 });
        let tail = store.snapshot().pop().unwrap();
        assert_eq!(tail.text(), Some("Enrollment rose 4%. "));
        assert!(!tail.in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn tail_is_always_a_prefix_of_accumulated_text() {
        let store = StoreHandle::new();
        let mut session = open(&store);
        session.feed("abcdef");

        for _ in 0..3 {
            tokio::time::sleep(TICK).await;
            let shown = store.snapshot().pop().unwrap().text().unwrap_or_default().to_string();
            assert!(session.accumulated().starts_with(&shown));
            assert!(shown.len() < session.accumulated().len());
        }

        session.end_of_body();
        session.finish().await;
        assert_eq!(store.snapshot()[0].text(), Some("abcdef"));
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_body_flushes_partial_marker() {
        let store = StoreHandle::new();
        let mut session = open(&store);
        session.feed("the end");
        session.end_of_body();
        assert_eq!(session.accumulated(), "the end");
        session.finish().await;
        assert_eq!(store.snapshot()[0].text(), Some("the end"));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_mid_stream_turns_writes_into_noops() {
        let store = StoreHandle::new();
        let mut session = open(&store);
        session.feed("abcdefgh");
        tokio::time::sleep(TICK * 2).await;

        store.clear();
        store.append(Message::user("fresh")).unwrap();
        session.end_of_body();

        assert_eq!(session.finish().await, DrainOutcome::Stale);
        let messages = store.snapshot();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_stream_types_fallback() {
        let store = StoreHandle::new();
        let mut session = open(&store).with_fallback("nothing came back");
        assert!(session.feed("end_of_stream"));
        assert_eq!(session.accumulated(), "nothing came back");
        assert_eq!(session.finish().await, DrainOutcome::Completed { chars: 17 });
        assert_eq!(store.snapshot()[0].text(), Some("nothing came back"));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_unused_when_text_arrived() {
        let store = StoreHandle::new();
        let mut session = open(&store).with_fallback("nothing came back");
        session.feed("ok");
        session.end_of_body();
        session.finish().await;
        assert_eq!(store.snapshot()[0].text(), Some("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_leaves_tail_in_progress() {
        let store = StoreHandle::new();
        let mut session = open(&store);
        session.feed("partial");
        let ticket = session.ticket().clone();
        assert_eq!(session.abort().await, DrainOutcome::Aborted);

        assert_eq!(store.in_progress_count(), 1);
        store.discard_stream(&ticket).unwrap();
        assert!(store.is_empty());
    }
}
