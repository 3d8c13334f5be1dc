//! Typing queue: decouples network arrival from display by draining buffered
//! text into the conversation one character per tick.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where drained characters go.
pub trait TypingSink: Send + Sync + 'static {
    /// Apply one character. Returning false stops the worker for good.
    fn type_char(&self, ch: char) -> bool;

    /// Called once, after the queue was sealed and fully drained.
    fn complete(&self);
}

/// How the drain worker ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed { chars: usize },
    Aborted,
    /// The sink refused a character (its target is gone).
    Stale,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<char>,
    draining: bool,
    sealed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    cancel: CancellationToken,
}

enum Step {
    Type(char),
    Complete,
    Idle,
}

/// Single-worker character queue. The worker is spawned when the queue is
/// created and parks while the buffer is empty.
pub struct TypingQueue {
    shared: Arc<Shared>,
    worker: JoinHandle<DrainOutcome>,
}

impl TypingQueue {
    pub fn spawn<S: TypingSink>(sink: S, interval: Duration, cancel: CancellationToken) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            cancel,
        });
        let worker = tokio::spawn(drain(Arc::clone(&shared), sink, interval));
        Self { shared, worker }
    }

    /// Buffer `text` behind anything already queued. Ignored once sealed.
    pub fn enqueue(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        {
            let mut state = self.shared.state.lock();
            if state.sealed {
                warn!(len = text.len(), "enqueue after seal ignored");
                return;
            }
            state.pending.extend(text.chars());
        }
        self.shared.wake.notify_one();
    }

    /// No more text will arrive. The worker completes once the buffer drains.
    pub fn seal(&self) {
        self.shared.state.lock().sealed = true;
        self.shared.wake.notify_one();
    }

    /// Stop the worker without completing.
    pub fn abort(&self) {
        self.shared.cancel.cancel();
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_draining(&self) -> bool {
        self.shared.state.lock().draining
    }

    /// Wait for the worker to finish.
    pub async fn finished(self) -> DrainOutcome {
        match self.worker.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "typing worker did not finish cleanly");
                DrainOutcome::Aborted
            }
        }
    }
}

async fn drain<S: TypingSink>(shared: Arc<Shared>, sink: S, interval: Duration) -> DrainOutcome {
    let mut typed = 0usize;
    loop {
        if shared.cancel.is_cancelled() {
            return DrainOutcome::Aborted;
        }

        let step = {
            let mut state = shared.state.lock();
            match state.pending.pop_front() {
                Some(ch) => {
                    state.draining = true;
                    Step::Type(ch)
                }
                None if state.sealed => {
                    state.draining = false;
                    Step::Complete
                }
                None => {
                    state.draining = false;
                    Step::Idle
                }
            }
        };

        match step {
            Step::Type(ch) => {
                if !sink.type_char(ch) {
                    debug!(typed, "typing target gone, stopping");
                    return DrainOutcome::Stale;
                }
                typed += 1;
                if !interval.is_zero() {
                    tokio::select! {
                        _ = shared.cancel.cancelled() => return DrainOutcome::Aborted,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
            Step::Complete => {
                sink.complete();
                return DrainOutcome::Completed { chars: typed };
            }
            Step::Idle => {
                tokio::select! {
                    _ = shared.cancel.cancelled() => return DrainOutcome::Aborted,
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Recorder {
        text: Arc<Mutex<String>>,
        completions: Arc<AtomicUsize>,
        refuse_after: Option<usize>,
    }

    impl TypingSink for Recorder {
        fn type_char(&self, ch: char) -> bool {
            let mut text = self.text.lock();
            if self.refuse_after.is_some_and(|n| text.chars().count() >= n) {
                return false;
            }
            text.push(ch);
            true
        }

        fn complete(&self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    const TICK: Duration = Duration::from_millis(30);

    #[tokio::test(start_paused = true)]
    async fn chunks_enqueued_before_a_tick_are_typed_in_order() {
        let sink = Recorder::default();
        let queue = TypingQueue::spawn(sink.clone(), TICK, CancellationToken::new());
        queue.enqueue("AB");
        queue.enqueue("CD");
        queue.seal();

        assert_eq!(queue.finished().await, DrainOutcome::Completed { chars: 4 });
        assert_eq!(*sink.text.lock(), "ABCD");
        assert_eq!(sink.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_character_per_tick() {
        let sink = Recorder::default();
        let queue = TypingQueue::spawn(sink.clone(), TICK, CancellationToken::new());
        queue.enqueue("abc");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*sink.text.lock(), "a");
        tokio::time::sleep(TICK).await;
        assert_eq!(*sink.text.lock(), "ab");
        tokio::time::sleep(TICK).await;
        assert_eq!(*sink.text.lock(), "abc");
        assert_eq!(sink.completions.load(Ordering::SeqCst), 0);

        queue.seal();
        assert!(matches!(queue.finished().await, DrainOutcome::Completed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_wakes_on_enqueue() {
        let sink = Recorder::default();
        let queue = TypingQueue::spawn(sink.clone(), TICK, CancellationToken::new());
        queue.enqueue("x");
        tokio::time::sleep(TICK * 3).await;
        assert!(!queue.is_draining());
        assert_eq!(queue.pending_len(), 0);

        queue.enqueue("yz");
        queue.seal();
        assert_eq!(queue.finished().await, DrainOutcome::Completed { chars: 3 });
        assert_eq!(*sink.text.lock(), "xyz");
    }

    #[tokio::test(start_paused = true)]
    async fn seal_on_empty_queue_completes_immediately() {
        let sink = Recorder::default();
        let queue = TypingQueue::spawn(sink.clone(), TICK, CancellationToken::new());
        queue.seal();
        assert_eq!(queue.finished().await, DrainOutcome::Completed { chars: 0 });
        assert_eq!(sink.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_without_completing() {
        let sink = Recorder::default();
        let queue = TypingQueue::spawn(sink.clone(), TICK, CancellationToken::new());
        queue.enqueue("long text here");
        tokio::time::sleep(TICK * 2).await;
        queue.abort();
        queue.seal();

        assert_eq!(queue.finished().await, DrainOutcome::Aborted);
        assert_eq!(sink.completions.load(Ordering::SeqCst), 0);
        assert!(sink.text.lock().len() < "long text here".len());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_aborts_idle_worker() {
        let parent = CancellationToken::new();
        let queue = TypingQueue::spawn(Recorder::default(), TICK, parent.child_token());
        parent.cancel();
        assert_eq!(queue.finished().await, DrainOutcome::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_character_stops_as_stale() {
        let sink = Recorder {
            refuse_after: Some(2),
            ..Recorder::default()
        };
        let queue = TypingQueue::spawn(sink.clone(), TICK, CancellationToken::new());
        queue.enqueue("abcdef");
        queue.seal();
        assert_eq!(queue.finished().await, DrainOutcome::Stale);
        assert_eq!(*sink.text.lock(), "ab");
        assert_eq!(sink.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_interval_drains_without_delay() {
        let sink = Recorder::default();
        let queue = TypingQueue::spawn(sink.clone(), Duration::ZERO, CancellationToken::new());
        queue.enqueue("fast");
        queue.seal();
        assert_eq!(queue.finished().await, DrainOutcome::Completed { chars: 4 });
        assert_eq!(*sink.text.lock(), "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_after_seal_is_ignored() {
        let sink = Recorder::default();
        let queue = TypingQueue::spawn(sink.clone(), TICK, CancellationToken::new());
        queue.enqueue("a");
        queue.seal();
        queue.enqueue("b");
        queue.finished().await;
        assert_eq!(*sink.text.lock(), "a");
    }
}
