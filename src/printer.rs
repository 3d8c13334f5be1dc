use std::io::Write;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use querydesk_chat::render::project;
use querydesk_core::events::ChatEvent;
use querydesk_core::messages::{Message, Origin};

/// Prints conversation events to stdout as they happen. Ends when the store
/// is dropped.
pub fn spawn(mut events: broadcast::Receiver<ChatEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printer = Printer::default();
        loop {
            match events.recv().await {
                Ok(event) => printer.handle(event),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[derive(Default)]
struct Printer {
    count: usize,
}

impl Printer {
    fn handle(&mut self, event: ChatEvent) {
        let mut out = std::io::stdout().lock();
        let _ = match event {
            ChatEvent::MessageAppended { message } => {
                self.count += 1;
                self.print_message(&mut out, &message)
            }
            ChatEvent::TailDelta { delta, .. } => write!(out, "{delta}"),
            ChatEvent::StreamFinished { .. } => writeln!(out, "\n"),
            ChatEvent::StreamDiscarded { .. } => {
                self.count = self.count.saturating_sub(1);
                writeln!(out, " [discarded]")
            }
            ChatEvent::Cleared { .. } => {
                self.count = 0;
                writeln!(out, "── new chat ──")
            }
            ChatEvent::ActionCleared { .. } | ChatEvent::TailUpdated { .. } => Ok(()),
        };
        let _ = out.flush();
    }

    fn print_message(&self, out: &mut impl Write, message: &Message) -> std::io::Result<()> {
        let who = match message.origin {
            Origin::User => "you",
            Origin::Assistant => "assistant",
        };
        if message.in_progress {
            return write!(out, "[{}] {who}: ", self.count);
        }

        writeln!(out, "[{}] {who}:", self.count)?;
        writeln!(out, "{}", project(message))?;
        let mut hints = Vec::new();
        if message.actions.execute {
            hints.push(format!("/execute {}", self.count));
        }
        if message.actions.summarize {
            hints.push(format!("/summarize {}", self.count));
            hints.push(format!("/chart {} <x> <y>", self.count));
        }
        if !hints.is_empty() {
            writeln!(out, "  ({})", hints.join(", "))?;
        }
        writeln!(out)
    }
}
