//! User actions: ask, execute, summarize, new chat.
//!
//! Every action is caught here. A failure becomes a visible message in the
//! conversation and an [`ActionOutcome`]; nothing is returned as an error.
//! One action runs at a time. A second action while one is in flight is
//! rejected without touching the conversation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use querydesk_client::reader::{ReadOutcome, TransportReader};
use querydesk_core::api::{
    CompleteRequest, ResponseKind, RunSqlRequest, TextToSqlRequest, NO_RESULTS, NO_SUMMARY,
};
use querydesk_core::backend::Backend;
use querydesk_core::errors::ChatError;
use querydesk_core::ids::MessageId;
use querydesk_core::messages::{Action, Message, MessageKind};
use querydesk_core::payload::QueryResult;
use querydesk_settings::{QuerydeskSettings, DEFAULT_SENTINEL, DEFAULT_SYSTEM_PROMPT};

use crate::catalog::Catalog;
use crate::chart::{ChartKind, ChartSpec, DEFAULT_POINT_LIMIT};
use crate::session::StreamSession;
use crate::store::{StoreHandle, StreamTicket};
use crate::typing::DrainOutcome;

pub const ASK_FAILED: &str = "An error occurred while fetching data.";
pub const EXECUTE_FAILED: &str = "Error executing SQL query.";
pub const SUMMARIZE_FAILED: &str = "An error occurred while summarizing.";

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub sentinel: String,
    pub typing_interval: Duration,
    pub system_prompt: String,
    pub stream_idle_timeout: Duration,
    pub suggested_prompts: Vec<String>,
    pub chart_point_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::from_settings(&QuerydeskSettings::default())
    }
}

impl ChatConfig {
    pub fn from_settings(settings: &QuerydeskSettings) -> Self {
        let sentinel = if settings.stream.sentinel.is_empty() {
            DEFAULT_SENTINEL.to_string()
        } else {
            settings.stream.sentinel.clone()
        };
        let system_prompt = if settings.stream.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            settings.stream.system_prompt.clone()
        };
        Self {
            sentinel,
            typing_interval: Duration::from_millis(settings.stream.typing_interval_ms),
            system_prompt,
            stream_idle_timeout: Duration::from_secs(settings.backend.stream_idle_timeout_secs),
            suggested_prompts: settings.ui.suggested_prompts.clone(),
            chart_point_limit: match settings.ui.chart_point_limit {
                0 => DEFAULT_POINT_LIMIT,
                n => n,
            },
        }
    }
}

/// Why an action was refused. Nothing is appended for a rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    EmptyPrompt,
    /// Another action is still running.
    Busy,
    UnknownMessage,
    /// Execute on a message that is not generated SQL.
    NotExecutable,
    /// Summarize on a message that is not an executed result.
    NotSummarizable,
}

#[derive(Clone, Debug)]
pub enum ActionOutcome {
    /// The action finished and its message was appended.
    Completed,
    /// The action failed; an error message was appended.
    Failed(ChatError),
    Rejected(Rejection),
    /// Cancelled by a new chat or an explicit cancel.
    Cancelled,
}

impl ActionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

struct ActiveAction {
    id: u64,
    kind: &'static str,
    cancel: CancellationToken,
}

/// Holds the single action slot. Dropping it frees the slot unless a new
/// chat already took it.
struct ActionGuard<'a> {
    slot: &'a Mutex<Option<ActiveAction>>,
    id: u64,
    cancel: CancellationToken,
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|a| a.id == self.id) {
            *slot = None;
        }
    }
}

pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    store: StoreHandle,
    config: ChatConfig,
    catalog: Mutex<Catalog>,
    active: Mutex<Option<ActiveAction>>,
    next_action: AtomicU64,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn Backend>, config: ChatConfig) -> Self {
        Self {
            backend,
            store: StoreHandle::new(),
            config,
            catalog: Mutex::new(Catalog::default()),
            active: Mutex::new(None),
            next_action: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn suggested_prompts(&self) -> &[String] {
        &self.config.suggested_prompts
    }

    /// Ask the suggested prompt at `index`.
    pub async fn submit_suggested(&self, index: usize) -> ActionOutcome {
        match self.config.suggested_prompts.get(index) {
            Some(prompt) => self.submit(prompt).await,
            None => ActionOutcome::Rejected(Rejection::EmptyPrompt),
        }
    }

    // ── Catalog ─────────────────────────────────────────────────────────

    pub fn catalog(&self) -> Catalog {
        self.catalog.lock().clone()
    }

    /// Fetch the offered models and search services. Failures leave the
    /// corresponding list empty.
    pub async fn load_catalog(&self) -> Catalog {
        let models = self.backend.analyst_details().await.unwrap_or_else(|e| {
            warn!(error = %e, error_kind = e.error_kind(), "failed to load semantic models");
            Vec::new()
        });
        let search = self.backend.search_details().await.unwrap_or_else(|e| {
            warn!(error = %e, error_kind = e.error_kind(), "failed to load search services");
            Vec::new()
        });
        info!(models = models.len(), search_services = search.len(), "catalog loaded");

        let mut catalog = self.catalog.lock();
        catalog.refresh(models, search);
        catalog.clone()
    }

    pub fn toggle_model(&self, name: &str) -> Option<bool> {
        self.catalog.lock().toggle_model(name)
    }

    pub fn toggle_search_service(&self, name: &str) -> Option<bool> {
        self.catalog.lock().toggle_search_service(name)
    }

    // ── Actions ─────────────────────────────────────────────────────────

    /// Ask a natural-language question.
    #[instrument(skip(self, prompt), fields(len = prompt.len()))]
    pub async fn submit(&self, prompt: &str) -> ActionOutcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return ActionOutcome::Rejected(Rejection::EmptyPrompt);
        }
        let Some(guard) = self.begin("ask") else {
            return ActionOutcome::Rejected(Rejection::Busy);
        };
        let generation = self.store.generation();
        if !self.append_at(generation, Message::user(prompt)) {
            return ActionOutcome::Cancelled;
        }

        let request = {
            let catalog = self.catalog.lock();
            TextToSqlRequest {
                natural_language_prompt: prompt.to_string(),
                selected_models: catalog.selected_models().to_vec(),
                selected_search_services: catalog.selected_search_services().to_vec(),
            }
        };

        let reply = tokio::select! {
            _ = guard.cancel.cancelled() => return ActionOutcome::Cancelled,
            reply = self.backend.text_to_sql(&request) => reply,
        };

        match reply {
            Ok(response) => {
                let answer = response.into_answer(prompt);
                if answer.substituted {
                    warn!(error_kind = "empty_response", "text-to-sql answer had no text");
                }
                let message = match answer.kind {
                    ResponseKind::Sql => Message::sql(answer.text, answer.prompt_echo),
                    ResponseKind::Text => Message::assistant_text(answer.text, answer.prompt_echo),
                };
                debug!(kind = ?answer.kind, "answer received");
                self.settle(generation, message, ActionOutcome::Completed)
            }
            Err(e) => self.fail(generation, ASK_FAILED, e),
        }
    }

    /// Run the SQL of a generated-SQL message. Can be repeated; each run
    /// appends its own result.
    #[instrument(skip(self, id), fields(message_id = %id))]
    pub async fn execute(&self, id: &MessageId) -> ActionOutcome {
        let Some(source) = self.store.get(id) else {
            return ActionOutcome::Rejected(Rejection::UnknownMessage);
        };
        if source.kind != MessageKind::GeneratedSql {
            return ActionOutcome::Rejected(Rejection::NotExecutable);
        }
        let Some(guard) = self.begin("execute") else {
            return ActionOutcome::Rejected(Rejection::Busy);
        };
        let generation = self.store.generation();

        let request = RunSqlRequest {
            sql_text: source.text().unwrap_or_default().to_string(),
            prompt_echo: source.prompt_echo.clone().unwrap_or_default(),
        };
        let reply = tokio::select! {
            _ = guard.cancel.cancelled() => return ActionOutcome::Cancelled,
            reply = self.backend.run_sql(&request) => reply,
        };

        self.clear_action(id, Action::Execute);

        match reply {
            Ok(result) => {
                info!(result = %result.summary(), "sql executed");
                let message = Message::executed(result, source.prompt_echo.clone(), id.clone());
                self.settle(generation, message, ActionOutcome::Completed)
            }
            Err(ChatError::EmptyResponse(field)) => {
                warn!(error_kind = "empty_response", field, "sql execution returned no data");
                let mut message =
                    Message::executed(QueryResult::text(NO_RESULTS), source.prompt_echo.clone(), id.clone());
                message.actions.clear(Action::Summarize);
                self.settle(generation, message, ActionOutcome::Completed)
            }
            Err(e) => self.fail(generation, EXECUTE_FAILED, e),
        }
    }

    /// Stream a natural-language summary of an executed result.
    #[instrument(skip(self, id), fields(message_id = %id))]
    pub async fn summarize(&self, id: &MessageId) -> ActionOutcome {
        let Some(source) = self.store.get(id) else {
            return ActionOutcome::Rejected(Rejection::UnknownMessage);
        };
        let Some(result) = source.result().filter(|_| source.kind == MessageKind::ExecutedResult) else {
            return ActionOutcome::Rejected(Rejection::NotSummarizable);
        };
        let Some(guard) = self.begin("summarize") else {
            return ActionOutcome::Rejected(Rejection::Busy);
        };
        let generation = self.store.generation();

        let placeholder = Message::streaming_placeholder(source.prompt_echo.clone(), id.clone());
        let ticket = match self.store.begin_stream_at(generation, placeholder) {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return ActionOutcome::Cancelled,
            Err(e) => {
                warn!(error = %e, "summary placeholder refused");
                return ActionOutcome::Rejected(Rejection::Busy);
            }
        };

        let request = CompleteRequest {
            system_prompt: self.config.system_prompt.clone(),
            prior_result: result.to_json(),
            prompt_echo: source.prompt_echo.clone().unwrap_or_default(),
        };

        match self.stream_summary(&guard.cancel, ticket.clone(), &request).await {
            Ok(DrainOutcome::Completed { chars }) => {
                self.clear_action(id, Action::Summarize);
                info!(chars, "summary complete");
                ActionOutcome::Completed
            }
            Ok(outcome) => {
                debug!(?outcome, "summary stopped before completion");
                self.discard(&ticket);
                ActionOutcome::Cancelled
            }
            Err(ChatError::Cancelled) => {
                self.discard(&ticket);
                ActionOutcome::Cancelled
            }
            Err(e) => {
                self.discard(&ticket);
                self.fail(generation, SUMMARIZE_FAILED, e)
            }
        }
    }

    /// Cancel whatever is running and start an empty conversation.
    pub fn new_chat(&self) -> u64 {
        self.cancel_active();
        let generation = self.store.clear();
        info!(generation, "new chat");
        generation
    }

    /// Cancel the running action, if any. The conversation is kept.
    pub fn cancel_active(&self) -> bool {
        match self.active.lock().take() {
            Some(active) => {
                info!(kind = active.kind, "cancelling active action");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Chart two columns of an executed table result.
    pub fn chart(&self, id: &MessageId, kind: ChartKind, x_key: &str, y_key: &str) -> Option<ChartSpec> {
        let message = self.store.get(id)?;
        let table = message.result()?.as_table()?;
        ChartSpec::build(table, kind, x_key, y_key, self.config.chart_point_limit)
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn begin(&self, kind: &'static str) -> Option<ActionGuard<'_>> {
        let mut slot = self.active.lock();
        if slot.is_some() || self.store.is_streaming() {
            info!(kind, "action rejected while another is running");
            return None;
        }
        let id = self.next_action.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *slot = Some(ActiveAction {
            id,
            kind,
            cancel: cancel.clone(),
        });
        Some(ActionGuard {
            slot: &self.active,
            id,
            cancel,
        })
    }

    async fn stream_summary(
        &self,
        cancel: &CancellationToken,
        ticket: StreamTicket,
        request: &CompleteRequest,
    ) -> Result<DrainOutcome, ChatError> {
        let idle = self.config.stream_idle_timeout;
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            body = tokio::time::timeout(idle, self.backend.stream_complete(request)) => match body {
                Ok(body) => body?,
                Err(_) => {
                    warn!(timeout = ?idle, error_kind = "idle_timeout", "completion headers never arrived");
                    return Err(ChatError::IdleTimeout(idle));
                }
            },
        };
        let mut reader =
            TransportReader::new(Some(body))?.with_idle_timeout(self.config.stream_idle_timeout);
        let mut session = StreamSession::open(
            self.store.clone(),
            ticket,
            &self.config.sentinel,
            self.config.typing_interval,
            cancel.child_token(),
        )
        .with_fallback(NO_SUMMARY);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                next = reader.next_chunk() => Some(next),
            };
            match next {
                None => {
                    session.abort().await;
                    return Err(ChatError::Cancelled);
                }
                Some(Ok(ReadOutcome::Chunk(text))) => {
                    if session.feed(&text) {
                        break;
                    }
                }
                Some(Ok(ReadOutcome::Done)) => {
                    session.end_of_body();
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, error_kind = e.error_kind(), "completion stream failed");
                    session.abort().await;
                    return Err(e);
                }
            }
        }

        debug!(
            bytes = reader.bytes_read(),
            chars = session.accumulated().chars().count(),
            "completion body read"
        );
        Ok(session.finish().await)
    }

    fn append_at(&self, generation: u64, message: Message) -> bool {
        match self.store.append_at(generation, message) {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "message not appended");
                false
            }
        }
    }

    fn settle(&self, generation: u64, message: Message, outcome: ActionOutcome) -> ActionOutcome {
        if self.append_at(generation, message) {
            outcome
        } else {
            ActionOutcome::Cancelled
        }
    }

    fn fail(&self, generation: u64, text: &str, error: ChatError) -> ActionOutcome {
        warn!(error = %error, error_kind = error.error_kind(), "action failed");
        let message = Message::failure(text, &error);
        self.settle(generation, message, ActionOutcome::Failed(error))
    }

    fn clear_action(&self, id: &MessageId, action: Action) {
        if let Err(e) = self.store.clear_action(id, action) {
            debug!(error = %e, ?action, "affordance not cleared");
        }
    }

    fn discard(&self, ticket: &StreamTicket) {
        if let Err(e) = self.store.discard_stream(ticket) {
            debug!(error = %e, "placeholder already gone");
        }
    }
}
