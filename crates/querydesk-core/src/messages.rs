use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;
use crate::ids::MessageId;
use crate::payload::QueryResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    PlainText,
    GeneratedSql,
    ExecutedResult,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Result { result: QueryResult },
}

/// Follow-up affordances offered on a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    pub execute: bool,
    pub summarize: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Execute,
    Summarize,
}

impl Actions {
    pub fn is_set(&self, action: Action) -> bool {
        match action {
            Action::Execute => self.execute,
            Action::Summarize => self.summarize,
        }
    }

    pub fn clear(&mut self, action: Action) {
        match action {
            Action::Execute => self.execute = false,
            Action::Summarize => self.summarize = false,
        }
    }
}

/// One entry of the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub origin: Origin,
    pub kind: MessageKind,
    pub content: MessageContent,
    pub in_progress: bool,
    pub actions: Actions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_echo: Option<String>,
    /// Message this one was produced from (executed SQL, summarized result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MessageId>,
    /// Set when the message reports a failed action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn base(origin: Origin, kind: MessageKind, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            origin,
            kind,
            content,
            in_progress: false,
            actions: Actions::default(),
            prompt_echo: None,
            source: None,
            failure: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let mut msg = Self::base(
            Origin::User,
            MessageKind::PlainText,
            MessageContent::Text { text: prompt.clone() },
        );
        msg.prompt_echo = Some(prompt);
        msg
    }

    pub fn assistant_text(text: impl Into<String>, prompt_echo: impl Into<String>) -> Self {
        let mut msg = Self::base(
            Origin::Assistant,
            MessageKind::PlainText,
            MessageContent::Text { text: text.into() },
        );
        msg.prompt_echo = Some(prompt_echo.into());
        msg
    }

    /// Generated SQL, offered for execution.
    pub fn sql(sql: impl Into<String>, prompt_echo: impl Into<String>) -> Self {
        let mut msg = Self::base(
            Origin::Assistant,
            MessageKind::GeneratedSql,
            MessageContent::Text { text: sql.into() },
        );
        msg.actions.execute = true;
        msg.prompt_echo = Some(prompt_echo.into());
        msg
    }

    /// Result of executing `source`, offered for summarization.
    pub fn executed(result: QueryResult, prompt_echo: Option<String>, source: MessageId) -> Self {
        let mut msg = Self::base(
            Origin::Assistant,
            MessageKind::ExecutedResult,
            MessageContent::Result { result },
        );
        msg.actions.summarize = true;
        msg.prompt_echo = prompt_echo;
        msg.source = Some(source);
        msg
    }

    /// Empty assistant message that streamed text is typed into.
    pub fn streaming_placeholder(prompt_echo: Option<String>, source: MessageId) -> Self {
        let mut msg = Self::base(
            Origin::Assistant,
            MessageKind::PlainText,
            MessageContent::Text { text: String::new() },
        );
        msg.in_progress = true;
        msg.prompt_echo = prompt_echo;
        msg.source = Some(source);
        msg
    }

    /// Visible report of a failed action.
    pub fn failure(text: impl Into<String>, error: &ChatError) -> Self {
        let mut msg = Self::base(
            Origin::Assistant,
            MessageKind::PlainText,
            MessageContent::Text { text: text.into() },
        );
        msg.failure = Some(error.error_kind().to_string());
        msg
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::Result { .. } => None,
        }
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match &self.content {
            MessageContent::Result { result } => Some(result),
            MessageContent::Text { .. } => None,
        }
    }

    /// Append streamed text. Result messages are left unchanged.
    pub fn push_text(&mut self, delta: &str) -> bool {
        match &mut self.content {
            MessageContent::Text { text } => {
                text.push_str(delta);
                true
            }
            MessageContent::Result { .. } => false,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}
