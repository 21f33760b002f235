use std::sync::Arc;

use crate::client::ClientInner;
use crate::message::ChatMessage;
use crate::model::ModelRef;
use crate::run::RequestBuilder;

/// Configuration used to create a `ChatSession`.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Human-readable conversation title (useful for logs).
    pub title: String,
    /// Optional system prompt sent with every request of this session.
    pub system_prompt: Option<String>,
}

impl SessionConfig {
    /// Creates a titled session config.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            system_prompt: None,
        }
    }

    /// Sets the session-wide system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// One conversation: an in-memory message history plus the client needed to
/// stream follow-up requests against it.
///
/// Sessions do not persist anything; the caller owns storage.
pub struct ChatSession {
    client: Arc<ClientInner>,
    session_id: uuid::Uuid,
    config: SessionConfig,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub(crate) fn new(client: Arc<ClientInner>, config: SessionConfig) -> Self {
        Self {
            client,
            session_id: uuid::Uuid::new_v4(),
            config,
            history: Vec::new(),
        }
    }

    /// Returns the session id.
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns the conversation title.
    pub fn title(&self) -> &str {
        &self.config.title
    }

    /// Returns the message history, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Records a finished assistant reply in the history.
    ///
    /// Call this with the text returned by `StreamHandle::finish` so the
    /// next `send` carries the full conversation.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content));
    }

    /// Starts building a request in this session without touching history.
    pub fn request(&self, model: ModelRef) -> RequestBuilder {
        let mut builder = RequestBuilder::new(self.client.clone(), self.session_id, model);
        if let Some(prompt) = &self.config.system_prompt {
            builder = builder.system_prompt(prompt.clone());
        }
        builder
    }

    /// Appends `text` as a user message and builds a request carrying the
    /// whole conversation so far.
    pub fn send(&mut self, model: ModelRef, text: impl Into<String>) -> RequestBuilder {
        self.history.push(ChatMessage::user(text));
        self.request(model).messages(self.history.clone())
    }
}
