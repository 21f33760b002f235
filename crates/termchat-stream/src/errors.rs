use crate::model::ProviderId;

/// Errors produced inside a provider adapter or the normalization pump before
/// they become the terminal state of a stream handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Provider returned an application-level failure (HTTP status, quota,
    /// or a well-formed error payload inside the stream).
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: ProviderId,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error ({provider}): {message}")]
    Transport {
        provider: ProviderId,
        message: String,
    },
    /// Response framing or event sequencing was invalid.
    #[error("protocol error ({provider}): {message}")]
    Protocol {
        provider: ProviderId,
        message: String,
    },
    /// A framing unit could not be decoded (malformed JSON, invalid UTF-8).
    #[error("decode error ({provider}): {message}")]
    Decode {
        provider: ProviderId,
        message: String,
    },
}

impl ProviderError {
    /// Creates a provider-level error.
    pub fn provider(
        provider: impl Into<ProviderId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a decode-level error.
    pub fn decode(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Decode {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Returns the provider associated with this error.
    pub fn provider_id(&self) -> &ProviderId {
        match self {
            Self::Provider { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::Decode { provider, .. } => provider,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. }
            | Self::Decode { message, .. } => message,
        }
    }
}

/// Terminal failure carried by a handle in the `Failed` state.
///
/// `Cancelled` is deliberate and surfaces through the `Cancelled` state (and
/// `ChatError::Cancelled`), never through `Failed`, so callers can suppress
/// error UI for a user-initiated stop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum StreamFailure {
    /// A framing unit was malformed (invalid JSON or UTF-8).
    #[error("decode failure ({provider}): {message}")]
    Decode { provider: String, message: String },
    /// Provider returned a terminal failure, message verbatim.
    #[error("provider failure ({provider}): {message}")]
    Provider { provider: String, message: String },
    /// Network or stream transport failed.
    #[error("transport failure ({provider}): {message}")]
    Transport { provider: String, message: String },
    /// The caller-configured deadline elapsed before a terminal signal.
    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    /// Sequencing or invariant violation detected by the aggregator.
    #[error("protocol failure: {message}")]
    Protocol { message: String },
    /// The stream was cancelled by the caller.
    #[error("stream cancelled")]
    Cancelled,
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client/provider configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input to the builder API.
    #[error("validation error: {0}")]
    Validation(String),
    /// Requested provider is not registered with the client.
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: ProviderId },
    /// Provider error raised before the stream was established.
    #[error(transparent)]
    Provider(ProviderError),
    /// Terminal failure from a started stream.
    #[error(transparent)]
    StreamFailed(StreamFailure),
    /// The stream was cancelled before a terminal result was produced.
    #[error("cancelled")]
    Cancelled,
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChatError {
    pub(crate) fn stream_failed(failure: StreamFailure) -> Self {
        Self::StreamFailed(failure)
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<StreamFailure> for ChatError {
    fn from(value: StreamFailure) -> Self {
        ChatError::StreamFailed(value)
    }
}

pub(crate) fn stream_failure_from_provider_error(err: &ProviderError) -> StreamFailure {
    match err {
        ProviderError::Provider {
            provider, message, ..
        } => StreamFailure::Provider {
            provider: provider.to_string(),
            message: message.clone(),
        },
        ProviderError::Transport { provider, message } => StreamFailure::Transport {
            provider: provider.to_string(),
            message: message.clone(),
        },
        ProviderError::Protocol { provider, message } => StreamFailure::Protocol {
            message: format!("provider={provider}: {message}"),
        },
        ProviderError::Decode { provider, message } => StreamFailure::Decode {
            provider: provider.to_string(),
            message: message.clone(),
        },
    }
}
