//! Adapter contracts implemented by vendor integrations.

use std::pin::Pin;

use crate::decode::Framing;
use crate::errors::ProviderError;
use crate::message::ChatMessage;
use crate::model::{ModelRef, ProviderId, RequestOptions};
use crate::stream::Delta;

/// Wire dialect spoken by a provider, fixed per integration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Ollama chat endpoint: NDJSON frames, `message.content` deltas,
    /// `"done": true` end marker.
    Ollama,
    /// OpenAI chat completions: SSE frames, `choices[0].delta.content`
    /// deltas, `data: [DONE]` end marker.
    OpenAi,
}

impl ProviderKind {
    /// Framing dialect used by this provider's streaming endpoint.
    pub fn framing(self) -> Framing {
        match self {
            ProviderKind::Ollama => Framing::Ndjson,
            ProviderKind::OpenAi => Framing::Sse,
        }
    }
}

/// Normalized event produced by a provider adapter's stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderEvent {
    /// One extracted content delta, sequence index already assigned.
    Delta(Delta),
    /// The provider's authoritative end-of-turn signal.
    Completed,
}

/// Everything an adapter needs to dispatch one streamed request.
#[derive(Clone, Debug)]
pub struct ProviderRequest {
    /// Caller-visible id of this request.
    pub request_id: uuid::Uuid,
    /// Session the request belongs to.
    pub session_id: uuid::Uuid,
    /// Model to run.
    pub model: ModelRef,
    /// Conversation messages in order, system prompt first when present.
    pub messages: Vec<ChatMessage>,
    /// Generic behavior options.
    pub options: RequestOptions,
}

/// Boxed raw byte stream handed from the HTTP layer to the pump.
///
/// Transport errors are erased to `std::io::Error` at the adapter boundary so
/// the pump (and its tests) do not depend on a concrete HTTP client error.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, std::io::Error>> + Send + 'static>>;

/// Boxed normalized event stream for one in-flight request.
pub type ProviderEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<ProviderEvent, ProviderError>> + Send + 'static>>;

/// One established streaming response.
///
/// The stream exclusively owns the underlying network resource; dropping it
/// releases the connection.
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
}

/// Implemented by each vendor integration.
///
/// `start_stream` performs the HTTP dispatch and must short-circuit a
/// non-2xx status into an error without entering the decoder.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable id the adapter registers under (for example `ollama`).
    fn id(&self) -> ProviderId;

    /// Dispatches one request and returns its normalized event stream.
    async fn start_stream(
        &self,
        req: ProviderRequest,
    ) -> Result<ProviderStreamHandle, ProviderError>;
}
