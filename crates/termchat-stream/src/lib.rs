//! Streaming chat client core with a builder-first async API.
//!
//! Normalizes Ollama (NDJSON) and OpenAI (SSE) streaming chat responses into
//! one ordered delta stream, and renders the accumulated markdown
//! incrementally for terminal display. Vendor-specific APIs are namespaced
//! under `vendors::*`.
//!
//! # Builder-first usage (Ollama)
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use termchat_stream::prelude::*;
//! use termchat_stream::vendors::ollama::OllamaProvider;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = ChatClient::builder()
//!     .register_provider(Arc::new(OllamaProvider::from_env()?))
//!     .build()?;
//!
//! let mut handle = client
//!     .request(ModelRef::parse("llama3"))
//!     .system_prompt("Answer briefly.")
//!     .user_text("Say hello")
//!     .start_stream()
//!     .await?;
//!
//! while let Some(delta) = handle.next_delta().await {
//!     print!("{}", delta.text);
//! }
//! let text = handle.finish().await?;
//! println!("\n-- {} chars --", text.len());
//! # Ok(())
//! # }
//! ```

/// Client entry point and provider registry builder.
pub mod client;
/// Stream framing decoders (NDJSON and SSE).
pub mod decode;
/// Public error types used by the client API.
pub mod errors;
mod extract;
/// Chat messages and roles.
pub mod message;
/// Model and provider identifiers plus generic request options.
pub mod model;
/// Process-wide tracing setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Provider adapter contracts used by vendor integrations.
pub mod provider;
/// Incremental markdown rendering and display sinks.
pub mod render;
/// Request builder, streaming handle, and cancellation handle.
pub mod run;
/// Session configuration and conversation history.
pub mod session;
/// Normalized deltas and stream lifecycle states.
pub mod stream;
/// Vendor-specific integrations.
pub mod vendors;

pub use client::{ChatClient, ChatClientBuilder};
pub use errors::{ChatError, ProviderError, StreamFailure};
pub use message::{ChatMessage, Role};
pub use model::{ModelRef, ProviderId, RequestOptions};
pub use observability::init_observability;
pub use provider::{
    ProviderAdapter, ProviderEvent, ProviderKind, ProviderRequest, ProviderStreamHandle,
};
pub use render::{
    DisplaySink, InlineSpan, InlineStyle, RenderBlock, RenderSnapshot, render, render_stream,
};
pub use run::{CancelHandle, RequestBuilder, StreamHandle};
pub use session::{ChatSession, SessionConfig};
pub use stream::{Delta, StreamState};
