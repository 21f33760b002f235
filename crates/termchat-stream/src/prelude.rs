//! Common imports for typical client usage.
//!
//! This module intentionally exports the most frequently used builder/runtime
//! types so examples and application code need fewer import lines.
pub use crate::{
    CancelHandle, ChatClient, ChatClientBuilder, ChatError, ChatMessage, ChatSession, Delta,
    ModelRef, ProviderId, RequestBuilder, Role, SessionConfig, StreamHandle, StreamState,
};
