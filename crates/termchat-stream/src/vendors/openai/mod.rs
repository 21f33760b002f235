//! OpenAI chat completions integration (SSE streaming).

mod adapter;
mod config;

pub use adapter::OpenAiProvider;
pub use config::OpenAiClientConfig;
