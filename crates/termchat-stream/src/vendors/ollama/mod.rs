//! Ollama chat integration (NDJSON streaming).

mod adapter;
mod config;

pub use adapter::OllamaProvider;
pub use config::OllamaClientConfig;
