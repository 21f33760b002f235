//! Vendor integrations.

pub mod ollama;
pub mod openai;
