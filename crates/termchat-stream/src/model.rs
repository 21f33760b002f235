use std::fmt;
use std::time::Duration;

/// Stable identifier for a provider implementation (for example `ollama`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProviderId(pub String);

impl ProviderId {
    /// Creates a provider id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the provider id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Model selection for a streamed request.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelRef {
    /// Provider that owns the model.
    pub provider: ProviderId,
    /// Provider-specific model name (for example `llama3` or `gpt-4o`).
    pub model: String,
}

impl ModelRef {
    /// Creates an explicit model reference.
    pub fn new(provider: impl Into<ProviderId>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parses the terminal client's routing syntax.
    ///
    /// Names prefixed with `openai/` route to the OpenAI provider with the
    /// prefix stripped; anything else routes to the local Ollama server
    /// unchanged (Ollama tags such as `llama3:8b` are legal model names).
    pub fn parse(value: &str) -> Self {
        match value.strip_prefix("openai/") {
            Some(model) => Self::new("openai", model),
            None => Self::new("ollama", value),
        }
    }
}

/// Generic per-request behavior options.
///
/// Configuration is passed explicitly at start time; the streaming core keeps
/// no ambient mutable state.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RequestOptions {
    /// Optional per-request deadline. On expiry the handle fails with a
    /// timeout failure.
    pub timeout: Option<Duration>,
    /// Bounded delta buffer size between the request task and the consumer.
    pub delta_buffer_capacity: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            delta_buffer_capacity: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_routes_openai_prefix_to_openai() {
        let model = ModelRef::parse("openai/gpt-4o");
        assert_eq!(model.provider, ProviderId::new("openai"));
        assert_eq!(model.model, "gpt-4o");
    }

    #[test]
    fn parse_routes_bare_names_to_ollama() {
        let model = ModelRef::parse("llama3:8b");
        assert_eq!(model.provider, ProviderId::new("ollama"));
        assert_eq!(model.model, "llama3:8b");
    }

    #[test]
    fn request_options_default_buffer_capacity() {
        assert_eq!(RequestOptions::default().delta_buffer_capacity, 128);
    }
}
