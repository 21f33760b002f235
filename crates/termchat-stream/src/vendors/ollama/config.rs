use std::time::Duration;

/// Configuration for the Ollama provider client.
#[derive(Clone, Debug)]
pub struct OllamaClientConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Timeout for establishing the connection.
    ///
    /// Covers connection setup only; an open stream is bounded by the
    /// caller's per-request deadline, not this value.
    pub connect_timeout: Duration,
}

impl Default for OllamaClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl OllamaClientConfig {
    /// Builds a config from the environment.
    ///
    /// `OLLAMA_BASE_URL` overrides the default local server address; Ollama
    /// needs no credentials, so everything else stays at defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var("OLLAMA_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config.base_url = base_url;
        }
        config
    }

    /// Overrides the server base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_strips_trailing_slash() {
        let config = OllamaClientConfig::default().base_url("http://box:11434/");
        assert_eq!(config.chat_url(), "http://box:11434/api/chat");
    }

    #[test]
    fn defaults_target_local_server() {
        let config = OllamaClientConfig::default();
        assert_eq!(config.chat_url(), "http://localhost:11434/api/chat");
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }
}
