use futures::TryStreamExt as _;
use tracing::debug;

use crate::errors::{ChatError, ProviderError};
use crate::extract::normalized_event_stream;
use crate::model::ProviderId;
use crate::provider::{
    ByteStream, ProviderAdapter, ProviderKind, ProviderRequest, ProviderStreamHandle,
};

use super::config::OpenAiClientConfig;

const OPENAI_PROVIDER: &str = "openai";

/// Provider adapter for OpenAI's chat completions API (SSE streaming).
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiClientConfig,
}

impl OpenAiProvider {
    /// Creates a provider from explicit client configuration.
    pub fn new(config: OpenAiClientConfig) -> Result<Self, ChatError> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::Config(
                "OpenAI client config api_key must not be empty".into(),
            ));
        }
        // a whole-request timeout would kill long-lived streams; only bound
        // connection setup here and leave deadlines to the request options
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build OpenAI client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a provider using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(OPENAI_PROVIDER)
    }

    async fn start_stream(
        &self,
        req: ProviderRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = ProviderId::new(OPENAI_PROVIDER);
        let body = build_request_body(&req);
        debug!(request_id = %req.request_id, session_id = %req.session_id, model = %req.model.model, "starting OpenAI chat completions stream");

        let mut http_req = self
            .client
            .post(self.config.chat_completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body);
        if let Some(timeout) = req.options.timeout {
            http_req = http_req.timeout(timeout);
        }

        let response = http_req.send().await.map_err(|e| {
            ProviderError::transport(provider_id.clone(), format!("OpenAI request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::provider(
                provider_id,
                format!("OpenAI chat request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let bytes_stream: ByteStream =
            Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        let stream = normalized_event_stream(provider_id, ProviderKind::OpenAi, bytes_stream);

        Ok(ProviderStreamHandle {
            stream: Box::pin(stream),
        })
    }
}

pub(crate) fn build_request_body(req: &ProviderRequest) -> serde_json::Value {
    serde_json::json!({
        "model": req.model.model,
        "messages": req.messages,
        "stream": true,
    })
}
