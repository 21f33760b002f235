use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::ChatError;
use crate::model::{ModelRef, ProviderId};
use crate::provider::ProviderAdapter;
use crate::run::RequestBuilder;
use crate::session::{ChatSession, SessionConfig};

pub(crate) struct ClientInner {
    providers: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ClientInner {
    pub(crate) fn provider(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(id).cloned()
    }
}

/// Entry point for creating sessions and streaming chat requests.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Starts a builder for registering providers and creating a client.
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    /// Creates a conversation-scoped session.
    pub fn session(&self, config: SessionConfig) -> ChatSession {
        ChatSession::new(self.inner.clone(), config)
    }

    /// Starts building a one-shot request outside any session history.
    pub fn request(&self, model: ModelRef) -> RequestBuilder {
        RequestBuilder::new(self.inner.clone(), uuid::Uuid::new_v4(), model)
    }
}

/// Builder used to register provider adapters before creating a `ChatClient`.
#[derive(Default)]
pub struct ChatClientBuilder {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl ChatClientBuilder {
    /// Registers a provider adapter.
    ///
    /// Register one adapter per provider id (one `ollama`, one `openai`).
    pub fn register_provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Builds the client and rejects duplicate provider registrations.
    pub fn build(self) -> Result<ChatClient, ChatError> {
        let mut map: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = HashMap::new();
        let mut seen: HashSet<ProviderId> = HashSet::new();
        for provider in self.providers {
            let id = provider.id();
            if !seen.insert(id.clone()) {
                return Err(ChatError::Config(format!(
                    "duplicate provider registration: {id}"
                )));
            }
            map.insert(id, provider);
        }
        Ok(ChatClient {
            inner: Arc::new(ClientInner { providers: map }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::provider::{ProviderRequest, ProviderStreamHandle};

    struct DummyProvider;

    #[async_trait::async_trait]
    impl ProviderAdapter for DummyProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new("dummy")
        }

        async fn start_stream(
            &self,
            _req: ProviderRequest,
        ) -> Result<ProviderStreamHandle, ProviderError> {
            unreachable!("not used in this test")
        }
    }

    #[test]
    fn build_rejects_duplicate_provider_ids() {
        let result = ChatClient::builder()
            .register_provider(Arc::new(DummyProvider))
            .register_provider(Arc::new(DummyProvider))
            .build();
        assert!(
            matches!(result, Err(ChatError::Config(message)) if message.contains("duplicate provider"))
        );
    }

    #[test]
    fn build_accepts_distinct_providers() {
        let client = ChatClient::builder()
            .register_provider(Arc::new(DummyProvider))
            .build()
            .expect("build");
        assert!(client.inner.provider(&ProviderId::new("dummy")).is_some());
        assert!(client.inner.provider(&ProviderId::new("other")).is_none());
    }
}
