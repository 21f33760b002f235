use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::client::ClientInner;
use crate::errors::{ChatError, StreamFailure, stream_failure_from_provider_error};
use crate::message::ChatMessage;
use crate::model::{ModelRef, ProviderId, RequestOptions};
use crate::provider::{ProviderAdapter, ProviderEvent, ProviderRequest};
use crate::stream::{Delta, StreamState};

/// Handle used to request cancellation of an in-flight stream.
///
/// `cancel` is idempotent and safe after the stream reached a terminal
/// state, where it is a no-op.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is cooperative: the flag is observed at the next
    /// suspension point, at least once per framing unit processed. Once
    /// observed, no further delta is emitted, deltas already buffered but
    /// not yet consumed are discarded, and the network resource is
    /// released.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Builder for configuring and starting one streamed chat request.
pub struct RequestBuilder {
    client: Arc<ClientInner>,
    session_id: uuid::Uuid,
    model: ModelRef,
    request_id: Option<uuid::Uuid>,
    system_prompt: Option<String>,
    messages: Vec<ChatMessage>,
    options: RequestOptions,
}

impl RequestBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, session_id: uuid::Uuid, model: ModelRef) -> Self {
        Self {
            client,
            session_id,
            model,
            request_id: None,
            system_prompt: None,
            messages: Vec::new(),
            options: RequestOptions::default(),
        }
    }

    /// Overrides the generated request id with a caller-assigned one.
    pub fn request_id(mut self, request_id: uuid::Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the system prompt, prepended to the message list.
    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.system_prompt = Some(text.into());
        self
    }

    /// Appends a plain user message.
    pub fn user_text(mut self, text: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(text));
        self
    }

    /// Replaces the message list with the provided conversation.
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Sets an optional per-request deadline.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets the bounded delta buffer size between the request task and the
    /// consumer.
    pub fn delta_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.delta_buffer_capacity = capacity;
        self
    }

    /// Validates the builder state and starts a streaming request.
    pub async fn start_stream(self) -> Result<StreamHandle, ChatError> {
        let client = self.client.clone();
        let request = self.validate_and_build_request()?;
        let provider = client
            .provider(&request.model.provider)
            .ok_or_else(|| ChatError::ProviderNotFound {
                provider: request.model.provider.clone(),
            })?;

        let (tx, rx) = mpsc::channel(request.options.delta_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(StreamState::Pending);

        let cancel_handle = CancelHandle { tx: cancel_tx };
        let request_id = request.request_id;
        let session_id = request.session_id;
        let model = request.model.clone();
        tokio::spawn(run_task(
            provider,
            request,
            tx,
            final_tx,
            cancel_rx.clone(),
            state_tx,
        ));

        Ok(StreamHandle {
            request_id,
            session_id,
            provider: model.provider,
            model: model.model,
            rx,
            final_rx,
            state_rx,
            cancel_rx,
            cancel_handle,
            saw_final: false,
            cancelled: false,
        })
    }

    /// Runs to completion and returns the full response text.
    pub async fn collect_text(self) -> Result<String, ChatError> {
        let handle = self.start_stream().await?;
        handle.finish().await
    }

    fn validate_and_build_request(self) -> Result<ProviderRequest, ChatError> {
        if self.model.provider.as_str().trim().is_empty() {
            return Err(ChatError::Validation(
                "model provider must not be empty".into(),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(ChatError::Validation("model must not be empty".into()));
        }
        if self.options.delta_buffer_capacity == 0 {
            return Err(ChatError::Validation(
                "delta_buffer_capacity must be greater than 0".into(),
            ));
        }

        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = self
            .system_prompt
            .as_ref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
        {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(self.messages);
        if messages.iter().all(|m| m.role != crate::message::Role::User) {
            return Err(ChatError::Validation(
                "at least one user message is required".into(),
            ));
        }
        for message in &messages {
            if message.content.trim().is_empty() {
                return Err(ChatError::Validation(
                    "message content must not be empty".into(),
                ));
            }
        }

        Ok(ProviderRequest {
            request_id: self.request_id.unwrap_or_else(uuid::Uuid::new_v4),
            session_id: self.session_id,
            model: self.model,
            messages,
            options: self.options,
        })
    }
}

/// Caller-visible lifecycle object for one streamed request.
///
/// Consume deltas with `next_delta` (this drives the whole pipeline) and
/// obtain the terminal result with `finish`. The stream is exhausted when
/// `next_delta` returns `None` or a delta with `is_final` set.
#[derive(Debug)]
pub struct StreamHandle {
    request_id: uuid::Uuid,
    session_id: uuid::Uuid,
    provider: ProviderId,
    model: String,
    rx: mpsc::Receiver<Delta>,
    final_rx: oneshot::Receiver<Result<String, ChatError>>,
    state_rx: watch::Receiver<StreamState>,
    cancel_rx: watch::Receiver<bool>,
    cancel_handle: CancelHandle,
    saw_final: bool,
    cancelled: bool,
}

impl StreamHandle {
    /// Returns the request id for this stream.
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Returns the session id that owns this request.
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns the provider serving this request.
    pub fn provider_id(&self) -> &ProviderId {
        &self.provider
    }

    /// Returns a handle that can cancel the stream from any task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// Returns the current lifecycle state.
    ///
    /// Cancellation requested before the caller observed the stream's own
    /// terminal outcome reads as `Cancelled`, even when the request task had
    /// already raced ahead of the delta buffer.
    pub fn state(&self) -> StreamState {
        if self.cancelled || (!self.saw_final && *self.cancel_rx.borrow()) {
            return StreamState::Cancelled;
        }
        self.state_rx.borrow().clone()
    }

    /// Waits for and returns the next delta in sequence order.
    ///
    /// Returns `None` once the stream is exhausted, including after
    /// cancellation or failure; consult `state` or `finish` for the reason.
    /// Deltas still buffered when cancellation is requested are discarded,
    /// never delivered.
    pub async fn next_delta(&mut self) -> Option<Delta> {
        if self.saw_final || self.cancel_observed() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel_rx.changed() => {
                self.mark_cancelled();
                None
            }
            delta = self.rx.recv() => {
                if let Some(d) = &delta
                    && d.is_final
                {
                    self.saw_final = true;
                }
                delta
            }
        }
    }

    /// Drains the stream (if needed) and returns the full accumulated text
    /// or the terminal failure.
    ///
    /// Safe to call after consuming deltas manually with `next_delta`. A
    /// deliberate stop surfaces as `ChatError::Cancelled`, never as a
    /// stream failure.
    pub async fn finish(mut self) -> Result<String, ChatError> {
        while !self.saw_final && !self.cancel_observed() {
            tokio::select! {
                biased;
                _ = self.cancel_rx.changed() => {
                    self.mark_cancelled();
                }
                delta = self.rx.recv() => {
                    match delta {
                        Some(d) if d.is_final => self.saw_final = true,
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }
        if self.cancelled {
            return Err(ChatError::Cancelled);
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(ChatError::protocol_msg(format!(
                "request task ended without final result (provider={}, model={})",
                self.provider, self.model
            ))),
        }
    }

    fn cancel_observed(&mut self) -> bool {
        if !self.cancelled && *self.cancel_rx.borrow() {
            self.mark_cancelled();
        }
        self.cancelled
    }

    fn mark_cancelled(&mut self) {
        self.cancelled = true;
        // unblocks a pump stuck on a full buffer so the connection drops
        self.rx.close();
    }
}

/// Enforces the lifecycle invariant: `Pending → Streaming → terminal`, with
/// at most one terminal transition per handle.
struct Lifecycle {
    state_tx: watch::Sender<StreamState>,
    current: StreamState,
}

impl Lifecycle {
    fn new(state_tx: watch::Sender<StreamState>) -> Self {
        Self {
            state_tx,
            current: StreamState::Pending,
        }
    }

    fn streaming(&mut self) {
        debug_assert_eq!(
            self.current,
            StreamState::Pending,
            "streaming transition must come from Pending"
        );
        if self.current.is_terminal() {
            return;
        }
        self.set(StreamState::Streaming);
    }

    fn terminal(&mut self, next: StreamState) {
        debug_assert!(next.is_terminal());
        debug_assert!(
            !self.current.is_terminal(),
            "double terminal transition is a defect"
        );
        if self.current.is_terminal() {
            return;
        }
        self.set(next);
    }

    fn set(&mut self, next: StreamState) {
        self.current = next.clone();
        let _ = self.state_tx.send(next);
    }
}

async fn wait_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn timeout_failure(timeout: Option<std::time::Duration>) -> StreamFailure {
    StreamFailure::Timeout {
        after_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
    }
}

async fn run_task(
    provider: Arc<dyn ProviderAdapter>,
    request: ProviderRequest,
    tx: mpsc::Sender<Delta>,
    final_tx: oneshot::Sender<Result<String, ChatError>>,
    mut cancel_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<StreamState>,
) {
    let request_id = request.request_id;
    let provider_id = request.model.provider.clone();
    let model_name = request.model.model.clone();
    let timeout = request.options.timeout;
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    let mut lifecycle = Lifecycle::new(state_tx);

    if *cancel_rx.borrow() {
        lifecycle.terminal(StreamState::Cancelled);
        let _ = final_tx.send(Err(ChatError::Cancelled));
        return;
    }

    let start = provider.start_stream(request);
    tokio::pin!(start);
    let mut events = loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                // Err means every handle is gone; stop the request
                if changed.is_err() || *cancel_rx.borrow() {
                    lifecycle.terminal(StreamState::Cancelled);
                    let _ = final_tx.send(Err(ChatError::Cancelled));
                    return;
                }
            }
            _ = wait_deadline(deadline) => {
                let failure = timeout_failure(timeout);
                lifecycle.terminal(StreamState::Failed(failure.clone()));
                let _ = final_tx.send(Err(ChatError::stream_failed(failure)));
                return;
            }
            started = &mut start => {
                match started {
                    Ok(handle) => break handle.stream,
                    Err(err) => {
                        let failure = stream_failure_from_provider_error(&err);
                        lifecycle.terminal(StreamState::Failed(failure.clone()));
                        let _ = final_tx.send(Err(ChatError::stream_failed(failure)));
                        return;
                    }
                }
            }
        }
    };
    lifecycle.streaming();
    debug!(request_id = %request_id, provider = %provider_id, model = %model_name, "stream established");

    let mut expected_seq = 0_u64;
    let mut accumulated = String::new();
    loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                // Err means every handle is gone; stop the request
                if changed.is_err() || *cancel_rx.borrow() {
                    lifecycle.terminal(StreamState::Cancelled);
                    let _ = final_tx.send(Err(ChatError::Cancelled));
                    // dropping `events` here releases the network resource
                    return;
                }
            }
            _ = wait_deadline(deadline) => {
                let failure = timeout_failure(timeout);
                lifecycle.terminal(StreamState::Failed(failure.clone()));
                let _ = final_tx.send(Err(ChatError::stream_failed(failure)));
                return;
            }
            next = events.next() => {
                match next {
                    Some(Ok(ProviderEvent::Delta(delta))) => {
                        if delta.seq != expected_seq {
                            let failure = StreamFailure::Protocol {
                                message: format!(
                                    "delta sequence violation: expected {expected_seq}, got {}",
                                    delta.seq
                                ),
                            };
                            lifecycle.terminal(StreamState::Failed(failure.clone()));
                            let _ = final_tx.send(Err(ChatError::stream_failed(failure)));
                            return;
                        }
                        expected_seq += 1;
                        accumulated.push_str(&delta.text);
                        debug!(request_id = %request_id, provider = %provider_id, seq = delta.seq, "delta applied");
                        if tx.send(delta).await.is_err() {
                            // the receiver closes when cancellation is
                            // observed on the consumer side
                            if *cancel_rx.borrow() {
                                lifecycle.terminal(StreamState::Cancelled);
                                let _ = final_tx.send(Err(ChatError::Cancelled));
                                return;
                            }
                            let failure = StreamFailure::Protocol {
                                message: "stream handle dropped during output".into(),
                            };
                            lifecycle.terminal(StreamState::Failed(failure.clone()));
                            let _ = final_tx.send(Err(ChatError::stream_failed(failure)));
                            return;
                        }
                    }
                    Some(Ok(ProviderEvent::Completed)) => {
                        lifecycle.terminal(StreamState::Completed);
                        let _ = tx.send(Delta::terminal(expected_seq)).await;
                        let _ = final_tx.send(Ok(accumulated));
                        return;
                    }
                    Some(Err(err)) => {
                        let failure = stream_failure_from_provider_error(&err);
                        lifecycle.terminal(StreamState::Failed(failure.clone()));
                        let _ = final_tx.send(Err(ChatError::stream_failed(failure)));
                        return;
                    }
                    None => {
                        let failure = StreamFailure::Protocol {
                            message: format!(
                                "provider stream ended without completion ({provider_id})"
                            ),
                        };
                        lifecycle.terminal(StreamState::Failed(failure.clone()));
                        let _ = final_tx.send(Err(ChatError::stream_failed(failure)));
                        return;
                    }
                }
            }
        }
    }
}
