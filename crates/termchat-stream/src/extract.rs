//! Token extractor: maps one framing unit to a content delta, a terminal
//! signal, or an error, hiding provider differences behind one interface.
//!
//! Also assembles the per-request pump that turns a raw byte stream into
//! ordered `ProviderEvent`s (bytes → frames → extracted tokens → deltas with
//! sequence indexes).

use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;

use crate::decode::{Frame, FrameDecoder};
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::{ByteStream, ProviderEvent, ProviderKind};
use crate::stream::Delta;

/// Result of extracting one framing unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Extracted {
    /// A content delta. Empty text is legal: heartbeats and metadata-only
    /// frames carry no content and never imply termination.
    Delta(String),
    /// The provider's own end-of-turn marker.
    Done,
}

/// Parses one framing unit for the given provider dialect.
///
/// Malformed JSON is fatal to the current stream: a corrupt frame
/// invalidates ordering guarantees, so no partial recovery is attempted.
/// A well-formed provider error payload propagates its message verbatim.
pub(crate) fn extract(
    kind: ProviderKind,
    provider: &ProviderId,
    payload: &str,
) -> Result<Extracted, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(payload).map_err(|e| {
        ProviderError::decode(provider.clone(), format!("malformed JSON frame: {e}"))
    })?;

    if let Some(error) = value.get("error") {
        return Err(ProviderError::provider(
            provider.clone(),
            provider_error_message(error),
            None,
        ));
    }

    match kind {
        ProviderKind::Ollama => {
            if value.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
                return Ok(Extracted::Done);
            }
            let text = value
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(Extracted::Delta(text.to_string()))
        }
        ProviderKind::OpenAi => {
            // the framing-level [DONE] marker is the authoritative terminal
            // signal; finish_reason is never used to infer termination
            let text = value
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(Extracted::Delta(text.to_string()))
        }
    }
}

fn provider_error_message(error: &serde_json::Value) -> String {
    error
        .get("message")
        .and_then(|v| v.as_str())
        .or_else(|| error.as_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| error.to_string())
}

/// Builds the normalized event stream for one request.
///
/// Frames decoded after the terminal signal are dropped; the sequence index
/// restarts at 0 per stream and counts every delta, including empty ones.
pub(crate) fn normalized_event_stream(
    provider_id: ProviderId,
    kind: ProviderKind,
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<ProviderEvent, ProviderError>> + Send {
    struct State {
        provider_id: ProviderId,
        kind: ProviderKind,
        bytes_stream: ByteStream,
        decoder: FrameDecoder,
        pending: VecDeque<ProviderEvent>,
        seq: u64,
        terminal_seen: bool,
        exhausted: bool,
    }

    fn enqueue(state: &mut State, frames: Vec<Frame>) -> Result<(), ProviderError> {
        for frame in frames {
            if state.terminal_seen {
                break;
            }
            match frame {
                Frame::Payload(payload) => {
                    match extract(state.kind, &state.provider_id, &payload)? {
                        Extracted::Delta(text) => {
                            state
                                .pending
                                .push_back(ProviderEvent::Delta(Delta::fragment(state.seq, text)));
                            state.seq += 1;
                        }
                        Extracted::Done => {
                            state.pending.push_back(ProviderEvent::Completed);
                            state.terminal_seen = true;
                        }
                    }
                }
                Frame::End => {
                    state.pending.push_back(ProviderEvent::Completed);
                    state.terminal_seen = true;
                }
            }
        }
        Ok(())
    }

    stream::try_unfold(
        State {
            decoder: FrameDecoder::new(kind.framing()),
            provider_id,
            kind,
            bytes_stream,
            pending: VecDeque::new(),
            seq: 0,
            terminal_seen: false,
            exhausted: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.exhausted || state.terminal_seen {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        let frames = state.decoder.push_chunk(&chunk).map_err(|e| {
                            ProviderError::decode(state.provider_id.clone(), e.to_string())
                        })?;
                        enqueue(&mut state, frames)?;
                    }
                    Some(Err(e)) => {
                        return Err(ProviderError::transport(
                            state.provider_id.clone(),
                            format!("streaming read failed: {e}"),
                        ));
                    }
                    None => {
                        state.exhausted = true;
                        let frames = state.decoder.finish().map_err(|e| {
                            ProviderError::decode(state.provider_id.clone(), e.to_string())
                        })?;
                        enqueue(&mut state, frames)?;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderId {
        ProviderId::new("test")
    }

    fn byte_stream(chunks: Vec<&'static [u8]>) -> ByteStream {
        let items: Vec<Result<bytes::Bytes, std::io::Error>> = chunks
            .into_iter()
            .map(|c| Ok(bytes::Bytes::from_static(c)))
            .collect();
        Box::pin(stream::iter(items))
    }

    async fn collect_events(
        kind: ProviderKind,
        chunks: Vec<&'static [u8]>,
    ) -> Vec<Result<ProviderEvent, ProviderError>> {
        normalized_event_stream(provider(), kind, byte_stream(chunks))
            .collect::<Vec<_>>()
            .await
    }

    #[test]
    fn ollama_content_delta() {
        let extracted = extract(
            ProviderKind::Ollama,
            &provider(),
            r#"{"message":{"content":"Hel"}}"#,
        )
        .expect("extract");
        assert_eq!(extracted, Extracted::Delta("Hel".into()));
    }

    #[test]
    fn ollama_done_true_is_terminal() {
        let extracted =
            extract(ProviderKind::Ollama, &provider(), r#"{"done":true}"#).expect("extract");
        assert_eq!(extracted, Extracted::Done);
    }

    #[test]
    fn ollama_done_false_with_content_is_a_delta() {
        let extracted = extract(
            ProviderKind::Ollama,
            &provider(),
            r#"{"message":{"content":"x"},"done":false}"#,
        )
        .expect("extract");
        assert_eq!(extracted, Extracted::Delta("x".into()));
    }

    #[test]
    fn missing_content_is_empty_heartbeat_not_error() {
        let extracted = extract(
            ProviderKind::Ollama,
            &provider(),
            r#"{"model":"llama3","created_at":"now"}"#,
        )
        .expect("extract");
        assert_eq!(extracted, Extracted::Delta(String::new()));

        let extracted = extract(
            ProviderKind::OpenAi,
            &provider(),
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        )
        .expect("extract");
        assert_eq!(extracted, Extracted::Delta(String::new()));
    }

    #[test]
    fn openai_delta_content() {
        let extracted = extract(
            ProviderKind::OpenAi,
            &provider(),
            r#"{"choices":[{"delta":{"content":"Hi"}}]}"#,
        )
        .expect("extract");
        assert_eq!(extracted, Extracted::Delta("Hi".into()));
    }

    #[test]
    fn provider_error_payload_message_is_verbatim() {
        let err = extract(
            ProviderKind::OpenAi,
            &provider(),
            r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#,
        )
        .expect_err("should fail");
        assert!(matches!(err, ProviderError::Provider { ref message, .. } if message == "quota exceeded"));

        // Ollama reports errors as a plain string
        let err = extract(
            ProviderKind::Ollama,
            &provider(),
            r#"{"error":"model not found"}"#,
        )
        .expect_err("should fail");
        assert!(matches!(err, ProviderError::Provider { ref message, .. } if message == "model not found"));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let err = extract(
            ProviderKind::Ollama,
            &provider(),
            r#"{"message":{content:"x"}}"#,
        )
        .expect_err("should fail");
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[tokio::test]
    async fn ndjson_stream_normalizes_in_order_with_sequence_indexes() {
        let events = collect_events(
            ProviderKind::Ollama,
            vec![b"{\"message\":{\"content\":\"Hel\"}}\n{\"message\":{\"content\":\"lo\"}}\n{\"done\":true}\n"],
        )
        .await;

        let events: Vec<ProviderEvent> =
            events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![
                ProviderEvent::Delta(Delta::fragment(0, "Hel")),
                ProviderEvent::Delta(Delta::fragment(1, "lo")),
                ProviderEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn sse_stream_completes_on_done_marker_without_forwarding_it() {
        let events = collect_events(
            ProviderKind::OpenAi,
            vec![b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n"],
        )
        .await;

        let events: Vec<ProviderEvent> =
            events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![
                ProviderEvent::Delta(Delta::fragment(0, "Hi")),
                ProviderEvent::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn frames_after_terminal_signal_are_dropped() {
        let events = collect_events(
            ProviderKind::Ollama,
            vec![b"{\"done\":true}\n{\"message\":{\"content\":\"late\"}}\n"],
        )
        .await;

        let events: Vec<ProviderEvent> =
            events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(events, vec![ProviderEvent::Completed]);
    }

    #[tokio::test]
    async fn stream_close_without_terminal_signal_just_ends() {
        let events = collect_events(
            ProviderKind::Ollama,
            vec![b"{\"message\":{\"content\":\"x\"}}\n"],
        )
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Ok(ProviderEvent::Delta(ref d)) if d.text == "x"
        ));
    }

    #[tokio::test]
    async fn transport_error_mid_stream_surfaces_as_transport() {
        let items: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from_static(
                b"{\"message\":{\"content\":\"a\"}}\n",
            )),
            Err(std::io::Error::other("connection reset")),
        ];
        let events = normalized_event_stream(
            provider(),
            ProviderKind::Ollama,
            Box::pin(stream::iter(items)),
        )
        .collect::<Vec<_>>()
        .await;

        assert!(matches!(events[0], Ok(ProviderEvent::Delta(_))));
        assert!(matches!(events[1], Err(ProviderError::Transport { .. })));
    }

    #[tokio::test]
    async fn malformed_frame_mid_stream_is_fatal_decode_error() {
        let events = collect_events(
            ProviderKind::Ollama,
            vec![b"{\"message\":{content:\"x\"}}\n"],
        )
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ProviderError::Decode { .. })));
    }

    #[tokio::test]
    async fn empty_heartbeat_deltas_keep_sequence_contiguous() {
        let events = collect_events(
            ProviderKind::Ollama,
            vec![b"{\"model\":\"m\"}\n{\"message\":{\"content\":\"hi\"}}\n{\"done\":true}\n"],
        )
        .await;

        let events: Vec<ProviderEvent> =
            events.into_iter().map(|e| e.expect("event")).collect();
        assert_eq!(
            events,
            vec![
                ProviderEvent::Delta(Delta::fragment(0, "")),
                ProviderEvent::Delta(Delta::fragment(1, "hi")),
                ProviderEvent::Completed,
            ]
        );
    }
}
