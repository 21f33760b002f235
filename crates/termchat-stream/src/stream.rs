use crate::errors::StreamFailure;

/// One incremental text fragment of a streamed model response.
///
/// Deltas are immutable once produced. `seq` is assigned by the extractor
/// layer and starts at 0 for every request; the aggregator rejects gaps and
/// repeats.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Delta {
    /// Position in the per-request delta sequence.
    pub seq: u64,
    /// Text fragment. May be empty: heartbeat and metadata-only frames are
    /// legal and never terminate a stream on their own.
    pub text: String,
    /// Set only on the last delta of a completed stream.
    pub is_final: bool,
}

impl Delta {
    pub(crate) fn fragment(seq: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            text: text.into(),
            is_final: false,
        }
    }

    pub(crate) fn terminal(seq: u64) -> Self {
        Self {
            seq,
            text: String::new(),
            is_final: true,
        }
    }
}

/// Lifecycle state of one streamed request.
///
/// `Completed`, `Cancelled`, and `Failed` are terminal; a handle transitions
/// into exactly one of them, exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Request accepted by the aggregator, transport not yet established.
    Pending,
    /// Transport established; deltas may arrive.
    Streaming,
    /// Provider signalled end-of-turn; accumulated text is final.
    Completed,
    /// Caller cancelled the stream. Not a failure.
    Cancelled,
    /// The stream failed; the reason is attached.
    Failed(StreamFailure),
}

impl StreamState {
    /// Returns true for `Completed`, `Cancelled`, and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Cancelled | StreamState::Failed(_)
        )
    }

    /// Returns the failure when the state is `Failed`.
    pub fn failure(&self) -> Option<&StreamFailure> {
        match self {
            StreamState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_terminal() {
        assert!(!StreamState::Pending.is_terminal());
        assert!(!StreamState::Streaming.is_terminal());
        assert!(StreamState::Completed.is_terminal());
        assert!(StreamState::Cancelled.is_terminal());
        assert!(StreamState::Failed(StreamFailure::Protocol { message: "x".into() }).is_terminal());
    }

    #[test]
    fn failure_accessor_only_set_when_failed() {
        let failed = StreamState::Failed(StreamFailure::Timeout { after_ms: 5 });
        assert!(failed.failure().is_some());
        assert!(StreamState::Cancelled.failure().is_none());
    }
}
