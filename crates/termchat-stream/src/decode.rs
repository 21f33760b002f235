//! Provider line decoder: splits a raw byte stream into provider-specific
//! framing units before any JSON parsing happens.
//!
//! The framing dialect is chosen once at construction; nothing downstream
//! inspects bytes again.

/// Framing dialect used by a provider's streaming endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per newline-terminated line (Ollama `/api/chat`).
    Ndjson,
    /// Server-Sent-Events `data:` records separated by a blank line
    /// (OpenAI `/v1/chat/completions`).
    Sse,
}

/// One decoded framing unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw payload of one logical message boundary, not yet parsed as JSON.
    Payload(String),
    /// Framing-level end-of-stream marker (`data: [DONE]`), never forwarded
    /// as a payload.
    End,
}

/// A framing unit could not be cut from the byte stream, for example an
/// unterminated multi-byte sequence left over at stream close.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid UTF-8 in stream frame (valid up to byte {valid_up_to})")]
pub struct DecodeError {
    pub valid_up_to: usize,
}

/// Incremental frame decoder over raw transport chunks.
///
/// Push chunks as they arrive; call `finish` once when the byte stream
/// closes so buffered trailing data is either emitted or rejected rather
/// than silently dropped.
pub struct FrameDecoder {
    framing: Framing,
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates a decoder for the given framing dialect.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buf: Vec::new(),
        }
    }

    /// Consumes one transport chunk and returns every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, DecodeError> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        match self.framing {
            Framing::Ndjson => {
                while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
                    // drop the newline terminator, keep the line untouched
                    if let Some(frame) = ndjson_frame(&line_bytes[..line_bytes.len() - 1])? {
                        frames.push(frame);
                    }
                }
            }
            Framing::Sse => {
                while let Some((idx, delim_len)) = find_record_delimiter(&self.buf) {
                    let record_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).collect();
                    if let Some(frame) = sse_frame(&record_bytes[..idx])? {
                        frames.push(frame);
                    }
                }
            }
        }
        Ok(frames)
    }

    /// Flushes data still buffered when the byte stream closes.
    ///
    /// An NDJSON line without a trailing newline and an SSE record without a
    /// blank-line terminator are both legal at end of stream; malformed
    /// leftovers are an error.
    pub fn finish(&mut self) -> Result<Vec<Frame>, DecodeError> {
        let rest = std::mem::take(&mut self.buf);
        if rest.is_empty() {
            return Ok(Vec::new());
        }
        let frame = match self.framing {
            Framing::Ndjson => ndjson_frame(&rest)?,
            Framing::Sse => sse_frame(&rest)?,
        };
        Ok(frame.into_iter().collect())
    }
}

fn frame_str(bytes: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|e| DecodeError {
        valid_up_to: e.valid_up_to(),
    })
}

fn ndjson_frame(bytes: &[u8]) -> Result<Option<Frame>, DecodeError> {
    let line = frame_str(bytes)?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(Frame::Payload(line.to_string())))
}

fn find_record_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn sse_frame(bytes: &[u8]) -> Result<Option<Frame>, DecodeError> {
    let text = frame_str(bytes)?;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("data:") {
            // at most one leading space belongs to the field separator
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return Ok(None);
    }
    let data = data_lines.join("\n");
    if data.trim() == "[DONE]" {
        return Ok(Some(Frame::End));
    }
    Ok(Some(Frame::Payload(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(frames: Vec<Frame>) -> Vec<String> {
        frames
            .into_iter()
            .map(|f| match f {
                Frame::Payload(p) => p,
                Frame::End => panic!("unexpected end frame"),
            })
            .collect()
    }

    #[test]
    fn ndjson_splits_lines_and_skips_blanks() {
        let mut decoder = FrameDecoder::new(Framing::Ndjson);
        let frames = decoder
            .push_chunk(b"{\"a\":1}\n\n   \n{\"b\":2}\n")
            .expect("decode");
        assert_eq!(payloads(frames), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn ndjson_handles_partial_chunk_boundaries() {
        let mut decoder = FrameDecoder::new(Framing::Ndjson);
        assert!(decoder.push_chunk(b"{\"message\":{\"con").expect("decode").is_empty());
        let frames = decoder.push_chunk(b"tent\":\"Hel\"}}\n").expect("decode");
        assert_eq!(payloads(frames), vec!["{\"message\":{\"content\":\"Hel\"}}"]);
    }

    #[test]
    fn ndjson_does_not_trim_inside_lines() {
        let mut decoder = FrameDecoder::new(Framing::Ndjson);
        let frames = decoder.push_chunk(b"  {\"a\":1}  \n").expect("decode");
        assert_eq!(payloads(frames), vec!["  {\"a\":1}  "]);
    }

    #[test]
    fn ndjson_finish_emits_unterminated_trailing_line() {
        let mut decoder = FrameDecoder::new(Framing::Ndjson);
        assert!(decoder.push_chunk(b"{\"done\":true}").expect("decode").is_empty());
        let frames = decoder.finish().expect("finish");
        assert_eq!(payloads(frames), vec!["{\"done\":true}"]);
        assert!(decoder.finish().expect("second finish").is_empty());
    }

    #[test]
    fn ndjson_unterminated_multibyte_at_close_is_decode_error() {
        let mut decoder = FrameDecoder::new(Framing::Ndjson);
        // first two bytes of a three-byte UTF-8 sequence, then stream close
        assert!(decoder.push_chunk(&[b'"', 0xE2, 0x82]).expect("decode").is_empty());
        let err = decoder.finish().expect_err("should reject");
        assert_eq!(err.valid_up_to, 1);
    }

    #[test]
    fn ndjson_invalid_utf8_inside_completed_line_is_decode_error() {
        let mut decoder = FrameDecoder::new(Framing::Ndjson);
        let err = decoder
            .push_chunk(&[b'{', 0xFF, b'}', b'\n'])
            .expect_err("should reject");
        assert_eq!(err.valid_up_to, 1);
    }

    #[test]
    fn sse_keeps_only_data_lines_and_strips_one_space() {
        let mut decoder = FrameDecoder::new(Framing::Sse);
        let frames = decoder
            .push_chunk(b"event: message\ndata:  spaced\n\n")
            .expect("decode");
        // one space is the field separator, the second is payload
        assert_eq!(payloads(frames), vec![" spaced"]);
    }

    #[test]
    fn sse_handles_partial_chunk_boundaries() {
        let mut decoder = FrameDecoder::new(Framing::Sse);
        let part1 = b"data: {\"choices\":[{\"delta\":{\"content\":\"hel";
        let part2 = b"lo\"}}]}\n\n";
        assert!(decoder.push_chunk(part1).expect("decode").is_empty());
        let frames = decoder.push_chunk(part2).expect("decode");
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Frame::Payload(p) if p.contains("hello")));
    }

    #[test]
    fn sse_record_without_data_line_yields_no_frame() {
        let mut decoder = FrameDecoder::new(Framing::Sse);
        let frames = decoder
            .push_chunk(b"event: ping\n: comment\n\n")
            .expect("decode");
        assert!(frames.is_empty());
    }

    #[test]
    fn sse_done_marker_yields_end_frame() {
        let mut decoder = FrameDecoder::new(Framing::Sse);
        let frames = decoder.push_chunk(b"data: [DONE]\n\n").expect("decode");
        assert_eq!(frames, vec![Frame::End]);
    }

    #[test]
    fn sse_crlf_record_separator_is_accepted() {
        let mut decoder = FrameDecoder::new(Framing::Sse);
        let frames = decoder
            .push_chunk(b"data: {\"x\":1}\r\n\r\ndata: [DONE]\r\n\r\n")
            .expect("decode");
        assert_eq!(
            frames,
            vec![Frame::Payload("{\"x\":1}".into()), Frame::End]
        );
    }

    #[test]
    fn sse_joins_multiple_data_lines_with_newline() {
        let mut decoder = FrameDecoder::new(Framing::Sse);
        let frames = decoder.push_chunk(b"data: a\ndata: b\n\n").expect("decode");
        assert_eq!(payloads(frames), vec!["a\nb"]);
    }

    #[test]
    fn sse_finish_parses_unterminated_trailing_record() {
        let mut decoder = FrameDecoder::new(Framing::Sse);
        assert!(decoder.push_chunk(b"data: tail\n").expect("decode").is_empty());
        let frames = decoder.finish().expect("finish");
        assert_eq!(payloads(frames), vec!["tail"]);
    }
}
