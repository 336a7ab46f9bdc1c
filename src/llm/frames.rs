//! Incremental decoding of the streaming `/generate` body.
//!
//! The backend writes one JSON object per frame, but a network read can end
//! anywhere: mid-object, mid-string, even mid-codepoint. Bytes are buffered
//! and fed to serde_json's streaming deserializer; complete values come out
//! in order and an unterminated tail stays buffered for the next read.

use crate::error::{RagError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateFrame {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every frame that is now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<GenerateFrame>> {
        self.buf.extend_from_slice(bytes);

        let (frames, consumed) = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buf).into_iter::<GenerateFrame>();
            let mut frames = Vec::new();
            loop {
                match stream.next() {
                    Some(Ok(frame)) => frames.push(frame),
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        return Err(RagError::protocol(format!("malformed frame: {}", e)))
                    }
                    None => break,
                }
            }
            (frames, stream.byte_offset())
        };

        self.buf.drain(..consumed);
        Ok(frames)
    }

    /// Bytes of an incomplete frame still waiting for the rest of their data
    pub fn pending(&self) -> usize {
        self.buf.iter().filter(|b| !b.is_ascii_whitespace()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> GenerateFrame {
        GenerateFrame {
            response: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_mid_object() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(br#"{"response":"He"#).unwrap().is_empty());
        assert!(decoder.pending() > 0);
        assert_eq!(
            decoder.push(br#"l","done":false}"#).unwrap(),
            vec![token("Hel")]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_batched_frames_in_one_read() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(b"{\"response\":\"a\",\"done\":false}\n{\"response\":\"b\",\"done\":false}\n{\"done\":")
            .unwrap();
        assert_eq!(frames, vec![token("a"), token("b")]);

        let last = decoder.push(b"true}\n").unwrap();
        assert_eq!(last.len(), 1);
        assert!(last[0].done);
    }

    #[test]
    fn test_braces_inside_strings() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(br#"{"response":"fn main() { } }{","done":false}"#)
            .unwrap();
        assert_eq!(frames, vec![token("fn main() { } }{")]);
    }

    #[test]
    fn test_split_inside_multibyte_char() {
        let bytes = r#"{"response":"größe","done":false}"#.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(decoder.push(&bytes[split..]).unwrap(), vec![token("größe")]);
    }

    #[test]
    fn test_error_frame_and_extra_fields() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(br#"{"model":"llama3","created_at":"now","error":"model not found"}"#)
            .unwrap();
        assert_eq!(frames[0].error.as_deref(), Some("model not found"));
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.push(b"not json").unwrap_err();
        assert!(matches!(err, RagError::Protocol(_)));
    }
}
