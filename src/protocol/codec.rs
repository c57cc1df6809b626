//! Line framing for the wire protocol (spec §4.G).
//!
//! One JSON object per line, `\n` terminated; a trailing `\r` is tolerated
//! but not required. This codec only handles framing — it decodes to a
//! `String`, leaving JSON parsing and schema validation to the connection
//! handler so that a framing fault (`MessageTooLarge`) stays distinct from
//! a schema fault (`BadRequest`).

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::messages::ServerMessage;

/// Suggested maximum line length (§4.G): 64 KiB.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("line exceeds {MAX_LINE_LENGTH} bytes")]
    TooLarge,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct LineCodec {
    /// Set once a frame over `MAX_LINE_LENGTH` without a newline has been
    /// observed, so the codec stops trying to find a (now meaningless) end
    /// to the oversized frame.
    discarding: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        loop {
            if let Some(newline_pos) = buf.iter().position(|&b| b == b'\n') {
                if self.discarding {
                    buf.advance(newline_pos + 1);
                    self.discarding = false;
                    return Err(CodecError::TooLarge);
                }

                let mut line = buf.split_to(newline_pos);
                buf.advance(1); // consume the '\n'
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                let text = String::from_utf8(line.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
                return Ok(Some(text));
            }

            if buf.len() > MAX_LINE_LENGTH {
                if self.discarding {
                    // Already flagged; keep dropping bytes until a newline turns up.
                    buf.clear();
                    return Ok(None);
                }
                self.discarding = true;
                buf.clear();
                return Err(CodecError::TooLarge);
            }

            return Ok(None);
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None if !buf.is_empty() && !self.discarding => {
                let line = std::mem::take(buf);
                let text = String::from_utf8(line.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<ServerMessage> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ServerMessage, dst: &mut BytesMut) -> Result<(), CodecError> {
        let text = serde_json::to_string(&item)?;
        dst.reserve(text.len() + 1);
        dst.extend_from_slice(text.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("{\"type\":\"leave_session\"}\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, r#"{"type":"leave_session"}"#);
        assert!(buf.is_empty());
    }

    #[test]
    fn tolerates_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("{\"type\":\"leave_session\"}\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, r#"{"type":"leave_session"}"#);
    }

    #[test]
    fn returns_none_on_incomplete_frame() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("{\"type\":\"leave");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decodes_multiple_lines_in_one_buffer() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), r#"{"a":1}"#);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), r#"{"b":2}"#);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_oversized_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'a'; MAX_LINE_LENGTH + 1]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::TooLarge));
    }

    #[test]
    fn encodes_with_trailing_newline_and_no_embedded_newlines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(ServerMessage::SessionLeft { session_id: "s1".into() }, &mut buf)
            .unwrap();
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
    }
}
