//! Decoder for the answer stream of `POST /admin/rag/chat/stream`.
//!
//! The backend writes server-sent-event style lines over a plain POST body:
//!
//! ```text
//! data: {"chunk": "Hi"}
//! data: {"chunk": " there"}
//! data: {"done": true, "references": [...]}
//! ```
//!
//! Network chunks do not respect line boundaries, so bytes are buffered
//! until a newline arrives. Lines that are not `data:` fields (blank
//! separators, `:` comments, `event:`/`id:`/`retry:`) are ignored.

use bytes::{Buf, BytesMut};
use serde::Deserialize;
use thiserror::Error;

use crate::models::Reference;

/// One decoded unit of the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatFrame {
    Chunk(String),
    Done { references: Vec<Reference> },
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("frame is not valid JSON ({message}): {line}")]
    InvalidJson { line: String, message: String },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    chunk: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    references: Option<Vec<Reference>>,
}

/// Decodes a single line. Returns no frames for lines that carry no payload.
pub fn decode_line(line: &str) -> Result<Vec<ChatFrame>, FrameError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: RawFrame = serde_json::from_str(payload).map_err(|e| FrameError::InvalidJson {
        line: payload.to_string(),
        message: e.to_string(),
    })?;

    let mut frames = Vec::with_capacity(2);
    if let Some(text) = raw.chunk.filter(|t| !t.is_empty()) {
        frames.push(ChatFrame::Chunk(text));
    }
    if raw.done == Some(true) {
        frames.push(ChatFrame::Done { references: raw.references.unwrap_or_default() });
    }
    Ok(frames)
}

/// Incremental line splitter over the raw byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<ChatFrame, FrameError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            Self::decode_into(&line, &mut out);
        }
        out
    }

    /// Decodes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<Result<ChatFrame, FrameError>> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            Self::decode_into(&rest, &mut out);
        }
        out
    }

    fn decode_into(line: &[u8], out: &mut Vec<Result<ChatFrame, FrameError>>) {
        match std::str::from_utf8(line) {
            Ok(text) => match decode_line(text) {
                Ok(frames) => out.extend(frames.into_iter().map(Ok)),
                Err(e) => out.push(Err(e)),
            },
            Err(_) => out.push(Err(FrameError::InvalidUtf8)),
        }
    }
}
