// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame codec for `tokio_util::codec::Framed`.
//!
//! The decoder never consumes a partial frame: msgpack reads that run out
//! of bytes leave the buffer untouched and wait for more. Malformed
//! msgpack and structurally-invalid frames are fatal for the connection.

use std::io::Cursor;

use bytes::{Buf, BytesMut};
use rmpv::Value;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use drover_core::{codes, Fault};

use crate::frame::Frame;
use crate::hpack::{HpackDecoder, HpackEncoder, HpackError};

/// Default cap on a single frame, decoded or encoded.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Errors from framing. All but `Io` are protocol-fatal.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed msgpack on the wire: {0}")]
    Parse(String),
    #[error("invalid frame structure: {0}")]
    FrameFormat(String),
    #[error("frame of {0} bytes breaches the frame size limit")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Hpack(#[from] HpackError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// The fault sent in a `goaway` before the session closes.
    pub fn fault(&self) -> Fault {
        match self {
            WireError::Parse(reason) => Fault::new(codes::PARSE_ERROR, reason.clone()),
            WireError::FrameFormat(reason) => {
                Fault::new(codes::FRAME_FORMAT_ERROR, reason.clone())
            }
            WireError::FrameTooLarge(len) => Fault::new(
                codes::FRAME_TOO_LARGE,
                format!("frame of {} bytes is too large", len),
            ),
            WireError::Hpack(err) => Fault::new(codes::FRAME_FORMAT_ERROR, err.to_string()),
            WireError::Io(err) => Fault::new(codes::PARSE_ERROR, err.to_string()),
        }
    }
}

/// Msgpack frame codec with per-direction HPACK tables.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_len: usize,
    headers_tx: HpackEncoder,
    headers_rx: HpackDecoder,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            headers_tx: HpackEncoder::new(),
            headers_rx: HpackDecoder::new(),
        }
    }

    fn parse(&mut self, value: Value) -> Result<Frame, WireError> {
        let elements = match value {
            Value::Array(elements) => elements,
            other => {
                return Err(WireError::FrameFormat(format!(
                    "expected a frame array, got {}",
                    other
                )))
            }
        };
        if elements.len() < 3 || elements.len() > 4 {
            return Err(WireError::FrameFormat(format!(
                "frame must have 3 or 4 elements, got {}",
                elements.len()
            )));
        }
        let mut elements = elements.into_iter();

        let channel = elements
            .next()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| WireError::FrameFormat("channel id is not an unsigned int".into()))?;
        let message_id = elements
            .next()
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| WireError::FrameFormat("message id is not a u32".into()))?;
        let args = match elements.next() {
            Some(Value::Array(args)) => args,
            _ => return Err(WireError::FrameFormat("argument list is not an array".into())),
        };
        let headers = match elements.next() {
            None => Vec::new(),
            Some(Value::Binary(block)) => self.headers_rx.decode(&block)?,
            Some(_) => {
                return Err(WireError::FrameFormat(
                    "header block is not a binary string".into(),
                ))
            }
        };

        Ok(Frame {
            channel,
            message_id,
            args,
            headers,
        })
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn is_short_read(err: &rmpv::decode::Error) -> bool {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(io) | rmpv::decode::Error::InvalidDataRead(io) => {
            io.kind() == std::io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        if src.is_empty() {
            return Ok(None);
        }
        let mut cursor = Cursor::new(&src[..]);
        let value = match rmpv::decode::read_value(&mut cursor) {
            Ok(value) => value,
            Err(err) if is_short_read(&err) => {
                // Insufficient bytes. A partial frame already past the cap
                // can never complete legally.
                if src.len() > self.max_frame_len {
                    return Err(WireError::FrameTooLarge(src.len()));
                }
                return Ok(None);
            }
            Err(err) => return Err(WireError::Parse(err.to_string())),
        };
        let consumed = cursor.position() as usize;
        if consumed > self.max_frame_len {
            return Err(WireError::FrameTooLarge(consumed));
        }
        src.advance(consumed);
        self.parse(value).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WireError> {
        let mut elements = vec![
            Value::from(frame.channel),
            Value::from(frame.message_id),
            Value::Array(frame.args),
        ];
        if !frame.headers.is_empty() {
            let block = self.headers_tx.encode(&frame.headers);
            elements.push(Value::Binary(block));
        }

        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::Array(elements))
            .map_err(|err| WireError::Parse(err.to_string()))?;
        if buf.len() > self.max_frame_len {
            return Err(WireError::FrameTooLarge(buf.len()));
        }
        dst.extend_from_slice(&buf);
        Ok(())
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
