// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-wire: the framed RPC transport layer.
//!
//! Frames are msgpack arrays `[channel, message_id, args]` with an
//! optional fourth element carrying an HPACK-compressed header block.
//! [`FrameCodec`] plugs into `tokio_util::codec::Framed` on any byte
//! stream (TCP, UNIX domain, in-process duplex).

pub mod codec;
pub mod frame;
pub mod hpack;

pub use codec::{FrameCodec, WireError, MAX_FRAME_LEN};
pub use frame::{Frame, Header};
pub use hpack::{HpackDecoder, HpackEncoder, HpackError};
