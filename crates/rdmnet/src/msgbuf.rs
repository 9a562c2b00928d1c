// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP stream reassembler.
//!
//! TCP gives us a byte stream; RDMnet frames are delimited by the ACN TCP
//! preamble's block-length field. The reassembler accumulates received
//! bytes and yields exactly one parsed message per wire frame:
//!
//! ```text
//! +----------------+-----------------------------+
//! | feed(bytes)    |  append, never blocks       |
//! +----------------+-----------------------------+
//! | poll()         |  Empty | Complete | Error   |
//! +----------------+-----------------------------+
//! ```
//!
//! After `Complete`, `poll` may be called again without new input until the
//! buffer drains. On `Error` the caller must close the connection; the
//! buffer never discards bytes silently. A frame whose framing is intact
//! but whose vector is unknown is skipped with a log line instead of
//! killing the connection.

use crate::protocol::consts::{ACN_PACKET_IDENT, ACN_TCP_PREAMBLE_SIZE, RDMNET_MAX_FRAME_SIZE};
use crate::protocol::{ParseError, RdmnetMessage};

/// Result of one [`MsgBuf::poll`] call.
#[derive(Debug)]
pub enum MsgBufPoll {
    /// No complete frame is buffered; feed more bytes.
    Empty,
    /// One complete message.
    Complete(RdmnetMessage),
    /// Unrecoverable framing damage; the connection must close.
    Error(ParseError),
}

/// Per-connection receive buffer and frame extractor.
pub struct MsgBuf {
    accumulator: Vec<u8>,
    pos: usize,
    frames_parsed: u64,
    frames_skipped: u64,
}

impl MsgBuf {
    pub fn new() -> Self {
        Self {
            accumulator: Vec::with_capacity(4096),
            pos: 0,
            frames_parsed: 0,
            frames_skipped: 0,
        }
    }

    /// Append received bytes. Never blocks, never fails.
    pub fn feed(&mut self, bytes: &[u8]) {
        // Compact once the consumed prefix dominates the buffer.
        if self.pos > 0 && self.pos > self.accumulator.len() / 2 {
            self.accumulator.drain(..self.pos);
            self.pos = 0;
        }
        self.accumulator.extend_from_slice(bytes);
    }

    /// Extract the next complete message, if any.
    pub fn poll(&mut self) -> MsgBufPoll {
        loop {
            let buffered = &self.accumulator[self.pos..];
            if buffered.len() < ACN_TCP_PREAMBLE_SIZE {
                return MsgBufPoll::Empty;
            }
            if &buffered[..ACN_PACKET_IDENT.len()] != ACN_PACKET_IDENT {
                return MsgBufPoll::Error(ParseError::Malformed);
            }
            let block_len = u32::from_be_bytes([
                buffered[12],
                buffered[13],
                buffered[14],
                buffered[15],
            ]) as usize;
            let frame_len = ACN_TCP_PREAMBLE_SIZE + block_len;
            if frame_len > RDMNET_MAX_FRAME_SIZE {
                return MsgBufPoll::Error(ParseError::Oversize {
                    declared: frame_len,
                });
            }
            if buffered.len() < frame_len {
                return MsgBufPoll::Empty;
            }

            match RdmnetMessage::parse(&buffered[..frame_len]) {
                Ok((msg, consumed)) => {
                    debug_assert_eq!(consumed, frame_len);
                    self.pos += frame_len;
                    self.frames_parsed += 1;
                    return MsgBufPoll::Complete(msg);
                }
                Err(err @ ParseError::UnsupportedVector { .. }) => {
                    // Framing is intact, so skip just this frame.
                    log::warn!("[CONN] skipping frame: {}", err);
                    self.pos += frame_len;
                    self.frames_skipped += 1;
                }
                Err(err) => return MsgBufPoll::Error(err),
            }
        }
    }

    /// Number of messages successfully parsed.
    pub fn frames_parsed(&self) -> u64 {
        self.frames_parsed
    }

    /// Number of well-framed but unsupported messages skipped.
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Bytes currently buffered and not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.accumulator.len() - self.pos
    }
}

impl Default for MsgBuf {
    fn default() -> Self {
        Self::new()
    }
}
