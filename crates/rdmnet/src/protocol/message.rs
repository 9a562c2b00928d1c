// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Top-level RDMnet TCP message type and frame entry points.

use super::acn;
use super::broker::BrokerMessage;
use super::consts::*;
use super::cursor::{Cursor, CursorMut};
use super::ept::EptMessage;
use super::rpt::RptMessage;
use super::{Layer, ParseError, ParseResult};
use crate::Cid;

/// Protocol-specific half of an RDMnet TCP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdmnetMessageData {
    Broker(BrokerMessage),
    Rpt(RptMessage),
    Ept(EptMessage),
}

/// One complete RDMnet TCP frame: preamble, root layer, protocol PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdmnetMessage {
    pub sender_cid: Cid,
    pub data: RdmnetMessageData,
}

impl RdmnetMessage {
    pub fn broker(sender_cid: Cid, msg: BrokerMessage) -> Self {
        Self {
            sender_cid,
            data: RdmnetMessageData::Broker(msg),
        }
    }

    pub fn rpt(sender_cid: Cid, msg: RptMessage) -> Self {
        Self {
            sender_cid,
            data: RdmnetMessageData::Rpt(msg),
        }
    }

    pub fn ept(sender_cid: Cid, msg: EptMessage) -> Self {
        Self {
            sender_cid,
            data: RdmnetMessageData::Ept(msg),
        }
    }

    fn root_vector(&self) -> u32 {
        match self.data {
            RdmnetMessageData::Broker(_) => VECTOR_ROOT_BROKER,
            RdmnetMessageData::Rpt(_) => VECTOR_ROOT_RPT,
            RdmnetMessageData::Ept(_) => VECTOR_ROOT_EPT,
        }
    }

    fn pdu_size(&self) -> usize {
        match &self.data {
            RdmnetMessageData::Broker(m) => m.size_of(),
            RdmnetMessageData::Rpt(m) => m.size_of(),
            RdmnetMessageData::Ept(m) => m.size_of(),
        }
    }

    /// Exact size of the full TCP frame, preamble included.
    pub fn size_of(&self) -> usize {
        ACN_TCP_PREAMBLE_SIZE + ACN_ROOT_PDU_HEADER_SIZE + self.pdu_size()
    }

    /// Pack the complete frame into `buf`, returning bytes written.
    pub fn pack(&self, buf: &mut [u8]) -> ParseResult<usize> {
        let total = self.size_of();
        if buf.len() < total {
            return Err(ParseError::BufferTooSmall);
        }
        let block_len = (ACN_ROOT_PDU_HEADER_SIZE + self.pdu_size()) as u32;
        let mut w = CursorMut::new(buf);
        acn::pack_tcp_preamble(&mut w, block_len)?;
        acn::pack_root_header(&mut w, self.root_vector(), &self.sender_cid, self.pdu_size())?;
        match &self.data {
            RdmnetMessageData::Broker(m) => m.pack(&mut w)?,
            RdmnetMessageData::Rpt(m) => m.pack(&mut w)?,
            RdmnetMessageData::Ept(m) => m.pack(&mut w)?,
        }
        debug_assert_eq!(w.offset(), total);
        Ok(total)
    }

    /// Parse one complete frame, returning the message and bytes consumed.
    ///
    /// `bytes` must begin at the TCP preamble and contain the whole frame
    /// (the reassembler guarantees this).
    pub fn parse(bytes: &[u8]) -> ParseResult<(Self, usize)> {
        let mut r = Cursor::new(bytes);
        let block_len = acn::parse_tcp_preamble(&mut r)? as usize;
        if block_len > r.remaining() {
            return Err(ParseError::Malformed);
        }
        let mut block = r.sub_cursor(block_len)?;
        let root = acn::parse_root_header(&mut block)?;
        if root.body_len != block.remaining() {
            return Err(ParseError::Malformed);
        }
        let data = match root.vector {
            VECTOR_ROOT_BROKER => RdmnetMessageData::Broker(BrokerMessage::parse(&mut block)?),
            VECTOR_ROOT_RPT => RdmnetMessageData::Rpt(RptMessage::parse(&mut block)?),
            VECTOR_ROOT_EPT => RdmnetMessageData::Ept(EptMessage::parse(&mut block)?),
            // LLRP never rides a TCP connection.
            other => {
                return Err(ParseError::UnsupportedVector {
                    layer: Layer::Root,
                    vector: other,
                })
            }
        };
        Ok((
            RdmnetMessage {
                sender_cid: root.sender_cid,
                data,
            },
            r.offset(),
        ))
    }

    /// Pack into a freshly allocated frame.
    pub fn pack_to_vec(&self) -> ParseResult<Vec<u8>> {
        let mut buf = vec![0u8; self.size_of()];
        self.pack(&mut buf)?;
        Ok(buf)
    }
}
