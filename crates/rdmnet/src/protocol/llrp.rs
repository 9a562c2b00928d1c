// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLRP PDU codec (E1.33 Sec.5).
//!
//! LLRP messages travel in UDP datagrams: ACN UDP preamble, root layer PDU
//! with the LLRP vector, then the LLRP PDU:
//!
//! ```text
//! +------------------+------------+---------------+------------------+
//! | flags+length (3) | vector (4) | dest CID (16) | transaction (4)  |
//! +------------------+------------+---------------+------------------+
//! | Probe Request / Probe Reply / RDM Command sub-PDU                |
//! +-------------------------------------------------------------------+
//! ```
//!
//! Probe requests address the broadcast CID; everything else is unicast by
//! CID even though it rides multicast groups on the wire.

use super::acn;
use super::consts::*;
use super::cursor::{Cursor, CursorMut};
use super::rdm::RdmBuffer;
use super::types::LlrpComponentType;
use super::{Layer, ParseError, ParseResult};
use crate::{Cid, RdmUid};

/// The destination CID placed in probe requests, addressing every target.
pub const LLRP_BROADCAST_CID: Cid = Cid::from_bytes([0xff; 16]);

/// LLRP probe request: discover targets whose UID lies in a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub lower_uid: RdmUid,
    pub upper_uid: RdmUid,
    /// Combination of `LLRP_FILTERVAL_*` bits.
    pub filter: u16,
    /// Targets already discovered; they suppress their replies.
    pub known_uids: Vec<RdmUid>,
}

impl ProbeRequest {
    /// True if `uid` falls within this probe's discovery range.
    pub fn uid_in_range(&self, uid: &RdmUid) -> bool {
        let v = uid.as_u64();
        v >= self.lower_uid.as_u64() && v <= self.upper_uid.as_u64()
    }
}

/// LLRP probe reply: a target announcing itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReply {
    pub uid: RdmUid,
    pub hardware_address: [u8; 6],
    pub component_type: LlrpComponentType,
}

/// Vector-specific half of an LLRP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlrpMessageData {
    ProbeRequest(ProbeRequest),
    ProbeReply(ProbeReply),
    /// A full RDM command or response packet.
    RdmCommand(RdmBuffer),
}

/// One complete LLRP message, preamble to payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlrpMessage {
    pub sender_cid: Cid,
    pub dest_cid: Cid,
    pub transaction_num: u32,
    pub data: LlrpMessageData,
}

impl LlrpMessage {
    pub fn vector(&self) -> u32 {
        match self.data {
            LlrpMessageData::ProbeRequest(_) => VECTOR_LLRP_PROBE_REQUEST,
            LlrpMessageData::ProbeReply(_) => VECTOR_LLRP_PROBE_REPLY,
            LlrpMessageData::RdmCommand(_) => VECTOR_LLRP_RDM_CMD,
        }
    }

    fn data_size(&self) -> usize {
        match &self.data {
            LlrpMessageData::ProbeRequest(req) => {
                PROBE_REQUEST_MIN_SIZE + req.known_uids.len() * 6
            }
            LlrpMessageData::ProbeReply(_) => PROBE_REPLY_SIZE,
            LlrpMessageData::RdmCommand(buf) => 3 + buf.len(),
        }
    }

    /// Exact size of the full UDP datagram for this message.
    pub fn size_of(&self) -> usize {
        ACN_UDP_PREAMBLE_SIZE + ACN_ROOT_PDU_HEADER_SIZE + LLRP_PDU_HEADER_SIZE + self.data_size()
    }

    /// Pack the complete datagram (UDP preamble included) into `buf`.
    ///
    /// Returns the number of bytes written.
    pub fn pack(&self, buf: &mut [u8]) -> ParseResult<usize> {
        let total = self.size_of();
        if buf.len() < total {
            return Err(ParseError::BufferTooSmall);
        }
        let mut w = CursorMut::new(buf);
        acn::pack_udp_preamble(&mut w)?;
        acn::pack_root_header(
            &mut w,
            VECTOR_ROOT_LLRP,
            &self.sender_cid,
            LLRP_PDU_HEADER_SIZE + self.data_size(),
        )?;
        w.write_flags_length(LLRP_PDU_HEADER_SIZE + self.data_size())?;
        w.write_u32(self.vector())?;
        w.write_bytes(self.dest_cid.as_bytes())?;
        w.write_u32(self.transaction_num)?;
        match &self.data {
            LlrpMessageData::ProbeRequest(req) => {
                if req.known_uids.len() > LLRP_KNOWN_UID_SIZE {
                    return Err(ParseError::BufferTooSmall);
                }
                w.write_flags_length(self.data_size())?;
                w.write_u8(VECTOR_PROBE_REQUEST_DATA)?;
                w.write_bytes(&req.lower_uid.to_bytes())?;
                w.write_bytes(&req.upper_uid.to_bytes())?;
                w.write_u16(req.filter)?;
                for uid in &req.known_uids {
                    w.write_bytes(&uid.to_bytes())?;
                }
            }
            LlrpMessageData::ProbeReply(reply) => {
                w.write_flags_length(PROBE_REPLY_SIZE)?;
                w.write_u8(VECTOR_PROBE_REPLY_DATA)?;
                w.write_bytes(&reply.uid.to_bytes())?;
                w.write_bytes(&reply.hardware_address)?;
                w.write_u8(reply.component_type.to_wire())?;
            }
            LlrpMessageData::RdmCommand(rdm) => {
                // The RDM start code doubles as the sub-PDU vector.
                w.write_flags_length(3 + rdm.len())?;
                w.write_bytes(rdm.as_slice())?;
            }
        }
        debug_assert_eq!(w.offset(), total);
        Ok(total)
    }

    /// Parse a complete LLRP datagram (UDP preamble included).
    pub fn parse(bytes: &[u8]) -> ParseResult<Self> {
        let mut r = Cursor::new(bytes);
        acn::parse_udp_preamble(&mut r)?;
        let root = acn::parse_root_header(&mut r)?;
        if root.vector != VECTOR_ROOT_LLRP {
            return Err(ParseError::UnsupportedVector {
                layer: Layer::Root,
                vector: root.vector,
            });
        }
        let pdu_len = r.read_flags_length()?;
        if pdu_len < LLRP_PDU_HEADER_SIZE {
            return Err(ParseError::Malformed);
        }
        let vector = r.read_u32()?;
        let dest_cid = Cid::from_bytes(r.read_array::<16>()?);
        let transaction_num = r.read_u32()?;
        let mut body = r.sub_cursor(pdu_len - LLRP_PDU_HEADER_SIZE)?;
        let data = match vector {
            VECTOR_LLRP_PROBE_REQUEST => {
                let sub_len = body.read_flags_length()?;
                if sub_len < PROBE_REQUEST_MIN_SIZE || (sub_len - PROBE_REQUEST_MIN_SIZE) % 6 != 0 {
                    return Err(ParseError::Malformed);
                }
                if body.read_u8()? != VECTOR_PROBE_REQUEST_DATA {
                    return Err(ParseError::Malformed);
                }
                let lower_uid = RdmUid::from_bytes(body.read_array::<6>()?);
                let upper_uid = RdmUid::from_bytes(body.read_array::<6>()?);
                let filter = body.read_u16()?;
                let num_known = (sub_len - PROBE_REQUEST_MIN_SIZE) / 6;
                if num_known > LLRP_KNOWN_UID_SIZE {
                    return Err(ParseError::Malformed);
                }
                let mut known_uids = Vec::with_capacity(num_known);
                for _ in 0..num_known {
                    known_uids.push(RdmUid::from_bytes(body.read_array::<6>()?));
                }
                LlrpMessageData::ProbeRequest(ProbeRequest {
                    lower_uid,
                    upper_uid,
                    filter,
                    known_uids,
                })
            }
            VECTOR_LLRP_PROBE_REPLY => {
                let sub_len = body.read_flags_length()?;
                if sub_len != PROBE_REPLY_SIZE {
                    return Err(ParseError::Malformed);
                }
                if body.read_u8()? != VECTOR_PROBE_REPLY_DATA {
                    return Err(ParseError::Malformed);
                }
                let uid = RdmUid::from_bytes(body.read_array::<6>()?);
                let hardware_address = body.read_array::<6>()?;
                let component_type = LlrpComponentType::from_wire(body.read_u8()?)?;
                LlrpMessageData::ProbeReply(ProbeReply {
                    uid,
                    hardware_address,
                    component_type,
                })
            }
            VECTOR_LLRP_RDM_CMD => {
                let sub_len = body.read_flags_length()?;
                if sub_len < 3 + RDM_MIN_BYTES {
                    return Err(ParseError::Malformed);
                }
                let raw = body.read_bytes(sub_len - 3)?;
                let buf = RdmBuffer::from_slice(raw)?;
                buf.validate()?;
                LlrpMessageData::RdmCommand(buf)
            }
            other => {
                return Err(ParseError::UnsupportedVector {
                    layer: Layer::Llrp,
                    vector: other,
                })
            }
        };
        Ok(LlrpMessage {
            sender_cid: root.sender_cid,
            dest_cid,
            transaction_num,
            data,
        })
    }
}
