// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPT PDU messages (E1.33 Sec.7).
//!
//! Wire layout of an RPT PDU:
//!
//! ```text
//! +------------------+------------+---------------------------------+
//! | flags+length (3) | vector (4) | source UID (6) + endpoint (2)   |
//! |                  |            | dest UID (6) + endpoint (2)     |
//! |                  |            | seqnum (4) + reserved (1)       |
//! +------------------+------------+---------------------------------+
//! | Request / Status / Notification sub-PDU                         |
//! +------------------------------------------------------------------+
//! ```
//!
//! Requests and notifications carry one or more chained RDM Command PDUs;
//! each embedded RDM packet is validated (checksum, start code, PDL) at
//! parse time so routing code never forwards a corrupt command.

use super::consts::*;
use super::cursor::{Cursor, CursorMut};
use super::rdm::RdmBuffer;
use super::types::RptStatusCode;
use super::{Layer, ParseError, ParseResult};
use crate::RdmUid;

/// Addressing header present in every RPT PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RptHeader {
    pub source_uid: RdmUid,
    pub source_endpoint_id: u16,
    pub dest_uid: RdmUid,
    pub dest_endpoint_id: u16,
    pub seqnum: u32,
}

/// A chain of RDM command buffers carried by a request or notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RdmBufList {
    pub buffers: Vec<RdmBuffer>,
    /// Set when the sender split an oversize ACK_OVERFLOW chain across
    /// multiple notifications.
    pub more_coming: bool,
}

/// RPT status message: a delivery failure or condition report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RptStatusMsg {
    pub status_code: RptStatusCode,
    /// Optional human-readable detail, absent for most codes.
    pub status_string: Option<String>,
}

/// Vector-specific half of an RPT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RptMessageData {
    Request(RdmBufList),
    Status(RptStatusMsg),
    Notification(RdmBufList),
}

/// One RPT PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RptMessage {
    pub header: RptHeader,
    pub data: RptMessageData,
}

impl RptMessage {
    pub fn vector(&self) -> u32 {
        match self.data {
            RptMessageData::Request(_) => VECTOR_RPT_REQUEST,
            RptMessageData::Status(_) => VECTOR_RPT_STATUS,
            RptMessageData::Notification(_) => VECTOR_RPT_NOTIFICATION,
        }
    }

    /// Exact packed size of the RPT PDU, header included.
    pub fn size_of(&self) -> usize {
        RPT_PDU_HEADER_SIZE
            + match &self.data {
                RptMessageData::Request(list) | RptMessageData::Notification(list) => {
                    REQUEST_NOTIF_PDU_HEADER_SIZE + rdm_chain_size(list)
                }
                RptMessageData::Status(status) => {
                    RPT_STATUS_HEADER_SIZE
                        + status.status_string.as_ref().map_or(0, |s| s.len())
                }
            }
    }

    /// Pack the RPT PDU into the cursor.
    pub fn pack(&self, w: &mut CursorMut<'_>) -> ParseResult<()> {
        w.write_flags_length(self.size_of())?;
        w.write_u32(self.vector())?;
        w.write_bytes(&self.header.source_uid.to_bytes())?;
        w.write_u16(self.header.source_endpoint_id)?;
        w.write_bytes(&self.header.dest_uid.to_bytes())?;
        w.write_u16(self.header.dest_endpoint_id)?;
        w.write_u32(self.header.seqnum)?;
        w.write_u8(0)?; // reserved
        match &self.data {
            RptMessageData::Request(list) => {
                if list.buffers.len() != 1 {
                    // A request carries exactly one RDM command.
                    return Err(ParseError::Malformed);
                }
                pack_rdm_chain(w, VECTOR_REQUEST_RDM_CMD, list)
            }
            RptMessageData::Notification(list) => {
                if list.buffers.is_empty() {
                    return Err(ParseError::Malformed);
                }
                pack_rdm_chain(w, VECTOR_NOTIFICATION_RDM_CMD, list)
            }
            RptMessageData::Status(status) => {
                let str_len = status.status_string.as_ref().map_or(0, |s| s.len());
                w.write_flags_length(RPT_STATUS_HEADER_SIZE + str_len)?;
                w.write_u16(status.status_code.to_wire())?;
                if let Some(s) = &status.status_string {
                    w.write_bytes(s.as_bytes())?;
                }
                Ok(())
            }
        }
    }

    /// Parse one RPT PDU from the cursor.
    pub fn parse(r: &mut Cursor<'_>) -> ParseResult<Self> {
        let pdu_len = r.read_flags_length()?;
        if pdu_len < RPT_PDU_HEADER_SIZE {
            return Err(ParseError::Malformed);
        }
        let vector = r.read_u32()?;
        let header = RptHeader {
            source_uid: RdmUid::from_bytes(r.read_array::<6>()?),
            source_endpoint_id: r.read_u16()?,
            dest_uid: RdmUid::from_bytes(r.read_array::<6>()?),
            dest_endpoint_id: r.read_u16()?,
            seqnum: r.read_u32()?,
        };
        let _reserved = r.read_u8()?;
        let mut body = r.sub_cursor(pdu_len - RPT_PDU_HEADER_SIZE)?;
        let data = match vector {
            VECTOR_RPT_REQUEST => {
                let list = parse_rdm_chain(&mut body)?;
                if list.buffers.len() != 1 {
                    return Err(ParseError::Malformed);
                }
                RptMessageData::Request(list)
            }
            VECTOR_RPT_NOTIFICATION => RptMessageData::Notification(parse_rdm_chain(&mut body)?),
            VECTOR_RPT_STATUS => {
                let status_len = body.read_flags_length()?;
                if status_len < RPT_STATUS_HEADER_SIZE {
                    return Err(ParseError::Malformed);
                }
                let status_code = RptStatusCode::from_wire(body.read_u16()?)?;
                let str_len = status_len - RPT_STATUS_HEADER_SIZE;
                let status_string = if str_len > 0 {
                    if str_len > RPT_STATUS_STRING_MAXLEN {
                        return Err(ParseError::Malformed);
                    }
                    let raw = body.read_bytes(str_len)?;
                    Some(
                        std::str::from_utf8(raw)
                            .map_err(|_| ParseError::Malformed)?
                            .to_string(),
                    )
                } else {
                    None
                };
                RptMessageData::Status(RptStatusMsg {
                    status_code,
                    status_string,
                })
            }
            other => {
                return Err(ParseError::UnsupportedVector {
                    layer: Layer::Rpt,
                    vector: other,
                })
            }
        };
        Ok(RptMessage { header, data })
    }
}

fn rdm_chain_size(list: &RdmBufList) -> usize {
    list.buffers.iter().map(|b| 3 + b.len()).sum()
}

fn pack_rdm_chain(w: &mut CursorMut<'_>, vector: u32, list: &RdmBufList) -> ParseResult<()> {
    w.write_flags_length(REQUEST_NOTIF_PDU_HEADER_SIZE + rdm_chain_size(list))?;
    w.write_u32(vector)?;
    for buf in &list.buffers {
        w.write_flags_length(3 + buf.len())?;
        w.write_bytes(buf.as_slice())?;
    }
    Ok(())
}

fn parse_rdm_chain(body: &mut Cursor<'_>) -> ParseResult<RdmBufList> {
    let chain_len = body.read_flags_length()?;
    if chain_len < REQUEST_NOTIF_PDU_HEADER_SIZE {
        return Err(ParseError::Malformed);
    }
    let vector = body.read_u32()?;
    if vector != VECTOR_REQUEST_RDM_CMD {
        return Err(ParseError::UnsupportedVector {
            layer: Layer::Rpt,
            vector,
        });
    }
    let mut chain = body.sub_cursor(chain_len - REQUEST_NOTIF_PDU_HEADER_SIZE)?;
    let mut buffers = Vec::new();
    while chain.remaining() > 0 {
        let cmd_len = chain.read_flags_length()?;
        if cmd_len < 3 + RDM_MIN_BYTES {
            return Err(ParseError::Malformed);
        }
        let raw = chain.read_bytes(cmd_len - 3)?;
        let buf = RdmBuffer::from_slice(raw)?;
        buf.validate()?;
        buffers.push(buf);
    }
    if buffers.is_empty() {
        return Err(ParseError::Malformed);
    }
    Ok(RdmBufList {
        buffers,
        more_coming: false,
    })
}
