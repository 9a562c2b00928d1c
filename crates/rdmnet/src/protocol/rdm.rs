// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDM (E1.20) packet framing validation.
//!
//! RDMnet carries whole RDM packets opaquely inside RPT and LLRP PDUs; the
//! codec validates framing (start code, length consistency, PDL bound,
//! checksum) but never interprets parameter data.

use super::consts::{RDM_MAX_BYTES, RDM_MAX_PDL, RDM_MIN_BYTES, RDM_START_CODE};
use super::{ParseError, ParseResult};

/// Offset of the message-length slot in an RDM packet.
const RDM_LENGTH_OFFSET: usize = 2;
/// Offset of the parameter-data-length slot.
const RDM_PDL_OFFSET: usize = 23;

/// One complete RDM packet, stored inline.
///
/// Fixed-capacity so that chained RDM buffers in RPT messages can live in a
/// flat caller-provided slice with no per-buffer allocation.
#[derive(Copy, Clone)]
pub struct RdmBuffer {
    data: [u8; RDM_MAX_BYTES],
    len: usize,
}

impl RdmBuffer {
    /// Wrap raw bytes without validating them. Fails only on impossible
    /// lengths; use [`RdmBuffer::validate`] before trusting the content.
    pub fn from_slice(bytes: &[u8]) -> ParseResult<Self> {
        if bytes.len() < RDM_MIN_BYTES || bytes.len() > RDM_MAX_BYTES {
            return Err(ParseError::Malformed);
        }
        let mut data = [0u8; RDM_MAX_BYTES];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            data,
            len: bytes.len(),
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Validate RDM framing: start code, message-length slot, PDL bound and
    /// consistency, and the additive checksum.
    pub fn validate(&self) -> ParseResult<()> {
        let d = self.as_slice();
        if d[0] != RDM_START_CODE {
            return Err(ParseError::Malformed);
        }
        // Message length counts every slot except the two checksum bytes.
        if d[RDM_LENGTH_OFFSET] as usize != self.len - 2 {
            return Err(ParseError::Malformed);
        }
        let pdl = d[RDM_PDL_OFFSET] as usize;
        if pdl > RDM_MAX_PDL || pdl != self.len - RDM_MIN_BYTES {
            return Err(ParseError::Malformed);
        }
        let expected = checksum(&d[..self.len - 2]);
        let actual = u16::from_be_bytes([d[self.len - 2], d[self.len - 1]]);
        if expected != actual {
            return Err(ParseError::RdmChecksum);
        }
        Ok(())
    }
}

/// RDM response type slot values.
pub const RDM_RESPONSE_TYPE_ACK: u8 = 0x00;
pub const RDM_RESPONSE_TYPE_NACK_REASON: u8 = 0x02;

impl RdmBuffer {
    /// Destination UID (slots 3..9).
    pub fn dest_uid(&self) -> crate::RdmUid {
        let mut b = [0u8; 6];
        b.copy_from_slice(&self.data[3..9]);
        crate::RdmUid::from_bytes(b)
    }

    /// Source UID (slots 9..15).
    pub fn source_uid(&self) -> crate::RdmUid {
        let mut b = [0u8; 6];
        b.copy_from_slice(&self.data[9..15]);
        crate::RdmUid::from_bytes(b)
    }

    /// Transaction number (slot 15).
    pub fn transaction_num(&self) -> u8 {
        self.data[15]
    }

    /// Command class (slot 20).
    pub fn command_class(&self) -> u8 {
        self.data[20]
    }

    /// Build the response packet for this command.
    ///
    /// Swaps source and destination, sets the response command class
    /// (command class | 0x01), fills the response-type slot, and appends
    /// `param_data` with a fresh checksum. `param_data` must fit the PDL
    /// bound.
    pub fn build_response(
        &self,
        responder_uid: crate::RdmUid,
        response_type: u8,
        param_data: &[u8],
    ) -> ParseResult<RdmBuffer> {
        if param_data.len() > RDM_MAX_PDL {
            return Err(ParseError::Malformed);
        }
        let total = RDM_MIN_BYTES + param_data.len();
        let mut out = [0u8; RDM_MAX_BYTES];
        out[..24].copy_from_slice(&self.data[..24]);
        out[RDM_LENGTH_OFFSET] = (total - 2) as u8;
        out[3..9].copy_from_slice(&self.source_uid().to_bytes());
        out[9..15].copy_from_slice(&responder_uid.to_bytes());
        out[16] = response_type;
        out[17] = 0; // message count
        out[20] = self.command_class() | 0x01;
        out[RDM_PDL_OFFSET] = param_data.len() as u8;
        out[24..24 + param_data.len()].copy_from_slice(param_data);
        let ck = checksum(&out[..total - 2]);
        out[total - 2..total].copy_from_slice(&ck.to_be_bytes());
        Ok(RdmBuffer {
            data: out,
            len: total,
        })
    }
}

impl PartialEq for RdmBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for RdmBuffer {}

impl std::fmt::Debug for RdmBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RdmBuffer({} bytes)", self.len)
    }
}

/// Additive 16-bit checksum over the given slots.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal GET_COMMAND-shaped packet with a valid checksum.
    fn valid_packet(pdl: u8) -> Vec<u8> {
        let total = RDM_MIN_BYTES + pdl as usize;
        let mut d = vec![0u8; total];
        d[0] = RDM_START_CODE;
        d[1] = 0x01;
        d[RDM_LENGTH_OFFSET] = (total - 2) as u8;
        d[RDM_PDL_OFFSET] = pdl;
        let ck = checksum(&d[..total - 2]);
        d[total - 2..].copy_from_slice(&ck.to_be_bytes());
        d
    }

    #[test]
    fn test_valid_packet_passes() {
        let buf = RdmBuffer::from_slice(&valid_packet(0)).unwrap();
        buf.validate().unwrap();

        let buf = RdmBuffer::from_slice(&valid_packet(4)).unwrap();
        buf.validate().unwrap();
    }

    #[test]
    fn test_bad_start_code_rejected() {
        let mut d = valid_packet(0);
        d[0] = 0xcd;
        let buf = RdmBuffer::from_slice(&d).unwrap();
        assert!(matches!(buf.validate(), Err(ParseError::Malformed)));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut d = valid_packet(0);
        let last = d.len() - 1;
        d[last] ^= 0xff;
        let buf = RdmBuffer::from_slice(&d).unwrap();
        assert!(matches!(buf.validate(), Err(ParseError::RdmChecksum)));
    }

    #[test]
    fn test_length_slot_mismatch_rejected() {
        let mut d = valid_packet(2);
        d[RDM_LENGTH_OFFSET] += 1;
        // Re-fix the checksum so only the length slot is wrong.
        let total = d.len();
        let ck = checksum(&d[..total - 2]);
        d[total - 2..].copy_from_slice(&ck.to_be_bytes());
        let buf = RdmBuffer::from_slice(&d).unwrap();
        assert!(matches!(buf.validate(), Err(ParseError::Malformed)));
    }

    #[test]
    fn test_size_bounds() {
        assert!(RdmBuffer::from_slice(&[0u8; RDM_MIN_BYTES - 1]).is_err());
        assert!(RdmBuffer::from_slice(&[0u8; RDM_MAX_BYTES + 1]).is_err());
        assert!(RdmBuffer::from_slice(&valid_packet(RDM_MAX_PDL as u8)).is_ok());
    }

    #[test]
    fn test_build_response_swaps_addressing() {
        let mut cmd_bytes = valid_packet(0);
        // GET_COMMAND from controller 1234:00000001 to device abcd:00000002.
        cmd_bytes[3..9].copy_from_slice(&crate::RdmUid::new(0xabcd, 2).to_bytes());
        cmd_bytes[9..15].copy_from_slice(&crate::RdmUid::new(0x1234, 1).to_bytes());
        cmd_bytes[15] = 7; // transaction
        cmd_bytes[20] = 0x20; // GET_COMMAND
        let total = cmd_bytes.len();
        let ck = checksum(&cmd_bytes[..total - 2]);
        cmd_bytes[total - 2..].copy_from_slice(&ck.to_be_bytes());

        let cmd = RdmBuffer::from_slice(&cmd_bytes).unwrap();
        cmd.validate().unwrap();

        let responder = crate::RdmUid::new(0xabcd, 2);
        let resp = cmd
            .build_response(responder, RDM_RESPONSE_TYPE_ACK, &[0x01, 0x02])
            .unwrap();
        resp.validate().unwrap();
        assert_eq!(resp.dest_uid(), crate::RdmUid::new(0x1234, 1));
        assert_eq!(resp.source_uid(), responder);
        assert_eq!(resp.transaction_num(), 7);
        assert_eq!(resp.command_class(), 0x21); // GET_COMMAND_RESPONSE
        assert_eq!(resp.len(), RDM_MIN_BYTES + 2);
    }

    #[test]
    fn test_build_response_rejects_oversize_data() {
        let cmd = RdmBuffer::from_slice(&valid_packet(0)).unwrap();
        let data = [0u8; RDM_MAX_PDL + 1];
        assert!(cmd
            .build_response(crate::RdmUid::new(1, 1), RDM_RESPONSE_TYPE_ACK, &data)
            .is_err());
    }

    #[test]
    fn test_fixture_response_packet() {
        // A real SET_COMMAND_RESPONSE capture: 26 bytes, zero PDL.
        let d: [u8; 26] = [
            0xcc, 0x01, 0x18, 0xcb, 0xa9, 0x87, 0x65, 0x43, 0x21, 0x12, 0x34, 0x56, 0x78, 0x9a,
            0xbc, 0x00, 0x00, 0x00, 0x00, 0x00, 0x31, 0x00, 0xf0, 0x00, 0x07, 0x34,
        ];
        let buf = RdmBuffer::from_slice(&d).unwrap();
        buf.validate().unwrap();
    }
}
