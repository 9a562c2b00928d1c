// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ACN (E1.17) preambles and the root layer PDU.
//!
//! TCP preamble:
//! ```text
//! +------------------------+------------------------+
//! | "ASC-E1.17\0\0\0" (12) | PDU block length (4 BE)|
//! +------------------------+------------------------+
//! ```
//!
//! UDP preamble:
//! ```text
//! +------------------+-------------------+------------------------+
//! | preamble sz (2)  | post-amble sz (2) | "ASC-E1.17\0\0\0" (12) |
//! +------------------+-------------------+------------------------+
//! ```
//!
//! Both are followed by one root layer PDU: flags+length (3), vector (4),
//! sender CID (16), then the protocol PDU block.

use super::consts::*;
use super::cursor::{Cursor, CursorMut};
use super::{Layer, ParseError, ParseResult};
use crate::Cid;

/// Parsed root layer PDU header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootLayerHeader {
    pub vector: u32,
    pub sender_cid: Cid,
    /// Length of the PDU body following the header.
    pub body_len: usize,
}

/// Pack a TCP preamble declaring `block_len` bytes of root layer PDUs.
pub fn pack_tcp_preamble(w: &mut CursorMut<'_>, block_len: u32) -> ParseResult<()> {
    w.write_bytes(ACN_PACKET_IDENT)?;
    w.write_u32(block_len)
}

/// Parse a TCP preamble, returning the declared PDU block length.
pub fn parse_tcp_preamble(r: &mut Cursor<'_>) -> ParseResult<u32> {
    let ident = r.read_bytes(ACN_PACKET_IDENT.len())?;
    if ident != ACN_PACKET_IDENT {
        return Err(ParseError::Malformed);
    }
    r.read_u32()
}

/// Pack a UDP preamble (used by LLRP).
pub fn pack_udp_preamble(w: &mut CursorMut<'_>) -> ParseResult<()> {
    w.write_u16(ACN_UDP_PREAMBLE_SIZE_FIELD)?;
    w.write_u16(0)?;
    w.write_bytes(ACN_PACKET_IDENT)
}

/// Parse a UDP preamble. The preamble-size field tells us where the root
/// layer starts; sizes other than the standard 16 skip extra bytes.
pub fn parse_udp_preamble(r: &mut Cursor<'_>) -> ParseResult<()> {
    let preamble_size = r.read_u16()? as usize;
    let _postamble_size = r.read_u16()?;
    if preamble_size < ACN_UDP_PREAMBLE_SIZE {
        return Err(ParseError::Malformed);
    }
    let ident = r.read_bytes(ACN_PACKET_IDENT.len())?;
    if ident != ACN_PACKET_IDENT {
        return Err(ParseError::Malformed);
    }
    // Skip any nonstandard preamble extension.
    r.read_bytes(preamble_size - ACN_UDP_PREAMBLE_SIZE)?;
    Ok(())
}

/// Pack a root layer PDU header covering `body_len` bytes of payload.
pub fn pack_root_header(
    w: &mut CursorMut<'_>,
    vector: u32,
    sender_cid: &Cid,
    body_len: usize,
) -> ParseResult<()> {
    w.write_flags_length(ACN_ROOT_PDU_HEADER_SIZE + body_len)?;
    w.write_u32(vector)?;
    w.write_bytes(sender_cid.as_bytes())
}

/// Parse a root layer PDU header.
///
/// The vector is validated against the known root vectors; anything else is
/// an `UnsupportedVector` at the root layer.
pub fn parse_root_header(r: &mut Cursor<'_>) -> ParseResult<RootLayerHeader> {
    let pdu_len = r.read_flags_length()?;
    if pdu_len < ACN_ROOT_PDU_HEADER_SIZE {
        return Err(ParseError::Malformed);
    }
    let vector = r.read_u32()?;
    let sender_cid = Cid::from_bytes(r.read_array::<16>()?);
    match vector {
        VECTOR_ROOT_BROKER | VECTOR_ROOT_RPT | VECTOR_ROOT_EPT | VECTOR_ROOT_LLRP => {}
        other => {
            return Err(ParseError::UnsupportedVector {
                layer: Layer::Root,
                vector: other,
            })
        }
    }
    Ok(RootLayerHeader {
        vector,
        sender_cid,
        body_len: pdu_len - ACN_ROOT_PDU_HEADER_SIZE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_preamble_roundtrip() {
        let mut buf = [0u8; ACN_TCP_PREAMBLE_SIZE];
        pack_tcp_preamble(&mut CursorMut::new(&mut buf), 30).unwrap();
        assert_eq!(&buf[..9], b"ASC-E1.17");
        assert_eq!(&buf[12..16], &[0, 0, 0, 30]);

        let mut r = Cursor::new(&buf);
        assert_eq!(parse_tcp_preamble(&mut r).unwrap(), 30);
    }

    #[test]
    fn test_tcp_preamble_rejects_wrong_ident() {
        let mut buf = [0u8; ACN_TCP_PREAMBLE_SIZE];
        pack_tcp_preamble(&mut CursorMut::new(&mut buf), 30).unwrap();
        buf[0] = b'B';
        assert!(parse_tcp_preamble(&mut Cursor::new(&buf)).is_err());
    }

    #[test]
    fn test_udp_preamble_roundtrip() {
        let mut buf = [0u8; ACN_UDP_PREAMBLE_SIZE];
        pack_udp_preamble(&mut CursorMut::new(&mut buf)).unwrap();
        assert_eq!(&buf[..4], &[0x00, 0x10, 0x00, 0x00]);
        parse_udp_preamble(&mut Cursor::new(&buf)).unwrap();
    }

    #[test]
    fn test_root_header_roundtrip() {
        let cid = Cid::parse("9efb9713-2b82-4121-8ae0-9ca045086fe6").unwrap();
        let mut buf = [0u8; 64];
        pack_root_header(&mut CursorMut::new(&mut buf), VECTOR_ROOT_BROKER, &cid, 7).unwrap();
        // Length covers header + body: 23 + 7 = 30 = 0x1e.
        assert_eq!(&buf[..3], &[0xf0, 0x00, 0x1e]);

        let mut r = Cursor::new(&buf[..30]);
        let hdr = parse_root_header(&mut r).unwrap();
        assert_eq!(hdr.vector, VECTOR_ROOT_BROKER);
        assert_eq!(hdr.sender_cid, cid);
        assert_eq!(hdr.body_len, 7);
    }

    #[test]
    fn test_root_header_unknown_vector() {
        let cid = Cid::nil();
        let mut buf = [0u8; 64];
        pack_root_header(&mut CursorMut::new(&mut buf), 0x42, &cid, 0).unwrap();
        let err = parse_root_header(&mut Cursor::new(&buf[..23])).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnsupportedVector {
                layer: Layer::Root,
                vector: 0x42
            }
        );
    }
}
