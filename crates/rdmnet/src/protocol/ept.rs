// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! EPT PDU messages.
//!
//! EPT carries opaque sub-protocol payloads between EPT clients; the codec
//! frames and addresses them but never inspects the data.

use super::consts::*;
use super::cursor::{Cursor, CursorMut};
use super::{Layer, ParseError, ParseResult};
use crate::Cid;

/// EPT status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EptStatusMsg {
    pub status_code: u16,
    pub status_string: Option<String>,
}

/// Vector-specific half of an EPT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EptMessageData {
    /// An opaque sub-protocol payload.
    Data { protocol_vector: u32, data: Vec<u8> },
    Status(EptStatusMsg),
}

/// One EPT PDU, addressed by component CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EptMessage {
    pub dest_cid: Cid,
    pub data: EptMessageData,
}

impl EptMessage {
    pub fn vector(&self) -> u32 {
        match self.data {
            EptMessageData::Data { .. } => VECTOR_EPT_DATA,
            EptMessageData::Status(_) => VECTOR_EPT_STATUS,
        }
    }

    /// Exact packed size of the EPT PDU, header included.
    pub fn size_of(&self) -> usize {
        EPT_PDU_HEADER_SIZE
            + match &self.data {
                EptMessageData::Data { data, .. } => 4 + data.len(),
                EptMessageData::Status(s) => 2 + s.status_string.as_ref().map_or(0, |s| s.len()),
            }
    }

    /// Pack the EPT PDU into the cursor.
    pub fn pack(&self, w: &mut CursorMut<'_>) -> ParseResult<()> {
        w.write_flags_length(self.size_of())?;
        w.write_u32(self.vector())?;
        w.write_bytes(self.dest_cid.as_bytes())?;
        match &self.data {
            EptMessageData::Data {
                protocol_vector,
                data,
            } => {
                w.write_u32(*protocol_vector)?;
                w.write_bytes(data)
            }
            EptMessageData::Status(s) => {
                w.write_u16(s.status_code)?;
                if let Some(string) = &s.status_string {
                    w.write_bytes(string.as_bytes())?;
                }
                Ok(())
            }
        }
    }

    /// Parse one EPT PDU from the cursor.
    pub fn parse(r: &mut Cursor<'_>) -> ParseResult<Self> {
        let pdu_len = r.read_flags_length()?;
        if pdu_len < EPT_PDU_HEADER_SIZE {
            return Err(ParseError::Malformed);
        }
        let vector = r.read_u32()?;
        let dest_cid = Cid::from_bytes(r.read_array::<16>()?);
        let mut body = r.sub_cursor(pdu_len - EPT_PDU_HEADER_SIZE)?;
        let data = match vector {
            VECTOR_EPT_DATA => {
                let protocol_vector = body.read_u32()?;
                let data = body.read_bytes(body.remaining())?.to_vec();
                EptMessageData::Data {
                    protocol_vector,
                    data,
                }
            }
            VECTOR_EPT_STATUS => {
                let status_code = body.read_u16()?;
                let rest = body.read_bytes(body.remaining())?;
                let status_string = if rest.is_empty() {
                    None
                } else {
                    Some(
                        std::str::from_utf8(rest)
                            .map_err(|_| ParseError::Malformed)?
                            .to_string(),
                    )
                };
                EptMessageData::Status(EptStatusMsg {
                    status_code,
                    status_string,
                })
            }
            other => {
                return Err(ParseError::UnsupportedVector {
                    layer: Layer::Ept,
                    vector: other,
                })
            }
        };
        Ok(EptMessage { dest_cid, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: &EptMessage) -> EptMessage {
        let mut buf = vec![0u8; msg.size_of()];
        msg.pack(&mut CursorMut::new(&mut buf)).unwrap();
        let parsed = EptMessage::parse(&mut Cursor::new(&buf)).unwrap();
        parsed
    }

    #[test]
    fn test_data_roundtrip() {
        let msg = EptMessage {
            dest_cid: Cid::parse("ed8dee0c-dfca-4d29-a50a-e0081dd567df").unwrap(),
            data: EptMessageData::Data {
                protocol_vector: 0x6574_0001,
                data: vec![1, 2, 3, 4, 5],
            },
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_status_roundtrip() {
        let msg = EptMessage {
            dest_cid: Cid::nil(),
            data: EptMessageData::Status(EptStatusMsg {
                status_code: EPT_STATUS_UNKNOWN_CID,
                status_string: Some("no such component".to_string()),
            }),
        };
        assert_eq!(roundtrip(&msg), msg);

        let bare = EptMessage {
            dest_cid: Cid::nil(),
            data: EptMessageData::Status(EptStatusMsg {
                status_code: EPT_STATUS_UNKNOWN_VECTOR,
                status_string: None,
            }),
        };
        assert_eq!(roundtrip(&bare), bare);
    }

    #[test]
    fn test_payload_is_opaque() {
        // Arbitrary non-UTF8 bytes must survive untouched.
        let payload: Vec<u8> = (0..=255).collect();
        let msg = EptMessage {
            dest_cid: Cid::nil(),
            data: EptMessageData::Data {
                protocol_vector: 1,
                data: payload.clone(),
            },
        };
        match roundtrip(&msg).data {
            EptMessageData::Data { data, .. } => assert_eq!(data, payload),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_unknown_vector() {
        let msg = EptMessage {
            dest_cid: Cid::nil(),
            data: EptMessageData::Status(EptStatusMsg {
                status_code: 0,
                status_string: None,
            }),
        };
        let mut buf = vec![0u8; msg.size_of()];
        msg.pack(&mut CursorMut::new(&mut buf)).unwrap();
        buf[6] = 0x77; // corrupt the vector
        let err = EptMessage::parse(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnsupportedVector {
                layer: Layer::Ept,
                ..
            }
        ));
    }

    #[test]
    fn test_length_consistency() {
        let msg = EptMessage {
            dest_cid: Cid::nil(),
            data: EptMessageData::Data {
                protocol_vector: 9,
                data: vec![0; 100],
            },
        };
        let mut buf = vec![0u8; msg.size_of()];
        msg.pack(&mut CursorMut::new(&mut buf)).unwrap();
        // The flags+length field must equal the serialized size.
        let declared = ((buf[0] as usize & 0x0f) << 16) | ((buf[1] as usize) << 8) | buf[2] as usize;
        assert_eq!(declared, msg.size_of());
    }
}
