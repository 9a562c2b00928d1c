// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.33 wire codec.
//!
//! Framing layers, top-down:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |  ACN preamble (TCP: ident + block length / UDP: sizes+ident) |
//! +--------------------------------------------------------------+
//! |  Root Layer PDU (flags+length, vector, sender CID)           |
//! +--------------------------------------------------------------+
//! |  Broker / RPT / EPT / LLRP PDU                               |
//! +--------------------------------------------------------------+
//! |  Inner payloads (client entries, RDM commands, status, ...)  |
//! +--------------------------------------------------------------+
//! ```
//!
//! Every message type follows the same functional contract: `size_of` gives
//! the exact packed size, `pack` serializes into a caller buffer, `parse`
//! returns the message (or a value-typed [`ParseError`]) plus bytes
//! consumed. Parsing never panics; unknown vectors surface as
//! [`ParseError::UnsupportedVector`], which a connection treats as
//! diagnosable noise rather than a reason to close.

pub mod acn;
pub mod broker;
pub mod consts;
pub mod cursor;
pub mod ept;
pub mod llrp;
pub mod message;
pub mod rdm;
pub mod rpt;
#[cfg(test)]
mod rpt_tests;
pub mod types;

pub use acn::{parse_tcp_preamble, parse_udp_preamble, RootLayerHeader};
pub use broker::{
    BrokerMessage, ClientConnectMsg, ClientEntry, ClientEntryData, ClientList, ConnectReplyMsg,
    DisconnectMsg, DynamicUidMapping, DynamicUidRequest, EptSubProtocol,
};
pub use ept::{EptMessage, EptMessageData, EptStatusMsg};
pub use llrp::{LlrpMessage, LlrpMessageData, ProbeReply, ProbeRequest};
pub use message::RdmnetMessage;
pub use rdm::RdmBuffer;
pub use rpt::{RdmBufList, RptHeader, RptMessage, RptMessageData, RptStatusMsg};
pub use types::{
    ConnectStatus, DisconnectReason, DynamicUidStatus, LlrpComponentType, RptClientType,
    RptStatusCode,
};

/// Identifies the framing layer at which a parse failure occurred.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layer {
    Root,
    Broker,
    Rpt,
    Ept,
    Llrp,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Layer::Root => "root",
            Layer::Broker => "broker",
            Layer::Rpt => "RPT",
            Layer::Ept => "EPT",
            Layer::Llrp => "LLRP",
        };
        write!(f, "{}", s)
    }
}

/// Wire parse/pack failures. These are values, never panics.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// A length field, preamble, or mandatory field violated the format.
    Malformed,
    /// A well-formed PDU carried a vector this implementation does not
    /// understand. Not fatal to a connection.
    UnsupportedVector { layer: Layer, vector: u32 },
    /// The caller-provided pack buffer cannot hold the message.
    BufferTooSmall,
    /// An embedded RDM packet failed its checksum.
    RdmChecksum,
    /// A frame declared a length beyond the permitted maximum.
    Oversize { declared: usize },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Malformed => write!(f, "Malformed wire data"),
            ParseError::UnsupportedVector { layer, vector } => {
                write!(f, "Unsupported {} layer vector 0x{:08x}", layer, vector)
            }
            ParseError::BufferTooSmall => write!(f, "Buffer too small for message"),
            ParseError::RdmChecksum => write!(f, "RDM checksum failure"),
            ParseError::Oversize { declared } => {
                write!(f, "Frame length {} exceeds maximum", declared)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Result alias for codec operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
