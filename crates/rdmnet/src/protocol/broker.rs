// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker PDU messages (E1.33 Sec.6.3).
//!
//! Wire layout of a Broker PDU:
//!
//! ```text
//! +-------------------+------------+----------------------+
//! | flags+length (3)  | vector (2) | vector-specific data |
//! +-------------------+------------+----------------------+
//! ```
//!
//! Client lists and dynamic UID lists are variable length; a broker splits
//! an oversize list across several messages of the same vector, and a
//! continuation octet in each list message tells the receiver whether more
//! fragments follow.

use super::consts::*;
use super::cursor::{Cursor, CursorMut};
use super::types::{ConnectStatus, DisconnectReason, DynamicUidStatus, RptClientType};
use super::{Layer, ParseError, ParseResult};
use crate::{Cid, RdmUid};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Client connect request, the first message on every RDMnet connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConnectMsg {
    pub scope: String,
    pub e133_version: u16,
    pub search_domain: String,
    pub connect_flags: u8,
    pub client_entry: ClientEntry,
}

impl ClientConnectMsg {
    /// Convenience constructor using the default scope and search domain.
    pub fn new_default_scope(client_entry: ClientEntry) -> Self {
        Self {
            scope: E133_DEFAULT_SCOPE.to_string(),
            e133_version: E133_VERSION,
            search_domain: E133_DEFAULT_DOMAIN.to_string(),
            connect_flags: 0,
            client_entry,
        }
    }
}

/// Broker's reply to a client connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReplyMsg {
    pub connect_status: ConnectStatus,
    pub e133_version: u16,
    pub broker_uid: RdmUid,
    pub client_uid: RdmUid,
}

/// Client entry update: a connected client changing its entry in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntryUpdateMsg {
    pub connect_flags: u8,
    pub client_entry: ClientEntry,
}

/// Redirect to another broker address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRedirectMsg {
    pub new_addr: SocketAddr,
}

/// Graceful disconnect with a reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectMsg {
    pub reason: DisconnectReason,
}

/// One client entry: the CID plus protocol-specific data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    pub cid: Cid,
    pub data: ClientEntryData,
}

/// Protocol-specific half of a client entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEntryData {
    Rpt {
        uid: RdmUid,
        client_type: RptClientType,
        binding_cid: Cid,
    },
    Ept {
        protocols: Vec<EptSubProtocol>,
    },
}

/// One EPT sub-protocol supported by an EPT client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EptSubProtocol {
    pub protocol_vector: u32,
    pub protocol_string: String,
}

/// A list of client entries plus the continuation flag.
///
/// `more_coming` is set on every fragment except the last when a broker
/// splits a list that does not fit in one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientList {
    pub client_entries: Vec<ClientEntry>,
    pub more_coming: bool,
}

/// One entry of a request-dynamic-UIDs message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicUidRequest {
    /// Manufacturer ID with the dynamic bit set; device field 0.
    pub requested_uid: RdmUid,
    /// Responder ID the assignment should be bound to.
    pub rid: Cid,
}

/// One entry of an assigned-dynamic-UIDs message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicUidMapping {
    pub uid: RdmUid,
    pub rid: Cid,
    pub status: DynamicUidStatus,
}

/// All broker PDU messages, one arm per vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerMessage {
    Connect(ClientConnectMsg),
    ConnectReply(ConnectReplyMsg),
    ClientEntryUpdate(ClientEntryUpdateMsg),
    RedirectV4(ClientRedirectMsg),
    RedirectV6(ClientRedirectMsg),
    FetchClientList,
    ConnectedClientList(ClientList),
    ClientAdd(ClientList),
    ClientRemove(ClientList),
    ClientEntryChange(ClientList),
    RequestDynamicUids(Vec<DynamicUidRequest>),
    AssignedDynamicUids(Vec<DynamicUidMapping>),
    FetchDynamicUidList(Vec<RdmUid>),
    Disconnect(DisconnectMsg),
    Null,
}

impl BrokerMessage {
    /// The wire vector for this message.
    pub fn vector(&self) -> u16 {
        match self {
            BrokerMessage::Connect(_) => VECTOR_BROKER_CONNECT,
            BrokerMessage::ConnectReply(_) => VECTOR_BROKER_CONNECT_REPLY,
            BrokerMessage::ClientEntryUpdate(_) => VECTOR_BROKER_CLIENT_ENTRY_UPDATE,
            BrokerMessage::RedirectV4(_) => VECTOR_BROKER_REDIRECT_V4,
            BrokerMessage::RedirectV6(_) => VECTOR_BROKER_REDIRECT_V6,
            BrokerMessage::FetchClientList => VECTOR_BROKER_FETCH_CLIENT_LIST,
            BrokerMessage::ConnectedClientList(_) => VECTOR_BROKER_CONNECTED_CLIENT_LIST,
            BrokerMessage::ClientAdd(_) => VECTOR_BROKER_CLIENT_ADD,
            BrokerMessage::ClientRemove(_) => VECTOR_BROKER_CLIENT_REMOVE,
            BrokerMessage::ClientEntryChange(_) => VECTOR_BROKER_CLIENT_ENTRY_CHANGE,
            BrokerMessage::RequestDynamicUids(_) => VECTOR_BROKER_REQUEST_DYNAMIC_UIDS,
            BrokerMessage::AssignedDynamicUids(_) => VECTOR_BROKER_ASSIGNED_DYNAMIC_UIDS,
            BrokerMessage::FetchDynamicUidList(_) => VECTOR_BROKER_FETCH_DYNAMIC_UID_LIST,
            BrokerMessage::Disconnect(_) => VECTOR_BROKER_DISCONNECT,
            BrokerMessage::Null => VECTOR_BROKER_NULL,
        }
    }

    /// Exact packed size of the broker PDU, header included.
    pub fn size_of(&self) -> usize {
        BROKER_PDU_HEADER_SIZE + self.data_size()
    }

    fn data_size(&self) -> usize {
        match self {
            BrokerMessage::Connect(m) => {
                CLIENT_CONNECT_COMMON_FIELD_SIZE + client_entry_size(&m.client_entry)
            }
            BrokerMessage::ConnectReply(_) => CONNECT_REPLY_DATA_SIZE,
            BrokerMessage::ClientEntryUpdate(m) => 1 + client_entry_size(&m.client_entry),
            BrokerMessage::RedirectV4(_) => REDIRECT_V4_DATA_SIZE,
            BrokerMessage::RedirectV6(_) => REDIRECT_V6_DATA_SIZE,
            BrokerMessage::FetchClientList | BrokerMessage::Null => 0,
            BrokerMessage::ConnectedClientList(l)
            | BrokerMessage::ClientAdd(l)
            | BrokerMessage::ClientRemove(l)
            | BrokerMessage::ClientEntryChange(l) => {
                1 + l
                    .client_entries
                    .iter()
                    .map(client_entry_size)
                    .sum::<usize>()
            }
            BrokerMessage::RequestDynamicUids(reqs) => {
                reqs.len() * DYNAMIC_UID_REQUEST_PAIR_SIZE
            }
            BrokerMessage::AssignedDynamicUids(maps) => maps.len() * DYNAMIC_UID_MAPPING_SIZE,
            BrokerMessage::FetchDynamicUidList(uids) => uids.len() * 6,
            BrokerMessage::Disconnect(_) => DISCONNECT_DATA_SIZE,
        }
    }

    /// Pack the broker PDU into the cursor.
    pub fn pack(&self, w: &mut CursorMut<'_>) -> ParseResult<()> {
        w.write_flags_length(self.size_of())?;
        w.write_u16(self.vector())?;
        match self {
            BrokerMessage::Connect(m) => {
                w.write_str_padded(&m.scope, E133_SCOPE_STRING_PADDED_LENGTH)?;
                w.write_u16(m.e133_version)?;
                w.write_str_padded(&m.search_domain, E133_DOMAIN_STRING_PADDED_LENGTH)?;
                w.write_u8(m.connect_flags)?;
                pack_client_entry(w, &m.client_entry)
            }
            BrokerMessage::ConnectReply(m) => {
                w.write_u16(m.connect_status.to_wire())?;
                w.write_u16(m.e133_version)?;
                w.write_bytes(&m.broker_uid.to_bytes())?;
                w.write_bytes(&m.client_uid.to_bytes())
            }
            BrokerMessage::ClientEntryUpdate(m) => {
                w.write_u8(m.connect_flags)?;
                pack_client_entry(w, &m.client_entry)
            }
            BrokerMessage::RedirectV4(m) => match m.new_addr {
                SocketAddr::V4(a) => {
                    w.write_bytes(&a.ip().octets())?;
                    w.write_u16(a.port())
                }
                SocketAddr::V6(_) => Err(ParseError::Malformed),
            },
            BrokerMessage::RedirectV6(m) => match m.new_addr {
                SocketAddr::V6(a) => {
                    w.write_bytes(&a.ip().octets())?;
                    w.write_u16(a.port())
                }
                SocketAddr::V4(_) => Err(ParseError::Malformed),
            },
            BrokerMessage::FetchClientList | BrokerMessage::Null => Ok(()),
            BrokerMessage::ConnectedClientList(l)
            | BrokerMessage::ClientAdd(l)
            | BrokerMessage::ClientRemove(l)
            | BrokerMessage::ClientEntryChange(l) => {
                w.write_u8(u8::from(l.more_coming))?;
                for entry in &l.client_entries {
                    pack_client_entry(w, entry)?;
                }
                Ok(())
            }
            BrokerMessage::RequestDynamicUids(reqs) => {
                for req in reqs {
                    w.write_bytes(&req.requested_uid.to_bytes())?;
                    w.write_bytes(req.rid.as_bytes())?;
                }
                Ok(())
            }
            BrokerMessage::AssignedDynamicUids(maps) => {
                for map in maps {
                    w.write_bytes(&map.uid.to_bytes())?;
                    w.write_bytes(map.rid.as_bytes())?;
                    w.write_u16(map.status.to_wire())?;
                }
                Ok(())
            }
            BrokerMessage::FetchDynamicUidList(uids) => {
                for uid in uids {
                    w.write_bytes(&uid.to_bytes())?;
                }
                Ok(())
            }
            BrokerMessage::Disconnect(m) => w.write_u16(m.reason.to_wire()),
        }
    }

    /// Parse one broker PDU from the cursor.
    pub fn parse(r: &mut Cursor<'_>) -> ParseResult<Self> {
        let pdu_len = r.read_flags_length()?;
        if pdu_len < BROKER_PDU_HEADER_SIZE {
            return Err(ParseError::Malformed);
        }
        let vector = r.read_u16()?;
        let mut body = r.sub_cursor(pdu_len - BROKER_PDU_HEADER_SIZE)?;
        match vector {
            VECTOR_BROKER_CONNECT => {
                let scope = body.read_str_padded(E133_SCOPE_STRING_PADDED_LENGTH)?.to_string();
                let e133_version = body.read_u16()?;
                let search_domain = body
                    .read_str_padded(E133_DOMAIN_STRING_PADDED_LENGTH)?
                    .to_string();
                let connect_flags = body.read_u8()?;
                let client_entry = parse_client_entry(&mut body)?;
                Ok(BrokerMessage::Connect(ClientConnectMsg {
                    scope,
                    e133_version,
                    search_domain,
                    connect_flags,
                    client_entry,
                }))
            }
            VECTOR_BROKER_CONNECT_REPLY => {
                let connect_status = ConnectStatus::from_wire(body.read_u16()?)?;
                let e133_version = body.read_u16()?;
                let broker_uid = RdmUid::from_bytes(body.read_array::<6>()?);
                let client_uid = RdmUid::from_bytes(body.read_array::<6>()?);
                Ok(BrokerMessage::ConnectReply(ConnectReplyMsg {
                    connect_status,
                    e133_version,
                    broker_uid,
                    client_uid,
                }))
            }
            VECTOR_BROKER_CLIENT_ENTRY_UPDATE => {
                let connect_flags = body.read_u8()?;
                let client_entry = parse_client_entry(&mut body)?;
                Ok(BrokerMessage::ClientEntryUpdate(ClientEntryUpdateMsg {
                    connect_flags,
                    client_entry,
                }))
            }
            VECTOR_BROKER_REDIRECT_V4 => {
                let ip = Ipv4Addr::from(body.read_array::<4>()?);
                let port = body.read_u16()?;
                Ok(BrokerMessage::RedirectV4(ClientRedirectMsg {
                    new_addr: SocketAddr::V4(SocketAddrV4::new(ip, port)),
                }))
            }
            VECTOR_BROKER_REDIRECT_V6 => {
                let ip = Ipv6Addr::from(body.read_array::<16>()?);
                let port = body.read_u16()?;
                Ok(BrokerMessage::RedirectV6(ClientRedirectMsg {
                    new_addr: SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)),
                }))
            }
            VECTOR_BROKER_FETCH_CLIENT_LIST => Ok(BrokerMessage::FetchClientList),
            VECTOR_BROKER_CONNECTED_CLIENT_LIST
            | VECTOR_BROKER_CLIENT_ADD
            | VECTOR_BROKER_CLIENT_REMOVE
            | VECTOR_BROKER_CLIENT_ENTRY_CHANGE => {
                let more_coming = body.read_u8()? != 0;
                let mut client_entries = Vec::new();
                while body.remaining() > 0 {
                    client_entries.push(parse_client_entry(&mut body)?);
                }
                let list = ClientList {
                    client_entries,
                    more_coming,
                };
                Ok(match vector {
                    VECTOR_BROKER_CONNECTED_CLIENT_LIST => BrokerMessage::ConnectedClientList(list),
                    VECTOR_BROKER_CLIENT_ADD => BrokerMessage::ClientAdd(list),
                    VECTOR_BROKER_CLIENT_REMOVE => BrokerMessage::ClientRemove(list),
                    _ => BrokerMessage::ClientEntryChange(list),
                })
            }
            VECTOR_BROKER_REQUEST_DYNAMIC_UIDS => {
                if body.remaining() % DYNAMIC_UID_REQUEST_PAIR_SIZE != 0 {
                    return Err(ParseError::Malformed);
                }
                let mut reqs = Vec::new();
                while body.remaining() > 0 {
                    let requested_uid = RdmUid::from_bytes(body.read_array::<6>()?);
                    let rid = Cid::from_bytes(body.read_array::<16>()?);
                    reqs.push(DynamicUidRequest { requested_uid, rid });
                }
                Ok(BrokerMessage::RequestDynamicUids(reqs))
            }
            VECTOR_BROKER_ASSIGNED_DYNAMIC_UIDS => {
                if body.remaining() % DYNAMIC_UID_MAPPING_SIZE != 0 {
                    return Err(ParseError::Malformed);
                }
                let mut maps = Vec::new();
                while body.remaining() > 0 {
                    let uid = RdmUid::from_bytes(body.read_array::<6>()?);
                    let rid = Cid::from_bytes(body.read_array::<16>()?);
                    let status = DynamicUidStatus::from_wire(body.read_u16()?)?;
                    maps.push(DynamicUidMapping { uid, rid, status });
                }
                Ok(BrokerMessage::AssignedDynamicUids(maps))
            }
            VECTOR_BROKER_FETCH_DYNAMIC_UID_LIST => {
                if body.remaining() % 6 != 0 {
                    return Err(ParseError::Malformed);
                }
                let mut uids = Vec::new();
                while body.remaining() > 0 {
                    uids.push(RdmUid::from_bytes(body.read_array::<6>()?));
                }
                Ok(BrokerMessage::FetchDynamicUidList(uids))
            }
            VECTOR_BROKER_DISCONNECT => {
                let reason = DisconnectReason::from_wire(body.read_u16()?)?;
                Ok(BrokerMessage::Disconnect(DisconnectMsg { reason }))
            }
            VECTOR_BROKER_NULL => Ok(BrokerMessage::Null),
            other => Err(ParseError::UnsupportedVector {
                layer: Layer::Broker,
                vector: other as u32,
            }),
        }
    }
}

/// Packed size of one client entry PDU.
pub fn client_entry_size(entry: &ClientEntry) -> usize {
    CLIENT_ENTRY_HEADER_SIZE
        + match &entry.data {
            ClientEntryData::Rpt { .. } => RPT_CLIENT_ENTRY_DATA_SIZE,
            ClientEntryData::Ept { protocols } => protocols.len() * EPT_PROTOCOL_ENTRY_SIZE,
        }
}

fn pack_client_entry(w: &mut CursorMut<'_>, entry: &ClientEntry) -> ParseResult<()> {
    w.write_flags_length(client_entry_size(entry))?;
    match &entry.data {
        ClientEntryData::Rpt {
            uid,
            client_type,
            binding_cid,
        } => {
            w.write_u32(CLIENT_PROTOCOL_RPT)?;
            w.write_bytes(entry.cid.as_bytes())?;
            w.write_bytes(&uid.to_bytes())?;
            w.write_u8(client_type.to_wire())?;
            w.write_bytes(binding_cid.as_bytes())
        }
        ClientEntryData::Ept { protocols } => {
            w.write_u32(CLIENT_PROTOCOL_EPT)?;
            w.write_bytes(entry.cid.as_bytes())?;
            for prot in protocols {
                w.write_u32(prot.protocol_vector)?;
                w.write_str_padded(&prot.protocol_string, EPT_PROTOCOL_STRING_PADDED_LENGTH)?;
            }
            Ok(())
        }
    }
}

fn parse_client_entry(r: &mut Cursor<'_>) -> ParseResult<ClientEntry> {
    let pdu_len = r.read_flags_length()?;
    if pdu_len < CLIENT_ENTRY_HEADER_SIZE {
        return Err(ParseError::Malformed);
    }
    let protocol = r.read_u32()?;
    let cid = Cid::from_bytes(r.read_array::<16>()?);
    let mut body = r.sub_cursor(pdu_len - CLIENT_ENTRY_HEADER_SIZE)?;
    let data = match protocol {
        CLIENT_PROTOCOL_RPT => {
            let uid = RdmUid::from_bytes(body.read_array::<6>()?);
            let client_type = RptClientType::from_wire(body.read_u8()?)?;
            let binding_cid = Cid::from_bytes(body.read_array::<16>()?);
            if body.remaining() != 0 {
                return Err(ParseError::Malformed);
            }
            ClientEntryData::Rpt {
                uid,
                client_type,
                binding_cid,
            }
        }
        CLIENT_PROTOCOL_EPT => {
            if body.remaining() % EPT_PROTOCOL_ENTRY_SIZE != 0 {
                return Err(ParseError::Malformed);
            }
            let mut protocols = Vec::new();
            while body.remaining() > 0 {
                let protocol_vector = body.read_u32()?;
                let protocol_string = body
                    .read_str_padded(EPT_PROTOCOL_STRING_PADDED_LENGTH)?
                    .to_string();
                protocols.push(EptSubProtocol {
                    protocol_vector,
                    protocol_string,
                });
            }
            ClientEntryData::Ept { protocols }
        }
        other => {
            return Err(ParseError::UnsupportedVector {
                layer: Layer::Broker,
                vector: other,
            })
        }
    };
    Ok(ClientEntry { cid, data })
}
