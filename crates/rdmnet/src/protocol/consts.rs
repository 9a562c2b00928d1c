// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.33 / E1.17 / LLRP protocol constants.
//!
//! Centralizes every wire magic number, vector value, padded string length,
//! port, multicast group, and timing constant so parser and builder code
//! share one source of truth.
//!

/// ACN packet identifier, first bytes of every TCP and UDP preamble (E1.17).
pub const ACN_PACKET_IDENT: &[u8; 12] = b"ASC-E1.17\0\0\0";

/// TCP preamble: packet identifier + 4-byte PDU block length.
pub const ACN_TCP_PREAMBLE_SIZE: usize = 16;

/// UDP preamble: preamble size (u16) + post-amble size (u16) + identifier.
pub const ACN_UDP_PREAMBLE_SIZE: usize = 16;

/// Value of the preamble-size field in a UDP preamble.
pub const ACN_UDP_PREAMBLE_SIZE_FIELD: u16 = 0x0010;

/// Root layer PDU header: flags+length (3) + vector (4) + sender CID (16).
pub const ACN_ROOT_PDU_HEADER_SIZE: usize = 23;

// ============================================================================
// Root Layer Vectors (E1.33 Table A-1)
// ============================================================================

pub const VECTOR_ROOT_BROKER: u32 = 0x0000_0009;
pub const VECTOR_ROOT_RPT: u32 = 0x0000_0005;
pub const VECTOR_ROOT_EPT: u32 = 0x0000_000b;
pub const VECTOR_ROOT_LLRP: u32 = 0x0000_000a;

// ============================================================================
// Broker PDU (E1.33 Table A-2)
// ============================================================================

/// Broker PDU header: flags+length (3) + vector (2).
pub const BROKER_PDU_HEADER_SIZE: usize = 5;

pub const VECTOR_BROKER_CONNECT: u16 = 0x0001;
pub const VECTOR_BROKER_CONNECT_REPLY: u16 = 0x0002;
pub const VECTOR_BROKER_CLIENT_ENTRY_UPDATE: u16 = 0x0003;
pub const VECTOR_BROKER_REDIRECT_V4: u16 = 0x0004;
pub const VECTOR_BROKER_REDIRECT_V6: u16 = 0x0005;
pub const VECTOR_BROKER_FETCH_CLIENT_LIST: u16 = 0x0006;
pub const VECTOR_BROKER_CONNECTED_CLIENT_LIST: u16 = 0x0007;
pub const VECTOR_BROKER_CLIENT_ADD: u16 = 0x0008;
pub const VECTOR_BROKER_CLIENT_REMOVE: u16 = 0x0009;
pub const VECTOR_BROKER_CLIENT_ENTRY_CHANGE: u16 = 0x000a;
pub const VECTOR_BROKER_REQUEST_DYNAMIC_UIDS: u16 = 0x000b;
pub const VECTOR_BROKER_ASSIGNED_DYNAMIC_UIDS: u16 = 0x000c;
pub const VECTOR_BROKER_FETCH_DYNAMIC_UID_LIST: u16 = 0x000d;
pub const VECTOR_BROKER_DISCONNECT: u16 = 0x000e;
pub const VECTOR_BROKER_NULL: u16 = 0x000f;

// ============================================================================
// Client Entries (E1.33 Table A-13)
// ============================================================================

/// Client entry PDU header: flags+length (3) + client protocol (4) + CID (16).
pub const CLIENT_ENTRY_HEADER_SIZE: usize = 23;

/// RPT client entry data: UID (6) + type (1) + binding CID (16).
pub const RPT_CLIENT_ENTRY_DATA_SIZE: usize = 23;

/// One EPT sub-protocol entry: vector (4) + name (32).
pub const EPT_PROTOCOL_ENTRY_SIZE: usize = 36;

pub const RPT_CLIENT_ENTRY_SIZE: usize = CLIENT_ENTRY_HEADER_SIZE + RPT_CLIENT_ENTRY_DATA_SIZE;

pub const CLIENT_PROTOCOL_RPT: u32 = VECTOR_ROOT_RPT;
pub const CLIENT_PROTOCOL_EPT: u32 = VECTOR_ROOT_EPT;

/// Maximum length of an EPT sub-protocol name, including the null terminator.
pub const EPT_PROTOCOL_STRING_PADDED_LENGTH: usize = 32;

// ============================================================================
// Broker Message Field Sizes
// ============================================================================

/// Scope string storage, including the null terminator.
pub const E133_SCOPE_STRING_PADDED_LENGTH: usize = 63;

/// Search domain string storage, including the null terminator.
pub const E133_DOMAIN_STRING_PADDED_LENGTH: usize = 231;

/// Client connect fixed fields: scope + E1.33 version (2) + search domain +
/// connect flags (1).
pub const CLIENT_CONNECT_COMMON_FIELD_SIZE: usize =
    E133_SCOPE_STRING_PADDED_LENGTH + 2 + E133_DOMAIN_STRING_PADDED_LENGTH + 1;

/// Connect reply data: connection code (2) + E1.33 version (2) + broker UID
/// (6) + client UID (6).
pub const CONNECT_REPLY_DATA_SIZE: usize = 16;

pub const REDIRECT_V4_DATA_SIZE: usize = 6;
pub const REDIRECT_V6_DATA_SIZE: usize = 18;

/// Dynamic UID request pair: requested UID (6) + RID (16).
pub const DYNAMIC_UID_REQUEST_PAIR_SIZE: usize = 22;

/// Dynamic UID mapping: assigned UID (6) + RID (16) + status code (2).
pub const DYNAMIC_UID_MAPPING_SIZE: usize = 24;

pub const DISCONNECT_DATA_SIZE: usize = 2;

/// Connect flag: request incremental client list updates.
pub const CONNECTFLAG_INCREMENTAL_UPDATES: u8 = 0x01;

// ============================================================================
// RPT PDU (E1.33 Table A-7)
// ============================================================================

/// RPT PDU header: flags+length (3) + vector (4) + source UID (6) + source
/// endpoint (2) + dest UID (6) + dest endpoint (2) + sequence number (4) +
/// reserved (1).
pub const RPT_PDU_HEADER_SIZE: usize = 28;

pub const VECTOR_RPT_REQUEST: u32 = 0x0000_0001;
pub const VECTOR_RPT_STATUS: u32 = 0x0000_0002;
pub const VECTOR_RPT_NOTIFICATION: u32 = 0x0000_0003;

/// Request / Notification sub-PDU header: flags+length (3) + vector (4).
pub const REQUEST_NOTIF_PDU_HEADER_SIZE: usize = 7;

/// The single defined Request/Notification sub-PDU vector (RDM command).
pub const VECTOR_REQUEST_RDM_CMD: u32 = 0x0000_0001;
pub const VECTOR_NOTIFICATION_RDM_CMD: u32 = 0x0000_0001;

/// RPT status sub-PDU header: flags+length (3) + vector (2).
pub const RPT_STATUS_HEADER_SIZE: usize = 5;

/// Maximum RPT status string length, excluding null terminator.
pub const RPT_STATUS_STRING_MAXLEN: usize = 1024;

/// Endpoint 0 addresses the component itself rather than a sub-responder.
pub const NULL_ENDPOINT: u16 = 0x0000;

// ============================================================================
// EPT PDU
// ============================================================================

/// EPT PDU header: flags+length (3) + vector (4) + destination CID (16).
pub const EPT_PDU_HEADER_SIZE: usize = 23;

pub const VECTOR_EPT_DATA: u32 = 0x0000_0001;
pub const VECTOR_EPT_STATUS: u32 = 0x0000_0002;

pub const EPT_STATUS_UNKNOWN_CID: u16 = 0x0001;
pub const EPT_STATUS_UNKNOWN_VECTOR: u16 = 0x0002;

// ============================================================================
// LLRP PDU (E1.33 Table A-20)
// ============================================================================

/// LLRP PDU header: flags+length (3) + vector (4) + destination CID (16) +
/// transaction number (4).
pub const LLRP_PDU_HEADER_SIZE: usize = 27;

pub const VECTOR_LLRP_PROBE_REQUEST: u32 = 0x0000_0001;
pub const VECTOR_LLRP_PROBE_REPLY: u32 = 0x0000_0002;
pub const VECTOR_LLRP_RDM_CMD: u32 = 0x0000_0003;

/// Probe request sub-PDU vector (one byte).
pub const VECTOR_PROBE_REQUEST_DATA: u8 = 0x01;
/// Probe reply sub-PDU vector (one byte).
pub const VECTOR_PROBE_REPLY_DATA: u8 = 0x01;

/// Probe request fixed fields: vector (1) + lower UID (6) + upper UID (6) +
/// filter (2), after the 3-byte flags+length.
pub const PROBE_REQUEST_MIN_SIZE: usize = 3 + 15;

/// Probe reply data: vector (1) + UID (6) + hardware address (6) + component
/// type (1), after the 3-byte flags+length.
pub const PROBE_REPLY_SIZE: usize = 3 + 14;

/// Maximum number of known UIDs that fit in one probe request.
pub const LLRP_KNOWN_UID_SIZE: usize = 200;

/// Filter bit: do not reply while connected to a broker.
pub const LLRP_FILTERVAL_CLIENT_CONN_INACTIVE: u16 = 0x0001;
/// Filter bit: only brokers reply.
pub const LLRP_FILTERVAL_BROKERS_ONLY: u16 = 0x0002;

// ============================================================================
// Network Addressing
// ============================================================================

/// LLRP UDP port (IANA).
pub const LLRP_PORT: u16 = 5569;

/// IPv4 multicast group on which LLRP probe requests are sent.
pub const LLRP_IPV4_REQUEST_ADDR: [u8; 4] = [239, 255, 250, 133];
/// IPv4 multicast group on which LLRP responses are sent.
pub const LLRP_IPV4_RESPONSE_ADDR: [u8; 4] = [239, 255, 250, 134];

/// IPv6 multicast group on which LLRP probe requests are sent.
pub const LLRP_IPV6_REQUEST_ADDR: [u16; 8] = [0xff18, 0, 0, 0, 0, 0x0085, 0, 0x0085];
/// IPv6 multicast group on which LLRP responses are sent.
pub const LLRP_IPV6_RESPONSE_ADDR: [u16; 8] = [0xff18, 0, 0, 0, 0, 0x0085, 0, 0x0086];

/// Multicast TTL for all LLRP send sockets.
pub const LLRP_MULTICAST_TTL: u32 = 20;

// ============================================================================
// Timing (milliseconds, E1.33 Sec.6 / Sec.5.4)
// ============================================================================

/// Interval at which a connection sends heartbeats (Broker Null PDUs).
pub const E133_HEARTBEAT_SEND_INTERVAL_MS: u64 = 15_000;

/// A connection is dead after this long with no traffic from the peer.
pub const E133_HEARTBEAT_TIMEOUT_MS: u64 = 2 * E133_HEARTBEAT_SEND_INTERVAL_MS;

/// Initial TCP connect retry backoff.
pub const CONNECT_BACKOFF_INITIAL_MS: u64 = 3_000;

/// Backoff doubles on each failure up to this ceiling.
pub const CONNECT_BACKOFF_MAX_MS: u64 = 30_000;

/// Ceiling for the random LLRP probe-reply delay.
pub const LLRP_MAX_BACKOFF_MS: u64 = 2_000;

/// How long an LLRP manager collects replies before deciding on a range.
pub const LLRP_DISCOVERY_INTERVAL_MS: u64 = 2_500;

/// How long a registering broker monitors its scope for a conflicting
/// broker before declaring registration complete.
pub const BROKER_REG_QUERY_TIMEOUT_MS: u64 = 3_000;

// ============================================================================
// Protocol Strings and Versions
// ============================================================================

pub const E133_VERSION: u16 = 1;
pub const E133_DEFAULT_SCOPE: &str = "default";
pub const E133_DEFAULT_DOMAIN: &str = "local.";

/// DNS-SD service type under which brokers register.
pub const E133_DNSSD_SRV_TYPE: &str = "_rdmnet-broker._tcp";

// ============================================================================
// Framing Limits
// ============================================================================

/// Largest RDMnet TCP frame this implementation will produce or accept.
///
/// The flags+length field could express up to 2^20 - 1, but no defined
/// message approaches that; brokers fragment client lists to stay under
/// this bound.
pub const RDMNET_MAX_FRAME_SIZE: usize = 65_536;

// ============================================================================
// RDM Framing (E1.20)
// ============================================================================

/// RDM start code.
pub const RDM_START_CODE: u8 = 0xcc;
/// RDM sub-start code.
pub const RDM_SUB_START_CODE: u8 = 0x01;
/// Smallest valid RDM packet: 24-byte header + 2-byte checksum.
pub const RDM_MIN_BYTES: usize = 26;
/// Largest valid RDM packet: header + 231-byte parameter data + checksum.
pub const RDM_MAX_BYTES: usize = 257;
/// Maximum parameter data length.
pub const RDM_MAX_PDL: usize = 231;
