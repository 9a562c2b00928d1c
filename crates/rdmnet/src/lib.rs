// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rdmnet - RDMnet (ANSI E1.33) in pure Rust
//!
//! An implementation of the RDMnet core for entertainment lighting
//! control: the wire codec, the broker connection state machine, LLRP
//! link-local discovery, DNS-SD broker discovery glue, and the client
//! and broker cores that tie them together.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rdmnet::{Cid, RdmUid, Result, RptClientType};
//! use rdmnet::client::{RptClient, RptClientConfig, ScopeConfig, RptClientNotifications};
//! use rdmnet::runtime::Runtime;
//! use std::time::Duration;
//!
//! struct App;
//! impl RptClientNotifications for App {}
//!
//! fn main() -> Result<()> {
//!     let runtime = Runtime::new()?;
//!     let config = RptClientConfig::new(
//!         Cid::parse("7ab5967a-1737-489b-9bc8-62a8ea479b6b").unwrap(),
//!         RdmUid::dynamic_request(0x6574),
//!         RptClientType::Controller,
//!     );
//!     let client = RptClient::new(config, runtime.handle(), None, false)?;
//!     let scope = client.add_scope(
//!         ScopeConfig::default_scope().with_static_broker("192.168.1.10:8888".parse().unwrap()),
//!     )?;
//!
//!     let mut app = App;
//!     loop {
//!         client.process(Duration::from_millis(100), &mut app);
//!     }
//!     # #[allow(unreachable_code)] { let _ = scope; Ok(()) }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Application Layer                            |
//! |      Controller / Device / Broker / EPT app / LLRP manager          |
//! +---------------------------------------------------------------------+
//! |                        Component Cores                              |
//! |   client (RPT/EPT scopes)  |  broker (registry, routing, UIDs)      |
//! +---------------------------------------------------------------------+
//! |                      Protocol Machinery                             |
//! |   conn (TCP FSM, heartbeat) | llrp (target/manager) | disc (mDNS)   |
//! +---------------------------------------------------------------------+
//! |                        Wire and I/O                                 |
//! |   protocol (codec) | msgbuf (reassembly) | mcast | runtime (poll)   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Cid`] | 128-bit component identifier |
//! | [`RdmUid`] | RDM unique ID (`manufacturer:device`) |
//! | [`client::RptClient`] | Controller/device client core |
//! | [`broker::Broker`] | Broker core |
//! | [`llrp::LlrpManager`] | LLRP discovery manager |
//! | [`runtime::Runtime`] | Shared polled-socket event loop |
//!
//! ## See Also
//!
//! - ANSI E1.33 (RDMnet), ANSI E1.20 (RDM), ANSI E1.17 (ACN)

/// Broker core: admission, client registry, UID assignment, routing.
pub mod broker;
/// Component identifier (CID) type.
mod cid;
/// RPT and EPT client cores (multi-scope identity, RDM/EPT data plane).
pub mod client;
/// Per-broker TCP connection state machine.
pub mod conn;
/// Broker discovery over DNS-SD.
pub mod disc;
/// Crate error types.
mod error;
/// LLRP link-local discovery and recovery messaging.
pub mod llrp;
/// Multicast transport (interface table, group subscription).
pub mod mcast;
/// TCP stream reassembler.
pub mod msgbuf;
/// E1.33 wire codec.
pub mod protocol;
/// Shared runtime: polled-socket registry, timers.
pub mod runtime;
/// RDM unique identifier type.
mod uid;
/// Small shared utilities.
pub mod util;

pub use cid::Cid;
pub use error::{Error, Result};
pub use protocol::{
    ConnectStatus, DisconnectReason, DynamicUidStatus, LlrpComponentType, ParseError, RdmBuffer,
    RdmnetMessage, RptClientType, RptStatusCode,
};
pub use uid::{RdmUid, BROADCAST_ALL_UID, CONTROLLER_BROADCAST_UID, DEVICE_BROADCAST_UID};

/// Capacity limits for static-memory deployments.
///
/// Every capped registry takes its maximum from one of these fields;
/// `None` means fully dynamic allocation, while a set limit makes the
/// corresponding registry return [`Error::NoMem`] instead of growing.
/// Components thread one `Limits` value through their configs
/// ([`broker::BrokerSettings`], [`client::RptClientConfig`],
/// [`client::EptClientConfig`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    /// Connections tracked by one component's connection table.
    pub max_connections: Option<usize>,
    /// Scopes one client may join.
    pub max_scopes_per_client: Option<usize>,
    /// Clients one broker admits.
    pub max_clients_per_broker: Option<usize>,
    /// Live entries in a broker's UID registry.
    pub max_uid_entries: Option<usize>,
    /// Responders behind one device endpoint.
    pub max_responders_per_endpoint: Option<usize>,
}
