// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLRP: link-local discovery and recovery messaging.
//!
//! LLRP finds E1.33 components on the local link via multicast probes and
//! carries limited RDM to targets that have no working broker connection.
//! Two roles:
//!
//! - [`target::LlrpTarget`] answers probes (with collision-avoidance
//!   backoff) and serves RDM commands.
//! - [`manager::LlrpManager`] runs the probe-driven binary search over
//!   the UID space and issues RDM commands to discovered targets.
//!
//! Both are pure state machines: they consume datagrams and ticks and
//! emit [`OutgoingDatagram`]s for the caller to push through the
//! multicast transport. That keeps every protocol decision unit-testable
//! without sockets.

pub mod manager;
pub mod target;

pub use manager::{DiscoveredLlrpTarget, LlrpManager, ManagerEvent};
pub use target::{LlrpTarget, LlrpTargetConfig, SavedLlrpRdmCommand, TargetRdmResponse};

use crate::mcast::NetintId;
use crate::protocol::consts::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A datagram to transmit on a specific interface.
#[derive(Debug, Clone)]
pub struct OutgoingDatagram {
    pub netint: NetintId,
    pub dest: SocketAddr,
    pub data: Vec<u8>,
}

/// The IPv4 socket address probe requests are sent to.
pub fn ipv4_request_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::from(LLRP_IPV4_REQUEST_ADDR)), LLRP_PORT)
}

/// The IPv4 socket address replies and RDM responses are sent to.
pub fn ipv4_response_addr() -> SocketAddr {
    SocketAddr::new(
        IpAddr::V4(Ipv4Addr::from(LLRP_IPV4_RESPONSE_ADDR)),
        LLRP_PORT,
    )
}

/// The IPv6 socket address probe requests are sent to.
pub fn ipv6_request_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V6(Ipv6Addr::from(LLRP_IPV6_REQUEST_ADDR)), LLRP_PORT)
}

/// The IPv6 socket address replies and RDM responses are sent to.
pub fn ipv6_response_addr() -> SocketAddr {
    SocketAddr::new(
        IpAddr::V6(Ipv6Addr::from(LLRP_IPV6_RESPONSE_ADDR)),
        LLRP_PORT,
    )
}
