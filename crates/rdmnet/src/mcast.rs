// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast transport: interface table, refcounted send sockets, and
//! per-interface group subscription.
//!
//! LLRP needs one send socket per (interface, source port) and receive
//! sockets bound to INADDR_ANY with explicit per-interface group joins.
//! The interface with the numerically lowest MAC address seeds the LLRP
//! hardware-identifier UID and DNS-SD tiebreaking.

use crate::protocol::consts::LLRP_MULTICAST_TTL;
use crate::{Error, Result};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

/// A hardware (MAC) address.
pub type MacAddr = [u8; 6];

/// Address family of one interface entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IpType {
    V4,
    V6,
}

/// Identifies one (interface, family) pair for multicast operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NetintId {
    pub index: u32,
    pub ip_type: IpType,
}

/// One usable multicast interface.
#[derive(Clone, Debug)]
pub struct NetintInfo {
    pub id: NetintId,
    pub name: String,
    pub addr: IpAddr,
    pub mac: MacAddr,
}

struct SendSocketEntry {
    socket: Arc<UdpSocket>,
    ref_count: usize,
}

/// Owner of the interface table and all multicast sockets.
pub struct McastManager {
    netints: Vec<NetintInfo>,
    lowest_mac: MacAddr,
    send_sockets: Mutex<HashMap<(NetintId, u16), SendSocketEntry>>,
}

impl McastManager {
    /// Enumerate interfaces and build the table.
    ///
    /// `RDMNET_MCAST_IF` overrides enumeration with a single IPv4 address
    /// (useful in containers and tests).
    pub fn new() -> Result<Self> {
        let netints = enumerate_netints()?;
        if netints.is_empty() {
            log::warn!("[MCAST] no multicast-capable interfaces found");
        }
        let lowest_mac = netints
            .iter()
            .map(|n| n.mac)
            .min()
            .unwrap_or([0, 0, 0, 0, 0, 0]);
        log::debug!(
            "[MCAST] {} interfaces, lowest MAC {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            netints.len(),
            lowest_mac[0],
            lowest_mac[1],
            lowest_mac[2],
            lowest_mac[3],
            lowest_mac[4],
            lowest_mac[5]
        );
        Ok(Self {
            netints,
            lowest_mac,
            send_sockets: Mutex::new(HashMap::new()),
        })
    }

    /// Build a manager from a fixed interface list (tests, static config).
    pub fn with_netints(netints: Vec<NetintInfo>) -> Self {
        let lowest_mac = netints
            .iter()
            .map(|n| n.mac)
            .min()
            .unwrap_or([0, 0, 0, 0, 0, 0]);
        Self {
            netints,
            lowest_mac,
            send_sockets: Mutex::new(HashMap::new()),
        }
    }

    pub fn netints(&self) -> &[NetintInfo] {
        &self.netints
    }

    pub fn netint_is_valid(&self, id: &NetintId) -> bool {
        self.netints.iter().any(|n| n.id == *id)
    }

    fn netint(&self, id: &NetintId) -> Result<&NetintInfo> {
        self.netints
            .iter()
            .find(|n| n.id == *id)
            .ok_or(Error::Invalid)
    }

    /// The lowest MAC across all interfaces; the LLRP tiebreak seed.
    pub fn lowest_mac_addr(&self) -> MacAddr {
        self.lowest_mac
    }

    /// Acquire the refcounted send socket for `(netint, source_port)`.
    ///
    /// TTL 20, loopback off, bound to the interface address so the OS
    /// routes the datagram out the requested interface.
    pub fn get_send_socket(&self, id: &NetintId, source_port: u16) -> Result<Arc<UdpSocket>> {
        let netint = self.netint(id)?.clone();
        let mut sockets = self.send_sockets.lock();
        if let Some(entry) = sockets.get_mut(&(*id, source_port)) {
            entry.ref_count += 1;
            return Ok(Arc::clone(&entry.socket));
        }

        let socket = create_send_socket(&netint, source_port)?;
        let socket = Arc::new(socket);
        sockets.insert(
            (*id, source_port),
            SendSocketEntry {
                socket: Arc::clone(&socket),
                ref_count: 1,
            },
        );
        log::debug!(
            "[MCAST] send socket created on {} port {}",
            netint.name,
            source_port
        );
        Ok(socket)
    }

    /// Drop one reference to a send socket; closes it on the last release.
    pub fn release_send_socket(&self, id: &NetintId, source_port: u16) {
        let mut sockets = self.send_sockets.lock();
        if let Some(entry) = sockets.get_mut(&(*id, source_port)) {
            entry.ref_count -= 1;
            if entry.ref_count == 0 {
                sockets.remove(&(*id, source_port));
            }
        }
    }

    /// Create a non-blocking receive socket bound to INADDR_ANY:`port`.
    ///
    /// Group membership is separate; call [`McastManager::subscribe`] per
    /// interface.
    pub fn create_recv_socket(&self, group: &IpAddr, port: u16) -> Result<UdpSocket> {
        let domain = match group {
            IpAddr::V4(_) => Domain::IPV4,
            IpAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Sys)?;
        socket.set_reuse_address(true).map_err(Error::Sys)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(Error::Sys)?;
        let bind_addr: SocketAddr = match group {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
        };
        socket.bind(&bind_addr.into()).map_err(Error::Sys)?;
        socket.set_nonblocking(true).map_err(Error::Sys)?;
        Ok(socket.into())
    }

    /// Join `group` on the given interface.
    pub fn subscribe(&self, socket: &UdpSocket, id: &NetintId, group: &IpAddr) -> Result<()> {
        let netint = self.netint(id)?;
        match (group, netint.addr) {
            (IpAddr::V4(group), IpAddr::V4(if_addr)) => socket
                .join_multicast_v4(group, &if_addr)
                .or_else(ignore_already_joined)
                .map_err(Error::Sys),
            (IpAddr::V6(group), _) => socket
                .join_multicast_v6(group, netint.id.index)
                .or_else(ignore_already_joined)
                .map_err(Error::Sys),
            _ => Err(Error::Invalid),
        }
    }

    /// Leave `group` on the given interface.
    pub fn unsubscribe(&self, socket: &UdpSocket, id: &NetintId, group: &IpAddr) -> Result<()> {
        let netint = self.netint(id)?;
        match (group, netint.addr) {
            (IpAddr::V4(group), IpAddr::V4(if_addr)) => socket
                .leave_multicast_v4(group, &if_addr)
                .map_err(Error::Sys),
            (IpAddr::V6(group), _) => socket
                .leave_multicast_v6(group, netint.id.index)
                .map_err(Error::Sys),
            _ => Err(Error::Invalid),
        }
    }
}

/// EADDRINUSE from a second join on the same physical NIC is harmless.
fn ignore_already_joined(e: std::io::Error) -> std::io::Result<()> {
    if e.raw_os_error() == Some(98) || e.kind() == std::io::ErrorKind::AddrInUse {
        Ok(())
    } else {
        Err(e)
    }
}

fn create_send_socket(netint: &NetintInfo, source_port: u16) -> Result<UdpSocket> {
    match netint.addr {
        IpAddr::V4(if_addr) => {
            let socket =
                Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Sys)?;
            socket.set_reuse_address(true).map_err(Error::Sys)?;
            let bind: SocketAddr = SocketAddr::new(IpAddr::V4(if_addr), source_port);
            socket.bind(&bind.into()).map_err(Error::Sys)?;
            socket
                .set_multicast_ttl_v4(LLRP_MULTICAST_TTL)
                .map_err(Error::Sys)?;
            socket.set_multicast_loop_v4(false).map_err(Error::Sys)?;
            socket.set_multicast_if_v4(&if_addr).map_err(Error::Sys)?;
            socket.set_nonblocking(true).map_err(Error::Sys)?;
            Ok(socket.into())
        }
        IpAddr::V6(_) => {
            let socket =
                Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Sys)?;
            socket.set_reuse_address(true).map_err(Error::Sys)?;
            let bind: SocketAddr =
                SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), source_port);
            socket.bind(&bind.into()).map_err(Error::Sys)?;
            socket
                .set_multicast_hops_v6(LLRP_MULTICAST_TTL)
                .map_err(Error::Sys)?;
            socket.set_multicast_loop_v6(false).map_err(Error::Sys)?;
            socket
                .set_multicast_if_v6(netint.id.index)
                .map_err(Error::Sys)?;
            socket.set_nonblocking(true).map_err(Error::Sys)?;
            Ok(socket.into())
        }
    }
}

/// Enumerate non-loopback interfaces via the `local_ip_address` crate.
fn enumerate_netints() -> Result<Vec<NetintInfo>> {
    // Env override for containers and multi-homed test machines.
    if let Ok(var) = std::env::var("RDMNET_MCAST_IF") {
        if let Ok(addr) = var.parse::<Ipv4Addr>() {
            log::debug!("[MCAST] using RDMNET_MCAST_IF override: {}", addr);
            return Ok(vec![NetintInfo {
                id: NetintId {
                    index: 0,
                    ip_type: IpType::V4,
                },
                name: "override".to_string(),
                addr: IpAddr::V4(addr),
                mac: mac_fallback_from_ip(&IpAddr::V4(addr)),
            }]);
        }
        log::warn!("[MCAST] invalid RDMNET_MCAST_IF='{}', ignoring", var);
    }

    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            log::warn!("[MCAST] interface enumeration failed: {}", e);
            return Ok(vec![]);
        }
    };

    let mut out = Vec::new();
    for (name, ip) in interfaces {
        if ip.is_loopback() {
            continue;
        }
        let index = if_index(&name);
        let ip_type = match ip {
            IpAddr::V4(_) => IpType::V4,
            IpAddr::V6(_) => IpType::V6,
        };
        let mac = read_mac(&name).unwrap_or_else(|| mac_fallback_from_ip(&ip));
        out.push(NetintInfo {
            id: NetintId { index, ip_type },
            name,
            addr: ip,
            mac,
        });
    }
    Ok(out)
}

fn if_index(name: &str) -> u32 {
    let cname = match std::ffi::CString::new(name) {
        Ok(c) => c,
        Err(_) => return 0,
    };
    // SAFETY: cname is a valid null-terminated string for the duration of
    // the call.
    unsafe { libc::if_nametoindex(cname.as_ptr()) }
}

/// Linux keeps interface MACs in sysfs.
#[cfg(target_os = "linux")]
fn read_mac(name: &str) -> Option<MacAddr> {
    let path = format!("/sys/class/net/{}/address", name);
    let contents = std::fs::read_to_string(path).ok()?;
    let mut mac = [0u8; 6];
    let mut parts = contents.trim().split(':');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    Some(mac)
}

#[cfg(not(target_os = "linux"))]
fn read_mac(_name: &str) -> Option<MacAddr> {
    None
}

/// Deterministic stand-in when the platform hides the hardware address.
fn mac_fallback_from_ip(ip: &IpAddr) -> MacAddr {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            [0x02, 0x00, o[0], o[1], o[2], o[3]]
        }
        IpAddr::V6(v6) => {
            let o = v6.octets();
            [0x02, 0x00, o[12], o[13], o[14], o[15]]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_netint(index: u32, last_octet: u8, mac: MacAddr) -> NetintInfo {
        NetintInfo {
            id: NetintId {
                index,
                ip_type: IpType::V4,
            },
            name: format!("test{}", index),
            addr: IpAddr::V4(Ipv4Addr::new(127, 0, 0, last_octet)),
            mac,
        }
    }

    #[test]
    fn test_lowest_mac_election() {
        let mgr = McastManager::with_netints(vec![
            fake_netint(1, 1, [0x00, 0x1b, 0x21, 0x00, 0x00, 0x05]),
            fake_netint(2, 2, [0x00, 0x1b, 0x21, 0x00, 0x00, 0x01]),
            fake_netint(3, 3, [0xaa, 0x00, 0x00, 0x00, 0x00, 0x00]),
        ]);
        assert_eq!(mgr.lowest_mac_addr(), [0x00, 0x1b, 0x21, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_netint_validity() {
        let mgr = McastManager::with_netints(vec![fake_netint(7, 1, [0; 6])]);
        assert!(mgr.netint_is_valid(&NetintId {
            index: 7,
            ip_type: IpType::V4
        }));
        assert!(!mgr.netint_is_valid(&NetintId {
            index: 8,
            ip_type: IpType::V4
        }));
        assert!(!mgr.netint_is_valid(&NetintId {
            index: 7,
            ip_type: IpType::V6
        }));
    }

    #[test]
    fn test_send_socket_refcounting() {
        let mgr = McastManager::with_netints(vec![fake_netint(1, 1, [0; 6])]);
        let id = NetintId {
            index: 1,
            ip_type: IpType::V4,
        };
        let first = mgr.get_send_socket(&id, 0).unwrap();
        let second = mgr.get_send_socket(&id, 0).unwrap();
        // Same underlying socket for the same (netint, port) key.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mgr.send_sockets.lock().len(), 1);

        mgr.release_send_socket(&id, 0);
        assert_eq!(mgr.send_sockets.lock().len(), 1);
        mgr.release_send_socket(&id, 0);
        assert_eq!(mgr.send_sockets.lock().len(), 0);
    }

    #[test]
    fn test_send_socket_unknown_netint() {
        let mgr = McastManager::with_netints(vec![]);
        let id = NetintId {
            index: 1,
            ip_type: IpType::V4,
        };
        assert!(matches!(
            mgr.get_send_socket(&id, 0),
            Err(Error::Invalid)
        ));
    }

    #[test]
    fn test_recv_socket_binds_any() {
        let mgr = McastManager::with_netints(vec![]);
        let group = IpAddr::V4(Ipv4Addr::new(239, 255, 250, 133));
        let sock = mgr.create_recv_socket(&group, 0).unwrap();
        let local = sock.local_addr().unwrap();
        assert!(local.ip().is_unspecified());
    }

    #[test]
    fn test_mac_fallback_is_deterministic() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(mac_fallback_from_ip(&ip), mac_fallback_from_ip(&ip));
        assert_eq!(mac_fallback_from_ip(&ip)[0], 0x02);
    }
}
