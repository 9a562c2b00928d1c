// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLRP manager: probe-driven discovery and RDM command issue.
//!
//! Discovery binary-searches the 48-bit UID space. Each round probes one
//! range, suppressing already-known UIDs (up to the 200 that fit in a
//! probe request). If a round draws more replies than the suppression
//! list could absorb, the range is split in half and both halves are
//! searched; a range that stays quiet for a full collection interval is
//! done. Discovery finishes when no ranges remain.

use super::{ipv4_request_addr, ipv4_response_addr, OutgoingDatagram};
use crate::mcast::{MacAddr, NetintId};
use crate::protocol::consts::*;
use crate::protocol::llrp::{
    LlrpMessage, LlrpMessageData, ProbeRequest, LLRP_BROADCAST_CID,
};
use crate::protocol::rdm::RdmBuffer;
use crate::protocol::types::LlrpComponentType;
use crate::runtime::Timer;
use crate::{Cid, Error, RdmUid, Result};
use std::collections::HashMap;

/// One discovered target, keyed by CID in the manager's map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLlrpTarget {
    pub cid: Cid,
    pub uid: RdmUid,
    pub component_type: LlrpComponentType,
    pub hardware_address: MacAddr,
    /// False once the target stops answering (reserved for lease logic).
    pub known: bool,
}

/// Events produced by the manager state machine.
#[derive(Debug)]
pub enum ManagerEvent {
    TargetDiscovered(DiscoveredLlrpTarget),
    DiscoveryFinished,
    /// An RDM response correlated by transaction number.
    RdmResponseReceived {
        source_cid: Cid,
        transaction_num: u32,
        response: RdmBuffer,
    },
}

struct DiscoveryState {
    /// Ranges still to search, as inclusive 48-bit bounds.
    pending_ranges: Vec<(u64, u64)>,
    current_range: (u64, u64),
    interval: Timer,
    replies_this_interval: usize,
    new_targets_found: bool,
    filter: u16,
}

/// LLRP manager state machine, one instance per managing component.
pub struct LlrpManager {
    cid: Cid,
    netint: NetintId,
    transaction_num: u32,
    targets: HashMap<Cid, DiscoveredLlrpTarget>,
    discovery: Option<DiscoveryState>,
    discovery_interval_ms: u64,
}

impl LlrpManager {
    pub fn new(cid: Cid, netint: NetintId) -> Self {
        Self {
            cid,
            netint,
            transaction_num: 0,
            targets: HashMap::new(),
            discovery: None,
            discovery_interval_ms: LLRP_DISCOVERY_INTERVAL_MS,
        }
    }

    /// Shorten the collection interval (tests).
    pub fn set_discovery_interval_ms(&mut self, ms: u64) {
        self.discovery_interval_ms = ms;
    }

    pub fn targets(&self) -> impl Iterator<Item = &DiscoveredLlrpTarget> {
        self.targets.values()
    }

    fn next_transaction(&mut self) -> u32 {
        let t = self.transaction_num;
        self.transaction_num = self.transaction_num.wrapping_add(1);
        t
    }

    /// Begin a discovery run over the entire UID space.
    ///
    /// Returns the first probe request to transmit. Fails if discovery is
    /// already running.
    pub fn start_discovery(&mut self, filter: u16) -> Result<OutgoingDatagram> {
        if self.discovery.is_some() {
            return Err(Error::Invalid);
        }
        let full_range = (0u64, RdmUid::new(0xffff, 0xffffffff).as_u64());
        let mut state = DiscoveryState {
            pending_ranges: Vec::new(),
            current_range: full_range,
            interval: Timer::start(self.discovery_interval_ms),
            replies_this_interval: 0,
            new_targets_found: false,
            filter,
        };
        let probe = self.build_probe(&mut state)?;
        self.discovery = Some(state);
        Ok(probe)
    }

    /// True while a discovery run is active.
    pub fn discovery_active(&self) -> bool {
        self.discovery.is_some()
    }

    fn build_probe(&mut self, state: &mut DiscoveryState) -> Result<OutgoingDatagram> {
        let (lower, upper) = state.current_range;
        let known_uids: Vec<RdmUid> = self
            .targets
            .values()
            .map(|t| t.uid)
            .filter(|uid| {
                let v = uid.as_u64();
                v >= lower && v <= upper
            })
            .take(LLRP_KNOWN_UID_SIZE)
            .collect();
        let msg = LlrpMessage {
            sender_cid: self.cid,
            dest_cid: LLRP_BROADCAST_CID,
            transaction_num: self.next_transaction(),
            data: LlrpMessageData::ProbeRequest(ProbeRequest {
                lower_uid: RdmUid::from_u64(lower),
                upper_uid: RdmUid::from_u64(upper),
                filter: state.filter,
                known_uids,
            }),
        };
        let mut data = vec![0u8; msg.size_of()];
        msg.pack(&mut data).map_err(|_| Error::Invalid)?;
        state.interval.restart_with(self.discovery_interval_ms);
        state.replies_this_interval = 0;
        log::debug!(
            "[LLRP] probing range {:012x}..{:012x}",
            lower,
            upper
        );
        Ok(OutgoingDatagram {
            netint: self.netint,
            dest: ipv4_request_addr(),
            data,
        })
    }

    /// Feed one received datagram (from the response multicast group).
    pub fn handle_datagram(&mut self, data: &[u8]) -> Vec<ManagerEvent> {
        let mut events = Vec::new();
        let msg = match LlrpMessage::parse(data) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("[LLRP] manager dropping datagram: {}", e);
                return events;
            }
        };
        if msg.sender_cid == self.cid {
            return events;
        }
        match msg.data {
            LlrpMessageData::ProbeReply(reply) => {
                if msg.dest_cid != self.cid {
                    return events;
                }
                if let Some(state) = self.discovery.as_mut() {
                    state.replies_this_interval += 1;
                }
                let target = DiscoveredLlrpTarget {
                    cid: msg.sender_cid,
                    uid: reply.uid,
                    component_type: reply.component_type,
                    hardware_address: reply.hardware_address,
                    known: true,
                };
                let is_new = self
                    .targets
                    .insert(msg.sender_cid, target.clone())
                    .is_none();
                if is_new {
                    if let Some(state) = self.discovery.as_mut() {
                        state.new_targets_found = true;
                    }
                    log::info!("[LLRP] discovered target {} ({})", target.uid, target.cid);
                    events.push(ManagerEvent::TargetDiscovered(target));
                }
            }
            LlrpMessageData::RdmCommand(response) => {
                if msg.dest_cid != self.cid {
                    return events;
                }
                events.push(ManagerEvent::RdmResponseReceived {
                    source_cid: msg.sender_cid,
                    transaction_num: msg.transaction_num,
                    response,
                });
            }
            LlrpMessageData::ProbeRequest(_) => {}
        }
        events
    }

    /// Drive the discovery interval timer.
    pub fn tick(&mut self) -> (Vec<OutgoingDatagram>, Vec<ManagerEvent>) {
        let mut datagrams = Vec::new();
        let mut events = Vec::new();

        let mut state = match self.discovery.take() {
            Some(s) => s,
            None => return (datagrams, events),
        };
        if !state.interval.is_expired() {
            self.discovery = Some(state);
            return (datagrams, events);
        }

        // The collection interval for the current range has ended.
        let threshold = LLRP_KNOWN_UID_SIZE.saturating_sub(self.targets.len()).max(1);
        if state.replies_this_interval >= threshold {
            // Too many replies to suppress next round; halve the range.
            let (lower, upper) = state.current_range;
            let mid = lower + (upper - lower) / 2;
            state.pending_ranges.push((mid + 1, upper));
            state.current_range = (lower, mid);
            match self.build_probe(&mut state) {
                Ok(dg) => {
                    datagrams.push(dg);
                    self.discovery = Some(state);
                }
                Err(_) => events.push(ManagerEvent::DiscoveryFinished),
            }
        } else if state.replies_this_interval > 0 {
            // Some replies but under threshold: probe the same range once
            // more so backoff losers get another chance to answer.
            match self.build_probe(&mut state) {
                Ok(dg) => {
                    datagrams.push(dg);
                    self.discovery = Some(state);
                }
                Err(_) => events.push(ManagerEvent::DiscoveryFinished),
            }
        } else if let Some(next) = state.pending_ranges.pop() {
            state.current_range = next;
            match self.build_probe(&mut state) {
                Ok(dg) => {
                    datagrams.push(dg);
                    self.discovery = Some(state);
                }
                Err(_) => events.push(ManagerEvent::DiscoveryFinished),
            }
        } else {
            log::info!(
                "[LLRP] discovery finished, {} targets known",
                self.targets.len()
            );
            events.push(ManagerEvent::DiscoveryFinished);
        }
        (datagrams, events)
    }

    /// Issue an RDM command to a discovered target.
    ///
    /// Returns the transaction number for response correlation plus the
    /// datagram to transmit.
    pub fn send_rdm_command(
        &mut self,
        dest_cid: Cid,
        rdm: RdmBuffer,
    ) -> Result<(u32, OutgoingDatagram)> {
        if !self.targets.contains_key(&dest_cid) {
            return Err(Error::NotFound);
        }
        let transaction_num = self.next_transaction();
        let msg = LlrpMessage {
            sender_cid: self.cid,
            dest_cid,
            transaction_num,
            data: LlrpMessageData::RdmCommand(rdm),
        };
        let mut data = vec![0u8; msg.size_of()];
        msg.pack(&mut data).map_err(|_| Error::Invalid)?;
        Ok((
            transaction_num,
            OutgoingDatagram {
                netint: self.netint,
                dest: ipv4_response_addr(),
                data,
            },
        ))
    }
}
