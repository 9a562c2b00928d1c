// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLRP target: probe replies with collision-avoidance backoff, and
//! RDM-over-multicast command service.
//!
//! # Probe reply backoff
//!
//! Every target on a link hears the same probe request. To keep replies
//! from colliding, each target draws a uniform delay in
//! `[0, LLRP_MAX_BACKOFF_MS]` and replies when its timer fires. A probe
//! that arrives while a reply is already pending does not restart the
//! timer; the earlier draw stands.
//!
//! # RDM service
//!
//! Commands addressed to this target's CID are dispatched to the user
//! handler synchronously. The handler either fills in a response (packed
//! and queued before the call returns) or defers, in which case the
//! command is saved with owned storage and answered later via
//! [`LlrpTarget::send_ack`] / [`LlrpTarget::send_nack`].

use super::{ipv4_response_addr, OutgoingDatagram};
use crate::mcast::{MacAddr, NetintId};
use crate::protocol::consts::*;
use crate::protocol::llrp::{LlrpMessage, LlrpMessageData, ProbeReply, ProbeRequest};
use crate::protocol::rdm::{RdmBuffer, RDM_RESPONSE_TYPE_ACK, RDM_RESPONSE_TYPE_NACK_REASON};
use crate::protocol::types::LlrpComponentType;
use crate::runtime::Timer;
use crate::{Cid, Error, RdmUid, Result};

/// Immutable identity of an LLRP target.
#[derive(Debug, Clone)]
pub struct LlrpTargetConfig {
    pub cid: Cid,
    pub uid: RdmUid,
    pub component_type: LlrpComponentType,
    pub hardware_address: MacAddr,
}

/// What the user handler decides to do with a received RDM command.
#[derive(Debug)]
pub enum TargetRdmResponse {
    /// Respond now with this parameter data.
    Ack(Vec<u8>),
    /// Respond now with a NACK reason code.
    Nack(u16),
    /// Respond later through `send_ack`/`send_nack`.
    Defer,
}

/// Handler for RDM commands received by a target.
pub trait LlrpTargetHandler: Send {
    fn rdm_command_received(&mut self, cmd: &SavedLlrpRdmCommand) -> TargetRdmResponse;
}

/// An RDM command saved with owned storage for a deferred response.
#[derive(Debug, Clone)]
pub struct SavedLlrpRdmCommand {
    pub source_cid: Cid,
    pub transaction_num: u32,
    pub rdm: RdmBuffer,
    pub netint: NetintId,
}

/// Per-interface reply state.
struct TargetNetint {
    id: NetintId,
    reply_pending: bool,
    pending_reply_cid: Cid,
    pending_reply_trans_num: u32,
    reply_backoff: Timer,
}

/// Output of feeding one datagram to a target.
#[derive(Debug, Default)]
pub struct TargetOutput {
    /// Responses to transmit immediately.
    pub datagrams: Vec<OutgoingDatagram>,
    /// A command the handler deferred; respond via `send_ack`/`send_nack`.
    pub saved_command: Option<SavedLlrpRdmCommand>,
}

/// LLRP target state machine, one instance per component.
pub struct LlrpTarget {
    config: LlrpTargetConfig,
    netints: Vec<TargetNetint>,
    connected_to_broker: bool,
}

impl LlrpTarget {
    pub fn new(config: LlrpTargetConfig, netints: &[NetintId]) -> Self {
        let netints = netints
            .iter()
            .map(|&id| TargetNetint {
                id,
                reply_pending: false,
                pending_reply_cid: Cid::nil(),
                pending_reply_trans_num: 0,
                reply_backoff: Timer::start(0),
            })
            .collect();
        Self {
            config,
            netints,
            connected_to_broker: false,
        }
    }

    pub fn cid(&self) -> Cid {
        self.config.cid
    }

    pub fn uid(&self) -> RdmUid {
        self.config.uid
    }

    /// Keep the component-type filter accurate: targets with a live
    /// broker connection suppress replies to CLIENT_CONN_INACTIVE probes.
    pub fn update_connection_state(&mut self, connected_to_broker: bool) {
        self.connected_to_broker = connected_to_broker;
    }

    /// Feed one received datagram.
    pub fn handle_datagram(
        &mut self,
        data: &[u8],
        netint: NetintId,
        handler: &mut dyn LlrpTargetHandler,
    ) -> TargetOutput {
        let mut out = TargetOutput::default();
        let msg = match LlrpMessage::parse(data) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("[LLRP] target dropping datagram: {}", e);
                return out;
            }
        };
        // Self-echo suppression.
        if msg.sender_cid == self.config.cid {
            return out;
        }
        match msg.data {
            LlrpMessageData::ProbeRequest(req) => {
                self.handle_probe_request(&msg.sender_cid, msg.transaction_num, &req, netint);
            }
            LlrpMessageData::RdmCommand(rdm) => {
                if msg.dest_cid != self.config.cid {
                    return out;
                }
                let saved = SavedLlrpRdmCommand {
                    source_cid: msg.sender_cid,
                    transaction_num: msg.transaction_num,
                    rdm,
                    netint,
                };
                match handler.rdm_command_received(&saved) {
                    TargetRdmResponse::Ack(data) => {
                        if let Ok(dg) = self.build_rdm_response(
                            &saved,
                            RDM_RESPONSE_TYPE_ACK,
                            &data,
                        ) {
                            out.datagrams.push(dg);
                        }
                    }
                    TargetRdmResponse::Nack(reason) => {
                        if let Ok(dg) = self.build_rdm_response(
                            &saved,
                            RDM_RESPONSE_TYPE_NACK_REASON,
                            &reason.to_be_bytes(),
                        ) {
                            out.datagrams.push(dg);
                        }
                    }
                    TargetRdmResponse::Defer => out.saved_command = Some(saved),
                }
            }
            // Targets ignore replies and responses from other targets.
            LlrpMessageData::ProbeReply(_) => {}
        }
        out
    }

    fn handle_probe_request(
        &mut self,
        sender_cid: &Cid,
        transaction_num: u32,
        req: &ProbeRequest,
        netint: NetintId,
    ) {
        if !req.uid_in_range(&self.config.uid) {
            return;
        }
        if req.known_uids.contains(&self.config.uid) {
            return;
        }
        if req.filter & LLRP_FILTERVAL_BROKERS_ONLY != 0
            && self.config.component_type != LlrpComponentType::Broker
        {
            return;
        }
        if req.filter & LLRP_FILTERVAL_CLIENT_CONN_INACTIVE != 0 && self.connected_to_broker {
            return;
        }
        let state = match self.netints.iter_mut().find(|n| n.id == netint) {
            Some(s) => s,
            None => return,
        };
        if state.reply_pending {
            // An earlier probe already armed the timer; keep its draw.
            return;
        }
        state.reply_pending = true;
        state.pending_reply_cid = *sender_cid;
        state.pending_reply_trans_num = transaction_num;
        let delay = fastrand::u64(0..=LLRP_MAX_BACKOFF_MS);
        state.reply_backoff.restart_with(delay);
        log::debug!(
            "[LLRP] target {} arming probe reply in {} ms",
            self.config.uid,
            delay
        );
    }

    /// Drive reply backoff timers; returns probe replies due now.
    pub fn tick(&mut self) -> Vec<OutgoingDatagram> {
        let mut out = Vec::new();
        for state in &mut self.netints {
            if !state.reply_pending || !state.reply_backoff.is_expired() {
                continue;
            }
            state.reply_pending = false;
            let msg = LlrpMessage {
                sender_cid: self.config.cid,
                dest_cid: state.pending_reply_cid,
                transaction_num: state.pending_reply_trans_num,
                data: LlrpMessageData::ProbeReply(ProbeReply {
                    uid: self.config.uid,
                    hardware_address: self.config.hardware_address,
                    component_type: self.config.component_type,
                }),
            };
            match pack_datagram(&msg, state.id) {
                Ok(dg) => out.push(dg),
                Err(e) => log::error!("[LLRP] probe reply pack failed: {}", e),
            }
        }
        out
    }

    /// Respond to a previously deferred command with an ACK.
    pub fn send_ack(
        &self,
        cmd: &SavedLlrpRdmCommand,
        response_data: &[u8],
    ) -> Result<OutgoingDatagram> {
        self.build_rdm_response(cmd, RDM_RESPONSE_TYPE_ACK, response_data)
            .map_err(|_| Error::Invalid)
    }

    /// Respond to a previously deferred command with a NACK reason.
    pub fn send_nack(&self, cmd: &SavedLlrpRdmCommand, nack_reason: u16) -> Result<OutgoingDatagram> {
        self.build_rdm_response(cmd, RDM_RESPONSE_TYPE_NACK_REASON, &nack_reason.to_be_bytes())
            .map_err(|_| Error::Invalid)
    }

    fn build_rdm_response(
        &self,
        cmd: &SavedLlrpRdmCommand,
        response_type: u8,
        data: &[u8],
    ) -> std::result::Result<OutgoingDatagram, crate::protocol::ParseError> {
        let response = cmd.rdm.build_response(self.config.uid, response_type, data)?;
        let msg = LlrpMessage {
            sender_cid: self.config.cid,
            dest_cid: cmd.source_cid,
            transaction_num: cmd.transaction_num,
            data: LlrpMessageData::RdmCommand(response),
        };
        pack_datagram(&msg, cmd.netint)
    }
}

fn pack_datagram(
    msg: &LlrpMessage,
    netint: NetintId,
) -> std::result::Result<OutgoingDatagram, crate::protocol::ParseError> {
    let mut data = vec![0u8; msg.size_of()];
    msg.pack(&mut data)?;
    Ok(OutgoingDatagram {
        netint,
        dest: ipv4_response_addr(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::llrp::LLRP_BROADCAST_CID;
    use crate::protocol::rdm::checksum;
    use crate::uid::BROADCAST_ALL_UID;

    const NETINT: NetintId = NetintId {
        index: 1,
        ip_type: crate::mcast::IpType::V4,
    };

    struct NullHandler;
    impl LlrpTargetHandler for NullHandler {
        fn rdm_command_received(&mut self, _cmd: &SavedLlrpRdmCommand) -> TargetRdmResponse {
            TargetRdmResponse::Defer
        }
    }

    struct AckHandler(Vec<u8>);
    impl LlrpTargetHandler for AckHandler {
        fn rdm_command_received(&mut self, _cmd: &SavedLlrpRdmCommand) -> TargetRdmResponse {
            TargetRdmResponse::Ack(self.0.clone())
        }
    }

    fn target_config() -> LlrpTargetConfig {
        LlrpTargetConfig {
            cid: Cid::parse("7ab5967a-1737-489b-9bc8-62a8ea479b6b").unwrap(),
            uid: RdmUid::new(0x6574, 0x100),
            component_type: LlrpComponentType::RptDevice,
            hardware_address: [0, 0x1b, 0x21, 1, 2, 3],
        }
    }

    fn manager_cid() -> Cid {
        Cid::parse("9aad1b1e-32fa-43d2-ae31-392ae88b19a0").unwrap()
    }

    fn probe_datagram(filter: u16, known: Vec<RdmUid>) -> Vec<u8> {
        let msg = LlrpMessage {
            sender_cid: manager_cid(),
            dest_cid: LLRP_BROADCAST_CID,
            transaction_num: 5,
            data: LlrpMessageData::ProbeRequest(ProbeRequest {
                lower_uid: RdmUid::new(0, 0),
                upper_uid: BROADCAST_ALL_UID,
                filter,
                known_uids: known,
            }),
        };
        let mut buf = vec![0u8; msg.size_of()];
        msg.pack(&mut buf).unwrap();
        buf
    }

    fn rdm_command_for(target: &LlrpTarget) -> RdmBuffer {
        let total = 26;
        let mut d = vec![0u8; total];
        d[0] = RDM_START_CODE;
        d[1] = RDM_SUB_START_CODE;
        d[2] = (total - 2) as u8;
        d[3..9].copy_from_slice(&target.uid().to_bytes());
        d[9..15].copy_from_slice(&RdmUid::new(0x1234, 1).to_bytes());
        d[15] = 9; // transaction
        d[20] = 0x20; // GET_COMMAND
        let ck = checksum(&d[..total - 2]);
        d[total - 2..].copy_from_slice(&ck.to_be_bytes());
        RdmBuffer::from_slice(&d).unwrap()
    }

    fn rdm_datagram(target: &LlrpTarget, dest_cid: Cid) -> Vec<u8> {
        let msg = LlrpMessage {
            sender_cid: manager_cid(),
            dest_cid,
            transaction_num: 77,
            data: LlrpMessageData::RdmCommand(rdm_command_for(target)),
        };
        let mut buf = vec![0u8; msg.size_of()];
        msg.pack(&mut buf).unwrap();
        buf
    }

    fn drain_reply(target: &mut LlrpTarget) -> Option<OutgoingDatagram> {
        // The backoff draw is bounded by LLRP_MAX_BACKOFF_MS; spin the
        // tick until it fires.
        let deadline = std::time::Instant::now()
            + std::time::Duration::from_millis(LLRP_MAX_BACKOFF_MS + 500);
        while std::time::Instant::now() < deadline {
            let replies = target.tick();
            if !replies.is_empty() {
                return replies.into_iter().next();
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_probe_in_range_arms_reply() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        let out = target.handle_datagram(&probe_datagram(0, vec![]), NETINT, &mut NullHandler);
        assert!(out.datagrams.is_empty());

        let reply = drain_reply(&mut target).expect("no probe reply");
        let parsed = LlrpMessage::parse(&reply.data).unwrap();
        assert_eq!(parsed.dest_cid, manager_cid());
        assert_eq!(parsed.transaction_num, 5);
        match parsed.data {
            LlrpMessageData::ProbeReply(r) => {
                assert_eq!(r.uid, target_config().uid);
                assert_eq!(r.component_type, LlrpComponentType::RptDevice);
                assert_eq!(r.hardware_address, [0, 0x1b, 0x21, 1, 2, 3]);
            }
            other => panic!("expected probe reply, got {:?}", other),
        }
    }

    #[test]
    fn test_known_uid_suppresses_reply() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        let probe = probe_datagram(0, vec![target_config().uid]);
        target.handle_datagram(&probe, NETINT, &mut NullHandler);
        assert!(target.tick().is_empty());
        assert!(!target.netints[0].reply_pending);
    }

    #[test]
    fn test_out_of_range_probe_ignored() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        let msg = LlrpMessage {
            sender_cid: manager_cid(),
            dest_cid: LLRP_BROADCAST_CID,
            transaction_num: 1,
            data: LlrpMessageData::ProbeRequest(ProbeRequest {
                lower_uid: RdmUid::new(0xaaaa, 0),
                upper_uid: RdmUid::new(0xbbbb, 0),
                filter: 0,
                known_uids: vec![],
            }),
        };
        let mut buf = vec![0u8; msg.size_of()];
        msg.pack(&mut buf).unwrap();
        target.handle_datagram(&buf, NETINT, &mut NullHandler);
        assert!(!target.netints[0].reply_pending);
    }

    #[test]
    fn test_brokers_only_filter() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        let probe = probe_datagram(LLRP_FILTERVAL_BROKERS_ONLY, vec![]);
        target.handle_datagram(&probe, NETINT, &mut NullHandler);
        assert!(!target.netints[0].reply_pending);
    }

    #[test]
    fn test_connected_filter() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        target.update_connection_state(true);
        let probe = probe_datagram(LLRP_FILTERVAL_CLIENT_CONN_INACTIVE, vec![]);
        target.handle_datagram(&probe, NETINT, &mut NullHandler);
        assert!(!target.netints[0].reply_pending);

        target.update_connection_state(false);
        target.handle_datagram(&probe, NETINT, &mut NullHandler);
        assert!(target.netints[0].reply_pending);
    }

    #[test]
    fn test_second_probe_keeps_earlier_timer() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        target.handle_datagram(&probe_datagram(0, vec![]), NETINT, &mut NullHandler);
        let first_trans = target.netints[0].pending_reply_trans_num;

        // A second probe (different transaction) must not re-arm.
        let msg = LlrpMessage {
            sender_cid: manager_cid(),
            dest_cid: LLRP_BROADCAST_CID,
            transaction_num: 99,
            data: LlrpMessageData::ProbeRequest(ProbeRequest {
                lower_uid: RdmUid::new(0, 0),
                upper_uid: BROADCAST_ALL_UID,
                filter: 0,
                known_uids: vec![],
            }),
        };
        let mut buf = vec![0u8; msg.size_of()];
        msg.pack(&mut buf).unwrap();
        target.handle_datagram(&buf, NETINT, &mut NullHandler);
        assert_eq!(target.netints[0].pending_reply_trans_num, first_trans);
    }

    #[test]
    fn test_backoff_draw_is_bounded_and_spread() {
        // Sample the same draw the probe handler makes.
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let delay = fastrand::u64(0..=LLRP_MAX_BACKOFF_MS);
            assert!(delay <= LLRP_MAX_BACKOFF_MS);
            seen.insert(delay);
        }
        // A uniform draw over 2001 values must not collapse to a handful.
        assert!(seen.len() > 500, "only {} distinct delays", seen.len());
    }

    #[test]
    fn test_sync_ack_produces_response() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        let dg = rdm_datagram(&target, target_config().cid);
        let out = target.handle_datagram(&dg, NETINT, &mut AckHandler(vec![0xaa, 0xbb]));
        assert_eq!(out.datagrams.len(), 1);
        assert!(out.saved_command.is_none());

        let parsed = LlrpMessage::parse(&out.datagrams[0].data).unwrap();
        assert_eq!(parsed.dest_cid, manager_cid());
        assert_eq!(parsed.transaction_num, 77);
        match parsed.data {
            LlrpMessageData::RdmCommand(resp) => {
                resp.validate().unwrap();
                assert_eq!(resp.source_uid(), target_config().uid);
                assert_eq!(resp.command_class(), 0x21);
            }
            other => panic!("expected RDM response, got {:?}", other),
        }
    }

    #[test]
    fn test_deferred_command_saved_then_acked() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        let dg = rdm_datagram(&target, target_config().cid);
        let out = target.handle_datagram(&dg, NETINT, &mut NullHandler);
        assert!(out.datagrams.is_empty());
        let saved = out.saved_command.expect("command not saved");
        assert_eq!(saved.source_cid, manager_cid());
        assert_eq!(saved.transaction_num, 77);

        let dg = target.send_ack(&saved, &[1, 2, 3]).unwrap();
        let parsed = LlrpMessage::parse(&dg.data).unwrap();
        assert_eq!(parsed.transaction_num, 77);
    }

    #[test]
    fn test_command_for_other_cid_ignored() {
        let mut target = LlrpTarget::new(target_config(), &[NETINT]);
        let dg = rdm_datagram(&target, manager_cid());
        let out = target.handle_datagram(&dg, NETINT, &mut NullHandler);
        assert!(out.datagrams.is_empty());
        assert!(out.saved_command.is_none());
    }
}
