// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPT and EPT client cores.
//!
//! Both client kinds own a set of scopes, each scope one broker
//! connection; they differ only in their data plane (RDM-over-RPT vs
//! opaque EPT payloads). The shared lifecycle lives in [`ClientCore`];
//! [`RptClient`] and [`EptClient`] layer their message handling on top.
//!
//! # Sync-response convention
//!
//! A device's RDM command notification returns a [`ClientRdmResponse`].
//! Returning `Ack`/`Nack` makes the core pack and transmit the response
//! before the notification call returns; returning `Defer` hands the
//! caller an owned [`SavedRdmCommand`] to answer later via
//! [`RptClient::send_rdm_ack`] / [`RptClient::send_rdm_nack`].

pub mod endpoints;
pub mod scope;

pub use endpoints::{Endpoint, EndpointKind, EndpointRegistry, ResponderRef};
pub use scope::{ScopeConfig, ScopeHandle};

use crate::conn::{ConnEvent, ConnHandle, ConnTiming, ConnectionTable, DisconnectCause};
use crate::llrp::target::{LlrpTargetHandler, SavedLlrpRdmCommand};
use crate::llrp::{LlrpTarget, LlrpTargetConfig, OutgoingDatagram};
use crate::mcast::{McastManager, NetintId};
use crate::protocol::broker::{
    BrokerMessage, ClientConnectMsg, ClientEntry, ClientEntryData, ClientList, DynamicUidMapping,
    DynamicUidRequest, EptSubProtocol,
};
use crate::protocol::consts::*;
use crate::protocol::ept::{EptMessage, EptMessageData, EptStatusMsg};
use crate::protocol::message::{RdmnetMessage, RdmnetMessageData};
use crate::protocol::rdm::{RdmBuffer, RDM_RESPONSE_TYPE_ACK, RDM_RESPONSE_TYPE_NACK_REASON};
use crate::protocol::rpt::{RdmBufList, RptHeader, RptMessage, RptMessageData, RptStatusMsg};
use crate::protocol::types::{DisconnectReason, LlrpComponentType, RptClientType};
use crate::runtime::RuntimeHandle;
use crate::util::HandleAllocator;
use crate::{Cid, Error, Limits, RdmUid, Result};
use parking_lot::Mutex;
use scope::ScopeState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Which client-list message a broker pushed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClientListAction {
    /// Full list in reply to a fetch.
    ConnectedList,
    Add,
    Remove,
    Change,
}

/// Broker admission details for a connected scope.
#[derive(Copy, Clone, Debug)]
pub struct ScopeConnectedInfo {
    pub broker_uid: RdmUid,
    /// The UID this client operates under (broker-assigned for dynamic
    /// clients).
    pub client_uid: RdmUid,
}

/// An RDM command saved with owned storage for a deferred response.
#[derive(Debug, Clone)]
pub struct SavedRdmCommand {
    pub scope: ScopeHandle,
    pub header: RptHeader,
    pub rdm: RdmBuffer,
}

/// Synchronous response decision for a received RDM command.
#[derive(Debug)]
pub enum ClientRdmResponse {
    Ack(Vec<u8>),
    Nack(u16),
    Defer,
}

/// Notifications delivered by [`RptClient::process`].
///
/// Default implementations ignore everything, so implementors override
/// only what they consume.
#[allow(unused_variables)]
pub trait RptClientNotifications {
    fn connected(&mut self, scope: ScopeHandle, info: &ScopeConnectedInfo) {}
    fn connect_failed(&mut self, scope: ScopeHandle, will_retry: bool) {}
    fn disconnected(&mut self, scope: ScopeHandle, cause: &DisconnectCause, will_retry: bool) {}
    fn client_list_update(
        &mut self,
        scope: ScopeHandle,
        action: ClientListAction,
        list: &ClientList,
    ) {
    }
    fn dynamic_uids_assigned(&mut self, scope: ScopeHandle, mappings: &[DynamicUidMapping]) {}
    /// A notification (RDM response or update) arrived.
    fn rdm_response_received(&mut self, scope: ScopeHandle, header: &RptHeader, list: &RdmBufList) {
    }
    fn status_received(&mut self, scope: ScopeHandle, header: &RptHeader, status: &RptStatusMsg) {}
    /// An RDM command addressed to this device. See the sync-response
    /// convention in the module docs.
    fn rdm_command_received(&mut self, cmd: &SavedRdmCommand) -> ClientRdmResponse {
        ClientRdmResponse::Defer
    }
}

/// Notifications delivered by [`EptClient::process`].
#[allow(unused_variables)]
pub trait EptClientNotifications {
    fn connected(&mut self, scope: ScopeHandle, info: &ScopeConnectedInfo) {}
    fn connect_failed(&mut self, scope: ScopeHandle, will_retry: bool) {}
    fn disconnected(&mut self, scope: ScopeHandle, cause: &DisconnectCause, will_retry: bool) {}
    fn client_list_update(
        &mut self,
        scope: ScopeHandle,
        action: ClientListAction,
        list: &ClientList,
    ) {
    }
    fn data_received(&mut self, scope: ScopeHandle, source_cid: &Cid, protocol_vector: u32, data: &[u8]) {
    }
    fn status_received(&mut self, scope: ScopeHandle, source_cid: &Cid, status: &EptStatusMsg) {}
}

// ============================================================================
// Shared core
// ============================================================================

/// Scope lifecycle shared by RPT and EPT clients.
struct ClientCore {
    cid: Cid,
    search_domain: String,
    runtime: RuntimeHandle,
    conns: ConnectionTable,
    scopes: Mutex<HashMap<ScopeHandle, ScopeState>>,
    conn_to_scope: Mutex<HashMap<ConnHandle, ScopeHandle>>,
    alloc: Mutex<HandleAllocator>,
    limits: Limits,
}

impl ClientCore {
    fn new(
        cid: Cid,
        search_domain: String,
        runtime: RuntimeHandle,
        timing: ConnTiming,
        limits: Limits,
    ) -> Self {
        Self {
            cid,
            search_domain,
            conns: ConnectionTable::with_timing(runtime.clone(), limits.max_connections, timing),
            runtime,
            scopes: Mutex::new(HashMap::new()),
            conn_to_scope: Mutex::new(HashMap::new()),
            alloc: Mutex::new(HandleAllocator::new()),
            limits,
        }
    }

    fn connect_msg(&self, scope: &ScopeConfig, entry: ClientEntry) -> ClientConnectMsg {
        ClientConnectMsg {
            scope: scope.scope.clone(),
            e133_version: E133_VERSION,
            search_domain: self.search_domain.clone(),
            connect_flags: CONNECTFLAG_INCREMENTAL_UPDATES,
            client_entry: entry,
        }
    }

    fn add_scope(&self, config: ScopeConfig, entry: ClientEntry) -> Result<ScopeHandle> {
        let mut scopes = self.scopes.lock();
        if let Some(max) = self.limits.max_scopes_per_client {
            if scopes.len() >= max {
                return Err(Error::NoMem);
            }
        }
        if scopes.values().any(|s| s.config.scope == config.scope) {
            return Err(Error::AlreadyExists);
        }
        let conn = self.conns.create(self.cid)?;
        let handle = self.alloc.lock().next_handle();
        if let Some(addr) = config.static_broker_addr {
            self.conns
                .connect(conn, addr, self.connect_msg(&config, entry))?;
        }
        scopes.insert(handle, ScopeState::new(handle, config, conn));
        self.conn_to_scope.lock().insert(conn, handle);
        Ok(handle)
    }

    fn remove_scope(&self, handle: ScopeHandle, reason: DisconnectReason) -> Result<()> {
        let state = self.scopes.lock().remove(&handle).ok_or(Error::NotFound)?;
        self.conn_to_scope.lock().remove(&state.conn);
        self.conns.destroy(state.conn, Some(reason))
    }

    fn change_scope(
        &self,
        handle: ScopeHandle,
        new_config: ScopeConfig,
        entry: ClientEntry,
        reason: DisconnectReason,
    ) -> Result<()> {
        let mut scopes = self.scopes.lock();
        let state = scopes.get_mut(&handle).ok_or(Error::NotFound)?;
        let msg = ClientConnectMsg {
            scope: new_config.scope.clone(),
            e133_version: E133_VERSION,
            search_domain: self.search_domain.clone(),
            connect_flags: CONNECTFLAG_INCREMENTAL_UPDATES,
            client_entry: entry,
        };
        state.config = new_config.clone();
        state.connected = false;
        if let Some(addr) = new_config.static_broker_addr {
            self.conns.reconnect(state.conn, addr, msg, reason)?;
        }
        Ok(())
    }

    /// A discovery adapter found a broker for a waiting scope.
    fn broker_found(&self, handle: ScopeHandle, addr: std::net::SocketAddr, entry: ClientEntry) -> Result<()> {
        let scopes = self.scopes.lock();
        let state = scopes.get(&handle).ok_or(Error::NotFound)?;
        let msg = self.connect_msg(&state.config, entry);
        self.conns.connect(state.conn, addr, msg)
    }

    fn scope_of_conn(&self, conn: ConnHandle) -> Option<ScopeHandle> {
        self.conn_to_scope.lock().get(&conn).copied()
    }

    /// Poll sockets and timers; map connection events to scope handles.
    fn process(&self, timeout: Duration) -> Vec<(ScopeHandle, ConnEvent)> {
        let mut conn_events = self.conns.tick();
        if let Ok(socket_events) = self.runtime.tick(Some(timeout)) {
            for ev in socket_events {
                conn_events.extend(self.conns.handle_socket_event(ev));
            }
        }
        conn_events
            .into_iter()
            .filter_map(|(conn, ev)| self.scope_of_conn(conn).map(|s| (s, ev)))
            .collect()
    }

    fn send_frame(&self, handle: ScopeHandle, frame: &[u8]) -> Result<()> {
        let conn = {
            let scopes = self.scopes.lock();
            let state = scopes.get(&handle).ok_or(Error::NotFound)?;
            if !state.connected {
                return Err(Error::Invalid);
            }
            state.conn
        };
        self.conns.send(conn, frame)
    }

    fn send_broker_msg(&self, handle: ScopeHandle, msg: BrokerMessage) -> Result<()> {
        let frame = RdmnetMessage::broker(self.cid, msg)
            .pack_to_vec()
            .map_err(|_| Error::Invalid)?;
        self.send_frame(handle, &frame)
    }

    fn mark_connected(&self, handle: ScopeHandle, broker_uid: RdmUid, client_uid: RdmUid) {
        if let Some(state) = self.scopes.lock().get_mut(&handle) {
            state.connected = true;
            state.broker_uid = broker_uid;
            state.assigned_uid = client_uid;
        }
    }

    fn mark_disconnected(&self, handle: ScopeHandle) {
        if let Some(state) = self.scopes.lock().get_mut(&handle) {
            state.connected = false;
        }
    }

    fn any_scope_connected(&self) -> bool {
        self.scopes.lock().values().any(|s| s.connected)
    }

    fn assigned_uid(&self, handle: ScopeHandle) -> Result<RdmUid> {
        self.scopes
            .lock()
            .get(&handle)
            .map(|s| s.assigned_uid)
            .ok_or(Error::NotFound)
    }

    fn take_seqnum(&self, handle: ScopeHandle) -> Result<u32> {
        self.scopes
            .lock()
            .get_mut(&handle)
            .map(ScopeState::take_seqnum)
            .ok_or(Error::NotFound)
    }
}

// ============================================================================
// RPT client
// ============================================================================

/// Configuration for an RPT client (controller or device).
#[derive(Debug, Clone)]
pub struct RptClientConfig {
    pub cid: Cid,
    /// Static UID, or a dynamic request built with
    /// [`RdmUid::dynamic_request`].
    pub uid: RdmUid,
    pub client_type: RptClientType,
    pub search_domain: String,
    /// Capacity limits for the client's scope, connection, and endpoint
    /// registries.
    pub limits: Limits,
    pub timing: ConnTiming,
}

impl RptClientConfig {
    pub fn new(cid: Cid, uid: RdmUid, client_type: RptClientType) -> Self {
        Self {
            cid,
            uid,
            client_type,
            search_domain: E133_DEFAULT_DOMAIN.to_string(),
            limits: Limits::default(),
            timing: ConnTiming::default(),
        }
    }
}

/// An RPT client: multi-scope identity plus the RDM data plane.
pub struct RptClient {
    config: RptClientConfig,
    core: ClientCore,
    llrp_target: Option<Mutex<LlrpTarget>>,
    mcast: Option<Arc<McastManager>>,
    /// Device-side endpoint table (empty for controllers).
    endpoints: Mutex<EndpointRegistry>,
}

impl RptClient {
    /// Create a client; `create_llrp_target` co-locates an LLRP target
    /// bound to the client's CID and UID on the manager's interfaces.
    pub fn new(
        config: RptClientConfig,
        runtime: RuntimeHandle,
        mcast: Option<Arc<McastManager>>,
        create_llrp_target: bool,
    ) -> Result<Self> {
        let llrp_target = if create_llrp_target {
            let mcast = mcast.as_ref().ok_or(Error::Invalid)?;
            let netints: Vec<NetintId> = mcast.netints().iter().map(|n| n.id).collect();
            let component_type = match config.client_type {
                RptClientType::Controller => LlrpComponentType::RptController,
                RptClientType::Device => LlrpComponentType::RptDevice,
            };
            Some(Mutex::new(LlrpTarget::new(
                LlrpTargetConfig {
                    cid: config.cid,
                    uid: config.uid,
                    component_type,
                    hardware_address: mcast.lowest_mac_addr(),
                },
                &netints,
            )))
        } else {
            None
        };
        let core = ClientCore::new(
            config.cid,
            config.search_domain.clone(),
            runtime,
            config.timing,
            config.limits,
        );
        let endpoints = Mutex::new(EndpointRegistry::new(
            config.limits.max_responders_per_endpoint,
        ));
        Ok(Self {
            config,
            core,
            llrp_target,
            mcast,
            endpoints,
        })
    }

    /// The device's endpoint table. Controllers leave it empty.
    pub fn endpoints(&self) -> &Mutex<EndpointRegistry> {
        &self.endpoints
    }

    /// Request dynamic UIDs for every virtual responder still awaiting
    /// one, binding each assignment to its RID.
    pub fn request_responder_uids(&self, scope: ScopeHandle) -> Result<()> {
        let requests = self
            .endpoints
            .lock()
            .pending_uid_requests(self.config.uid.manu);
        if requests.is_empty() {
            return Ok(());
        }
        self.request_dynamic_uids(scope, requests)
    }

    pub fn cid(&self) -> Cid {
        self.config.cid
    }

    fn client_entry(&self) -> ClientEntry {
        ClientEntry {
            cid: self.config.cid,
            data: ClientEntryData::Rpt {
                uid: self.config.uid,
                client_type: self.config.client_type,
                binding_cid: Cid::nil(),
            },
        }
    }

    /// Join a scope. With a static broker address the connection starts
    /// immediately; otherwise call [`RptClient::broker_found`] when
    /// discovery resolves one.
    pub fn add_scope(&self, config: ScopeConfig) -> Result<ScopeHandle> {
        self.core.add_scope(config, self.client_entry())
    }

    /// Shortcut for the discovery default scope.
    pub fn add_default_scope(&self) -> Result<ScopeHandle> {
        self.add_scope(ScopeConfig::default_scope())
    }

    /// Leave a scope, sending the broker a disconnect with `reason`.
    pub fn remove_scope(&self, scope: ScopeHandle, reason: DisconnectReason) -> Result<()> {
        self.core.remove_scope(scope, reason)
    }

    /// Atomically swap a scope's configuration, keeping the handle.
    pub fn change_scope(
        &self,
        scope: ScopeHandle,
        new_config: ScopeConfig,
        reason: DisconnectReason,
    ) -> Result<()> {
        self.core
            .change_scope(scope, new_config, self.client_entry(), reason)
    }

    /// Feed a discovered broker address to a scope awaiting one.
    pub fn broker_found(&self, scope: ScopeHandle, addr: std::net::SocketAddr) -> Result<()> {
        self.core.broker_found(scope, addr, self.client_entry())
    }

    /// Poll sockets/timers and deliver notifications. Callbacks run with
    /// no internal locks held.
    pub fn process(&self, timeout: Duration, notify: &mut dyn RptClientNotifications) {
        for (scope, event) in self.core.process(timeout) {
            match event {
                ConnEvent::Connected { reply } => {
                    self.core
                        .mark_connected(scope, reply.broker_uid, reply.client_uid);
                    self.update_llrp_connected();
                    notify.connected(
                        scope,
                        &ScopeConnectedInfo {
                            broker_uid: reply.broker_uid,
                            client_uid: reply.client_uid,
                        },
                    );
                }
                ConnEvent::ConnectFailed { will_retry, .. } => {
                    notify.connect_failed(scope, will_retry);
                }
                ConnEvent::Disconnected { cause, will_retry } => {
                    self.core.mark_disconnected(scope);
                    self.update_llrp_connected();
                    notify.disconnected(scope, &cause, will_retry);
                }
                ConnEvent::MsgReceived(msg) => self.dispatch_message(scope, msg, notify),
            }
        }
    }

    fn dispatch_message(
        &self,
        scope: ScopeHandle,
        msg: RdmnetMessage,
        notify: &mut dyn RptClientNotifications,
    ) {
        match msg.data {
            RdmnetMessageData::Broker(bmsg) => match bmsg {
                BrokerMessage::ConnectedClientList(list) => {
                    notify.client_list_update(scope, ClientListAction::ConnectedList, &list);
                }
                BrokerMessage::ClientAdd(list) => {
                    notify.client_list_update(scope, ClientListAction::Add, &list);
                }
                BrokerMessage::ClientRemove(list) => {
                    notify.client_list_update(scope, ClientListAction::Remove, &list);
                }
                BrokerMessage::ClientEntryChange(list) => {
                    notify.client_list_update(scope, ClientListAction::Change, &list);
                }
                BrokerMessage::AssignedDynamicUids(mappings) => {
                    {
                        let mut endpoints = self.endpoints.lock();
                        for m in &mappings {
                            if m.status == crate::protocol::DynamicUidStatus::Ok {
                                endpoints.apply_uid_assignment(&m.rid, m.uid);
                            }
                        }
                    }
                    notify.dynamic_uids_assigned(scope, &mappings);
                }
                other => {
                    log::debug!(
                        "[CLIENT] ignoring broker message vector 0x{:04x}",
                        other.vector()
                    );
                }
            },
            RdmnetMessageData::Rpt(rpt) => match rpt.data {
                RptMessageData::Request(list) => {
                    // A request carries exactly one command (the codec
                    // enforces it).
                    let cmd = SavedRdmCommand {
                        scope,
                        header: rpt.header,
                        rdm: list.buffers[0],
                    };
                    match notify.rdm_command_received(&cmd) {
                        ClientRdmResponse::Ack(data) => {
                            if let Err(e) = self.send_rdm_ack(&cmd, &data) {
                                log::warn!("[CLIENT] sync ack failed: {}", e);
                            }
                        }
                        ClientRdmResponse::Nack(reason) => {
                            if let Err(e) = self.send_rdm_nack(&cmd, reason) {
                                log::warn!("[CLIENT] sync nack failed: {}", e);
                            }
                        }
                        ClientRdmResponse::Defer => {}
                    }
                }
                RptMessageData::Notification(list) => {
                    notify.rdm_response_received(scope, &rpt.header, &list);
                }
                RptMessageData::Status(status) => {
                    notify.status_received(scope, &rpt.header, &status);
                }
            },
            RdmnetMessageData::Ept(_) => {
                log::debug!("[CLIENT] RPT client ignoring EPT message");
            }
        }
    }

    // ========================================================================
    // RDM sends
    // ========================================================================

    /// Send an RDM command to a device. Returns the sequence number for
    /// correlating the response notification.
    pub fn send_rdm_command(
        &self,
        scope: ScopeHandle,
        dest_uid: RdmUid,
        dest_endpoint_id: u16,
        rdm: RdmBuffer,
    ) -> Result<u32> {
        let seqnum = self.core.take_seqnum(scope)?;
        let header = RptHeader {
            source_uid: self.core.assigned_uid(scope)?,
            source_endpoint_id: NULL_ENDPOINT,
            dest_uid,
            dest_endpoint_id,
            seqnum,
        };
        let msg = RptMessage {
            header,
            data: RptMessageData::Request(RdmBufList {
                buffers: vec![rdm],
                more_coming: false,
            }),
        };
        let frame = RdmnetMessage::rpt(self.config.cid, msg)
            .pack_to_vec()
            .map_err(|_| Error::Invalid)?;
        self.core.send_frame(scope, &frame)?;
        Ok(seqnum)
    }

    /// ACK a previously received (or deferred) command.
    pub fn send_rdm_ack(&self, cmd: &SavedRdmCommand, response_data: &[u8]) -> Result<()> {
        let uid = self.core.assigned_uid(cmd.scope)?;
        let response = cmd
            .rdm
            .build_response(uid, RDM_RESPONSE_TYPE_ACK, response_data)
            .map_err(|_| Error::Invalid)?;
        self.send_notification_for(cmd, response)
    }

    /// NACK a previously received (or deferred) command.
    pub fn send_rdm_nack(&self, cmd: &SavedRdmCommand, nack_reason: u16) -> Result<()> {
        let uid = self.core.assigned_uid(cmd.scope)?;
        let response = cmd
            .rdm
            .build_response(uid, RDM_RESPONSE_TYPE_NACK_REASON, &nack_reason.to_be_bytes())
            .map_err(|_| Error::Invalid)?;
        self.send_notification_for(cmd, response)
    }

    fn send_notification_for(&self, cmd: &SavedRdmCommand, response: RdmBuffer) -> Result<()> {
        let header = RptHeader {
            source_uid: self.core.assigned_uid(cmd.scope)?,
            source_endpoint_id: cmd.header.dest_endpoint_id,
            dest_uid: cmd.header.source_uid,
            dest_endpoint_id: cmd.header.source_endpoint_id,
            seqnum: cmd.header.seqnum,
        };
        let msg = RptMessage {
            header,
            data: RptMessageData::Notification(RdmBufList {
                buffers: vec![response],
                more_coming: false,
            }),
        };
        let frame = RdmnetMessage::rpt(self.config.cid, msg)
            .pack_to_vec()
            .map_err(|_| Error::Invalid)?;
        self.core.send_frame(cmd.scope, &frame)
    }

    /// Send an unsolicited RDM update to every controller on the scope.
    pub fn send_rdm_update(
        &self,
        scope: ScopeHandle,
        source_endpoint_id: u16,
        rdm: RdmBuffer,
    ) -> Result<u32> {
        let seqnum = self.core.take_seqnum(scope)?;
        let header = RptHeader {
            source_uid: self.core.assigned_uid(scope)?,
            source_endpoint_id,
            dest_uid: crate::uid::CONTROLLER_BROADCAST_UID,
            dest_endpoint_id: NULL_ENDPOINT,
            seqnum,
        };
        let msg = RptMessage {
            header,
            data: RptMessageData::Notification(RdmBufList {
                buffers: vec![rdm],
                more_coming: false,
            }),
        };
        let frame = RdmnetMessage::rpt(self.config.cid, msg)
            .pack_to_vec()
            .map_err(|_| Error::Invalid)?;
        self.core.send_frame(scope, &frame)?;
        Ok(seqnum)
    }

    // ========================================================================
    // Broker queries
    // ========================================================================

    pub fn request_client_list(&self, scope: ScopeHandle) -> Result<()> {
        self.core.send_broker_msg(scope, BrokerMessage::FetchClientList)
    }

    pub fn request_dynamic_uids(
        &self,
        scope: ScopeHandle,
        requests: Vec<DynamicUidRequest>,
    ) -> Result<()> {
        self.core
            .send_broker_msg(scope, BrokerMessage::RequestDynamicUids(requests))
    }

    pub fn request_responder_ids(&self, scope: ScopeHandle, uids: &[RdmUid]) -> Result<()> {
        self.core
            .send_broker_msg(scope, BrokerMessage::FetchDynamicUidList(uids.to_vec()))
    }

    // ========================================================================
    // Co-located LLRP target
    // ========================================================================

    fn update_llrp_connected(&self) {
        if let Some(target) = &self.llrp_target {
            target
                .lock()
                .update_connection_state(self.core.any_scope_connected());
        }
    }

    /// Feed a datagram from an LLRP receive socket to the co-located
    /// target. Sync responses and due probe replies are transmitted via
    /// the multicast manager.
    pub fn llrp_data_received(
        &self,
        data: &[u8],
        netint: NetintId,
        handler: &mut dyn LlrpTargetHandler,
    ) -> Option<SavedLlrpRdmCommand> {
        let target = self.llrp_target.as_ref()?;
        let out = target.lock().handle_datagram(data, netint, handler);
        for dg in &out.datagrams {
            self.send_llrp_datagram(dg);
        }
        out.saved_command
    }

    /// Drive the LLRP target's reply backoff timers.
    pub fn llrp_tick(&self) {
        if let Some(target) = &self.llrp_target {
            let due = target.lock().tick();
            for dg in &due {
                self.send_llrp_datagram(dg);
            }
        }
    }

    /// ACK a deferred LLRP command.
    pub fn send_llrp_ack(&self, cmd: &SavedLlrpRdmCommand, response_data: &[u8]) -> Result<()> {
        let target = self.llrp_target.as_ref().ok_or(Error::Invalid)?;
        let dg = target.lock().send_ack(cmd, response_data)?;
        self.send_llrp_datagram(&dg);
        Ok(())
    }

    /// NACK a deferred LLRP command.
    pub fn send_llrp_nack(&self, cmd: &SavedLlrpRdmCommand, nack_reason: u16) -> Result<()> {
        let target = self.llrp_target.as_ref().ok_or(Error::Invalid)?;
        let dg = target.lock().send_nack(cmd, nack_reason)?;
        self.send_llrp_datagram(&dg);
        Ok(())
    }

    fn send_llrp_datagram(&self, dg: &OutgoingDatagram) {
        let mcast = match &self.mcast {
            Some(m) => m,
            None => return,
        };
        match mcast.get_send_socket(&dg.netint, 0) {
            Ok(socket) => {
                if let Err(e) = socket.send_to(&dg.data, dg.dest) {
                    log::debug!("[LLRP] send failed: {}", e);
                }
                mcast.release_send_socket(&dg.netint, 0);
            }
            Err(e) => log::debug!("[LLRP] no send socket: {}", e),
        }
    }
}

// ============================================================================
// EPT client
// ============================================================================

/// Configuration for an EPT client.
#[derive(Debug, Clone)]
pub struct EptClientConfig {
    pub cid: Cid,
    pub protocols: Vec<EptSubProtocol>,
    pub search_domain: String,
    /// Capacity limits for the client's scope and connection registries.
    pub limits: Limits,
    pub timing: ConnTiming,
}

impl EptClientConfig {
    pub fn new(cid: Cid, protocols: Vec<EptSubProtocol>) -> Self {
        Self {
            cid,
            protocols,
            search_domain: E133_DEFAULT_DOMAIN.to_string(),
            limits: Limits::default(),
            timing: ConnTiming::default(),
        }
    }
}

/// An EPT client: the same scope lifecycle with an opaque data plane.
pub struct EptClient {
    config: EptClientConfig,
    core: ClientCore,
}

impl EptClient {
    pub fn new(config: EptClientConfig, runtime: RuntimeHandle) -> Self {
        let core = ClientCore::new(
            config.cid,
            config.search_domain.clone(),
            runtime,
            config.timing,
            config.limits,
        );
        Self { config, core }
    }

    pub fn cid(&self) -> Cid {
        self.config.cid
    }

    fn client_entry(&self) -> ClientEntry {
        ClientEntry {
            cid: self.config.cid,
            data: ClientEntryData::Ept {
                protocols: self.config.protocols.clone(),
            },
        }
    }

    pub fn add_scope(&self, config: ScopeConfig) -> Result<ScopeHandle> {
        self.core.add_scope(config, self.client_entry())
    }

    pub fn remove_scope(&self, scope: ScopeHandle, reason: DisconnectReason) -> Result<()> {
        self.core.remove_scope(scope, reason)
    }

    pub fn change_scope(
        &self,
        scope: ScopeHandle,
        new_config: ScopeConfig,
        reason: DisconnectReason,
    ) -> Result<()> {
        self.core
            .change_scope(scope, new_config, self.client_entry(), reason)
    }

    pub fn broker_found(&self, scope: ScopeHandle, addr: std::net::SocketAddr) -> Result<()> {
        self.core.broker_found(scope, addr, self.client_entry())
    }

    pub fn request_client_list(&self, scope: ScopeHandle) -> Result<()> {
        self.core.send_broker_msg(scope, BrokerMessage::FetchClientList)
    }

    /// Send an opaque sub-protocol payload to another EPT client.
    ///
    /// The core does not parse or validate the payload.
    pub fn send_data(
        &self,
        scope: ScopeHandle,
        dest_cid: Cid,
        protocol_vector: u32,
        data: &[u8],
    ) -> Result<()> {
        let msg = EptMessage {
            dest_cid,
            data: EptMessageData::Data {
                protocol_vector,
                data: data.to_vec(),
            },
        };
        let frame = RdmnetMessage::ept(self.config.cid, msg)
            .pack_to_vec()
            .map_err(|_| Error::Invalid)?;
        self.core.send_frame(scope, &frame)
    }

    /// Send an EPT status to another EPT client.
    pub fn send_status(
        &self,
        scope: ScopeHandle,
        dest_cid: Cid,
        status_code: u16,
        status_string: Option<String>,
    ) -> Result<()> {
        let msg = EptMessage {
            dest_cid,
            data: EptMessageData::Status(EptStatusMsg {
                status_code,
                status_string,
            }),
        };
        let frame = RdmnetMessage::ept(self.config.cid, msg)
            .pack_to_vec()
            .map_err(|_| Error::Invalid)?;
        self.core.send_frame(scope, &frame)
    }

    pub fn process(&self, timeout: Duration, notify: &mut dyn EptClientNotifications) {
        for (scope, event) in self.core.process(timeout) {
            match event {
                ConnEvent::Connected { reply } => {
                    self.core
                        .mark_connected(scope, reply.broker_uid, reply.client_uid);
                    notify.connected(
                        scope,
                        &ScopeConnectedInfo {
                            broker_uid: reply.broker_uid,
                            client_uid: reply.client_uid,
                        },
                    );
                }
                ConnEvent::ConnectFailed { will_retry, .. } => {
                    notify.connect_failed(scope, will_retry);
                }
                ConnEvent::Disconnected { cause, will_retry } => {
                    self.core.mark_disconnected(scope);
                    notify.disconnected(scope, &cause, will_retry);
                }
                ConnEvent::MsgReceived(msg) => {
                    let sender_cid = msg.sender_cid;
                    match msg.data {
                        RdmnetMessageData::Broker(BrokerMessage::ConnectedClientList(list)) => {
                            notify.client_list_update(scope, ClientListAction::ConnectedList, &list);
                        }
                        RdmnetMessageData::Broker(BrokerMessage::ClientAdd(list)) => {
                            notify.client_list_update(scope, ClientListAction::Add, &list);
                        }
                        RdmnetMessageData::Broker(BrokerMessage::ClientRemove(list)) => {
                            notify.client_list_update(scope, ClientListAction::Remove, &list);
                        }
                        RdmnetMessageData::Broker(BrokerMessage::ClientEntryChange(list)) => {
                            notify.client_list_update(scope, ClientListAction::Change, &list);
                        }
                        RdmnetMessageData::Ept(ept) => match ept.data {
                            EptMessageData::Data {
                                protocol_vector,
                                data,
                            } => notify.data_received(scope, &sender_cid, protocol_vector, &data),
                            EptMessageData::Status(status) => {
                                notify.status_received(scope, &sender_cid, &status)
                            }
                        },
                        other => {
                            log::debug!("[CLIENT] EPT client ignoring message: {:?}", other);
                        }
                    }
                }
            }
        }
    }
}
