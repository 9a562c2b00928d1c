// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker core: admission, client registry, and RPT/EPT routing.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                          Broker                               |
//! |  +--------------+   +----------------+   +----------------+  |
//! |  |  Listeners   |   | ClientRegistry |   | BrokerUidManager|  |
//! |  | (per netint) |   | handle/CID/conn|   |  cursor + maps |  |
//! |  +------+-------+   +----------------+   +----------------+  |
//! |         | accept                                              |
//! |         v                                                     |
//! |  +--------------------------------------------------------+  |
//! |  |  ConnectionTable (attached sockets, heartbeat timers)   |  |
//! |  +--------------------------------------------------------+  |
//! |         | messages                                            |
//! |         v                                                     |
//! |  admission -> routing (RPT by UID, EPT by CID) -> client     |
//! |  list pushes to subscribed controllers                        |
//! +--------------------------------------------------------------+
//! ```
//!
//! Admission: a freshly accepted socket must deliver a valid
//! `client_connect` within the initial read window or it is closed.
//! Scope and E1.33 version must match; dynamic UIDs are assigned on the
//! spot. A client connecting with a CID already in use displaces the
//! older connection.
//!
//! Routing preserves per-source ordering because every message for one
//! source is handled on the single process loop in receive order.

pub mod registry;
pub mod uid_manager;

pub use registry::{BrokerClient, ClientRegistry};
pub use uid_manager::{BrokerUidManager, ClientHandle};

use crate::conn::{ConnEvent, ConnHandle, ConnTiming, ConnectionTable};
use crate::protocol::broker::{
    BrokerMessage, ClientConnectMsg, ClientEntry, ClientEntryData, ClientList, ConnectReplyMsg,
    DynamicUidMapping, DynamicUidRequest,
};
use crate::protocol::consts::*;
use crate::protocol::ept::{EptMessage, EptMessageData, EptStatusMsg};
use crate::protocol::message::{RdmnetMessage, RdmnetMessageData};
use crate::protocol::rpt::{RptHeader, RptMessage, RptMessageData};
use crate::protocol::types::{ConnectStatus, DisconnectReason, DynamicUidStatus, RptStatusCode};
use crate::protocol::RptStatusMsg;
use crate::runtime::{RuntimeHandle, SocketHandle, Timer};
use crate::{Cid, Error, Limits, RdmUid, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use mio::net::TcpListener;
use mio::Interest;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub cid: Cid,
    /// The broker's own static UID.
    pub uid: RdmUid,
    pub scope: String,
    /// One listening socket is opened per address.
    pub listen_addrs: Vec<SocketAddr>,
    /// Capacity limits shared by the client, UID, and connection
    /// registries.
    pub limits: Limits,
    /// Connection timing; tests shorten it.
    pub timing: ConnTiming,
}

impl BrokerSettings {
    pub fn new(cid: Cid, uid: RdmUid, scope: impl Into<String>) -> Self {
        Self {
            cid,
            uid,
            scope: scope.into(),
            listen_addrs: vec!["0.0.0.0:0".parse().expect("static addr")],
            limits: Limits::default(),
            timing: ConnTiming::default(),
        }
    }
}

/// Events surfaced to the embedding application.
#[derive(Debug)]
pub enum BrokerEvent {
    ClientConnected(BrokerClient),
    ClientDisconnected { cid: Cid },
}

struct Listener {
    socket_handle: SocketHandle,
    listener: TcpListener,
    local_addr: SocketAddr,
}

/// The broker core.
pub struct Broker {
    settings: BrokerSettings,
    runtime: RuntimeHandle,
    conns: ConnectionTable,
    registry: ClientRegistry,
    uids: Mutex<BrokerUidManager>,
    listeners: Mutex<Vec<Listener>>,
    /// Accepted connections awaiting their client_connect.
    pending: Mutex<HashMap<ConnHandle, Timer>>,
}

impl Broker {
    /// Bind all listeners and start accepting.
    pub fn new(settings: BrokerSettings, runtime: RuntimeHandle) -> Result<Self> {
        let conns = ConnectionTable::with_timing(
            runtime.clone(),
            settings.limits.max_connections,
            settings.timing,
        );
        let registry = ClientRegistry::new(&settings.limits);
        let uids = Mutex::new(BrokerUidManager::new(&settings.limits));

        let mut listeners = Vec::new();
        for addr in &settings.listen_addrs {
            let mut listener = TcpListener::bind(*addr).map_err(Error::Sys)?;
            let local_addr = listener.local_addr().map_err(Error::Sys)?;
            let socket_handle = runtime.register(&mut listener, Interest::READABLE)?;
            log::info!("[BROKER] listening on {}", local_addr);
            listeners.push(Listener {
                socket_handle,
                listener,
                local_addr,
            });
        }

        Ok(Self {
            settings,
            runtime,
            conns,
            registry,
            uids,
            listeners: Mutex::new(listeners),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Addresses the broker is actually listening on (after port 0
    /// resolution); advertised via DNS-SD.
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.lock().iter().map(|l| l.local_addr).collect()
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// One iteration of the broker loop: poll sockets, drive timers,
    /// route messages. Returns application-level events.
    pub fn process(&self, timeout: std::time::Duration) -> Vec<BrokerEvent> {
        let mut out = Vec::new();

        // Admission window expiry.
        let expired: Vec<ConnHandle> = {
            let mut pending = self.pending.lock();
            let expired: Vec<_> = pending
                .iter()
                .filter(|(_, t)| t.is_expired())
                .map(|(&h, _)| h)
                .collect();
            for h in &expired {
                pending.remove(h);
            }
            expired
        };
        for conn in expired {
            log::info!("[BROKER] conn {}: no client_connect in window", conn);
            let _ = self.conns.destroy(conn, None);
        }

        let mut conn_events = self.conns.tick();

        if let Ok(socket_events) = self.runtime.tick(Some(timeout)) {
            for ev in socket_events {
                if self.is_listener(ev.handle) {
                    self.accept_all(ev.handle);
                } else {
                    conn_events.extend(self.conns.handle_socket_event(ev));
                }
            }
        }

        for (conn, event) in conn_events {
            self.handle_conn_event(conn, event, &mut out);
        }
        out
    }

    /// Deterministic teardown: listeners first, then client connections.
    pub fn shutdown(&self) {
        let mut listeners = self.listeners.lock();
        for l in listeners.iter_mut() {
            let _ = self.runtime.deregister(&mut l.listener, l.socket_handle);
        }
        listeners.clear();
        for client in self.registry.all() {
            let _ = self
                .conns
                .destroy(client.conn, Some(DisconnectReason::Shutdown));
            self.registry.remove_by_conn(client.conn);
        }
    }

    fn is_listener(&self, handle: SocketHandle) -> bool {
        self.listeners
            .lock()
            .iter()
            .any(|l| l.socket_handle == handle)
    }

    fn accept_all(&self, handle: SocketHandle) {
        loop {
            let accepted = {
                let listeners = self.listeners.lock();
                let listener = match listeners.iter().find(|l| l.socket_handle == handle) {
                    Some(l) => l,
                    None => return,
                };
                listener.listener.accept()
            };
            match accepted {
                Ok((stream, remote_addr)) => {
                    log::debug!("[BROKER] accepted {}", remote_addr);
                    match self.conns.create(self.settings.cid) {
                        Ok(conn) => {
                            if self
                                .conns
                                .attach_mio_socket(conn, stream, remote_addr)
                                .is_ok()
                            {
                                self.pending
                                    .lock()
                                    .insert(conn, Timer::start(self.settings.timing.heartbeat_timeout_ms));
                            } else {
                                let _ = self.conns.destroy(conn, None);
                            }
                        }
                        Err(e) => log::warn!("[BROKER] cannot track new connection: {}", e),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::warn!("[BROKER] accept error: {}", e);
                    return;
                }
            }
        }
    }

    fn handle_conn_event(&self, conn: ConnHandle, event: ConnEvent, out: &mut Vec<BrokerEvent>) {
        match event {
            ConnEvent::MsgReceived(msg) => self.handle_message(conn, msg, out),
            ConnEvent::Disconnected { cause, .. } => {
                self.pending.lock().remove(&conn);
                if let Some(client) = self.registry.remove_by_conn(conn) {
                    log::info!(
                        "[BROKER] client {} disconnected ({:?})",
                        client.cid,
                        cause
                    );
                    self.uids.lock().remove_handle(client.handle);
                    self.push_client_list(BrokerMessage::ClientRemove, &[client.entry.clone()], None);
                    out.push(BrokerEvent::ClientDisconnected { cid: client.cid });
                }
                let _ = self.conns.destroy(conn, None);
            }
            // Attached sockets skip the client-side handshake, so these
            // never fire on a broker connection.
            ConnEvent::Connected { .. } | ConnEvent::ConnectFailed { .. } => {}
        }
    }

    fn handle_message(&self, conn: ConnHandle, msg: RdmnetMessage, out: &mut Vec<BrokerEvent>) {
        let sender_cid = msg.sender_cid;
        match msg.data {
            RdmnetMessageData::Broker(bmsg) => self.handle_broker_message(conn, bmsg, out),
            RdmnetMessageData::Rpt(rpt) => self.route_rpt(conn, sender_cid, rpt),
            RdmnetMessageData::Ept(ept) => self.route_ept(conn, sender_cid, ept),
        }
    }

    fn handle_broker_message(
        &self,
        conn: ConnHandle,
        bmsg: BrokerMessage,
        out: &mut Vec<BrokerEvent>,
    ) {
        match bmsg {
            BrokerMessage::Connect(connect) => self.admit(conn, connect, out),
            BrokerMessage::FetchClientList => self.send_client_list(conn),
            BrokerMessage::RequestDynamicUids(reqs) => self.assign_dynamic_uids(conn, &reqs),
            BrokerMessage::FetchDynamicUidList(uids) => self.send_uid_assignments(conn, &uids),
            BrokerMessage::ClientEntryUpdate(update) => {
                if let Some(client) = self.registry.by_conn(conn) {
                    // Swap the entry in place, keeping the assigned UID.
                    let mut entry = update.client_entry;
                    if let (ClientEntryData::Rpt { uid, .. }, Some(old_uid)) =
                        (&mut entry.data, client.uid())
                    {
                        *uid = old_uid;
                    }
                    if self.registry.replace_entry(conn, entry.clone()).is_ok() {
                        self.push_client_list(BrokerMessage::ClientEntryChange, &[entry], Some(conn));
                    }
                }
            }
            BrokerMessage::Disconnect(d) => {
                self.pending.lock().remove(&conn);
                if let Some(client) = self.registry.remove_by_conn(conn) {
                    log::info!(
                        "[BROKER] client {} sent disconnect: {}",
                        client.cid,
                        d.reason
                    );
                    self.uids.lock().remove_handle(client.handle);
                    self.push_client_list(BrokerMessage::ClientRemove, &[client.entry], None);
                    out.push(BrokerEvent::ClientDisconnected { cid: client.cid });
                }
                let _ = self.conns.destroy(conn, None);
            }
            // Client-to-broker only; a client must not send these.
            other => {
                log::debug!(
                    "[BROKER] conn {}: unexpected broker message vector 0x{:04x}",
                    conn,
                    other.vector()
                );
            }
        }
    }

    // ========================================================================
    // Admission
    // ========================================================================

    fn admit(&self, conn: ConnHandle, connect: ClientConnectMsg, out: &mut Vec<BrokerEvent>) {
        if self.pending.lock().remove(&conn).is_none() {
            // Either already admitted or never accepted here.
            log::debug!("[BROKER] conn {}: duplicate client_connect", conn);
            return;
        }

        if connect.scope != self.settings.scope {
            self.reject(conn, ConnectStatus::ScopeMismatch);
            return;
        }
        if connect.e133_version != E133_VERSION {
            self.reject(conn, ConnectStatus::InvalidClientEntry);
            return;
        }

        let mut entry = connect.client_entry;

        // Newest-wins duplicate CID rule: displace the old client before
        // assigning UIDs so its dynamic reservation can be re-issued.
        if let Some(old) = self.registry.by_cid(&entry.cid) {
            log::info!(
                "[BROKER] client CID {} reconnected; closing old conn {}",
                old.cid,
                old.conn
            );
            self.uids.lock().remove_handle(old.handle);
            let _ = self
                .conns
                .destroy(old.conn, Some(DisconnectReason::SoftwareReset));
            self.registry.remove_by_conn(old.conn);
            self.push_client_list(BrokerMessage::ClientRemove, &[old.entry], Some(conn));
        }

        let handle = self.registry.allocate_handle();
        let client_uid = match &mut entry.data {
            ClientEntryData::Rpt { uid, .. } => {
                if uid.is_broadcast() {
                    self.reject(conn, ConnectStatus::InvalidUid);
                    return;
                }
                let result = if uid.is_dynamic_request() {
                    self.uids.lock().add_dynamic(handle, entry.cid, uid.manu)
                } else {
                    self.uids.lock().add_static(handle, *uid).map(|()| *uid)
                };
                match result {
                    Ok(assigned) => {
                        *uid = assigned;
                        assigned
                    }
                    Err(Error::AlreadyExists) => {
                        self.reject(conn, ConnectStatus::DuplicateUid);
                        return;
                    }
                    Err(_) => {
                        self.reject(conn, ConnectStatus::CapacityExceeded);
                        return;
                    }
                }
            }
            ClientEntryData::Ept { .. } => RdmUid::new(0, 0),
        };

        if self
            .registry
            .insert_with_handle(handle, conn, entry.clone())
            .is_err()
        {
            self.uids.lock().remove_handle(handle);
            self.reject(conn, ConnectStatus::CapacityExceeded);
            return;
        }

        self.send_broker_msg(
            conn,
            BrokerMessage::ConnectReply(ConnectReplyMsg {
                connect_status: ConnectStatus::Ok,
                e133_version: E133_VERSION,
                broker_uid: self.settings.uid,
                client_uid,
            }),
        );

        log::info!(
            "[BROKER] client {} admitted on scope '{}'",
            entry.cid,
            self.settings.scope
        );
        self.push_client_list(BrokerMessage::ClientAdd, &[entry], Some(conn));
        if let Some(client) = self.registry.get(handle) {
            out.push(BrokerEvent::ClientConnected(client));
        }
    }

    fn reject(&self, conn: ConnHandle, status: ConnectStatus) {
        log::info!("[BROKER] rejecting conn {}: {}", conn, status);
        self.send_broker_msg(
            conn,
            BrokerMessage::ConnectReply(ConnectReplyMsg {
                connect_status: status,
                e133_version: E133_VERSION,
                broker_uid: self.settings.uid,
                client_uid: RdmUid::new(0, 0),
            }),
        );
        let _ = self.conns.destroy(conn, None);
    }

    // ========================================================================
    // RPT Routing
    // ========================================================================

    fn route_rpt(&self, conn: ConnHandle, sender_cid: Cid, rpt: RptMessage) {
        let source = match self.registry.by_conn(conn) {
            Some(c) => c,
            None => {
                log::debug!("[BROKER] RPT from unadmitted conn {}", conn);
                return;
            }
        };
        match &rpt.data {
            RptMessageData::Request(_) => {
                if !source.is_controller() {
                    self.send_rpt_status(conn, &rpt.header, RptStatusCode::InvalidMessage);
                    return;
                }
                if rpt.header.dest_uid.is_device_broadcast() {
                    for device in self.registry.devices() {
                        self.forward_rpt(device.conn, sender_cid, &rpt);
                    }
                    self.send_rpt_status(conn, &rpt.header, RptStatusCode::BroadcastComplete);
                    return;
                }
                match self.lookup_conn_by_uid(&rpt.header.dest_uid) {
                    Some(dest_conn) => self.forward_rpt(dest_conn, sender_cid, &rpt),
                    None => {
                        self.send_rpt_status(conn, &rpt.header, RptStatusCode::UnknownRdmUid)
                    }
                }
            }
            RptMessageData::Notification(_) => {
                if !source.is_device() {
                    self.send_rpt_status(conn, &rpt.header, RptStatusCode::InvalidMessage);
                    return;
                }
                if rpt.header.dest_uid.is_controller_broadcast()
                    || rpt.header.dest_uid.is_broadcast()
                {
                    for controller in self.registry.controllers() {
                        self.forward_rpt(controller.conn, sender_cid, &rpt);
                    }
                    return;
                }
                match self.lookup_conn_by_uid(&rpt.header.dest_uid) {
                    Some(dest_conn) => self.forward_rpt(dest_conn, sender_cid, &rpt),
                    None => {
                        self.send_rpt_status(conn, &rpt.header, RptStatusCode::UnknownRdmUid)
                    }
                }
            }
            RptMessageData::Status(_) => {
                if let Some(dest_conn) = self.lookup_conn_by_uid(&rpt.header.dest_uid) {
                    self.forward_rpt(dest_conn, sender_cid, &rpt);
                }
            }
        }
    }

    fn lookup_conn_by_uid(&self, uid: &RdmUid) -> Option<ConnHandle> {
        let handle = self.uids.lock().uid_to_handle(uid)?;
        Some(self.registry.get(handle)?.conn)
    }

    fn forward_rpt(&self, dest_conn: ConnHandle, sender_cid: Cid, rpt: &RptMessage) {
        // Per-source ordering holds because forwarding happens inline on
        // the receive path.
        let frame = RdmnetMessage::rpt(sender_cid, rpt.clone()).pack_to_vec();
        match frame {
            Ok(f) => {
                if let Err(e) = self.conns.send(dest_conn, &f) {
                    log::debug!("[BROKER] forward to conn {} failed: {}", dest_conn, e);
                }
            }
            Err(e) => log::error!("[BROKER] RPT repack failed: {}", e),
        }
    }

    fn send_rpt_status(&self, conn: ConnHandle, request_header: &RptHeader, code: RptStatusCode) {
        let header = RptHeader {
            source_uid: self.settings.uid,
            source_endpoint_id: NULL_ENDPOINT,
            dest_uid: request_header.source_uid,
            dest_endpoint_id: request_header.source_endpoint_id,
            seqnum: request_header.seqnum,
        };
        let msg = RptMessage {
            header,
            data: RptMessageData::Status(RptStatusMsg {
                status_code: code,
                status_string: None,
            }),
        };
        if let Ok(frame) = RdmnetMessage::rpt(self.settings.cid, msg).pack_to_vec() {
            let _ = self.conns.send(conn, &frame);
        }
    }

    // ========================================================================
    // EPT Routing
    // ========================================================================

    fn route_ept(&self, conn: ConnHandle, sender_cid: Cid, ept: EptMessage) {
        if self.registry.by_conn(conn).is_none() {
            return;
        }
        match self.registry.by_cid(&ept.dest_cid) {
            Some(dest) => {
                if let Ok(frame) = RdmnetMessage::ept(sender_cid, ept).pack_to_vec() {
                    let _ = self.conns.send(dest.conn, &frame);
                }
            }
            None => {
                let status = EptMessage {
                    dest_cid: sender_cid,
                    data: EptMessageData::Status(EptStatusMsg {
                        status_code: EPT_STATUS_UNKNOWN_CID,
                        status_string: None,
                    }),
                };
                if let Ok(frame) = RdmnetMessage::ept(self.settings.cid, status).pack_to_vec() {
                    let _ = self.conns.send(conn, &frame);
                }
            }
        }
    }

    // ========================================================================
    // Client Lists and Dynamic UIDs
    // ========================================================================

    /// Reply to fetch_client_list, fragmenting to stay under the frame
    /// ceiling. The continuation flag is clear only on the last fragment.
    fn send_client_list(&self, conn: ConnHandle) {
        if self.registry.by_conn(conn).is_none() {
            return;
        }
        let entries: Vec<ClientEntry> = self
            .registry
            .all()
            .into_iter()
            .map(|c| c.entry)
            .collect();
        let frame_limit = RDMNET_MAX_FRAME_SIZE
            - (ACN_TCP_PREAMBLE_SIZE + ACN_ROOT_PDU_HEADER_SIZE + BROKER_PDU_HEADER_SIZE + 1);

        let mut fragments: Vec<Vec<ClientEntry>> = vec![Vec::new()];
        let mut used = 0usize;
        for entry in entries {
            let size = crate::protocol::broker::client_entry_size(&entry);
            if used + size > frame_limit && !fragments.last().map_or(true, Vec::is_empty) {
                fragments.push(Vec::new());
                used = 0;
            }
            used += size;
            fragments.last_mut().expect("nonempty").push(entry);
        }

        let count = fragments.len();
        for (i, client_entries) in fragments.into_iter().enumerate() {
            self.send_broker_msg(
                conn,
                BrokerMessage::ConnectedClientList(ClientList {
                    client_entries,
                    more_coming: i + 1 < count,
                }),
            );
        }
    }

    fn assign_dynamic_uids(&self, conn: ConnHandle, reqs: &[DynamicUidRequest]) {
        let client = match self.registry.by_conn(conn) {
            Some(c) => c,
            None => return,
        };
        let mut mappings = Vec::with_capacity(reqs.len());
        let mut uids = self.uids.lock();
        for req in reqs {
            if !req.requested_uid.is_dynamic_request() {
                mappings.push(DynamicUidMapping {
                    uid: req.requested_uid,
                    rid: req.rid,
                    status: DynamicUidStatus::InvalidRequest,
                });
                continue;
            }
            match uids.add_dynamic(client.handle, req.rid, req.requested_uid.manu) {
                Ok(uid) => mappings.push(DynamicUidMapping {
                    uid,
                    rid: req.rid,
                    status: DynamicUidStatus::Ok,
                }),
                Err(Error::AlreadyExists) => mappings.push(DynamicUidMapping {
                    uid: RdmUid::new(0, 0),
                    rid: req.rid,
                    status: DynamicUidStatus::DuplicateUid,
                }),
                Err(_) => mappings.push(DynamicUidMapping {
                    uid: RdmUid::new(0, 0),
                    rid: req.rid,
                    status: DynamicUidStatus::CapacityExhausted,
                }),
            }
        }
        drop(uids);
        self.send_broker_msg(conn, BrokerMessage::AssignedDynamicUids(mappings));
    }

    fn send_uid_assignments(&self, conn: ConnHandle, queried: &[RdmUid]) {
        let uids = self.uids.lock();
        let mappings: Vec<DynamicUidMapping> = queried
            .iter()
            .map(|uid| match uids.rid_for_uid(uid) {
                Some(rid) => DynamicUidMapping {
                    uid: *uid,
                    rid,
                    status: DynamicUidStatus::Ok,
                },
                None => DynamicUidMapping {
                    uid: *uid,
                    rid: Cid::nil(),
                    status: DynamicUidStatus::UidNotFound,
                },
            })
            .collect();
        drop(uids);
        self.send_broker_msg(conn, BrokerMessage::AssignedDynamicUids(mappings));
    }

    /// Push a client list change to every connected controller except the
    /// originator. The registry snapshot is taken first so no locks are
    /// held while writing to sockets.
    fn push_client_list(
        &self,
        ctor: fn(ClientList) -> BrokerMessage,
        entries: &[ClientEntry],
        exclude_conn: Option<ConnHandle>,
    ) {
        let msg = ctor(ClientList {
            client_entries: entries.to_vec(),
            more_coming: false,
        });
        let frame = match RdmnetMessage::broker(self.settings.cid, msg).pack_to_vec() {
            Ok(f) => f,
            Err(e) => {
                log::error!("[BROKER] client list pack failed: {}", e);
                return;
            }
        };
        for controller in self.registry.controllers() {
            if Some(controller.conn) == exclude_conn {
                continue;
            }
            let _ = self.conns.send(controller.conn, &frame);
        }
    }

    fn send_broker_msg(&self, conn: ConnHandle, msg: BrokerMessage) {
        match RdmnetMessage::broker(self.settings.cid, msg).pack_to_vec() {
            Ok(frame) => {
                if let Err(e) = self.conns.send(conn, &frame) {
                    log::debug!("[BROKER] send to conn {} failed: {}", conn, e);
                }
            }
            Err(e) => log::error!("[BROKER] pack failed: {}", e),
        }
    }

    /// Run the broker loop on a library-owned thread, delivering events
    /// through a channel. The worker owns the loop until stopped.
    pub fn spawn(self: Arc<Self>) -> Result<BrokerWorker> {
        let (tx, events): (Sender<BrokerEvent>, Receiver<BrokerEvent>) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let broker = Arc::clone(&self);
        let thread = std::thread::Builder::new()
            .name("rdmnet-broker".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::SeqCst) {
                    for event in broker.process(Duration::from_millis(100)) {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            })
            .map_err(Error::Sys)?;
        Ok(BrokerWorker {
            broker: self,
            events,
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to a broker running on its own thread (see [`Broker::spawn`]).
pub struct BrokerWorker {
    broker: Arc<Broker>,
    events: Receiver<BrokerEvent>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl BrokerWorker {
    /// The broker driven by this worker.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Channel of application events from the broker loop.
    pub fn events(&self) -> &Receiver<BrokerEvent> {
        &self.events
    }

    /// Stop the loop and tear the broker down (listeners first, then
    /// client connections).
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.broker.shutdown();
    }
}

impl Drop for BrokerWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
