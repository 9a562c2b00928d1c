// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-broker TCP connection with handshake, heartbeat, and backoff.
//!
//! # State Machine
//!
//! ```text
//!      +------------+           +----------------+
//!      | NotStarted |-connect()>| ConnectPending |
//!      +------------+           +-------+--------+
//!                                       | tick
//!      +------------+   t_backoff      v
//!      |  Backoff   |------------>+----------------+
//!      +------------+             | TcpConnPending |--(tcp error)--+
//!            ^                    +-------+--------+               |
//!            |                            | tcp up                 |
//!            |  (timeout)      +-------------------+               |
//!            +<----------------| RdmnetConnPending |--(reject)--+  |
//!            |                 +-------+-----------+            |  |
//!            |                         | valid connect reply    |  |
//!            |  (tcp error / peer close /                       |  |
//!            |   heartbeat timeout,    v                        v  v
//!            |   if auto-        +-----------+        +----------------------+
//!            +-------------------| Heartbeat |------->| MarkedForDestruction |
//!                reconnect)      +-----------+        +----------------------+
//! ```
//!
//! Timers per E1.33: heartbeats every 15 s, peer declared dead after 30 s
//! of silence, connect retries backed off from 3 s doubling to 30 s and
//! reset on a successful handshake.
//!
//! The table hands out integer handles; callers never hold a reference to
//! a connection. All state transitions happen with the per-connection
//! lock held, and user-visible events are collected into a dispatch list
//! that the caller delivers after every lock is released.


use crate::msgbuf::{MsgBuf, MsgBufPoll};
use crate::protocol::broker::{BrokerMessage, ClientConnectMsg, ConnectReplyMsg, DisconnectMsg};
use crate::protocol::consts::*;
use crate::protocol::message::{RdmnetMessage, RdmnetMessageData};
use crate::protocol::types::{ConnectStatus, DisconnectReason};
use crate::runtime::{RuntimeHandle, SocketEvent, SocketHandle, Timer};
use crate::util::HandleAllocator;
use crate::{Cid, Error, Result};
use mio::net::TcpStream;
use mio::Interest;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

/// Connection handle, valid until `destroy`.
pub type ConnHandle = u32;

/// Connection state machine states.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Created but no connect attempt made.
    #[default]
    NotStarted,
    /// Connect requested; the first TCP attempt starts on the next tick.
    ConnectPending,
    /// Waiting out the retry backoff before the next TCP attempt.
    Backoff,
    /// Non-blocking TCP connect in flight.
    TcpConnPending,
    /// TCP is up; client connect sent, waiting for the broker's reply.
    RdmnetConnPending,
    /// Fully connected; exchanging data and heartbeats.
    Heartbeat,
    /// Torn down; the handle answers `NotFound` from here on.
    MarkedForDestruction,
}

impl ConnState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnState::Heartbeat)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnState::MarkedForDestruction)
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnState::NotStarted => "NotStarted",
            ConnState::ConnectPending => "ConnectPending",
            ConnState::Backoff => "Backoff",
            ConnState::TcpConnPending => "TcpConnPending",
            ConnState::RdmnetConnPending => "RdmnetConnPending",
            ConnState::Heartbeat => "Heartbeat",
            ConnState::MarkedForDestruction => "MarkedForDestruction",
        };
        write!(f, "{}", s)
    }
}

/// Connection timing knobs. The defaults are the E1.33 values; tests and
/// constrained deployments may shorten them.
#[derive(Copy, Clone, Debug)]
pub struct ConnTiming {
    pub heartbeat_send_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ConnTiming {
    fn default() -> Self {
        Self {
            heartbeat_send_interval_ms: E133_HEARTBEAT_SEND_INTERVAL_MS,
            heartbeat_timeout_ms: E133_HEARTBEAT_TIMEOUT_MS,
            backoff_initial_ms: CONNECT_BACKOFF_INITIAL_MS,
            backoff_max_ms: CONNECT_BACKOFF_MAX_MS,
        }
    }
}

/// Why a connection left the `Heartbeat` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// A socket-level error.
    ConnError,
    /// The peer closed the TCP stream.
    PeerClosed,
    /// The peer sent a disconnect message with this reason.
    PeerDisconnect(DisconnectReason),
    /// No traffic from the peer for the heartbeat timeout.
    HeartbeatTimeout,
    /// The broker redirected us to another address.
    Redirected(SocketAddr),
}

/// User-visible connection events, dispatched after locks are released.
#[derive(Debug)]
pub enum ConnEvent {
    /// Handshake completed; the broker accepted us.
    Connected { reply: ConnectReplyMsg },
    /// A connect attempt failed.
    ConnectFailed { status: Option<ConnectStatus>, will_retry: bool },
    /// An established connection went down.
    Disconnected { cause: DisconnectCause, will_retry: bool },
    /// A non-heartbeat message arrived.
    MsgReceived(RdmnetMessage),
}

struct Connection {
    handle: ConnHandle,
    local_cid: Cid,
    timing: ConnTiming,
    remote_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    socket_handle: Option<SocketHandle>,
    external_socket_attached: bool,
    state: ConnState,
    connect_msg: Option<ClientConnectMsg>,
    auto_reconnect: bool,

    send_timer: Timer,
    hb_timer: Timer,
    backoff_timer: Timer,
    backoff_ms: u64,

    recv_buf: MsgBuf,
    send_queue: VecDeque<Vec<u8>>,
    pending_send: Option<(Vec<u8>, usize)>,
    /// Frame under construction via the partial-send API.
    partial_frame: Option<Vec<u8>>,
}

impl Connection {
    fn new(handle: ConnHandle, local_cid: Cid, timing: ConnTiming) -> Self {
        Self {
            handle,
            local_cid,
            timing,
            remote_addr: None,
            stream: None,
            socket_handle: None,
            external_socket_attached: false,
            state: ConnState::NotStarted,
            connect_msg: None,
            auto_reconnect: true,
            send_timer: Timer::start(timing.heartbeat_send_interval_ms),
            hb_timer: Timer::start(timing.heartbeat_timeout_ms),
            backoff_timer: Timer::start(0),
            backoff_ms: timing.backoff_initial_ms,
            recv_buf: MsgBuf::new(),
            send_queue: VecDeque::new(),
            pending_send: None,
            partial_frame: None,
        }
    }

    fn enqueue(&mut self, frame: Vec<u8>) {
        self.send_queue.push_back(frame);
    }

    /// Push queued bytes into the socket until it would block.
    fn flush(&mut self) -> std::io::Result<()> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(()),
        };
        loop {
            if let Some((buf, offset)) = self.pending_send.as_mut() {
                match stream.write(&buf[*offset..]) {
                    Ok(n) => {
                        *offset += n;
                        if *offset < buf.len() {
                            continue;
                        }
                        self.pending_send = None;
                        self.send_timer.reset();
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            match self.send_queue.pop_front() {
                Some(frame) => self.pending_send = Some((frame, 0)),
                None => return Ok(()),
            }
        }
    }

    fn wants_writable(&self) -> bool {
        self.pending_send.is_some() || !self.send_queue.is_empty()
    }

    /// Best-effort final disconnect PDU straight onto the socket.
    fn send_disconnect_now(&mut self, reason: DisconnectReason) {
        let msg = RdmnetMessage::broker(
            self.local_cid,
            BrokerMessage::Disconnect(DisconnectMsg { reason }),
        );
        if let (Some(stream), Ok(frame)) = (self.stream.as_mut(), msg.pack_to_vec()) {
            if let Err(e) = stream.write(&frame) {
                if e.kind() != std::io::ErrorKind::WouldBlock {
                    log::debug!("[CONN] {}: disconnect PDU not sent: {}", self.handle, e);
                }
            }
        }
    }

    fn close_socket(&mut self, runtime: &RuntimeHandle) {
        if let (Some(stream), Some(sh)) = (self.stream.as_mut(), self.socket_handle.take()) {
            let _ = runtime.deregister(stream, sh);
        }
        self.stream = None;
        self.pending_send = None;
        self.send_queue.clear();
        self.recv_buf = MsgBuf::new();
    }

    /// Enter backoff after a failure, doubling the delay.
    fn enter_backoff(&mut self, runtime: &RuntimeHandle) {
        self.close_socket(runtime);
        self.state = ConnState::Backoff;
        self.backoff_timer.restart_with(self.backoff_ms);
        log::debug!(
            "[CONN] {}: backing off {} ms before reconnect",
            self.handle,
            self.backoff_ms
        );
        self.backoff_ms = (self.backoff_ms * 2).min(self.timing.backoff_max_ms);
    }

    fn mark_destroyed(&mut self, runtime: &RuntimeHandle) {
        self.close_socket(runtime);
        self.state = ConnState::MarkedForDestruction;
    }
}

/// Registry of all connections sharing one runtime.
pub struct ConnectionTable {
    runtime: RuntimeHandle,
    conns: RwLock<HashMap<ConnHandle, Arc<Mutex<Connection>>>>,
    by_socket: RwLock<HashMap<SocketHandle, ConnHandle>>,
    alloc: Mutex<HandleAllocator>,
    max_connections: Option<usize>,
    timing: ConnTiming,
}

impl ConnectionTable {
    pub fn new(runtime: RuntimeHandle, max_connections: Option<usize>) -> Self {
        Self::with_timing(runtime, max_connections, ConnTiming::default())
    }

    /// Create a table with non-default timers (tests, constrained links).
    pub fn with_timing(
        runtime: RuntimeHandle,
        max_connections: Option<usize>,
        timing: ConnTiming,
    ) -> Self {
        Self {
            runtime,
            conns: RwLock::new(HashMap::new()),
            by_socket: RwLock::new(HashMap::new()),
            alloc: Mutex::new(HandleAllocator::new()),
            max_connections,
            timing,
        }
    }

    /// Create a connection in `NotStarted`.
    pub fn create(&self, local_cid: Cid) -> Result<ConnHandle> {
        let mut conns = self.conns.write();
        if let Some(max) = self.max_connections {
            if conns.len() >= max {
                return Err(Error::NoMem);
            }
        }
        let handle = self.alloc.lock().next_handle();
        conns.insert(
            handle,
            Arc::new(Mutex::new(Connection::new(handle, local_cid, self.timing))),
        );
        Ok(handle)
    }

    fn get(&self, handle: ConnHandle) -> Result<Arc<Mutex<Connection>>> {
        self.conns
            .read()
            .get(&handle)
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// Begin connecting to a broker. The first TCP attempt happens on the
    /// next `tick`; retry waits go through `Backoff`.
    pub fn connect(
        &self,
        handle: ConnHandle,
        remote_addr: SocketAddr,
        connect_msg: ClientConnectMsg,
    ) -> Result<()> {
        let conn = self.get(handle)?;
        let mut c = conn.lock();
        if !matches!(c.state, ConnState::NotStarted | ConnState::Backoff) {
            return Err(Error::Invalid);
        }
        c.remote_addr = Some(remote_addr);
        c.connect_msg = Some(connect_msg);
        c.backoff_ms = c.timing.backoff_initial_ms;
        c.state = ConnState::ConnectPending;
        Ok(())
    }

    /// Re-target an established or in-progress connection at a new broker
    /// address. Tears down any current socket and reconnects immediately.
    pub fn reconnect(
        &self,
        handle: ConnHandle,
        remote_addr: SocketAddr,
        connect_msg: ClientConnectMsg,
        reason: DisconnectReason,
    ) -> Result<()> {
        let conn = self.get(handle)?;
        let mut c = conn.lock();
        if c.state.is_terminal() {
            return Err(Error::NotFound);
        }
        if c.state.is_connected() {
            c.send_disconnect_now(reason);
        }
        c.close_socket(&self.runtime);
        c.remote_addr = Some(remote_addr);
        c.connect_msg = Some(connect_msg);
        c.backoff_ms = c.timing.backoff_initial_ms;
        c.state = ConnState::ConnectPending;
        Ok(())
    }

    /// Adopt an already-established socket (broker side, or a redirect
    /// handoff). Skips both the TCP and the RDMnet handshake; the caller
    /// owns message-level admission.
    pub fn attach_socket(
        &self,
        handle: ConnHandle,
        stream: std::net::TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        stream.set_nonblocking(true).map_err(Error::Sys)?;
        self.attach_mio_socket(handle, TcpStream::from_std(stream), remote_addr)
    }

    /// `attach_socket` for streams already in mio form (listener accept).
    pub(crate) fn attach_mio_socket(
        &self,
        handle: ConnHandle,
        mut stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> Result<()> {
        let conn = self.get(handle)?;
        let mut c = conn.lock();
        if c.state != ConnState::NotStarted {
            return Err(Error::Invalid);
        }
        let sh = self
            .runtime
            .register(&mut stream, Interest::READABLE | Interest::WRITABLE)?;
        self.by_socket.write().insert(sh, handle);
        c.stream = Some(stream);
        c.socket_handle = Some(sh);
        c.remote_addr = Some(remote_addr);
        c.external_socket_attached = true;
        c.auto_reconnect = false;
        c.state = ConnState::Heartbeat;
        c.send_timer.reset();
        c.hb_timer.reset();
        Ok(())
    }

    /// Queue one pre-packed frame for transmission.
    pub fn send(&self, handle: ConnHandle, frame: &[u8]) -> Result<()> {
        let conn = self.get(handle)?;
        let mut c = conn.lock();
        if !c.state.is_connected() {
            return Err(Error::Invalid);
        }
        c.enqueue(frame.to_vec());
        c.flush().map_err(Error::from)
    }

    /// Begin a streamed frame. Bytes accumulate until `send_partial_end`.
    pub fn send_partial_start(&self, handle: ConnHandle, first: &[u8]) -> Result<()> {
        let conn = self.get(handle)?;
        let mut c = conn.lock();
        if !c.state.is_connected() || c.partial_frame.is_some() {
            return Err(Error::Invalid);
        }
        c.partial_frame = Some(first.to_vec());
        Ok(())
    }

    /// Append bytes to the streamed frame in progress.
    pub fn send_partial(&self, handle: ConnHandle, chunk: &[u8]) -> Result<()> {
        let conn = self.get(handle)?;
        let mut c = conn.lock();
        match c.partial_frame.as_mut() {
            Some(frame) => {
                frame.extend_from_slice(chunk);
                Ok(())
            }
            None => Err(Error::Invalid),
        }
    }

    /// Finish the streamed frame and queue it.
    pub fn send_partial_end(&self, handle: ConnHandle, last: &[u8]) -> Result<()> {
        let conn = self.get(handle)?;
        let mut c = conn.lock();
        let mut frame = c.partial_frame.take().ok_or(Error::Invalid)?;
        frame.extend_from_slice(last);
        c.enqueue(frame);
        c.flush().map_err(Error::from)
    }

    /// Tear down a connection, sending a final disconnect PDU when the
    /// socket is still writable. The handle is invalid afterwards.
    pub fn destroy(&self, handle: ConnHandle, reason: Option<DisconnectReason>) -> Result<()> {
        let conn = {
            let mut conns = self.conns.write();
            conns.remove(&handle).ok_or(Error::NotFound)?
        };
        let mut c = conn.lock();
        if let Some(sh) = c.socket_handle {
            self.by_socket.write().remove(&sh);
        }
        if c.state.is_connected() {
            if let Some(reason) = reason {
                c.send_disconnect_now(reason);
            }
        }
        c.mark_destroyed(&self.runtime);
        Ok(())
    }

    pub fn state(&self, handle: ConnHandle) -> Result<ConnState> {
        Ok(self.get(handle)?.lock().state)
    }

    pub fn len(&self) -> usize {
        self.conns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.read().is_empty()
    }

    /// Drive timers for every connection. Call at least a few times per
    /// second; returns events to dispatch with no locks held.
    pub fn tick(&self) -> Vec<(ConnHandle, ConnEvent)> {
        let mut events = Vec::new();
        let conns: Vec<_> = self.conns.read().values().cloned().collect();
        for conn in conns {
            let mut c = conn.lock();
            match c.state {
                ConnState::ConnectPending => {
                    self.start_tcp_connect(&mut c, &mut events);
                }
                ConnState::Backoff => {
                    if c.backoff_timer.is_expired() {
                        self.start_tcp_connect(&mut c, &mut events);
                    }
                }
                ConnState::RdmnetConnPending => {
                    if c.hb_timer.is_expired() {
                        log::info!("[CONN] {}: handshake timed out", c.handle);
                        c.enter_backoff(&self.runtime);
                        events.push((
                            c.handle,
                            ConnEvent::ConnectFailed {
                                status: None,
                                will_retry: true,
                            },
                        ));
                    }
                }
                ConnState::Heartbeat => {
                    if c.hb_timer.is_expired() {
                        log::info!("[CONN] {}: heartbeat timeout", c.handle);
                        self.fail_connected(&mut c, DisconnectCause::HeartbeatTimeout, &mut events);
                    } else if c.send_timer.is_expired() {
                        let null =
                            RdmnetMessage::broker(c.local_cid, BrokerMessage::Null).pack_to_vec();
                        if let Ok(frame) = null {
                            c.enqueue(frame);
                        }
                        c.send_timer.reset();
                        if c.flush().is_err() {
                            self.fail_connected(&mut c, DisconnectCause::ConnError, &mut events);
                        }
                    }
                }
                _ => {}
            }
        }
        events
    }

    /// Feed one runtime readiness event to the owning connection.
    pub fn handle_socket_event(&self, event: SocketEvent) -> Vec<(ConnHandle, ConnEvent)> {
        let mut events = Vec::new();
        let handle = match self.by_socket.read().get(&event.handle) {
            Some(&h) => h,
            None => return events,
        };
        let conn = match self.get(handle) {
            Ok(c) => c,
            Err(_) => return events,
        };
        let mut c = conn.lock();
        if c.socket_handle != Some(event.handle) {
            // Stale mapping from a socket this connection already closed.
            self.by_socket.write().remove(&event.handle);
            return events;
        }

        if event.writable {
            self.handle_writable(&mut c, &mut events);
        }
        if event.readable {
            self.handle_readable(&mut c, &mut events);
        }
        events
    }

    fn start_tcp_connect(&self, c: &mut Connection, events: &mut Vec<(ConnHandle, ConnEvent)>) {
        let addr = match c.remote_addr {
            Some(a) => a,
            None => return,
        };
        match TcpStream::connect(addr) {
            Ok(mut stream) => {
                match self
                    .runtime
                    .register(&mut stream, Interest::READABLE | Interest::WRITABLE)
                {
                    Ok(sh) => {
                        self.by_socket.write().insert(sh, c.handle);
                        c.stream = Some(stream);
                        c.socket_handle = Some(sh);
                        c.state = ConnState::TcpConnPending;
                        log::debug!("[CONN] {}: TCP connect to {} started", c.handle, addr);
                    }
                    Err(e) => {
                        log::warn!("[CONN] {}: socket registration failed: {}", c.handle, e);
                        c.enter_backoff(&self.runtime);
                        events.push((
                            c.handle,
                            ConnEvent::ConnectFailed {
                                status: None,
                                will_retry: true,
                            },
                        ));
                    }
                }
            }
            Err(e) => {
                log::info!("[CONN] {}: TCP connect to {} failed: {}", c.handle, addr, e);
                c.enter_backoff(&self.runtime);
                events.push((
                    c.handle,
                    ConnEvent::ConnectFailed {
                        status: None,
                        will_retry: true,
                    },
                ));
            }
        }
    }

    fn handle_writable(&self, c: &mut Connection, events: &mut Vec<(ConnHandle, ConnEvent)>) {
        if c.state == ConnState::TcpConnPending {
            // Writable on an in-flight connect means the handshake finished,
            // successfully or not.
            let established = c
                .stream
                .as_ref()
                .map(|s| s.take_error().ok().flatten().is_none() && s.peer_addr().is_ok())
                .unwrap_or(false);
            if !established {
                log::info!("[CONN] {}: TCP connect failed", c.handle);
                c.enter_backoff(&self.runtime);
                events.push((
                    c.handle,
                    ConnEvent::ConnectFailed {
                        status: None,
                        will_retry: true,
                    },
                ));
                return;
            }
            // Send the client connect message and await the broker's reply.
            let connect = match &c.connect_msg {
                Some(m) => m.clone(),
                None => return,
            };
            let frame = RdmnetMessage::broker(c.local_cid, BrokerMessage::Connect(connect))
                .pack_to_vec();
            match frame {
                Ok(f) => {
                    c.enqueue(f);
                    c.state = ConnState::RdmnetConnPending;
                    c.hb_timer.reset();
                    if c.flush().is_err() {
                        c.enter_backoff(&self.runtime);
                        events.push((
                            c.handle,
                            ConnEvent::ConnectFailed {
                                status: None,
                                will_retry: true,
                            },
                        ));
                    }
                }
                Err(e) => log::error!("[CONN] {}: cannot pack connect: {}", c.handle, e),
            }
            return;
        }

        if c.wants_writable() && c.flush().is_err() {
            match c.state {
                ConnState::Heartbeat => {
                    self.fail_connected(c, DisconnectCause::ConnError, events);
                }
                _ => {
                    c.enter_backoff(&self.runtime);
                }
            }
        }
    }

    fn handle_readable(&self, c: &mut Connection, events: &mut Vec<(ConnHandle, ConnEvent)>) {
        let mut chunk = [0u8; 4096];
        loop {
            let stream = match c.stream.as_mut() {
                Some(s) => s,
                None => return,
            };
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.peer_closed(c, events);
                    return;
                }
                Ok(n) => {
                    c.recv_buf.feed(&chunk[..n]);
                    if !self.drain_messages(c, events) {
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::info!("[CONN] {}: read error: {}", c.handle, e);
                    self.fail_connected(c, DisconnectCause::ConnError, events);
                    return;
                }
            }
        }
    }

    /// Pull parsed messages out of the receive buffer. Returns false when
    /// the connection died while draining.
    fn drain_messages(&self, c: &mut Connection, events: &mut Vec<(ConnHandle, ConnEvent)>) -> bool {
        loop {
            match c.recv_buf.poll() {
                MsgBufPoll::Empty => return true,
                MsgBufPoll::Error(err) => {
                    log::warn!("[CONN] {}: protocol error: {}", c.handle, err);
                    c.send_disconnect_now(DisconnectReason::SoftwareFault);
                    self.fail_connected(c, DisconnectCause::ConnError, events);
                    return false;
                }
                MsgBufPoll::Complete(msg) => {
                    // Any traffic proves the peer alive.
                    c.hb_timer.reset();
                    if !self.handle_message(c, msg, events) {
                        return false;
                    }
                }
            }
        }
    }

    /// Returns false when the message tore the connection down.
    fn handle_message(
        &self,
        c: &mut Connection,
        msg: RdmnetMessage,
        events: &mut Vec<(ConnHandle, ConnEvent)>,
    ) -> bool {
        let sender_cid = msg.sender_cid;
        match msg.data {
            // Heartbeats are consumed here, never delivered.
            RdmnetMessageData::Broker(BrokerMessage::Null) => true,

            RdmnetMessageData::Broker(BrokerMessage::ConnectReply(reply))
                if c.state == ConnState::RdmnetConnPending =>
            {
                if reply.connect_status == ConnectStatus::Ok {
                    c.state = ConnState::Heartbeat;
                    c.backoff_ms = c.timing.backoff_initial_ms;
                    c.send_timer.reset();
                    c.hb_timer.reset();
                    log::info!("[CONN] {}: connected to broker", c.handle);
                    events.push((c.handle, ConnEvent::Connected { reply }));
                    true
                } else {
                    // The broker refused us; retrying the same request
                    // would just be refused again.
                    log::info!(
                        "[CONN] {}: broker rejected connection: {}",
                        c.handle,
                        reply.connect_status
                    );
                    let status = reply.connect_status;
                    c.mark_destroyed(&self.runtime);
                    events.push((
                        c.handle,
                        ConnEvent::ConnectFailed {
                            status: Some(status),
                            will_retry: false,
                        },
                    ));
                    false
                }
            }

            RdmnetMessageData::Broker(BrokerMessage::Disconnect(d)) => {
                self.fail_connected(c, DisconnectCause::PeerDisconnect(d.reason), events);
                false
            }

            RdmnetMessageData::Broker(BrokerMessage::RedirectV4(r))
            | RdmnetMessageData::Broker(BrokerMessage::RedirectV6(r)) => {
                let addr = r.new_addr;
                log::info!("[CONN] {}: redirected to {}", c.handle, addr);
                c.remote_addr = Some(addr);
                c.close_socket(&self.runtime);
                c.state = ConnState::ConnectPending;
                events.push((
                    c.handle,
                    ConnEvent::Disconnected {
                        cause: DisconnectCause::Redirected(addr),
                        will_retry: true,
                    },
                ));
                false
            }

            data => {
                events.push((
                    c.handle,
                    ConnEvent::MsgReceived(RdmnetMessage { sender_cid, data }),
                ));
                true
            }
        }
    }

    fn peer_closed(&self, c: &mut Connection, events: &mut Vec<(ConnHandle, ConnEvent)>) {
        log::info!("[CONN] {}: peer closed", c.handle);
        self.fail_connected(c, DisconnectCause::PeerClosed, events);
    }

    /// Common teardown for a connection leaving `Heartbeat` (or dying
    /// mid-handshake): backoff if auto-reconnect, destruction otherwise.
    fn fail_connected(
        &self,
        c: &mut Connection,
        cause: DisconnectCause,
        events: &mut Vec<(ConnHandle, ConnEvent)>,
    ) {
        let will_retry = c.auto_reconnect && !c.external_socket_attached;
        if will_retry {
            c.enter_backoff(&self.runtime);
        } else {
            c.mark_destroyed(&self.runtime);
        }
        events.push((c.handle, ConnEvent::Disconnected { cause, will_retry }));
    }
}
