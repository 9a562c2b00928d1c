// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared runtime: the polled-socket registry and tick primitive.
//!
//! Every I/O component (connections, multicast listeners, broker
//! listeners) registers its socket here and drives itself from the
//! readiness events one `tick` call returns. The tick can run on the
//! application's own thread or a dedicated library worker; either way
//! there is exactly one poll loop per [`Runtime`].
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                        Runtime                               |
//! |  +-------------------------------------------------------+  |
//! |  |                    mio::Poll                           |  |
//! |  |  - TCP connections (client + broker sides)            |  |
//! |  |  - Multicast recv sockets (LLRP)                      |  |
//! |  |  - Broker listeners (accept)                          |  |
//! |  |  - Waker (cross-thread wake for shutdown/send)        |  |
//! |  +-------------------------------------------------------+  |
//! |                              |                               |
//! |                              v                               |
//! |        tick(timeout) -> Vec<SocketEvent> -> owners          |
//! +-------------------------------------------------------------+
//! ```
//!
//! There is deliberately no hidden global: the application creates a
//! `Runtime`, hands [`RuntimeHandle`]s to the components it builds, and
//! calls `shutdown` when done.

pub mod timer;

pub use timer::Timer;

use crate::{Error, Result};
use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Token reserved for the cross-thread waker.
const WAKER_TOKEN: Token = Token(0);

/// First token handed out to registered sockets.
const SOCKET_TOKEN_START: usize = 1;

/// Maximum events drained per tick.
const MAX_EVENTS: usize = 128;

/// Identifies one registered socket within its runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SocketHandle(pub usize);

/// One readiness event delivered by [`RuntimeHandle::tick`].
#[derive(Copy, Clone, Debug)]
pub struct SocketEvent {
    pub handle: SocketHandle,
    pub readable: bool,
    pub writable: bool,
}

struct RuntimeInner {
    poll: Mutex<(Poll, Events)>,
    registry: mio::Registry,
    waker: Waker,
    next_token: AtomicUsize,
    registered: Mutex<HashSet<usize>>,
    shutting_down: AtomicBool,
}

/// Owner of the poll loop. Create once per process (or per isolated stack
/// in tests), pass [`RuntimeHandle`]s to components, drop last.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Cloneable reference to a [`Runtime`] passed to every I/O component.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(Error::Sys)?;
        let registry = poll.registry().try_clone().map_err(Error::Sys)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(Error::Sys)?;
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                poll: Mutex::new((poll, Events::with_capacity(MAX_EVENTS))),
                registry,
                waker,
                next_token: AtomicUsize::new(SOCKET_TOKEN_START),
                registered: Mutex::new(HashSet::new()),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Begin teardown: wake any blocked tick and refuse new registrations.
    ///
    /// Owners deregister and drop their sockets in their own teardown;
    /// the deterministic order (listeners, connections, discovery,
    /// multicast) is enforced by the component that owns them.
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        if let Err(e) = self.inner.waker.wake() {
            log::warn!("[RT] shutdown wake failed: {}", e);
        }
    }
}

impl RuntimeHandle {
    /// Register a socket for the given interests.
    ///
    /// Registering the same socket twice is an error (the registry is
    /// shared process state; a second registration would shadow the
    /// first owner's events).
    pub fn register(&self, source: &mut dyn Source, interest: Interest) -> Result<SocketHandle> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::Invalid);
        }
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        self.inner
            .registry
            .register(source, Token(token), interest)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::AlreadyExists
                } else {
                    Error::Sys(e)
                }
            })?;
        self.inner.registered.lock().insert(token);
        Ok(SocketHandle(token))
    }

    /// Change the interest set of a registered socket.
    pub fn reregister(
        &self,
        source: &mut dyn Source,
        handle: SocketHandle,
        interest: Interest,
    ) -> Result<()> {
        if !self.inner.registered.lock().contains(&handle.0) {
            return Err(Error::NotFound);
        }
        self.inner
            .registry
            .reregister(source, Token(handle.0), interest)
            .map_err(Error::Sys)
    }

    /// Remove a socket from the registry.
    pub fn deregister(&self, source: &mut dyn Source, handle: SocketHandle) -> Result<()> {
        if !self.inner.registered.lock().remove(&handle.0) {
            return Err(Error::NotFound);
        }
        self.inner.registry.deregister(source).map_err(Error::Sys)
    }

    /// Wait up to `timeout` for readiness and return the events.
    ///
    /// The only unbounded wait in the library is a `None` timeout here,
    /// and only the library-owned worker uses that (woken via
    /// [`RuntimeHandle::wake`]).
    pub fn tick(&self, timeout: Option<Duration>) -> Result<Vec<SocketEvent>> {
        let mut guard = self.inner.poll.lock();
        let (poll, events) = &mut *guard;
        poll.poll(events, timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::Interrupted {
                Error::WouldBlock
            } else {
                Error::Sys(e)
            }
        })?;
        let mut out = Vec::with_capacity(events.iter().count());
        for event in events.iter() {
            if event.token() == WAKER_TOKEN {
                continue;
            }
            out.push(SocketEvent {
                handle: SocketHandle(event.token().0),
                readable: event.is_readable(),
                writable: event.is_writable(),
            });
        }
        Ok(out)
    }

    /// Wake a tick blocked in the poll wait.
    pub fn wake(&self) -> Result<()> {
        self.inner.waker.wake().map_err(Error::Sys)
    }

    /// True once [`Runtime::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::UdpSocket;

    fn bound_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_register_and_tick_readable() {
        let rt = Runtime::new().unwrap();
        let h = rt.handle();

        let mut recv = bound_socket();
        let recv_addr = recv.local_addr().unwrap();
        let handle = h.register(&mut recv, Interest::READABLE).unwrap();

        let send = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        send.send_to(b"ping", recv_addr).unwrap();

        // Poll until the datagram is visible (bounded retries).
        let mut seen = false;
        for _ in 0..50 {
            let events = h.tick(Some(Duration::from_millis(100))).unwrap();
            if events.iter().any(|e| e.handle == handle && e.readable) {
                seen = true;
                break;
            }
        }
        assert!(seen, "registered socket never became readable");

        h.deregister(&mut recv, handle).unwrap();
    }

    #[test]
    fn test_deregister_unknown_handle_fails() {
        let rt = Runtime::new().unwrap();
        let h = rt.handle();
        let mut sock = bound_socket();
        assert!(matches!(
            h.deregister(&mut sock, SocketHandle(999)),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_double_register_same_socket_fails() {
        let rt = Runtime::new().unwrap();
        let h = rt.handle();
        let mut sock = bound_socket();
        let _first = h.register(&mut sock, Interest::READABLE).unwrap();
        assert!(h.register(&mut sock, Interest::READABLE).is_err());
    }

    #[test]
    fn test_shutdown_refuses_registration() {
        let rt = Runtime::new().unwrap();
        let h = rt.handle();
        rt.shutdown();
        let mut sock = bound_socket();
        assert!(matches!(
            h.register(&mut sock, Interest::READABLE),
            Err(Error::Invalid)
        ));
        assert!(h.is_shutting_down());
    }

    #[test]
    fn test_wake_interrupts_tick() {
        let rt = Runtime::new().unwrap();
        let h = rt.handle();
        let h2 = h.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            h2.wake().unwrap();
        });
        // Without the wake this would block for 10 seconds.
        let start = std::time::Instant::now();
        let _ = h.tick(Some(Duration::from_secs(10))).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }
}
