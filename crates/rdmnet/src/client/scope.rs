// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scope configuration and per-scope connection state.

use crate::conn::ConnHandle;
use crate::protocol::consts::{E133_DEFAULT_SCOPE, E133_SCOPE_STRING_PADDED_LENGTH};
use crate::{Error, RdmUid, Result};
use std::net::SocketAddr;

/// Handle to one scope within a client, valid until the scope is removed.
pub type ScopeHandle = u32;

/// Configuration for one scope membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConfig {
    /// UTF-8, at most 62 bytes (the wire field adds a null terminator).
    pub scope: String,
    /// Skips discovery and connects straight to this broker.
    pub static_broker_addr: Option<SocketAddr>,
}

impl ScopeConfig {
    pub fn new(scope: impl Into<String>) -> Result<Self> {
        let scope = scope.into();
        if scope.is_empty() || scope.len() >= E133_SCOPE_STRING_PADDED_LENGTH {
            return Err(Error::Invalid);
        }
        Ok(Self {
            scope,
            static_broker_addr: None,
        })
    }

    /// The discovery default scope.
    pub fn default_scope() -> Self {
        Self {
            scope: E133_DEFAULT_SCOPE.to_string(),
            static_broker_addr: None,
        }
    }

    pub fn with_static_broker(mut self, addr: SocketAddr) -> Self {
        self.static_broker_addr = Some(addr);
        self
    }
}

/// Book-keeping for one scope's connection.
#[derive(Debug)]
pub(crate) struct ScopeState {
    pub handle: ScopeHandle,
    pub config: ScopeConfig,
    pub conn: ConnHandle,
    pub connected: bool,
    /// Monotonic sequence number for RPT messages on this scope.
    pub next_seqnum: u32,
    pub broker_uid: RdmUid,
    /// The UID this client operates under on this scope (broker-assigned
    /// for dynamic clients).
    pub assigned_uid: RdmUid,
}

impl ScopeState {
    pub fn new(handle: ScopeHandle, config: ScopeConfig, conn: ConnHandle) -> Self {
        Self {
            handle,
            config,
            conn,
            connected: false,
            next_seqnum: 1,
            broker_uid: RdmUid::default(),
            assigned_uid: RdmUid::default(),
        }
    }

    pub fn take_seqnum(&mut self) -> u32 {
        let n = self.next_seqnum;
        self.next_seqnum = self.next_seqnum.wrapping_add(1);
        if self.next_seqnum == 0 {
            self.next_seqnum = 1;
        }
        n
    }
}
