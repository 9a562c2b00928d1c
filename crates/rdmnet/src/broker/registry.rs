// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker client registry: connected clients indexed by handle, CID, and
//! connection.

use super::uid_manager::ClientHandle;
use crate::conn::ConnHandle;
use crate::protocol::broker::{ClientEntry, ClientEntryData};
use crate::protocol::types::RptClientType;
use crate::{Cid, Error, Limits, RdmUid, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// One connected client.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    pub handle: ClientHandle,
    pub conn: ConnHandle,
    pub cid: Cid,
    /// The client's wire entry with the broker-assigned UID filled in.
    pub entry: ClientEntry,
}

impl BrokerClient {
    /// The client's RPT UID, if it is an RPT client.
    pub fn uid(&self) -> Option<RdmUid> {
        match &self.entry.data {
            ClientEntryData::Rpt { uid, .. } => Some(*uid),
            ClientEntryData::Ept { .. } => None,
        }
    }

    pub fn client_type(&self) -> Option<RptClientType> {
        match &self.entry.data {
            ClientEntryData::Rpt { client_type, .. } => Some(*client_type),
            ClientEntryData::Ept { .. } => None,
        }
    }

    pub fn is_controller(&self) -> bool {
        self.client_type() == Some(RptClientType::Controller)
    }

    pub fn is_device(&self) -> bool {
        self.client_type() == Some(RptClientType::Device)
    }
}

/// Concurrent registry of connected clients.
pub struct ClientRegistry {
    clients: DashMap<ClientHandle, BrokerClient>,
    by_conn: DashMap<ConnHandle, ClientHandle>,
    by_cid: DashMap<Cid, ClientHandle>,
    next_handle: AtomicU32,
    max_clients: Option<usize>,
}

impl ClientRegistry {
    pub fn new(limits: &Limits) -> Self {
        Self {
            clients: DashMap::new(),
            by_conn: DashMap::new(),
            by_cid: DashMap::new(),
            next_handle: AtomicU32::new(0),
            max_clients: limits.max_clients_per_broker,
        }
    }

    /// Reserve a client handle ahead of insertion, so UID assignments can
    /// be keyed to the final handle before the registry entry exists.
    pub fn allocate_handle(&self) -> ClientHandle {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    /// Insert a newly admitted client under a pre-allocated handle.
    ///
    /// If a live client already holds the same CID, that older client's
    /// handle is returned so the caller can close it (newest wins).
    pub fn insert_with_handle(
        &self,
        handle: ClientHandle,
        conn: ConnHandle,
        entry: ClientEntry,
    ) -> Result<Option<ClientHandle>> {
        if let Some(max) = self.max_clients {
            if self.clients.len() >= max {
                return Err(Error::NoMem);
            }
        }
        let displaced = self.by_cid.get(&entry.cid).map(|h| *h);
        let client = BrokerClient {
            handle,
            conn,
            cid: entry.cid,
            entry,
        };
        self.by_cid.insert(client.cid, handle);
        self.by_conn.insert(conn, handle);
        self.clients.insert(handle, client);
        Ok(displaced)
    }

    /// Allocate a handle and insert in one step.
    pub fn insert(
        &self,
        conn: ConnHandle,
        entry: ClientEntry,
    ) -> Result<(ClientHandle, Option<ClientHandle>)> {
        let handle = self.allocate_handle();
        let displaced = self.insert_with_handle(handle, conn, entry)?;
        Ok((handle, displaced))
    }

    pub fn get(&self, handle: ClientHandle) -> Option<BrokerClient> {
        self.clients.get(&handle).map(|c| c.clone())
    }

    pub fn by_conn(&self, conn: ConnHandle) -> Option<BrokerClient> {
        self.by_conn
            .get(&conn)
            .and_then(|h| self.clients.get(&h).map(|c| c.clone()))
    }

    pub fn by_cid(&self, cid: &Cid) -> Option<BrokerClient> {
        self.by_cid
            .get(cid)
            .and_then(|h| self.clients.get(&h).map(|c| c.clone()))
    }

    /// Swap a connected client's entry in place, keeping its handle (so
    /// UID-manager ownership stays valid).
    pub fn replace_entry(&self, conn: ConnHandle, entry: ClientEntry) -> Result<ClientHandle> {
        let handle = *self.by_conn.get(&conn).ok_or(Error::NotFound)?;
        let mut client = self.clients.get_mut(&handle).ok_or(Error::NotFound)?;
        // Read-then-drop before removing: a held shard guard would
        // deadlock the remove.
        let cid_owner = self.by_cid.get(&client.cid).map(|h| *h);
        if cid_owner == Some(handle) {
            self.by_cid.remove(&client.cid);
        }
        client.cid = entry.cid;
        client.entry = entry;
        self.by_cid.insert(client.cid, handle);
        Ok(handle)
    }

    /// Remove a client by its connection. Returns the removed client.
    pub fn remove_by_conn(&self, conn: ConnHandle) -> Option<BrokerClient> {
        let handle = self.by_conn.remove(&conn)?.1;
        let client = self.clients.remove(&handle)?.1;
        // Only drop the CID index if it still points at this client (a
        // duplicate-CID admission may have overwritten it already).
        let cid_owner = self.by_cid.get(&client.cid).map(|h| *h);
        if cid_owner == Some(handle) {
            self.by_cid.remove(&client.cid);
        }
        Some(client)
    }

    /// Snapshot of every connected client.
    pub fn all(&self) -> Vec<BrokerClient> {
        self.clients.iter().map(|c| c.clone()).collect()
    }

    /// Snapshot of all connected controllers.
    pub fn controllers(&self) -> Vec<BrokerClient> {
        self.clients
            .iter()
            .filter(|c| c.is_controller())
            .map(|c| c.clone())
            .collect()
    }

    /// Snapshot of all connected devices.
    pub fn devices(&self) -> Vec<BrokerClient> {
        self.clients
            .iter()
            .filter(|c| c.is_device())
            .map(|c| c.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        let mut b = [0u8; 16];
        b[15] = n;
        Cid::from_bytes(b)
    }

    fn rpt_entry(n: u8, client_type: RptClientType) -> ClientEntry {
        ClientEntry {
            cid: cid(n),
            data: ClientEntryData::Rpt {
                uid: RdmUid::new(0xe574, n as u32),
                client_type,
                binding_cid: Cid::nil(),
            },
        }
    }

    #[test]
    fn test_insert_and_indexes() {
        let reg = ClientRegistry::new(&Limits::default());
        let (h1, displaced) = reg.insert(10, rpt_entry(1, RptClientType::Controller)).unwrap();
        assert!(displaced.is_none());
        let (h2, _) = reg.insert(11, rpt_entry(2, RptClientType::Device)).unwrap();
        assert_ne!(h1, h2);

        assert_eq!(reg.by_conn(10).unwrap().handle, h1);
        assert_eq!(reg.by_cid(&cid(2)).unwrap().handle, h2);
        assert_eq!(reg.controllers().len(), 1);
        assert_eq!(reg.devices().len(), 1);
    }

    #[test]
    fn test_duplicate_cid_reports_displaced() {
        let reg = ClientRegistry::new(&Limits::default());
        let (old, _) = reg.insert(10, rpt_entry(1, RptClientType::Device)).unwrap();
        let (new, displaced) = reg.insert(11, rpt_entry(1, RptClientType::Device)).unwrap();
        assert_eq!(displaced, Some(old));

        // The CID index now points at the newer client.
        assert_eq!(reg.by_cid(&cid(1)).unwrap().handle, new);

        // Removing the old client must not break the CID index.
        reg.remove_by_conn(10);
        assert_eq!(reg.by_cid(&cid(1)).unwrap().handle, new);
    }

    #[test]
    fn test_remove_by_conn() {
        let reg = ClientRegistry::new(&Limits::default());
        reg.insert(10, rpt_entry(1, RptClientType::Device)).unwrap();
        let removed = reg.remove_by_conn(10).unwrap();
        assert_eq!(removed.cid, cid(1));
        assert!(reg.is_empty());
        assert!(reg.by_cid(&cid(1)).is_none());
        assert!(reg.remove_by_conn(10).is_none());
    }

    #[test]
    fn test_capacity() {
        let reg = ClientRegistry::new(&Limits {
            max_clients_per_broker: Some(1),
            ..Limits::default()
        });
        reg.insert(10, rpt_entry(1, RptClientType::Device)).unwrap();
        assert!(matches!(
            reg.insert(11, rpt_entry(2, RptClientType::Device)),
            Err(Error::NoMem)
        ));
    }
}
