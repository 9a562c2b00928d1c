// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker UID assignment and lookup.
//!
//! Dynamic assignments are sticky per CID for the broker's lifetime: a
//! client that reconnects with the same CID gets its previous device ID
//! back even if the UID was released in between. Device IDs come from a
//! shared cursor that wraps from 0xFFFFFFFF to 1 (0 is reserved) and
//! skips IDs still in use.

use crate::{Cid, Error, Limits, RdmUid, Result};
use std::collections::HashMap;

/// Handle of the client that owns a UID, broker-internal.
pub type ClientHandle = u32;

/// UID registry for one broker scope.
pub struct BrokerUidManager {
    next_device_id: u32,
    uid_to_handle: HashMap<RdmUid, ClientHandle>,
    /// CID -> reserved device ID; survives removal of the live entry.
    reservations: HashMap<Cid, u32>,
    /// Live dynamic UID -> the RID (CID) it was assigned for.
    assigned_rids: HashMap<RdmUid, Cid>,
    max_entries: Option<usize>,
}

impl BrokerUidManager {
    pub fn new(limits: &Limits) -> Self {
        Self {
            next_device_id: 1,
            uid_to_handle: HashMap::new(),
            reservations: HashMap::new(),
            assigned_rids: HashMap::new(),
            max_entries: limits.max_uid_entries,
        }
    }

    /// Override the assignment cursor (tests, persistence restore).
    pub fn set_next_device_id(&mut self, next: u32) {
        self.next_device_id = next;
    }

    fn check_capacity(&self) -> Result<()> {
        if let Some(max) = self.max_entries {
            if self.uid_to_handle.len() >= max {
                return Err(Error::NoMem);
            }
        }
        Ok(())
    }

    /// Register a statically configured UID.
    pub fn add_static(&mut self, handle: ClientHandle, uid: RdmUid) -> Result<()> {
        self.check_capacity()?;
        if self.uid_to_handle.contains_key(&uid) {
            return Err(Error::AlreadyExists);
        }
        self.uid_to_handle.insert(uid, handle);
        Ok(())
    }

    /// Assign (or re-assign) a dynamic UID for `cid` with the requested
    /// manufacturer ID.
    ///
    /// A CID with a live assignment cannot request a second one; a CID
    /// whose earlier assignment was removed gets the same device ID back.
    pub fn add_dynamic(&mut self, handle: ClientHandle, cid: Cid, manu: u16) -> Result<RdmUid> {
        self.check_capacity()?;
        if let Some(&reserved) = self.reservations.get(&cid) {
            let uid = RdmUid::new(manu, reserved);
            if self.uid_to_handle.contains_key(&uid) {
                return Err(Error::AlreadyExists);
            }
            self.uid_to_handle.insert(uid, handle);
            self.assigned_rids.insert(uid, cid);
            return Ok(uid);
        }

        let device_id = self.alloc_device_id(manu)?;
        let uid = RdmUid::new(manu, device_id);
        self.uid_to_handle.insert(uid, handle);
        self.reservations.insert(cid, device_id);
        self.assigned_rids.insert(uid, cid);
        Ok(uid)
    }

    fn alloc_device_id(&mut self, manu: u16) -> Result<u32> {
        // O(n) only after 2^32 assignments in one session.
        let mut candidate = self.next_device_id;
        for _ in 0..=u32::MAX as u64 {
            if candidate == 0 {
                candidate = 1;
            }
            if !self.uid_to_handle.contains_key(&RdmUid::new(manu, candidate)) {
                self.next_device_id = candidate.wrapping_add(1);
                return Ok(candidate);
            }
            candidate = candidate.wrapping_add(1);
        }
        Err(Error::NoMem)
    }

    /// Release a UID. The CID reservation stays.
    pub fn remove_uid(&mut self, uid: &RdmUid) {
        self.uid_to_handle.remove(uid);
        self.assigned_rids.remove(uid);
    }

    /// Release every UID owned by `handle`.
    pub fn remove_handle(&mut self, handle: ClientHandle) {
        let removed: Vec<RdmUid> = self
            .uid_to_handle
            .iter()
            .filter(|(_, h)| **h == handle)
            .map(|(u, _)| *u)
            .collect();
        for uid in removed {
            self.uid_to_handle.remove(&uid);
            self.assigned_rids.remove(&uid);
        }
    }

    /// The RID a live dynamic UID was assigned for.
    pub fn rid_for_uid(&self, uid: &RdmUid) -> Option<Cid> {
        self.assigned_rids.get(uid).copied()
    }

    /// Look up the owner of a UID.
    pub fn uid_to_handle(&self, uid: &RdmUid) -> Option<ClientHandle> {
        self.uid_to_handle.get(uid).copied()
    }

    /// Number of live assignments.
    pub fn len(&self) -> usize {
        self.uid_to_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uid_to_handle.is_empty()
    }

    /// Iterate live `(uid, handle)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&RdmUid, &ClientHandle)> {
        self.uid_to_handle.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        let mut bytes = [0u8; 16];
        bytes[15] = n;
        Cid::from_bytes(bytes)
    }

    #[test]
    fn test_static_uid() {
        let mut mgr = BrokerUidManager::new(&Limits::default());
        let test_1 = RdmUid::new(0, 1);
        let test_2 = RdmUid::new(0, 2);
        let test_3 = RdmUid::new(10, 20);

        mgr.add_static(1, test_1).unwrap();
        mgr.add_static(2, test_2).unwrap();
        mgr.add_static(3, test_3).unwrap();

        assert_eq!(mgr.uid_to_handle(&test_1), Some(1));
        assert_eq!(mgr.uid_to_handle(&test_2), Some(2));
        assert_eq!(mgr.uid_to_handle(&test_3), Some(3));

        // Static UID conflict.
        assert!(matches!(
            mgr.add_static(4, test_1),
            Err(Error::AlreadyExists)
        ));

        // Remove, then the same UID can bind to a new connection.
        mgr.remove_uid(&test_1);
        assert_eq!(mgr.uid_to_handle(&test_1), None);
        mgr.add_static(5, test_1).unwrap();
        assert_eq!(mgr.uid_to_handle(&test_1), Some(5));
    }

    #[test]
    fn test_dynamic_uid() {
        let mut mgr = BrokerUidManager::new(&Limits::default());
        mgr.set_next_device_id(1000);

        let uid_1 = mgr.add_dynamic(1, cid(1), 0xe574).unwrap();
        assert_eq!(uid_1.manu, 0xe574);
        assert_eq!(uid_1.id, 1000);

        // The same CID cannot hold two live assignments.
        assert!(matches!(
            mgr.add_dynamic(2, cid(1), 0xe574),
            Err(Error::AlreadyExists)
        ));

        let uid_2 = mgr.add_dynamic(3, cid(2), 0x8001).unwrap();
        assert_eq!(uid_2.manu, 0x8001);
        assert_eq!(uid_2.id, 1001);

        assert_eq!(mgr.uid_to_handle(&uid_1), Some(1));
        assert_eq!(mgr.uid_to_handle(&uid_2), Some(3));

        // Remove the first, then the CID gets its reservation back.
        mgr.remove_uid(&uid_1);
        assert_eq!(mgr.uid_to_handle(&uid_1), None);
        let uid_again = mgr.add_dynamic(4, cid(1), 0xe574).unwrap();
        assert_eq!(uid_again, RdmUid::new(0xe574, 1000));
    }

    #[test]
    fn test_wraparound() {
        let mut mgr = BrokerUidManager::new(&Limits::default());
        mgr.set_next_device_id(1);

        assert_eq!(mgr.add_dynamic(1, cid(1), 0x8001).unwrap().id, 1);
        assert_eq!(mgr.add_dynamic(2, cid(2), 0x8001).unwrap().id, 2);
        assert_eq!(mgr.add_dynamic(3, cid(3), 0x8001).unwrap().id, 3);

        // Free ID 2.
        mgr.remove_uid(&RdmUid::new(0x8001, 2));

        // Pretend the whole 32-bit range has been walked.
        mgr.set_next_device_id(0xffffffff);
        assert_eq!(
            mgr.add_dynamic(4, cid(4), 0x8001).unwrap().id,
            0xffffffff
        );

        // Wrap: skip reserved 0, skip in-use 1, land on freed 2.
        assert_eq!(mgr.add_dynamic(5, cid(5), 0x8001).unwrap().id, 2);

        // Skip in-use 3, land on 4.
        assert_eq!(mgr.add_dynamic(6, cid(6), 0x8001).unwrap().id, 4);
    }

    #[test]
    fn test_bijection_after_churn() {
        let mut mgr = BrokerUidManager::new(&Limits::default());
        for i in 0..50u8 {
            mgr.add_dynamic(i as u32, cid(i), 0x8001).unwrap();
        }
        for i in (0..50u8).step_by(2) {
            mgr.remove_uid(&RdmUid::new(0x8001, i as u32 + 1));
        }
        // Forward and reverse agree for every live entry.
        let entries: Vec<_> = mgr.iter().map(|(u, h)| (*u, *h)).collect();
        assert_eq!(entries.len(), 25);
        for (uid, handle) in entries {
            assert_eq!(mgr.uid_to_handle(&uid), Some(handle));
        }
    }

    #[test]
    fn test_capacity_limit() {
        let mut mgr = BrokerUidManager::new(&Limits {
            max_uid_entries: Some(1),
            ..Limits::default()
        });
        mgr.add_static(1, RdmUid::new(0, 1)).unwrap();
        assert!(matches!(
            mgr.add_dynamic(2, cid(2), 0x8001),
            Err(Error::NoMem)
        ));
    }

    #[test]
    fn test_remove_handle_clears_all() {
        let mut mgr = BrokerUidManager::new(&Limits::default());
        mgr.add_static(7, RdmUid::new(0, 1)).unwrap();
        mgr.add_static(7, RdmUid::new(0, 2)).unwrap();
        mgr.add_static(8, RdmUid::new(0, 3)).unwrap();
        mgr.remove_handle(7);
        assert_eq!(mgr.len(), 1);
        assert_eq!(mgr.uid_to_handle(&RdmUid::new(0, 3)), Some(8));
    }
}
