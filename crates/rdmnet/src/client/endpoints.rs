// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device endpoints and their responders.
//!
//! A device exposes numbered endpoints; endpoint 0 is the device itself.
//! Physical endpoints front real RDM responders with their own UIDs;
//! virtual endpoints front software responders identified by RID (a
//! CID), which need a broker-assigned dynamic UID before controllers can
//! address them.

use crate::protocol::broker::DynamicUidRequest;
use crate::util::CapVec;
use crate::{Cid, Error, RdmUid, Result};
use std::collections::HashMap;

/// The endpoint number addressing the device itself.
pub const DEFAULT_ENDPOINT: u16 = 0;

/// Endpoint kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    /// Fronts physical RDM responders (e.g. a DMX port).
    Physical,
    /// Fronts software responders identified by RID.
    Virtual,
}

/// One addressable target behind an endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponderRef {
    /// A responder with a static RDM UID.
    StaticUid(RdmUid),
    /// A virtual responder awaiting (or holding) a dynamic UID for its
    /// RID.
    DynamicRid { rid: Cid, uid: Option<RdmUid> },
    /// A physical sub-device behind a parent responder.
    SubDevice { uid: RdmUid, sub_device: u16 },
}

impl ResponderRef {
    /// The UID this responder answers to, if one is known yet.
    pub fn uid(&self) -> Option<RdmUid> {
        match self {
            ResponderRef::StaticUid(uid) => Some(*uid),
            ResponderRef::DynamicRid { uid, .. } => *uid,
            ResponderRef::SubDevice { uid, .. } => Some(*uid),
        }
    }
}

/// One endpoint and its responders.
#[derive(Debug)]
pub struct Endpoint {
    pub id: u16,
    pub kind: EndpointKind,
    responders: CapVec<ResponderRef>,
}

impl Endpoint {
    pub fn responders(&self) -> &[ResponderRef] {
        self.responders.as_slice()
    }
}

/// The endpoint table of one device.
pub struct EndpointRegistry {
    endpoints: HashMap<u16, Endpoint>,
    max_responders_per_endpoint: Option<usize>,
}

impl EndpointRegistry {
    pub fn new(max_responders_per_endpoint: Option<usize>) -> Self {
        Self {
            endpoints: HashMap::new(),
            max_responders_per_endpoint,
        }
    }

    /// Add an endpoint. Endpoint 0 is reserved and cannot be added.
    pub fn add_endpoint(&mut self, id: u16, kind: EndpointKind) -> Result<()> {
        if id == DEFAULT_ENDPOINT {
            return Err(Error::Invalid);
        }
        if self.endpoints.contains_key(&id) {
            return Err(Error::AlreadyExists);
        }
        self.endpoints.insert(
            id,
            Endpoint {
                id,
                kind,
                responders: CapVec::with_limit(self.max_responders_per_endpoint),
            },
        );
        Ok(())
    }

    pub fn remove_endpoint(&mut self, id: u16) -> Result<()> {
        self.endpoints.remove(&id).map(|_| ()).ok_or(Error::NotFound)
    }

    pub fn endpoint(&self, id: u16) -> Option<&Endpoint> {
        self.endpoints.get(&id)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    /// Add a responder behind an endpoint. Physical endpoints take UID
    /// responders; virtual endpoints take RIDs or static UIDs.
    pub fn add_responder(&mut self, endpoint_id: u16, responder: ResponderRef) -> Result<()> {
        let endpoint = self
            .endpoints
            .get_mut(&endpoint_id)
            .ok_or(Error::NotFound)?;
        if endpoint.kind == EndpointKind::Physical {
            if matches!(responder, ResponderRef::DynamicRid { .. }) {
                return Err(Error::Invalid);
            }
        }
        if endpoint
            .responders
            .iter()
            .any(|r| r == &responder)
        {
            return Err(Error::AlreadyExists);
        }
        endpoint.responders.push(responder)
    }

    pub fn remove_responder(&mut self, endpoint_id: u16, responder: &ResponderRef) -> Result<()> {
        let endpoint = self
            .endpoints
            .get_mut(&endpoint_id)
            .ok_or(Error::NotFound)?;
        let before = endpoint.responders.len();
        endpoint.responders.retain(|r| r != responder);
        if endpoint.responders.len() == before {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Dynamic UID requests for every virtual responder still awaiting
    /// an assignment.
    pub fn pending_uid_requests(&self, manu: u16) -> Vec<DynamicUidRequest> {
        self.endpoints
            .values()
            .flat_map(|e| e.responders.iter())
            .filter_map(|r| match r {
                ResponderRef::DynamicRid { rid, uid: None } => Some(DynamicUidRequest {
                    requested_uid: RdmUid::dynamic_request(manu),
                    rid: *rid,
                }),
                _ => None,
            })
            .collect()
    }

    /// Record broker-assigned UIDs for virtual responders by RID.
    pub fn apply_uid_assignment(&mut self, rid: &Cid, assigned: RdmUid) {
        for endpoint in self.endpoints.values_mut() {
            for responder in endpoint.responders.iter_mut() {
                if let ResponderRef::DynamicRid { rid: r, uid } = responder {
                    if r == rid {
                        *uid = Some(assigned);
                    }
                }
            }
        }
    }

    /// Find which endpoint a UID lives behind.
    pub fn endpoint_for_uid(&self, uid: &RdmUid) -> Option<u16> {
        self.endpoints
            .values()
            .find(|e| e.responders.iter().any(|r| r.uid() == Some(*uid)))
            .map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(n: u8) -> Cid {
        let mut b = [0u8; 16];
        b[15] = n;
        Cid::from_bytes(b)
    }

    #[test]
    fn test_endpoint_zero_reserved() {
        let mut reg = EndpointRegistry::new(None);
        assert!(matches!(
            reg.add_endpoint(0, EndpointKind::Physical),
            Err(Error::Invalid)
        ));
        reg.add_endpoint(1, EndpointKind::Physical).unwrap();
        assert!(matches!(
            reg.add_endpoint(1, EndpointKind::Virtual),
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn test_physical_endpoint_rejects_rids() {
        let mut reg = EndpointRegistry::new(None);
        reg.add_endpoint(1, EndpointKind::Physical).unwrap();
        reg.add_responder(1, ResponderRef::StaticUid(RdmUid::new(0x1234, 9)))
            .unwrap();
        assert!(matches!(
            reg.add_responder(
                1,
                ResponderRef::DynamicRid {
                    rid: rid(1),
                    uid: None
                }
            ),
            Err(Error::Invalid)
        ));
    }

    #[test]
    fn test_pending_requests_and_assignment() {
        let mut reg = EndpointRegistry::new(None);
        reg.add_endpoint(2, EndpointKind::Virtual).unwrap();
        reg.add_responder(
            2,
            ResponderRef::DynamicRid {
                rid: rid(1),
                uid: None,
            },
        )
        .unwrap();
        reg.add_responder(
            2,
            ResponderRef::DynamicRid {
                rid: rid(2),
                uid: None,
            },
        )
        .unwrap();

        let reqs = reg.pending_uid_requests(0x6574);
        assert_eq!(reqs.len(), 2);
        assert!(reqs.iter().all(|r| r.requested_uid.is_dynamic_request()));

        reg.apply_uid_assignment(&rid(1), RdmUid::new(0xe574, 500));
        let reqs = reg.pending_uid_requests(0x6574);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].rid, rid(2));

        assert_eq!(reg.endpoint_for_uid(&RdmUid::new(0xe574, 500)), Some(2));
        assert_eq!(reg.endpoint_for_uid(&RdmUid::new(0xe574, 501)), None);
    }

    #[test]
    fn test_responder_capacity() {
        let mut reg = EndpointRegistry::new(Some(1));
        reg.add_endpoint(1, EndpointKind::Virtual).unwrap();
        reg.add_responder(
            1,
            ResponderRef::DynamicRid {
                rid: rid(1),
                uid: None,
            },
        )
        .unwrap();
        assert!(matches!(
            reg.add_responder(
                1,
                ResponderRef::DynamicRid {
                    rid: rid(2),
                    uid: None
                }
            ),
            Err(Error::NoMem)
        ));
    }

    #[test]
    fn test_remove_responder() {
        let mut reg = EndpointRegistry::new(None);
        reg.add_endpoint(1, EndpointKind::Virtual).unwrap();
        let responder = ResponderRef::StaticUid(RdmUid::new(1, 2));
        reg.add_responder(1, responder).unwrap();
        reg.remove_responder(1, &responder).unwrap();
        assert!(matches!(
            reg.remove_responder(1, &responder),
            Err(Error::NotFound)
        ));
        assert_eq!(reg.endpoint(1).unwrap().responders().len(), 0);
    }
}
