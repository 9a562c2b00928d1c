// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker self-registration with conflict election.
//!
//! A broker must not serve a scope another broker already serves. On
//! registration it browses its own scope for `BROKER_REG_QUERY_TIMEOUT_MS`
//! before declaring itself registered; if a competing broker appears
//! during the window (or later), the election is decided by CID: the
//! byte-wise greater CID deregisters.

use super::backend::{DnsSdBackend, ServiceRegistration};
use super::monitor::MonitoredScope;
use super::{
    DiscoveredBroker, DnsTxtItem, TXT_CID_KEY, TXT_E133VERS_KEY, TXT_MANUFACTURER_KEY,
    TXT_MODEL_KEY, TXT_SCOPE_KEY, TXT_UID_KEY, TXT_VERS, TXT_VERS_KEY,
};
use crate::mcast::NetintId;
use crate::protocol::consts::{BROKER_REG_QUERY_TIMEOUT_MS, E133_DNSSD_SRV_TYPE, E133_VERSION};
use crate::runtime::Timer;
use crate::{Cid, Error, RdmUid, Result};

/// True when this broker must yield the scope to `other`.
///
/// CIDs compare as 16-byte big-endian unsigned integers; the greater CID
/// loses so both sides of the election agree without negotiation.
pub fn should_deregister(this_broker_cid: &Cid, other_broker_cid: &Cid) -> bool {
    this_broker_cid > other_broker_cid
}

/// Registration settings for a broker instance.
#[derive(Debug, Clone)]
pub struct BrokerRegisterConfig {
    pub cid: Cid,
    pub uid: RdmUid,
    pub service_instance_name: String,
    pub port: u16,
    pub netints: Vec<NetintId>,
    pub scope: String,
    pub domain: String,
    pub model: String,
    pub manufacturer: String,
    pub additional_txt_items: Vec<DnsTxtItem>,
}

/// Registration lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BrokerRegState {
    NotRegistered,
    /// Service registered; watching the scope for a competing broker.
    Querying,
    Registered,
}

/// Events surfaced during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterEvent {
    /// The query window closed with no conflict.
    BrokerRegistered { assigned_service_name: String },
    /// A competing broker won the election; we have deregistered.
    OtherBrokerFound(DiscoveredBroker),
    /// A competing broker exists but loses the election; informational.
    OtherBrokerLost { service_name: String },
}

/// One registering (or registered) broker.
pub struct RegisteredBroker {
    config: BrokerRegisterConfig,
    state: BrokerRegState,
    query_timer: Timer,
    monitor: MonitoredScope,
    assigned_service_name: String,
}

impl RegisteredBroker {
    pub fn new(config: BrokerRegisterConfig) -> Self {
        let monitor = MonitoredScope::new(config.scope.clone(), config.domain.clone());
        let assigned_service_name = config.service_instance_name.clone();
        Self {
            config,
            state: BrokerRegState::NotRegistered,
            query_timer: Timer::start(BROKER_REG_QUERY_TIMEOUT_MS),
            monitor,
            assigned_service_name,
        }
    }

    pub fn state(&self) -> BrokerRegState {
        self.state
    }

    pub fn config(&self) -> &BrokerRegisterConfig {
        &self.config
    }

    /// The standard TXT record set plus the user's additional items.
    pub fn txt_items(&self) -> Vec<DnsTxtItem> {
        let mut items = vec![
            DnsTxtItem::new(TXT_VERS_KEY, TXT_VERS),
            DnsTxtItem::new(TXT_SCOPE_KEY, self.config.scope.clone()),
            DnsTxtItem::new(TXT_E133VERS_KEY, E133_VERSION.to_string()),
            DnsTxtItem::new(TXT_CID_KEY, self.config.cid.to_string()),
            DnsTxtItem::new(TXT_UID_KEY, self.config.uid.to_string()),
            DnsTxtItem::new(TXT_MODEL_KEY, self.config.model.clone()),
            DnsTxtItem::new(TXT_MANUFACTURER_KEY, self.config.manufacturer.clone()),
        ];
        items.extend(self.config.additional_txt_items.iter().cloned());
        items
    }

    /// Register the service and open the conflict query window.
    pub fn register(&mut self, backend: &mut dyn DnsSdBackend) -> Result<()> {
        if self.state != BrokerRegState::NotRegistered {
            return Err(Error::Invalid);
        }
        backend.register_service(&ServiceRegistration {
            service_instance_name: self.config.service_instance_name.clone(),
            service_type: E133_DNSSD_SRV_TYPE.to_string(),
            domain: self.config.domain.clone(),
            port: self.config.port,
            netints: self.config.netints.clone(),
            txt_items: self.txt_items(),
        })?;
        backend.start_monitor(E133_DNSSD_SRV_TYPE, &self.config.domain)?;
        self.state = BrokerRegState::Querying;
        self.query_timer.restart_with(BROKER_REG_QUERY_TIMEOUT_MS);
        log::info!(
            "[DISC] broker '{}' registering on scope '{}'",
            self.config.service_instance_name,
            self.config.scope
        );
        Ok(())
    }

    /// The responder renamed our instance on collision.
    pub fn service_renamed(&mut self, assigned_service_name: &str) {
        self.assigned_service_name = assigned_service_name.to_string();
    }

    /// Feed one resolved service from the DNS-SD adapter.
    pub fn service_resolved(
        &mut self,
        broker: DiscoveredBroker,
        backend: &mut dyn DnsSdBackend,
    ) -> Option<RegisterEvent> {
        if broker.cid == self.config.cid {
            // Our own advertisement echoed back.
            return None;
        }
        self.monitor.service_resolved(broker.clone())?;
        if should_deregister(&self.config.cid, &broker.cid) {
            log::warn!(
                "[DISC] conflicting broker '{}' wins scope '{}'; deregistering",
                broker.service_instance_name,
                self.config.scope
            );
            backend.deregister_service(&self.assigned_service_name);
            backend.stop_monitor(E133_DNSSD_SRV_TYPE, &self.config.domain);
            self.state = BrokerRegState::NotRegistered;
            Some(RegisterEvent::OtherBrokerFound(broker))
        } else {
            // We win; the other side is expected to stand down.
            Some(RegisterEvent::OtherBrokerLost {
                service_name: broker.service_instance_name,
            })
        }
    }

    /// Drive the query window timer.
    pub fn tick(&mut self) -> Option<RegisterEvent> {
        if self.state == BrokerRegState::Querying && self.query_timer.is_expired() {
            self.state = BrokerRegState::Registered;
            log::info!(
                "[DISC] broker registered as '{}'",
                self.assigned_service_name
            );
            return Some(RegisterEvent::BrokerRegistered {
                assigned_service_name: self.assigned_service_name.clone(),
            });
        }
        None
    }

    /// Withdraw the registration.
    pub fn deregister(&mut self, backend: &mut dyn DnsSdBackend) {
        if self.state != BrokerRegState::NotRegistered {
            backend.deregister_service(&self.assigned_service_name);
            backend.stop_monitor(E133_DNSSD_SRV_TYPE, &self.config.domain);
            self.state = BrokerRegState::NotRegistered;
        }
    }
}
