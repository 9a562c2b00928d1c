// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scope monitoring: track the brokers advertising one scope.

use super::DiscoveredBroker;
use crate::Cid;
use std::collections::HashMap;

/// Events emitted while monitoring a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    BrokerFound(DiscoveredBroker),
    BrokerUpdated(DiscoveredBroker),
    BrokerLost { service_name: String, cid: Cid },
}

/// State for one monitored scope.
///
/// A broker answering on several interfaces produces one resolve per
/// interface; those are merged here so the application sees a single
/// `BrokerFound` followed by address-list updates.
pub struct MonitoredScope {
    scope: String,
    domain: String,
    brokers: HashMap<Cid, DiscoveredBroker>,
}

impl MonitoredScope {
    pub fn new(scope: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            domain: domain.into(),
            brokers: HashMap::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Brokers currently known on this scope.
    pub fn brokers(&self) -> impl Iterator<Item = &DiscoveredBroker> {
        self.brokers.values()
    }

    /// Feed one resolved service from the DNS-SD adapter.
    ///
    /// Services whose E133Scope TXT value does not match this monitor are
    /// ignored. Returns the event to surface, or `None` for duplicates.
    pub fn service_resolved(&mut self, broker: DiscoveredBroker) -> Option<MonitorEvent> {
        if broker.scope != self.scope {
            return None;
        }
        match self.brokers.get_mut(&broker.cid) {
            None => {
                log::info!(
                    "[DISC] broker '{}' found on scope '{}'",
                    broker.service_instance_name,
                    self.scope
                );
                self.brokers.insert(broker.cid, broker.clone());
                Some(MonitorEvent::BrokerFound(broker))
            }
            Some(existing) => {
                // Merge addresses reported by other interfaces.
                let mut changed = false;
                for addr in &broker.listen_addrs {
                    if !existing.listen_addrs.contains(addr) {
                        existing.listen_addrs.push(*addr);
                        changed = true;
                    }
                }
                if existing.port != broker.port
                    || existing.service_instance_name != broker.service_instance_name
                    || existing.additional_txt_items != broker.additional_txt_items
                {
                    existing.port = broker.port;
                    existing.service_instance_name = broker.service_instance_name;
                    existing.additional_txt_items = broker.additional_txt_items;
                    changed = true;
                }
                if changed {
                    Some(MonitorEvent::BrokerUpdated(existing.clone()))
                } else {
                    None
                }
            }
        }
    }

    /// Feed one lost service from the DNS-SD adapter.
    pub fn service_lost(&mut self, service_instance_name: &str) -> Option<MonitorEvent> {
        let cid = self
            .brokers
            .values()
            .find(|b| b.service_instance_name == service_instance_name)
            .map(|b| b.cid)?;
        self.brokers.remove(&cid);
        log::info!(
            "[DISC] broker '{}' lost from scope '{}'",
            service_instance_name,
            self.scope
        );
        Some(MonitorEvent::BrokerLost {
            service_name: service_instance_name.to_string(),
            cid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RdmUid;
    use std::net::{IpAddr, Ipv4Addr};

    fn broker(cid_last: u8, addr_last: u8) -> DiscoveredBroker {
        let mut cid = [0u8; 16];
        cid[15] = cid_last;
        DiscoveredBroker {
            service_instance_name: format!("Broker {}", cid_last),
            cid: Cid::from_bytes(cid),
            uid: RdmUid::new(0x6574, 1),
            scope: "default".to_string(),
            port: 8888,
            listen_addrs: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, addr_last))],
            model: "Test Broker".to_string(),
            manufacturer: "ETC".to_string(),
            additional_txt_items: vec![],
        }
    }

    #[test]
    fn test_found_then_lost() {
        let mut mon = MonitoredScope::new("default", "local.");
        let ev = mon.service_resolved(broker(1, 1));
        assert!(matches!(ev, Some(MonitorEvent::BrokerFound(_))));
        assert_eq!(mon.brokers().count(), 1);

        let ev = mon.service_lost("Broker 1");
        match ev {
            Some(MonitorEvent::BrokerLost { service_name, .. }) => {
                assert_eq!(service_name, "Broker 1");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(mon.brokers().count(), 0);
        assert!(mon.service_lost("Broker 1").is_none());
    }

    #[test]
    fn test_wrong_scope_filtered() {
        let mut mon = MonitoredScope::new("stage-left", "local.");
        assert!(mon.service_resolved(broker(1, 1)).is_none());
        assert_eq!(mon.brokers().count(), 0);
    }

    #[test]
    fn test_multi_interface_dedup() {
        let mut mon = MonitoredScope::new("default", "local.");
        mon.service_resolved(broker(1, 1));

        // The identical resolve from another interface responder is
        // swallowed entirely.
        assert!(mon.service_resolved(broker(1, 1)).is_none());

        // A resolve carrying a new address merges into one update.
        let ev = mon.service_resolved(broker(1, 2));
        match ev {
            Some(MonitorEvent::BrokerUpdated(b)) => {
                assert_eq!(b.listen_addrs.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_port_change_is_update() {
        let mut mon = MonitoredScope::new("default", "local.");
        mon.service_resolved(broker(1, 1));
        let mut changed = broker(1, 1);
        changed.port = 9999;
        assert!(matches!(
            mon.service_resolved(changed),
            Some(MonitorEvent::BrokerUpdated(_))
        ));
    }
}
