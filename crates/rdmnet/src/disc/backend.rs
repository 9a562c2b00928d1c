// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DNS-SD platform contract.
//!
//! Bonjour, Avahi, and lightweight-mDNS adapters implement this trait;
//! the discovery state machines only ever see it, which keeps them
//! substitutable in unit tests.

use super::DnsTxtItem;
use crate::mcast::NetintId;
use crate::Result;

/// A service registration request handed to the platform responder.
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    /// Requested instance name; the responder may rename on collision.
    pub service_instance_name: String,
    /// Always `_rdmnet-broker._tcp` for brokers.
    pub service_type: String,
    pub domain: String,
    pub port: u16,
    /// Interfaces to advertise on; empty means all.
    pub netints: Vec<NetintId>,
    pub txt_items: Vec<DnsTxtItem>,
}

/// The operations a platform DNS-SD responder must provide.
///
/// Resolved/lost services flow back through the state machines'
/// `service_resolved` / `service_lost` methods; the backend only carries
/// requests outward.
pub trait DnsSdBackend: Send {
    /// Register a service. Completion (with the possibly-renamed instance
    /// name) is reported asynchronously by the adapter.
    fn register_service(&mut self, registration: &ServiceRegistration) -> Result<()>;

    /// Withdraw a previously registered service.
    fn deregister_service(&mut self, service_instance_name: &str);

    /// Start browsing for a service type in a domain.
    fn start_monitor(&mut self, service_type: &str, domain: &str) -> Result<()>;

    /// Stop a browse started with `start_monitor`.
    fn stop_monitor(&mut self, service_type: &str, domain: &str);
}

/// In-memory backend for unit tests: records every call.
#[derive(Default)]
pub struct RecordingBackend {
    pub registrations: Vec<ServiceRegistration>,
    pub deregistrations: Vec<String>,
    pub monitors: Vec<(String, String)>,
    pub stopped_monitors: Vec<(String, String)>,
}

impl DnsSdBackend for RecordingBackend {
    fn register_service(&mut self, registration: &ServiceRegistration) -> Result<()> {
        self.registrations.push(registration.clone());
        Ok(())
    }

    fn deregister_service(&mut self, service_instance_name: &str) {
        self.deregistrations.push(service_instance_name.to_string());
    }

    fn start_monitor(&mut self, service_type: &str, domain: &str) -> Result<()> {
        self.monitors
            .push((service_type.to_string(), domain.to_string()));
        Ok(())
    }

    fn stop_monitor(&mut self, service_type: &str, domain: &str) {
        self.stopped_monitors
            .push((service_type.to_string(), domain.to_string()));
    }
}
