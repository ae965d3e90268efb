//! # Service Broker
//!
//! Source of truth for "who can answer this call" on a node. Maps service URNs
//! to local handles.
//!
//! Uses DashMap so owners can register and unregister while the request handler
//! resolves, without a global lock. Each operation is exclusive on its own;
//! nothing here spans more than one operation.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::service::RestService;
use crate::service::ServiceProvider;
use crate::service::ServiceRegistry;
use crate::urn::ServiceUrn;

/// Concurrent URN to handle table.
#[derive(Default)]
pub struct ServiceBroker {
    services: DashMap<ServiceUrn, Arc<dyn RestService>>,
}

impl ServiceBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, identifier: &ServiceUrn) -> bool {
        self.services.contains_key(identifier)
    }
}

impl ServiceRegistry for ServiceBroker {
    fn register_service(&self, service: Arc<dyn RestService>) {
        let urn = service.identifier().clone();
        debug!(%urn, "registering coap service");
        self.services.insert(urn, service);
    }

    fn unregister_service(&self, service: &dyn RestService) {
        let urn = service.identifier();
        debug!(%urn, "unregistering coap service");
        self.services.remove(urn);
    }
}

impl ServiceProvider for ServiceBroker {
    fn resolve(&self, identifier: &ServiceUrn) -> Option<Arc<dyn RestService>> {
        self.services.get(identifier).map(|entry| entry.value().clone())
    }
}
