//! # Message Server
//!
//! The server-side facade of a node: a `ServiceBroker` that applications
//! register local services with, and a `RequestHandler` that answers inbound
//! requests from that broker.
//!
//! Assemble with `ServerBuilder`. When a connector is given, the handler is
//! registered on it and starts answering right away.

use std::sync::Arc;

use tracing::debug;

use crate::broker::ServiceBroker;
use crate::config::Config;
use crate::handler::RequestHandler;
use crate::service::RestService;
use crate::service::ServiceProvider;
use crate::service::ServiceRegistry;
use crate::translator::UrnTranslator;
use crate::transport;
use crate::transport::MessageDispatcher;
use crate::transport::SocketConnector;
use crate::urn::ServiceUrn;

/// Prefix of the key the server's handler registers under on its connector.
pub const SERVER_DISPATCHER: &str = "coap-server";

/// Fluent builder for a `MessageServer`.
#[derive(Default)]
pub struct ServerBuilder {
    connector: Option<Arc<dyn SocketConnector>>,
    translator: Option<Arc<dyn UrnTranslator>>,
    config: Config,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn UrnTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> MessageServer {
        let broker = Arc::new(ServiceBroker::new());

        let mut handler = RequestHandler::new(broker.clone(), &self.config);
        if let Some(connector) = &self.connector {
            handler = handler.with_connector(connector.clone());
        }
        if let Some(translator) = self.translator {
            handler = handler.with_translator(translator);
        }
        let handler = Arc::new(handler);

        let key = transport::unique_key(SERVER_DISPATCHER);
        if let Some(connector) = &self.connector {
            debug!(dispatcher = %key, "registering request handler with connector");
            connector.dispatchers().add(key.clone(), handler.clone());
        }

        MessageServer {
            key,
            broker,
            handler,
            connector: self.connector,
        }
    }
}

/// Local service registry plus the handler that serves it.
///
/// Dropping the server stops it.
pub struct MessageServer {
    key: String,
    broker: Arc<ServiceBroker>,
    handler: Arc<RequestHandler>,
    connector: Option<Arc<dyn SocketConnector>>,
}

impl MessageServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn broker(&self) -> &Arc<ServiceBroker> {
        &self.broker
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// The key the handler is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stops answering inbound requests. Returns whether the handler was registered.
    pub fn stop(&self) -> bool {
        let Some(connector) = &self.connector else {
            return false;
        };
        let removed = connector.dispatchers().remove(&self.key);
        if removed {
            debug!(dispatcher = %self.key, "removed request handler from connector");
        }
        removed
    }
}

impl Drop for MessageServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ServiceRegistry for MessageServer {
    fn register_service(&self, service: Arc<dyn RestService>) {
        self.broker.register_service(service);
    }

    fn unregister_service(&self, service: &dyn RestService) {
        self.broker.unregister_service(service);
    }
}

impl ServiceProvider for MessageServer {
    fn resolve(&self, identifier: &ServiceUrn) -> Option<Arc<dyn RestService>> {
        self.broker.resolve(identifier)
    }
}

#[async_trait::async_trait]
impl MessageDispatcher for MessageServer {
    async fn dispatch_message(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.handler.dispatch_message(bytes).await
    }
}
