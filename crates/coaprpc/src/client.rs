//! # Message Client
//!
//! The client-side `ServiceProvider`. Every identifier resolves to a remote
//! proxy that shares one `RequestDispatcher`; whether anything answers is only
//! known once a verb is called.

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::dispatcher::RequestDispatcher;
use crate::proxy::ServiceProxy;
use crate::service::RestService;
use crate::service::ServiceProvider;
use crate::translator::UrnTranslator;
use crate::transport::SocketConnector;
use crate::urn::ServiceUrn;

/// Prefix of the key the client's dispatcher registers under on its connector.
pub const CLIENT_DISPATCHER: &str = "coap-client";

/// Hands out remote handles for a node.
pub struct MessageClient {
    dispatcher: Arc<RequestDispatcher>,
    translator: Option<Arc<dyn UrnTranslator>>,
}

impl MessageClient {
    pub fn new(connector: Arc<dyn SocketConnector>, config: Config) -> Self {
        Self {
            dispatcher: RequestDispatcher::new(CLIENT_DISPATCHER, connector, config),
            translator: None,
        }
    }

    /// Uses single-byte addressing for every identifier `translator` knows.
    pub fn with_translator(mut self, translator: Arc<dyn UrnTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }
}

impl ServiceProvider for MessageClient {
    fn resolve(&self, identifier: &ServiceUrn) -> Option<Arc<dyn RestService>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let byte = self.translator.as_ref().and_then(|t| t.urn_to_byte(identifier));

        let proxy = match byte {
            Some(b) => {
                debug!(urn = %identifier, byte = b, "resolved remote service by translated byte");
                ServiceProxy::with_byte(identifier.clone(), dispatcher, b)
            }
            None => {
                debug!(urn = %identifier, "resolved remote service by urn");
                ServiceProxy::new(identifier.clone(), dispatcher)
            }
        };

        Some(Arc::new(proxy))
    }
}
