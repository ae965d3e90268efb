//! # Coaprpc
//!
//! Service routing over CoAP datagrams. A node publishes local services under
//! URNs and calls remote ones through proxies that look exactly like local
//! handles.
//!
//! The request payload carries the address: `[urn]['?'][args]`, or a single
//! translated byte followed by the arguments. Responses are matched to their
//! requests by CoAP message id.

pub mod broker;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod local;
pub mod loopback;
pub mod policy;
pub mod proxy;
pub mod server;
pub mod service;
pub mod translator;
pub mod transport;
pub mod urn;

pub use broker::ServiceBroker;
pub use client::MessageClient;
pub use config::Config;
pub use dispatcher::RequestDispatcher;
pub use handler::RequestHandler;
pub use local::LocalService;
pub use loopback::LoopbackConnector;
pub use policy::Policy;
pub use proxy::ServiceProxy;
pub use server::MessageServer;
pub use server::ServerBuilder;
pub use service::RestService;
pub use service::ServiceError;
pub use service::ServiceProvider;
pub use service::ServiceRegistry;
pub use translator::StaticTranslator;
pub use translator::UrnTranslator;
pub use transport::DispatcherRegistry;
pub use transport::MessageDispatcher;
pub use transport::SocketConnector;
pub use transport::TransportError;
pub use urn::ServiceUrn;
pub use urn::UrnError;

#[cfg(test)]
mod tests;
