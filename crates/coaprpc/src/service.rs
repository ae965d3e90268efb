//! # REST Service Handles
//!
//! The uniform verb interface every service exposes, local or remote.
//!
//! A handle is bound to exactly one `ServiceUrn`. Arguments are an optional
//! byte buffer; results are an optional byte buffer. `Ok(None)` means "no
//! answer", which is not a failure.

use std::fmt;

use coapwire::Method;
use coapwire::ResponseCode;

use crate::transport::TransportError;
use crate::urn::ServiceUrn;

/// Failures reported to the caller of a service verb.
#[derive(Debug, Clone)]
pub enum ServiceError {
    /// The remote side answered with a non-success status.
    Status(ResponseCode),
    /// The wait for a response was cancelled before anything arrived.
    Cancelled,
    /// The request could not be written.
    Transport(TransportError),
    /// The request could not be encoded.
    Codec(coapwire::Error),
    /// Every message id is currently in flight.
    IdsExhausted,
    /// A local service does not implement this verb.
    Unsupported(Method),
    /// A local service failed with a description.
    Failed(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "Error in using coap service ({})", code),
            Self::Cancelled => write!(f, "Request cancelled while waiting for a response"),
            Self::Transport(e) => write!(f, "Transport failure: {}", e),
            Self::Codec(e) => write!(f, "Codec failure: {}", e),
            Self::IdsExhausted => write!(f, "No free message id"),
            Self::Unsupported(method) => write!(f, "Method {:?} not supported by this service", method),
            Self::Failed(msg) => write!(f, "Service failed: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ServiceError {
    fn from(e: TransportError) -> Self { Self::Transport(e) }
}

impl From<coapwire::Error> for ServiceError {
    fn from(e: coapwire::Error) -> Self { Self::Codec(e) }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// A capability exposing GET/PUT/POST/DELETE against one service.
///
/// This trait is designed to be object-safe (`Arc<dyn RestService>`).
#[async_trait::async_trait]
pub trait RestService: Send + Sync + 'static {
    /// The identifier this handle answers to. Fixed for the handle's lifetime.
    fn identifier(&self) -> &ServiceUrn;

    async fn get(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>>;

    async fn put(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>>;

    async fn post(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>>;

    /// Routes a method code onto the matching verb.
    async fn call(&self, method: Method, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        match method {
            Method::Get => self.get(input).await,
            Method::Put => self.put(input).await,
            Method::Post => self.post(input).await,
            Method::Delete => self.delete(input).await,
        }
    }
}

/// Resolves identifiers to handles.
pub trait ServiceProvider: Send + Sync + 'static {
    /// Returns `None` when nothing answers to `identifier`.
    fn resolve(&self, identifier: &ServiceUrn) -> Option<std::sync::Arc<dyn RestService>>;
}

/// Accepts service handles for publication.
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Inserts `service`, replacing any handle under the same identifier.
    fn register_service(&self, service: std::sync::Arc<dyn RestService>);

    /// Removes whatever is registered under `service.identifier()`.
    fn unregister_service(&self, service: &dyn RestService);
}
