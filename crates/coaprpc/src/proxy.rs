//! # Remote Service Proxy
//!
//! A `RestService` handle whose verbs travel over the wire.
//!
//! The proxy holds no per-call state. Every call prepends a fixed address
//! prefix to the arguments and hands the result to the shared
//! `RequestDispatcher`, which owns id allocation and correlation.
//!
//! ## Addressing
//!
//! - URN mode: `[urn bytes]['?'][args...]`
//! - Byte mode: `[translated byte][args...]`

use std::sync::Arc;

use coapwire::Method;

use crate::dispatcher::RequestDispatcher;
use crate::policy::SERVICE_TERMINATOR;
use crate::service::RestService;
use crate::service::Result;
use crate::urn::ServiceUrn;

/// Client-side handle for one remote service.
pub struct ServiceProxy {
    identifier: ServiceUrn,
    dispatcher: Arc<RequestDispatcher>,
    prefix: Vec<u8>,
}

impl ServiceProxy {
    /// Addresses the service by its full URN.
    pub fn new(identifier: ServiceUrn, dispatcher: Arc<RequestDispatcher>) -> Self {
        let mut prefix = Vec::with_capacity(identifier.as_bytes().len() + 1);
        prefix.extend_from_slice(identifier.as_bytes());
        prefix.push(SERVICE_TERMINATOR);
        Self { identifier, dispatcher, prefix }
    }

    /// Addresses the service by a single translated byte.
    pub fn with_byte(identifier: ServiceUrn, dispatcher: Arc<RequestDispatcher>, b: u8) -> Self {
        Self { identifier, dispatcher, prefix: vec![b] }
    }

    /// The bytes every request payload starts with.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    async fn send(&self, method: Method, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let args = input.unwrap_or_default();
        let mut payload = Vec::with_capacity(self.prefix.len() + args.len());
        payload.extend_from_slice(&self.prefix);
        payload.extend_from_slice(args);
        self.dispatcher.dispatch_request(method, payload).await
    }
}

#[async_trait::async_trait]
impl RestService for ServiceProxy {
    fn identifier(&self) -> &ServiceUrn {
        &self.identifier
    }

    async fn get(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.send(Method::Get, input).await
    }

    async fn put(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.send(Method::Put, input).await
    }

    async fn post(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.send(Method::Post, input).await
    }

    async fn delete(&self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.send(Method::Delete, input).await
    }
}
