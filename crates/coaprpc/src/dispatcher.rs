//! # Request Dispatcher
//!
//! The client half of a node. Turns a verb and a payload into a NON request,
//! correlates the eventual response by message id, and hands it back to the
//! caller that is waiting on it.
//!
//! ## Invariants
//!
//! - A message id is claimed in the pending table *before* the request is written,
//!   so a response can never arrive ahead of its slot.
//! - No id is handed out while it is still pending, and id `10` is never handed out.
//! - A response is delivered to at most one waiter; the slot is removed on delivery.
//! - A waiter's slot is removed when its wait ends, however it ends
//!   (response, timeout, cancellation, error, or the future being dropped).

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicU16;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use coapwire::Message;
use coapwire::Method;
use coapwire::PacketType;
use coapwire::ResponseCode;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::config::Config;
use crate::policy;
use crate::service::Result;
use crate::service::ServiceError;
use crate::transport;
use crate::transport::DispatcherRegistry;
use crate::transport::Hex;
use crate::transport::MessageDispatcher;
use crate::transport::SocketConnector;

/// Message id that is never allocated, kept for wire compatibility with deployed peers.
pub const RESERVED_MESSAGE_ID: u16 = 10;

/// What a waiting caller receives.
#[derive(Debug)]
enum Delivery {
    Response { code: ResponseCode, payload: Vec<u8> },
    Cancelled,
}

/// A rendezvous slot. `ticket` tells apart successive owners of the same id.
struct Slot {
    ticket: u64,
    tx: oneshot::Sender<Delivery>,
}

/// Client-side correlation engine.
///
/// Construct with `RequestDispatcher::new`, which returns an `Arc`; the
/// dispatcher registers a weak listener for itself on the connector the first
/// time it sends, and removes it again when dropped.
pub struct RequestDispatcher {
    key: String,
    me: Weak<RequestDispatcher>,
    connector: Arc<dyn SocketConnector>,
    config: Config,
    pending: DashMap<u16, Slot>,
    next_id: AtomicU16,
    next_ticket: AtomicU64,
    /// Registries this dispatcher is listening on, keyed by address.
    listening: DashMap<usize, Weak<DispatcherRegistry>>,
}

impl RequestDispatcher {
    /// Creates a dispatcher.
    /// `name` prefixes its key in the connector's dispatcher registry; the key
    /// itself is unique, so any number of dispatchers can share a connector.
    pub fn new(name: &str, connector: Arc<dyn SocketConnector>, config: Config) -> Arc<Self> {
        let key = transport::unique_key(name);
        Arc::new_cyclic(|me| Self {
            key,
            me: me.clone(),
            connector,
            config,
            pending: DashMap::new(),
            next_id: AtomicU16::new(1),
            next_ticket: AtomicU64::new(0),
            listening: DashMap::new(),
        })
    }

    /// The key this dispatcher registers under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of requests currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sends `payload` as a `method` request and waits for the matching response.
    ///
    /// Returns `Ok(None)` if nothing arrived within the configured timeout,
    /// `Ok(Some(bytes))` for a 2.xx response, and `Err` for an error status,
    /// cancellation, or a request that could not be sent.
    pub async fn dispatch_request(&self, method: Method, payload: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let (id, ticket, rx) = self.claim_slot()?;
        let _guard = PendingGuard { pending: &self.pending, id, ticket };

        let request = Message::request(PacketType::Non, method, id).with_payload(payload);
        let bytes = request.serialize()?;

        self.listen_on(&self.connector.dispatchers());
        let registry = self.connector.write(&bytes).await?;
        self.listen_on(&registry);

        trace!(message_id = id, ?method, payload = %Hex(&request.payload), "sent coap request");

        // longingly await a response
        let delivery = match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => Delivery::Cancelled,
            Err(_) => {
                debug!(message_id = id, timeout = ?self.config.request_timeout, "coap request timed out");
                return Ok(None);
            }
        };

        match delivery {
            Delivery::Response { code, payload } if code.is_success() => Ok(Some(payload)),
            Delivery::Response { code, .. } => {
                error!(message_id = id, %code, "error in using coap service");
                Err(ServiceError::Status(code))
            }
            Delivery::Cancelled => {
                error!(message_id = id, "request dispatcher interrupted");
                Err(ServiceError::Cancelled)
            }
        }
    }

    /// Hands an inbound response to its waiter.
    ///
    /// Returns the reply to send back, if the policy allows one: an ACK when a
    /// confirmable response was delivered, a 4.04 when nobody was waiting for
    /// a success response.
    /// Messages that are not responses are ignored.
    pub fn handle_response(&self, message: &Message) -> Option<Message> {
        let code = message.response_code()?;
        let id = message.message_id;

        let delivered = match self.pending.remove(&id) {
            Some((_, slot)) => slot.tx
                .send(Delivery::Response { code, payload: message.payload.clone() })
                .is_ok(),
            None => false,
        };

        if !delivered {
            warn!(message_id = id, %code, "cannot handle coap response: no matching request found");
            // answering an error with an error would let two error-enabled nodes trade 4.04s forever
            if !code.is_success() {
                return None;
            }
            return self.config.policy.create_error(message, ResponseCode::NotFound);
        }

        if message.is_confirmable() {
            self.config.policy.create_ack(message)
        } else {
            None
        }
    }

    /// Wakes every waiter with `ServiceError::Cancelled`. Returns how many were waiting.
    pub fn cancel_pending(&self) -> usize {
        let ids: Vec<u16> = self.pending.iter().map(|e| *e.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, slot)) = self.pending.remove(&id) {
                if slot.tx.send(Delivery::Cancelled).is_ok() {
                    cancelled += 1;
                }
            }
        }
        debug!(dispatcher = %self.key, cancelled, "cancelled pending coap requests");
        cancelled
    }

    /// Allocates a fresh id and claims its slot in one step.
    fn claim_slot(&self) -> Result<(u16, u64, oneshot::Receiver<Delivery>)> {
        for _ in 0..=u16::MAX as u32 {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == RESERVED_MESSAGE_ID {
                continue;
            }

            if let Entry::Vacant(entry) = self.pending.entry(id) {
                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                entry.insert(Slot { ticket, tx });
                return Ok((id, ticket, rx));
            }
        }

        Err(ServiceError::IdsExhausted)
    }

    /// Makes sure `registry` offers inbound datagrams to this dispatcher.
    fn listen_on(&self, registry: &Arc<DispatcherRegistry>) {
        if registry.contains(&self.key) {
            return;
        }
        debug!(dispatcher = %self.key, "registering request dispatcher with connector");
        registry.add(self.key.clone(), Arc::new(Listener(self.me.clone())));
        self.listening.insert(Arc::as_ptr(registry) as usize, Arc::downgrade(registry));
    }
}

impl Drop for RequestDispatcher {
    fn drop(&mut self) {
        for entry in self.listening.iter() {
            if let Some(registry) = entry.value().upgrade() {
                registry.remove(&self.key);
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageDispatcher for RequestDispatcher {
    async fn dispatch_message(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        // no use reporting parse errors, there is nobody to report them to
        let message = match Message::parse(bytes) {
            Ok(message) => message,
            Err(e) => {
                trace!(error = %e, "received bytes cannot be parsed as coap message");
                return None;
            }
        };

        if !message.is_response() {
            return None;
        }

        trace!(
            message_id = message.message_id,
            code = ?message.code,
            payload = %Hex(&message.payload),
            "received coap response"
        );

        let reply = self.handle_response(&message)?;
        policy::encode_reply(&reply)
    }
}

/// Removes a slot when its waiter goes away, unless the id was already reused.
struct PendingGuard<'a> {
    pending: &'a DashMap<u16, Slot>,
    id: u16,
    ticket: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove_if(&self.id, |_, slot| slot.ticket == self.ticket);
    }
}

/// Registry entry for a dispatcher.
/// Holds it weakly so the connector does not keep the client alive.
struct Listener(Weak<RequestDispatcher>);

#[async_trait::async_trait]
impl MessageDispatcher for Listener {
    async fn dispatch_message(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let dispatcher = self.0.upgrade()?;
        dispatcher.dispatch_message(bytes).await
    }
}
