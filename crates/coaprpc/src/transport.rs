//! # Transport Abstraction
//!
//! A minimal interface for moving datagrams between nodes.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The connector knows nothing about CoAP or services.
//!   It moves opaque buffers.
//! - **Fire and Route**: Writing does not wait for a reply. Inbound datagrams are
//!   offered to every registered `MessageDispatcher`, and whatever a dispatcher
//!   returns is written back to the sender by the connector.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The peer is unreachable or the channel was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Something that consumes inbound datagrams.
#[async_trait::async_trait]
pub trait MessageDispatcher: Send + Sync + 'static {
    /// Handles one datagram and optionally returns a reply for the sender.
    ///
    /// # invariants
    /// - Must never fail: bytes it cannot understand yield `None`.
    async fn dispatch_message(&self, bytes: &[u8]) -> Option<Vec<u8>>;
}

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

/// A registry key no other dispatcher in this process has, e.g. `coap-client#3`.
pub(crate) fn unique_key(prefix: &str) -> String {
    format!("{}#{}", prefix, NEXT_KEY.fetch_add(1, Ordering::Relaxed))
}

/// Named set of dispatchers that inbound datagrams are offered to.
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: DashMap<String, Arc<dyn MessageDispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `dispatcher` under `name`, replacing any previous entry.
    pub fn add(&self, name: impl Into<String>, dispatcher: Arc<dyn MessageDispatcher>) {
        self.dispatchers.insert(name.into(), dispatcher);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.dispatchers.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dispatchers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    /// Clones the current dispatchers so callers can await them without holding shard locks.
    pub fn snapshot(&self) -> Vec<Arc<dyn MessageDispatcher>> {
        self.dispatchers.iter().map(|e| e.value().clone()).collect()
    }
}

/// A datagram socket shared by the client and server roles of a node.
///
/// This trait is designed to be object-safe (`Arc<dyn SocketConnector>`).
#[async_trait::async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    /// Sends a datagram.
    ///
    /// Returns the registry whose dispatchers will see replies to this datagram,
    /// so the writer can make sure it is listening.
    async fn write(&self, payload: &[u8]) -> Result<Arc<DispatcherRegistry>>;

    /// The registry inbound datagrams are offered to.
    fn dispatchers(&self) -> Arc<DispatcherRegistry>;
}

/// Renders bytes as space separated hex for log fields.
pub(crate) struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
