//! In-process connectors.
//!
//! A `LoopbackConnector` pair behaves like two sockets pointed at each other:
//! whatever one side writes is offered to every dispatcher registered on the
//! other side, and replies travel back the same way. Useful for tests and for
//! running client and server in one process.

use std::sync::Arc;
use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::trace;
use tracing::warn;

use crate::transport;
use crate::transport::DispatcherRegistry;
use crate::transport::SocketConnector;
use crate::transport::TransportError;

/// One end of an in-memory datagram link.
pub struct LoopbackConnector {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    dispatchers: Arc<DispatcherRegistry>,
}

impl LoopbackConnector {
    /// Creates two connectors linked to each other.
    ///
    /// Spawns one delivery task per side, so this must run inside a tokio runtime.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Arc::new(Self {
            tx: tx_a,
            dispatchers: Arc::new(DispatcherRegistry::new()),
        });

        let b = Arc::new(Self {
            tx: tx_b,
            dispatchers: Arc::new(DispatcherRegistry::new()),
        });

        // a writes into rx_a, which b reads, and vice versa
        tokio::spawn(pump(Arc::downgrade(&b), rx_a));
        tokio::spawn(pump(Arc::downgrade(&a), rx_b));

        (a, b)
    }
}

#[async_trait::async_trait]
impl SocketConnector for LoopbackConnector {
    async fn write(&self, payload: &[u8]) -> transport::Result<Arc<DispatcherRegistry>> {
        self.tx
            .send(payload.to_vec())
            .map_err(|_| TransportError::ConnectionLost("Loopback peer closed".into()))?;
        Ok(self.dispatchers.clone())
    }

    fn dispatchers(&self) -> Arc<DispatcherRegistry> {
        self.dispatchers.clone()
    }
}

/// Offers every datagram arriving for `side` to its dispatchers and writes replies back.
async fn pump(side: Weak<LoopbackConnector>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(datagram) = rx.recv().await {
        let Some(connector) = side.upgrade() else {
            break;
        };

        // one task per datagram, so a slow service does not hold up the link
        tokio::spawn(async move {
            for dispatcher in connector.dispatchers.snapshot() {
                let Some(reply) = dispatcher.dispatch_message(&datagram).await else {
                    continue;
                };
                trace!(len = reply.len(), "loopback writing reply");
                if let Err(e) = connector.write(&reply).await {
                    warn!(error = %e, "loopback failed to write reply");
                }
            }
        });
    }
    trace!("loopback delivery task stopped");
}
