//! Broker boundary - the narrow interface the dispatch core sees.
//!
//! Inbound, the broker client hands the host [`Delivery`] values:
//! opaque payload bytes plus the reply-destination token captured from
//! the message. Outbound, the host publishes encoded responses through
//! [`Broker::publish`]. Everything else about the broker - wire
//! protocol, reconnects, queue topology - stays on the other side of
//! this boundary.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, RpcError};
use crate::registry::BoxFuture;

/// One inbound message as handed over by the broker client.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Opaque encoded request envelope.
    pub payload: Bytes,
    /// Reply-destination token captured from the message, if any.
    pub reply_to: Option<String>,
}

impl Delivery {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            reply_to: None,
        }
    }

    /// Attach the broker's reply-destination token.
    #[must_use]
    pub fn with_reply_to(mut self, destination: impl Into<String>) -> Self {
        self.reply_to = Some(destination.into());
        self
    }
}

/// Outbound half of the broker interface.
///
/// Implementations wrap a real broker client; the host only ever asks
/// them to publish an opaque payload to a destination token.
pub trait Broker: Send + Sync + 'static {
    fn publish(&self, destination: &str, payload: Bytes) -> BoxFuture<'static, Result<()>>;
}

/// Channel-backed in-process broker.
///
/// Routes published payloads to per-destination queues. Stands in for
/// a real broker client behind the same narrow interface; used by the
/// demo and the integration tests.
#[derive(Default)]
pub struct LocalBroker {
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<Bytes>>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a destination queue and return its receiving end.
    ///
    /// Binding an existing destination replaces the previous queue.
    pub fn bind(&self, destination: &str) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(destination.to_string(), tx);
        rx
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<Bytes>>> {
        match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Broker for LocalBroker {
    fn publish(&self, destination: &str, payload: Bytes) -> BoxFuture<'static, Result<()>> {
        let sender = self.lock().get(destination).cloned();
        let destination = destination.to_string();

        Box::pin(async move {
            match sender {
                Some(tx) => tx.send(payload).map_err(|_| RpcError::ConnectionClosed),
                None => Err(RpcError::Broker(format!(
                    "unroutable destination: {destination}"
                ))),
            }
        })
    }
}

impl std::fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBroker")
            .field("destinations", &self.lock().keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_routes_to_bound_queue() {
        let broker = LocalBroker::new();
        let mut rx = broker.bind("replies");

        broker
            .publish("replies", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_publish_unroutable_destination() {
        let broker = LocalBroker::new();

        let err = broker
            .publish("nowhere", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Broker(_)));
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped() {
        let broker = LocalBroker::new();
        let rx = broker.bind("replies");
        drop(rx);

        let err = broker
            .publish("replies", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
    }

    #[test]
    fn test_delivery_builder() {
        let delivery = Delivery::new(&b"data"[..]).with_reply_to("replies");
        assert_eq!(delivery.payload, Bytes::from_static(b"data"));
        assert_eq!(delivery.reply_to.as_deref(), Some("replies"));
    }
}
