//! Service host - wires the dispatch core to a broker client.
//!
//! The host is the process context: it owns the [`Dispatcher`] (and
//! through it the registry) and the outbound broker handle; there is no
//! ambient global state. The inbound side is an mpsc channel of
//! [`Delivery`] values fed by the broker client's own receive loop.
//!
//! Per delivery: decode the request envelope, dispatch it, encode the
//! response, publish to the reply destination. Each delivery runs on
//! its own task, capped by a semaphore.
//!
//! # Example
//!
//! ```ignore
//! use busrpc::{LocalBroker, ServiceHost, ServiceRegistry, WireFormat};
//!
//! let mut registry = ServiceRegistry::new();
//! registry.add_module(&MyService)?;
//!
//! let broker = Arc::new(LocalBroker::new());
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//!
//! let host = ServiceHost::builder(registry)
//!     .wire_format(WireFormat::Json)
//!     .start(broker, rx);
//!
//! // ... feed deliveries through tx ...
//! host.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;

use crate::broker::{Broker, Delivery};
use crate::codec::WireFormat;
use crate::dispatch::Dispatcher;
use crate::registry::ServiceRegistry;

/// Default maximum concurrent dispatches.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 256;

/// Builder for configuring and starting a [`ServiceHost`].
pub struct ServiceHostBuilder {
    registry: ServiceRegistry,
    wire_format: WireFormat,
    handler_timeout: Option<Duration>,
    max_concurrent_dispatches: usize,
}

impl ServiceHostBuilder {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            wire_format: WireFormat::default(),
            handler_timeout: None,
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
        }
    }

    /// Envelope encoding for this host's broker contract.
    #[must_use]
    pub fn wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    /// Per-invocation handler deadline (none by default).
    #[must_use]
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Cap on concurrently running dispatches.
    ///
    /// When the cap is reached the delivery loop waits instead of
    /// dropping, so every decodable request still gets its response.
    /// Default: 256.
    #[must_use]
    pub fn max_concurrent_dispatches(mut self, limit: usize) -> Self {
        self.max_concurrent_dispatches = limit;
        self
    }

    /// Start the delivery loop.
    ///
    /// `deliveries` is fed by the broker client; closing it ends the
    /// loop after in-flight dispatches drain.
    pub fn start(self, broker: Arc<dyn Broker>, deliveries: mpsc::Receiver<Delivery>) -> ServiceHost {
        let dispatcher = Arc::new(match self.handler_timeout {
            Some(timeout) => Dispatcher::with_timeout(self.registry, timeout),
            None => Dispatcher::new(self.registry),
        });

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_dispatches));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let loop_task = tokio::spawn(delivery_loop(
            dispatcher.clone(),
            broker,
            deliveries,
            self.wire_format,
            semaphore,
            self.max_concurrent_dispatches,
            shutdown_rx,
        ));

        ServiceHost {
            dispatcher,
            shutdown_tx,
            loop_task,
        }
    }
}

/// A running service host.
pub struct ServiceHost {
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: oneshot::Sender<()>,
    loop_task: JoinHandle<()>,
}

impl ServiceHost {
    /// Create a new host builder.
    pub fn builder(registry: ServiceRegistry) -> ServiceHostBuilder {
        ServiceHostBuilder::new(registry)
    }

    /// The host's dispatcher, e.g. for a runtime registry swap.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Stop accepting new deliveries, drain in-flight dispatches, then
    /// return.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.loop_task.await;
    }

    /// Block until the delivery channel closes and in-flight dispatches
    /// drain.
    pub async fn wait_for_shutdown(self) {
        let _ = self.loop_task.await;
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Main delivery loop - receives deliveries and spawns one dispatch
/// task per request, bounded by the semaphore.
async fn delivery_loop(
    dispatcher: Arc<Dispatcher>,
    broker: Arc<dyn Broker>,
    mut deliveries: mpsc::Receiver<Delivery>,
    wire_format: WireFormat,
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let delivery = tokio::select! {
            _ = &mut shutdown => break,
            next = deliveries.recv() => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        let dispatcher = dispatcher.clone();
        let broker = broker.clone();
        tokio::spawn(async move {
            // Permit is held until this dispatch completes.
            let _permit = permit;
            handle_delivery(dispatcher, broker, wire_format, delivery).await;
        });
    }

    // Drain: wait for every in-flight dispatch before reporting the
    // loop finished.
    let _ = semaphore.acquire_many(max_permits as u32).await;
    tracing::debug!("delivery loop stopped");
}

/// Decode, dispatch, encode, publish - one delivery end to end.
async fn handle_delivery(
    dispatcher: Arc<Dispatcher>,
    broker: Arc<dyn Broker>,
    wire_format: WireFormat,
    delivery: Delivery,
) {
    let Delivery { payload, reply_to } = delivery;

    let request = match wire_format.decode_request(&payload) {
        Ok(request) => request,
        Err(err) => {
            // Without a parsed envelope there is no correlation id to
            // reply with.
            tracing::error!(%err, "dropping undecodable request payload");
            return;
        }
    };

    // The envelope's reply destination wins over the broker token.
    let destination = request.reply_to.clone().or(reply_to);

    tracing::debug!(method = %request.method, id = %request.id, "dispatching request");
    let response = dispatcher.dispatch(request).await;

    let Some(destination) = destination else {
        tracing::warn!(id = %response.id, "dropping response: no reply destination");
        return;
    };

    let encoded = match wire_format.encode_response(&response) {
        Ok(encoded) => encoded,
        Err(err) => {
            tracing::error!(id = %response.id, %err, "failed to encode response");
            return;
        }
    };

    if let Err(err) = broker.publish(&destination, Bytes::from(encoded)).await {
        tracing::error!(%err, %destination, "failed to publish response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::LocalBroker;
    use crate::codec::WireFormat;
    use crate::message::{FaultKind, RpcRequest};
    use crate::value::Value;

    fn echo_registry() -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry
            .register("echo", |mut args: Vec<Value>| async move {
                Ok(args.pop().unwrap_or(Value::Null))
            })
            .unwrap();
        registry
    }

    async fn roundtrip(
        host_wire: WireFormat,
        request: RpcRequest,
    ) -> crate::message::RpcResponse {
        let broker = Arc::new(LocalBroker::new());
        let mut replies = broker.bind("replies");
        let (tx, rx) = mpsc::channel(8);

        let host = ServiceHost::builder(echo_registry())
            .wire_format(host_wire)
            .start(broker.clone(), rx);

        let payload = host_wire.encode_request(&request).unwrap();
        tx.send(Delivery::new(payload).with_reply_to("replies"))
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let response = host_wire.decode_response(&reply).unwrap();

        drop(tx);
        host.wait_for_shutdown().await;
        response
    }

    #[tokio::test]
    async fn test_roundtrip_json() {
        let response = roundtrip(
            WireFormat::Json,
            RpcRequest::new("echo", vec![Value::from("hi")], "1"),
        )
        .await;

        assert_eq!(response.id, "1");
        assert_eq!(response.result, Some(Value::from("hi")));
    }

    #[tokio::test]
    async fn test_roundtrip_msgpack() {
        let response = roundtrip(
            WireFormat::MsgPack,
            RpcRequest::new("echo", vec![Value::from("hi")], "mp"),
        )
        .await;

        assert_eq!(response.id, "mp");
        assert_eq!(response.result, Some(Value::from("hi")));
    }

    #[tokio::test]
    async fn test_envelope_reply_to_wins_over_token() {
        let broker = Arc::new(LocalBroker::new());
        let mut preferred = broker.bind("preferred");
        let mut fallback = broker.bind("fallback");
        let (tx, rx) = mpsc::channel(8);

        let host = ServiceHost::builder(echo_registry()).start(broker.clone(), rx);

        let request = RpcRequest::new("echo", vec![Value::Null], "1").with_reply_to("preferred");
        let payload = WireFormat::Json.encode_request(&request).unwrap();
        tx.send(Delivery::new(payload).with_reply_to("fallback"))
            .await
            .unwrap();

        assert!(preferred.recv().await.is_some());
        assert!(fallback.try_recv().is_err());

        drop(tx);
        host.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_undecodable_payload_dropped_loop_survives() {
        let broker = Arc::new(LocalBroker::new());
        let mut replies = broker.bind("replies");
        let (tx, rx) = mpsc::channel(8);

        let host = ServiceHost::builder(echo_registry()).start(broker.clone(), rx);

        tx.send(Delivery::new(&b"garbage"[..]).with_reply_to("replies"))
            .await
            .unwrap();

        // The loop keeps serving after the bad payload.
        let request = RpcRequest::new("echo", vec![Value::from("ok")], "2");
        let payload = WireFormat::Json.encode_request(&request).unwrap();
        tx.send(Delivery::new(payload).with_reply_to("replies"))
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        let response = WireFormat::Json.decode_response(&reply).unwrap();
        assert_eq!(response.id, "2");

        drop(tx);
        host.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_method_not_found_reaches_caller() {
        let response = roundtrip(
            WireFormat::Json,
            RpcRequest::new("missing", vec![], "3"),
        )
        .await;

        assert_eq!(response.id, "3");
        assert_eq!(response.error.map(|f| f.kind), Some(FaultKind::MethodNotFound));
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight() {
        let mut registry = echo_registry();
        registry
            .register("slow", |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Value::from("done"))
            })
            .unwrap();

        let broker = Arc::new(LocalBroker::new());
        let mut replies = broker.bind("replies");
        let (tx, rx) = mpsc::channel(8);

        let host = ServiceHost::builder(registry).start(broker.clone(), rx);

        let request = RpcRequest::new("slow", vec![], "9");
        let payload = WireFormat::Json.encode_request(&request).unwrap();
        tx.send(Delivery::new(payload).with_reply_to("replies"))
            .await
            .unwrap();

        // Give the loop a tick to pick the delivery up, then shut down.
        tokio::time::sleep(Duration::from_millis(10)).await;
        host.shutdown().await;

        // The in-flight dispatch finished before shutdown returned.
        let reply = replies.try_recv().unwrap();
        let response = WireFormat::Json.decode_response(&reply).unwrap();
        assert_eq!(response.result, Some(Value::from("done")));
    }
}
