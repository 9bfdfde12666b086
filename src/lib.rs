//! # busrpc
//!
//! Dispatch core for RPC services living behind a message broker.
//!
//! A service process registers plain async handlers (or whole service
//! modules) under method names, then hosts a delivery loop that turns
//! each inbound broker message into exactly one correlated reply:
//! decode the request envelope, resolve and invoke the handler inside a
//! fault boundary, encode and publish the response.
//!
//! The broker itself is an external collaborator reached through a
//! narrow interface ([`Broker`] out, [`Delivery`] in); wire protocol,
//! connection management and queue administration all live on its side
//! of the boundary.
//!
//! ## Example
//!
//! ```ignore
//! use busrpc::{LocalBroker, ServiceHost, ServiceRegistry, Value, WireFormat};
//!
//! let mut registry = ServiceRegistry::new();
//! registry.register("echo", |mut args: Vec<Value>| async move {
//!     Ok(args.pop().unwrap_or(Value::Null))
//! })?;
//!
//! let broker = std::sync::Arc::new(LocalBroker::new());
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//!
//! let host = ServiceHost::builder(registry)
//!     .wire_format(WireFormat::Json)
//!     .start(broker, rx);
//!
//! // the broker client feeds deliveries through `tx` ...
//! host.wait_for_shutdown().await;
//! ```

pub mod broker;
pub mod codec;
pub mod error;
pub mod message;
pub mod registry;
pub mod value;

mod dispatch;
mod host;

pub use broker::{Broker, Delivery, LocalBroker};
pub use codec::{JsonCodec, MsgPackCodec, WireFormat};
pub use dispatch::Dispatcher;
pub use error::{Result, RpcError};
pub use host::{ServiceHost, ServiceHostBuilder, DEFAULT_MAX_CONCURRENT_DISPATCHES};
pub use message::{Fault, FaultKind, RpcRequest, RpcResponse};
pub use registry::{
    BoxFuture, DuplicatePolicy, FnHandler, Handler, HandlerResult, MethodEntry, ServiceModule,
    ServiceRegistry, RESERVED_PREFIX,
};
pub use value::Value;
