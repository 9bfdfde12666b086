//! RPC service demo - registers a plain service object's methods and
//! serves requests through an in-process broker.
//!
//! This example demonstrates:
//! - Mounting a service module into a registry
//! - Starting the host with an explicit broker handle
//! - Feeding deliveries the way a broker client would, and reading the
//!   correlated replies

use std::sync::Arc;

use busrpc::{
    Delivery, LocalBroker, RpcError, RpcRequest, ServiceHost, ServiceModule, ServiceRegistry,
    Value, WireFormat,
};
use tokio::sync::mpsc;

/// Example service whose methods are exposed for remote dispatch.
struct DemoService;

fn to_i64(value: &Value) -> busrpc::Result<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Str(s) => s
            .parse()
            .map_err(|err: std::num::ParseIntError| RpcError::handler(err.to_string())),
        other => Err(RpcError::handler(format!("not an integer: {other}"))),
    }
}

impl ServiceModule for DemoService {
    fn mount(&self, registry: &mut ServiceRegistry) -> busrpc::Result<()> {
        registry.register("get_string", |mut args: Vec<Value>| async move {
            Ok(args.drain(..).next().unwrap_or(Value::Null))
        })?;

        registry.register("echo", |mut args: Vec<Value>| async move {
            Ok(args.pop().unwrap_or(Value::Null))
        })?;

        registry.register_with_arity("save", 1, |_args| async { Ok(Value::from("OK")) })?;

        registry.register_with_arity("plus", 2, |args: Vec<Value>| async move {
            Ok(Value::Int(to_i64(&args[0])? + to_i64(&args[1])?))
        })?;

        registry.register("test_encoding", |_args| async { Ok(Value::from("中文")) })?;

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = ServiceRegistry::new();
    registry.add_module(&DemoService)?;

    let broker = Arc::new(LocalBroker::new());
    let mut replies = broker.bind("demo.reply");
    let (tx, rx) = mpsc::channel(64);

    let wire = WireFormat::Json;
    let host = ServiceHost::builder(registry)
        .wire_format(wire)
        .start(broker.clone(), rx);

    // Simulate the broker client delivering requests to the service queue.
    let requests = [
        ("echo", vec![Value::from("hi")]),
        ("plus", vec![Value::from("2"), Value::from("3")]),
        ("save", vec![Value::from("user-1")]),
        ("test_encoding", vec![]),
        ("missing", vec![]),
    ];

    let count = requests.len();
    for (i, (method, params)) in requests.into_iter().enumerate() {
        let request = RpcRequest::new(method, params, (i + 1).to_string());
        let payload = wire.encode_request(&request)?;
        tx.send(Delivery::new(payload).with_reply_to("demo.reply"))
            .await?;
    }

    for _ in 0..count {
        let payload = replies.recv().await.ok_or("reply stream closed")?;
        let response = wire.decode_response(&payload)?;
        let id = response.id.clone();
        match response.into_result() {
            Ok(result) => println!("[{id}] result: {result}"),
            Err(fault) => println!("[{id}] fault: {fault}"),
        }
    }

    drop(tx);
    host.shutdown().await;
    Ok(())
}
