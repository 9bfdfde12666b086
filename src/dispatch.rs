//! RPC dispatcher - one request in, one response out.
//!
//! [`Dispatcher::dispatch`] is a stateless transaction keyed only by
//! the correlation id: resolve the method, optionally check arity,
//! invoke the handler inside a fault boundary, stamp the response.
//! Handler failures - error returns, panics, missed deadlines - become
//! structured faults on the reply path; they never escape to the
//! delivery loop or touch other in-flight requests.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::message::{Fault, RpcRequest, RpcResponse};
use crate::registry::ServiceRegistry;

/// Turns inbound requests into outbound responses against a shared
/// registry snapshot.
///
/// Cheap to share (`Arc<Dispatcher>`) and safe to call concurrently:
/// the dispatcher holds no per-request state, and every `dispatch`
/// resolves against a complete snapshot of the registry.
pub struct Dispatcher {
    registry: RwLock<Arc<ServiceRegistry>>,
    handler_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Dispatcher without a handler deadline.
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry: RwLock::new(Arc::new(registry)),
            handler_timeout: None,
        }
    }

    /// Dispatcher with a per-invocation deadline.
    ///
    /// A handler that misses the deadline yields a `Timeout` fault and
    /// its task is aborted. Aborting cancels at the next await point;
    /// a compute-bound section keeps running detached until it yields.
    pub fn with_timeout(registry: ServiceRegistry, handler_timeout: Duration) -> Self {
        Self {
            registry: RwLock::new(Arc::new(registry)),
            handler_timeout: Some(handler_timeout),
        }
    }

    /// Current registry snapshot.
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        match self.registry.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap in a re-built registry.
    ///
    /// Dispatches already in flight keep their old snapshot; new ones
    /// see the complete new mapping. Lookups never observe a partially
    /// updated registry.
    pub fn swap_registry(&self, registry: ServiceRegistry) {
        let next = Arc::new(registry);
        match self.registry.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Turn one request into exactly one response.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            method, params, id, ..
        } = request;

        let Some(entry) = self.registry().resolve(&method) else {
            tracing::debug!(%method, %id, "method not found");
            return RpcResponse::fault(id, Fault::method_not_found(&method));
        };

        if let Some(arity) = entry.arity() {
            if params.len() != arity {
                return RpcResponse::fault(
                    id,
                    Fault::invalid_arguments(format!(
                        "{method} expects {arity} argument(s), got {}",
                        params.len()
                    )),
                );
            }
        }

        // The spawned task is the fault boundary: a panic inside the
        // handler surfaces as a join error here instead of unwinding
        // into the delivery loop.
        let mut task = tokio::spawn(async move { entry.invoke(params).await });

        let joined = if let Some(deadline) = self.handler_timeout {
            match tokio::time::timeout(deadline, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    tracing::warn!(%method, ?deadline, "handler timed out");
                    return RpcResponse::fault(
                        id,
                        Fault::timeout(format!("{method} exceeded {deadline:?}")),
                    );
                }
            }
        } else {
            (&mut task).await
        };

        match joined {
            Ok(Ok(value)) => RpcResponse::ok(id, value),
            Ok(Err(err)) => {
                tracing::debug!(%method, %err, "handler failed");
                RpcResponse::fault(id, Fault::handler(err.to_string()))
            }
            Err(join_err) => {
                let message = panic_message(join_err);
                tracing::error!(%method, %message, "handler panicked");
                RpcResponse::fault(id, Fault::handler(message))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.registry().len())
            .field("handler_timeout", &self.handler_timeout)
            .finish()
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        }
    } else {
        "handler cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::message::FaultKind;
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

    #[tokio::test]
    async fn test_dispatch_success() {
        let dispatcher = Dispatcher::new(echo_registry());

        let request = RpcRequest::new("echo", vec![Value::from("hi")], "1");
        let response = dispatcher.dispatch(request).await;

        assert_eq!(response.id, "1");
        assert_eq!(response.result, Some(Value::from("hi")));
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_method_not_found() {
        let dispatcher = Dispatcher::new(echo_registry());

        let response = dispatcher
            .dispatch(RpcRequest::new("missing", vec![], "3"))
            .await;

        assert_eq!(response.id, "3");
        let fault = response.error.unwrap();
        assert_eq!(fault.kind, FaultKind::MethodNotFound);
        assert_eq!(fault.message, "missing");
    }

    #[tokio::test]
    async fn test_dispatch_arity_mismatch() {
        let mut registry = ServiceRegistry::new();
        registry
            .register_with_arity("plus", 2, |_| async { Ok(Value::Null) })
            .unwrap();
        let dispatcher = Dispatcher::new(registry);

        let response = dispatcher
            .dispatch(RpcRequest::new("plus", vec![Value::Int(1)], "7"))
            .await;

        let fault = response.error.unwrap();
        assert_eq!(fault.kind, FaultKind::InvalidArguments);
        assert!(fault.message.contains("expects 2"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_fault() {
        let mut registry = ServiceRegistry::new();
        registry
            .register("fail", |_| async { Err(RpcError::handler("boom")) })
            .unwrap();
        let dispatcher = Dispatcher::new(registry);

        let response = dispatcher.dispatch(RpcRequest::new("fail", vec![], "4")).await;

        let fault = response.error.unwrap();
        assert_eq!(fault.kind, FaultKind::HandlerError);
        assert_eq!(fault.message, "boom");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut registry = echo_registry();
        registry
            .register("explode", |_| async { panic!("kaboom") })
            .unwrap();
        let dispatcher = Dispatcher::new(registry);

        let response = dispatcher
            .dispatch(RpcRequest::new("explode", vec![], "5"))
            .await;
        let fault = response.error.unwrap();
        assert_eq!(fault.kind, FaultKind::HandlerError);
        assert!(fault.message.contains("kaboom"));

        // The dispatcher keeps serving unrelated requests.
        let response = dispatcher
            .dispatch(RpcRequest::new("echo", vec![Value::from("still up")], "6"))
            .await;
        assert_eq!(response.result, Some(Value::from("still up")));
    }

    #[tokio::test]
    async fn test_timeout_fault() {
        let mut registry = ServiceRegistry::new();
        registry
            .register("sleepy", |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            })
            .unwrap();
        let dispatcher = Dispatcher::with_timeout(registry, Duration::from_millis(20));

        let response = dispatcher
            .dispatch(RpcRequest::new("sleepy", vec![], "8"))
            .await;

        let fault = response.error.unwrap();
        assert_eq!(fault.kind, FaultKind::Timeout);
        assert!(fault.message.contains("sleepy"));
    }

    #[tokio::test]
    async fn test_correlation_id_roundtrip() {
        let dispatcher = Dispatcher::new(echo_registry());

        for id in ["1", "req-42", "00000000-0000-0000-0000-000000000000"] {
            let response = dispatcher
                .dispatch(RpcRequest::new("echo", vec![Value::Null], id))
                .await;
            assert_eq!(response.id, id);
        }
    }

    #[tokio::test]
    async fn test_swap_registry_visible_to_new_dispatches() {
        let dispatcher = Dispatcher::new(echo_registry());

        let mut next = ServiceRegistry::new();
        next.register("version", |_| async { Ok(Value::Int(2)) })
            .unwrap();
        dispatcher.swap_registry(next);

        let response = dispatcher
            .dispatch(RpcRequest::new("version", vec![], "9"))
            .await;
        assert_eq!(response.result, Some(Value::Int(2)));

        // The old binding is gone with the old snapshot.
        let response = dispatcher.dispatch(RpcRequest::new("echo", vec![], "10")).await;
        assert_eq!(
            response.error.map(|f| f.kind),
            Some(FaultKind::MethodNotFound)
        );
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_share_dispatcher() {
        let dispatcher = Arc::new(Dispatcher::new(echo_registry()));

        let mut tasks = Vec::new();
        for i in 0..16i64 {
            let dispatcher = dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .dispatch(RpcRequest::new(
                        "echo",
                        vec![Value::Int(i)],
                        i.to_string(),
                    ))
                    .await
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            let response = task.await.unwrap();
            assert_eq!(response.id, i.to_string());
            assert_eq!(response.result, Some(Value::Int(i as i64)));
        }
    }
}
