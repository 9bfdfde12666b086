//! Service registry - maps method names to handlers.
//!
//! The registry is built at startup from registered closures and
//! service modules, then shared read-only behind `Arc`. Names starting
//! with the reserved prefix are never bound, and duplicate handling is
//! an explicit policy rather than an accident of insertion order.
//!
//! # Example
//!
//! ```
//! use busrpc::{ServiceRegistry, Value};
//!
//! let mut registry = ServiceRegistry::new();
//! registry
//!     .register("echo", |mut args: Vec<Value>| async move {
//!         Ok(args.pop().unwrap_or(Value::Null))
//!     })
//!     .unwrap();
//!
//! assert!(registry.resolve("echo").is_some());
//! assert!(registry.resolve("missing").is_none());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{Result, RpcError};
use crate::value::Value;

/// Method names beginning with this prefix are reserved for internal
/// use and are never bound as remotely invocable methods.
pub const RESERVED_PREFIX: char = '_';

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for handler invocations.
pub type HandlerResult = Result<Value>;

/// A bound, invocable unit backing one registered method name.
pub trait Handler: Send + Sync + 'static {
    /// Invoke with the request's argument sequence.
    ///
    /// The returned future owns everything it needs: it may outlive the
    /// registry snapshot it was resolved from.
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper binding an async closure as a [`Handler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.f)(args))
    }
}

/// A registered method: the handler plus its optionally declared arity.
pub struct MethodEntry {
    handler: Box<dyn Handler>,
    arity: Option<usize>,
}

impl MethodEntry {
    /// Declared argument count, if the method opted into arity checking.
    #[inline]
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Invoke the underlying handler.
    #[inline]
    pub fn invoke(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        self.handler.call(args)
    }
}

/// What registration does when the name is already bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Last write wins; the replaced binding is logged.
    #[default]
    Replace,
    /// Fail registration with [`RpcError::DuplicateMethod`].
    Reject,
}

/// A service source: anything that can mount one or more invocable
/// methods into a registry.
///
/// This is the explicit counterpart of registering a plain object's
/// methods - each module names its own exports, no runtime reflection.
/// A module that mounts zero methods is not an error.
pub trait ServiceModule {
    fn mount(&self, registry: &mut ServiceRegistry) -> Result<()>;
}

/// Registry mapping method names to handlers.
///
/// Entries live behind `Arc` so an in-flight invocation stays valid
/// across a registry snapshot swap on the dispatcher.
pub struct ServiceRegistry {
    methods: HashMap<String, Arc<MethodEntry>>,
    on_duplicate: DuplicatePolicy,
}

impl ServiceRegistry {
    /// Create an empty registry with the [`Replace`](DuplicatePolicy::Replace) policy.
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::default())
    }

    /// Create an empty registry with an explicit duplicate policy.
    pub fn with_policy(on_duplicate: DuplicatePolicy) -> Self {
        Self {
            methods: HashMap::new(),
            on_duplicate,
        }
    }

    /// Register a method handler.
    ///
    /// No arity is declared: the argument count is the handler's own
    /// concern.
    pub fn register<F, Fut>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(name, None, Box::new(FnHandler::new(f)))
    }

    /// Register a method handler with a declared arity.
    ///
    /// Requests whose argument count differs are rejected by the
    /// dispatcher with an `InvalidArguments` fault before the handler
    /// runs.
    pub fn register_with_arity<F, Fut>(&mut self, name: &str, arity: usize, f: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(name, Some(arity), Box::new(FnHandler::new(f)))
    }

    /// Mount every method a service source exports.
    pub fn add_module(&mut self, module: &dyn ServiceModule) -> Result<()> {
        module.mount(self)
    }

    fn bind(&mut self, name: &str, arity: Option<usize>, handler: Box<dyn Handler>) -> Result<()> {
        if name.starts_with(RESERVED_PREFIX) {
            tracing::warn!(method = name, "skipping reserved method name");
            return Ok(());
        }

        if self.methods.contains_key(name) {
            match self.on_duplicate {
                DuplicatePolicy::Reject => {
                    return Err(RpcError::DuplicateMethod(name.to_string()));
                }
                DuplicatePolicy::Replace => {
                    tracing::debug!(method = name, "replacing existing handler");
                }
            }
        }

        self.methods
            .insert(name.to_string(), Arc::new(MethodEntry { handler, arity }));
        Ok(())
    }

    /// Look up the entry bound to `name`.
    ///
    /// Pure lookup: unknown names return `None` so the caller can build
    /// an error response instead of failing.
    pub fn resolve(&self, name: &str) -> Option<Arc<MethodEntry>> {
        self.methods.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Names of all bound methods, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("methods", &self.methods.keys())
            .field("on_duplicate", &self.on_duplicate)
            .finish()
    }
}
