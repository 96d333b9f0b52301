//! Operation routing seam.
//!
//! The dispatcher resolves each inbound frame's header to an operation
//! through the [`Router`] trait. svcwire treats the header as opaque
//! routing bytes; what they mean is the application's business. The
//! bundled [`RegistryRouter`] interprets headers as UTF-8 operation names
//! against a registry, which is enough for most deployments and for the
//! builtin server binary.

use bytes::Bytes;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future type used by the `Operation` trait.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Why an inbound frame could not be routed. Per-request: the connection
/// stays open and the caller receives an error-marked reply.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("routing header is not valid UTF-8")]
    BadHeader,

    #[error("no operation registered for '{0}'")]
    NotFound(String),
}

/// Application-level invocation failure, reported to the caller as an
/// error-marked reply while the connection stays usable.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A callable service operation: body bytes in, body bytes out.
pub trait Operation: Send + Sync {
    fn invoke(&self, body: Bytes) -> BoxFuture<Result<Bytes, OperationError>>;
}

impl std::fmt::Debug for dyn Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Operation")
    }
}

/// Resolves a frame's routing header to an operation.
pub trait Router: Send + Sync {
    fn resolve(&self, header: &[u8]) -> Result<Arc<dyn Operation>, RouteError>;
}

/// Router backed by a name registry; headers are UTF-8 operation names.
#[derive(Default)]
pub struct RegistryRouter {
    ops: DashMap<String, Arc<dyn Operation>>,
}

impl RegistryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, op: Arc<dyn Operation>) {
        self.ops.insert(name.into(), op);
    }

    /// Registers a closure as an operation.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, OperationError>> + Send + 'static,
    {
        self.register(name, op_fn(f));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Router for RegistryRouter {
    fn resolve(&self, header: &[u8]) -> Result<Arc<dyn Operation>, RouteError> {
        let name = std::str::from_utf8(header).map_err(|_| RouteError::BadHeader)?;
        self.ops
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RouteError::NotFound(name.to_string()))
    }
}

struct FnOperation<F>(F);

impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, OperationError>> + Send + 'static,
{
    fn invoke(&self, body: Bytes) -> BoxFuture<Result<Bytes, OperationError>> {
        Box::pin((self.0)(body))
    }
}

/// Adapts an async closure into an [`Operation`].
pub fn op_fn<F, Fut>(f: F) -> Arc<dyn Operation>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, OperationError>> + Send + 'static,
{
    Arc::new(FnOperation(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_resolve_and_invoke() {
        let router = RegistryRouter::new();
        router.register_fn("svc.echo", |body| async move { Ok(body) });

        let op = router.resolve(b"svc.echo").unwrap();
        let reply = op.invoke(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(reply.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_registry_unknown_operation() {
        let router = RegistryRouter::new();
        let err = router.resolve(b"svc.missing").unwrap_err();
        assert!(matches!(err, RouteError::NotFound(_)));
        assert!(err.to_string().contains("svc.missing"));
    }

    #[test]
    fn test_registry_rejects_non_utf8_header() {
        let router = RegistryRouter::new();
        let err = router.resolve(&[0xFF, 0xFE, 0x80]).unwrap_err();
        assert!(matches!(err, RouteError::BadHeader));
    }

    #[tokio::test]
    async fn test_operation_error_propagates() {
        let router = RegistryRouter::new();
        router.register_fn("svc.fail", |_| async move {
            Err(OperationError::new("backend unavailable"))
        });

        let op = router.resolve(b"svc.fail").unwrap();
        let err = op.invoke(Bytes::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable");
    }

    #[test]
    fn test_register_replaces() {
        let router = RegistryRouter::new();
        router.register_fn("svc.op", |_| async move { Ok(Bytes::from_static(b"v1")) });
        router.register_fn("svc.op", |_| async move { Ok(Bytes::from_static(b"v2")) });
        assert_eq!(router.len(), 1);
    }
}
