use conductor_core::ConductorResult;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

type BoxedFallback<T> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = ConductorResult<T>> + Send>> + Send + Sync>;

/// Registry of per-operation fallbacks.
///
/// A fallback runs only after the primary call — already wrapped by retry
/// and circuit breaker — has failed terminally. A fallback's own failure
/// propagates to the caller; nothing is swallowed. Arguments the primary
/// needed are captured by the registered closure.
#[derive(Default)]
pub struct FallbackHandler<T> {
    fallbacks: HashMap<String, BoxedFallback<T>>,
}

impl<T> FallbackHandler<T> {
    pub fn new() -> Self {
        Self {
            fallbacks: HashMap::new(),
        }
    }

    /// Register a fallback for the named operation, replacing any previous
    /// one.
    pub fn register<F, Fut>(&mut self, operation: impl Into<String>, fallback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConductorResult<T>> + Send + 'static,
    {
        self.fallbacks
            .insert(operation.into(), Box::new(move || Box::pin(fallback())));
    }

    /// Whether a fallback is registered for the operation.
    pub fn has(&self, operation: &str) -> bool {
        self.fallbacks.contains_key(operation)
    }

    /// Invoke the fallback for the operation, if registered.
    pub async fn invoke(&self, operation: &str) -> Option<ConductorResult<T>> {
        match self.fallbacks.get(operation) {
            Some(fallback) => Some(fallback().await),
            None => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_core::ConductorError;

    #[tokio::test]
    async fn test_unregistered_operation_is_none() {
        let handler: FallbackHandler<u32> = FallbackHandler::new();
        assert!(!handler.has("op"));
        assert!(handler.invoke("op").await.is_none());
    }

    #[tokio::test]
    async fn test_registered_fallback_runs() {
        let mut handler = FallbackHandler::new();
        handler.register("op", || async { Ok(99u32) });

        assert!(handler.has("op"));
        let result = handler.invoke("op").await.unwrap();
        assert_eq!(result.unwrap(), 99);
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let mut handler: FallbackHandler<u32> = FallbackHandler::new();
        handler.register("op", || async {
            Err(ConductorError::WorkerExecution("fallback failed too".into()))
        });

        let result = handler.invoke("op").await.unwrap();
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("fallback failed too"));
    }

    #[tokio::test]
    async fn test_reregistering_replaces() {
        let mut handler = FallbackHandler::new();
        handler.register("op", || async { Ok(1u32) });
        handler.register("op", || async { Ok(2u32) });
        assert_eq!(handler.invoke("op").await.unwrap().unwrap(), 2);
    }
}
