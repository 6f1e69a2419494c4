//! Utility functions

use crate::errors::{Error, Result};
use std::future::Future;
use tokio::task::JoinHandle;

/// Extract header value as string
pub fn header_str(headers: &http::HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(|s| s.to_string())
}

/// Generate a new client request ID
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A spawned task that is aborted when dropped
///
/// Owned by exactly one caller; the task is torn down on success, failure, or when
/// the awaiting future is itself dropped.
struct ScopedTask<T> {
    handle: JoinHandle<T>,
}

impl<T> Drop for ScopedTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run `fut` on its own short-lived task and wait for it
pub(crate) async fn run_scoped<F>(fut: F) -> Result<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut task = ScopedTask {
        handle: tokio::spawn(fut),
    };
    (&mut task.handle)
        .await
        .map_err(|e| Error::authentication("token task did not complete", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_header_str() {
        let mut headers = http::HeaderMap::new();
        let _ = headers.insert("x-ms-request-id", http::HeaderValue::from_static("req-1"));
        assert_eq!(header_str(&headers, "x-ms-request-id"), Some("req-1".to_string()));
        assert_eq!(header_str(&headers, "x-missing"), None);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[tokio::test]
    async fn test_run_scoped_returns_output() {
        let value = run_scoped(async { 41 + 1 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_scoped_panic_is_authentication_error() {
        let err = run_scoped(async {
            if true {
                panic!("resulting value is out of range");
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Authentication { source: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_run_scoped_aborts_when_caller_is_dropped() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let outer = run_scoped(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), outer).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
