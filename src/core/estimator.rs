use crate::core::error::{ClientError, ClientResult};
use crate::core::model::FormatEstimates;
use crate::plugins::registry::MediaBackend;
use std::sync::Arc;
use tracing::{debug, warn};

/// Asks the backend for per-format sizes and the destination's free space.
/// Purely advisory; callers are expected to carry on when it fails.
#[derive(Clone)]
pub struct Estimator {
    backend: Arc<dyn MediaBackend>,
}

impl Estimator {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    pub async fn estimate(&self, url: &str, destination: &str) -> ClientResult<FormatEstimates> {
        if url.trim().is_empty() {
            return Err(ClientError::Validation("URL is required".to_string()));
        }
        let est = self.backend.analyze_formats(url, destination).await?;
        debug!(formats = est.formats.len(), has_storage = est.storage.is_some(), destination, "estimates received");
        Ok(est)
    }

    /// Same as [`estimate`](Self::estimate) but degrades to "unknown" (`None`).
    pub async fn estimate_or_unknown(&self, url: &str, destination: &str) -> Option<FormatEstimates> {
        match self.estimate(url, destination).await {
            Ok(est) => Some(est),
            Err(e) => {
                warn!(error = %e, destination, "size estimation unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedBackend;

    #[tokio::test]
    async fn failure_degrades_to_unknown() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_estimates(ClientError::Network("connection reset".to_string()));
        let est = Estimator::new(backend.clone());
        assert!(est.estimate_or_unknown("https://y.tube/v", "/d").await.is_none());
        assert!(matches!(est.estimate("https://y.tube/v", "/d").await, Err(ClientError::Network(_))));
    }

    #[tokio::test]
    async fn repeated_calls_are_idempotent() {
        let backend = Arc::new(ScriptedBackend::new());
        let est = Estimator::new(backend.clone());
        let a = est.estimate("https://y.tube/v", "/d").await.unwrap();
        let b = est.estimate("https://y.tube/v", "/d").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.calls_to("analyze_formats"), 2);
    }

    #[tokio::test]
    async fn empty_url_never_reaches_backend() {
        let backend = Arc::new(ScriptedBackend::new());
        let est = Estimator::new(backend.clone());
        assert!(matches!(est.estimate("  ", "/d").await, Err(ClientError::Validation(_))));
        assert_eq!(backend.calls_to("analyze_formats"), 0);
    }
}
