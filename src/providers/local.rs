//! Local pre-rendered image provider.
//!
//! Serves images from a directory of previously persisted files instead of
//! calling out to a remote generator. "Generation" is a no-op returning a
//! fixed external id; the first poll picks a random pooled file and
//! returns its bytes. Ready only when the gate has elapsed and the pool
//! holds at least one file.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::traits::{ImageProvider, ProviderCaps};
use crate::gate::RateGate;
use crate::pool::FilePool;
use crate::{ArtgateError, Result};

/// Provider code used as a metrics dimension.
pub const LOCAL_POOL_CODE: &str = "local-pool";

/// External id returned for every local-pool generation.
const LOCAL_EXTERNAL_ID: &str = "local-pool-operation";

/// Pool-backed provider for pre-rendered images.
pub struct LocalPoolProvider {
    pool: Arc<FilePool>,
    gate: Mutex<RateGate>,
}

impl LocalPoolProvider {
    /// Create a provider over `folder`, rate-limited by `threshold`.
    ///
    /// The pool is scan-only here: the long-lived pool that receives
    /// persisted provider output is a separate instance owned by the
    /// manager.
    pub fn new(folder: impl Into<PathBuf>, threshold: Duration) -> Result<Self> {
        // Scan-only pool: limits never trigger because add() is not called.
        let pool = FilePool::new(folder, "jpeg", usize::MAX, usize::MAX)?;
        Ok(Self {
            pool: Arc::new(pool),
            gate: Mutex::new(RateGate::new(threshold)),
        })
    }

    /// Shared handle to the underlying pool, for the refresh sweep.
    pub fn pool(&self) -> Arc<FilePool> {
        Arc::clone(&self.pool)
    }

    /// Rescan the backing directory.
    pub fn refresh(&self) -> Result<()> {
        debug!("refresh local image pool");
        self.pool.scan()
    }
}

#[async_trait]
impl ImageProvider for LocalPoolProvider {
    fn name(&self) -> &str {
        "local-pool"
    }

    fn code(&self) -> &str {
        LOCAL_POOL_CODE
    }

    async fn start(&self) -> Result<()> {
        if !self.pool.dir().is_dir() {
            return Err(ArtgateError::Configuration(format!(
                "local image folder does not exist: {}",
                self.pool.dir().display()
            )));
        }
        self.pool.scan()
    }

    async fn generate(&self, prompt: Option<&str>, direct: bool) -> Result<String> {
        if prompt.is_some() {
            return Err(ArtgateError::Provider(
                "local pool cannot generate from a prompt".into(),
            ));
        }
        if !direct {
            let mut gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
            gate.record_call(Instant::now());
        }
        Ok(LOCAL_EXTERNAL_ID.to_string())
    }

    async fn poll(&self, _external_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self
            .pool
            .pick_random()
            .ok_or_else(|| ArtgateError::Provider("local pool is empty".into()))?;
        debug!(path = %path.display(), "serving pooled file");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ArtgateError::Provider(format!("read pooled file: {e}")))?;
        Ok(Some(bytes))
    }

    fn is_ready(&self) -> bool {
        {
            let gate = self.gate.lock().unwrap_or_else(|p| p.into_inner());
            if !gate.threshold_out(Instant::now()) {
                return false;
            }
        }
        !self.pool.is_empty()
    }

    fn caps(&self) -> ProviderCaps {
        ProviderCaps {
            prompt_capable: false,
            persist_raw: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn seeded_dir() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpeg");
        fs::write(&path, b"jpeg-bytes").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn start_fails_on_missing_directory() {
        let provider =
            LocalPoolProvider::new("/nonexistent/local-images", Duration::ZERO).unwrap();
        assert!(matches!(
            provider.start().await,
            Err(ArtgateError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn poll_returns_pooled_bytes_immediately() {
        let (dir, _) = seeded_dir();
        let provider = LocalPoolProvider::new(dir.path(), Duration::ZERO).unwrap();
        provider.start().await.unwrap();

        let id = provider.generate(None, false).await.unwrap();
        let bytes = provider.poll(&id).await.unwrap().unwrap();
        assert_eq!(bytes, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn poll_on_empty_pool_is_a_provider_error() {
        let dir = TempDir::new().unwrap();
        let provider = LocalPoolProvider::new(dir.path(), Duration::ZERO).unwrap();
        provider.start().await.unwrap();
        assert!(matches!(
            provider.poll(LOCAL_EXTERNAL_ID).await,
            Err(ArtgateError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn not_ready_until_pool_has_files() {
        let dir = TempDir::new().unwrap();
        let provider = LocalPoolProvider::new(dir.path(), Duration::ZERO).unwrap();
        provider.start().await.unwrap();
        assert!(!provider.is_ready());

        fs::write(dir.path().join("new.jpeg"), b"x").unwrap();
        provider.refresh().unwrap();
        assert!(provider.is_ready());
    }

    #[tokio::test]
    async fn non_direct_generate_closes_the_gate() {
        let (dir, _) = seeded_dir();
        let provider =
            LocalPoolProvider::new(dir.path(), Duration::from_secs(600)).unwrap();
        provider.start().await.unwrap();
        assert!(provider.is_ready());

        provider.generate(None, false).await.unwrap();
        assert!(!provider.is_ready());
    }

    #[tokio::test]
    async fn direct_generate_leaves_the_gate_open() {
        let (dir, _) = seeded_dir();
        let provider =
            LocalPoolProvider::new(dir.path(), Duration::from_secs(600)).unwrap();
        provider.start().await.unwrap();

        provider.generate(None, true).await.unwrap();
        assert!(provider.is_ready());
    }

    #[tokio::test]
    async fn prompt_generation_is_rejected() {
        let (dir, _) = seeded_dir();
        let provider = LocalPoolProvider::new(dir.path(), Duration::ZERO).unwrap();
        assert!(matches!(
            provider.generate(Some("a fox"), true).await,
            Err(ArtgateError::Provider(_))
        ));
    }
}
