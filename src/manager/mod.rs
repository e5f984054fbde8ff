//! Operation lifecycle core.
//!
//! [`OperationManager`] orchestrates the whole request path: provider
//! selection for new operations, pending/complete bookkeeping with
//! time-bounded caches, image fitting and persistence on completion, and
//! the per-id serialization that keeps concurrent status polls from
//! racing.
//!
//! # Lifecycle
//!
//! ```text
//! start_operation ──► pending cache ──► status() polls provider
//!        │                                   │ done
//!        │ local pool                        ▼
//!        └──────────────────────────► complete cache (Done | Error)
//! ```
//!
//! Local-pool operations skip the pending stage entirely: the pool pick,
//! fit, and temp write happen synchronously and the operation is born
//! `Done`.
//!
//! Entries expire from either cache after 1 h idle / 2 h hard, whether or
//! not anyone keeps polling. An id in neither cache is simply not found.

mod idlock;
mod operation;

pub use idlock::{IdGuard, IdLocks};
pub use operation::{Operation, OperationKind, OperationStatus, Status};

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use moka::future::Cache;
use tracing::{debug, error, info, instrument, warn};

use crate::fit::{FitConfig, Fitter, black_jpeg};
use crate::gate::RateGate;
use crate::pool::FilePool;
use crate::providers::{ImageProvider, ProviderRegistry};
use crate::telemetry;
use crate::window::SleepWindow;
use crate::{ArtgateError, Result};

/// Sliding TTL for both operation caches.
const CACHE_IDLE: Duration = Duration::from_secs(60 * 60);
/// Hard TTL for both operation caches.
const CACHE_LIVE: Duration = Duration::from_secs(2 * 60 * 60);

/// How a caller wants the operation serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Sleep windows, then the rate gate, then ready-provider selection.
    Auto,
    /// Demand a generating provider right now, readiness ignored.
    Direct,
    /// Serve from the local pool.
    LocalPool,
}

impl OpType {
    /// Parse the REST `type` field. Unknown values fall back to `Auto`.
    pub fn parse(value: &str) -> Self {
        match value {
            "ydart" | "direct" => OpType::Direct,
            "old" | "local" => OpType::LocalPool,
            _ => OpType::Auto,
        }
    }
}

/// Manager construction parameters.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub fit: FitConfig,
    /// Minimum interval between expensive-provider invocations on the
    /// `auto` path.
    pub gate_threshold: Duration,
    pub sleep_windows: Vec<SleepWindow>,
    /// Directory for fitted outputs (a small bounded pool of its own).
    pub temp_dir: PathBuf,
    pub temp_limit_min: usize,
    pub temp_limit_max: usize,
    /// Where the black placeholder is rendered at startup.
    pub placeholder_path: PathBuf,
}

impl ManagerConfig {
    pub fn new(fit: FitConfig) -> Self {
        Self {
            fit,
            gate_threshold: Duration::from_secs(10 * 60),
            sleep_windows: Vec::new(),
            temp_dir: PathBuf::from("tmp_images"),
            temp_limit_min: 5,
            temp_limit_max: 10,
            placeholder_path: PathBuf::from("black.jpeg"),
        }
    }
}

/// The operation lifecycle and provider-selection core.
pub struct OperationManager {
    registry: ProviderRegistry,
    pending: Cache<String, Arc<Operation>>,
    complete: Cache<String, Arc<Operation>>,
    locks: Arc<IdLocks>,
    /// Global gate for the `auto` path. The async mutex is held across
    /// the check-select-generate-stamp sequence so two concurrent `auto`
    /// starts cannot both observe an elapsed threshold.
    gate: tokio::sync::Mutex<RateGate>,
    sleep_windows: Vec<SleepWindow>,
    fitter: Fitter,
    /// Long-lived pool of persisted originals, also the old-picture source.
    pool: Arc<FilePool>,
    /// Bounded pool of fitted outputs.
    temp_pool: Arc<FilePool>,
    placeholder_path: PathBuf,
    seq: AtomicU64,
}

impl OperationManager {
    pub fn new(
        config: ManagerConfig,
        registry: ProviderRegistry,
        pool: Arc<FilePool>,
    ) -> Result<Self> {
        let temp_pool = FilePool::new(
            &config.temp_dir,
            "jpeg",
            config.temp_limit_min,
            config.temp_limit_max,
        )?;

        Ok(Self {
            registry,
            pending: operation_cache(),
            complete: operation_cache(),
            locks: Arc::new(IdLocks::new()),
            gate: tokio::sync::Mutex::new(RateGate::new(config.gate_threshold)),
            sleep_windows: config.sleep_windows,
            fitter: Fitter::new(config.fit),
            pool,
            temp_pool: Arc::new(temp_pool),
            placeholder_path: config.placeholder_path,
            seq: AtomicU64::new(0),
        })
    }

    /// One-time startup: fail fast on an empty registry or invalid sleep
    /// windows, render the black placeholder, bring up pools and
    /// providers.
    pub async fn start(&self) -> Result<()> {
        if self.registry.is_empty() {
            return Err(ArtgateError::NoProvider);
        }

        for window in &self.sleep_windows {
            window.time_range.validate()?;
        }

        self.pool.start()?;
        self.temp_pool.start()?;
        self.render_placeholder().await?;

        for provider in self.registry.all() {
            info!(provider = provider.name(), "starting image provider");
            provider.start().await.inspect_err(|err| {
                error!(provider = provider.name(), error = %err, "provider start failed");
            })?;
        }
        Ok(())
    }

    /// The long-lived pool (scan sweep target).
    pub fn pool(&self) -> Arc<FilePool> {
        Arc::clone(&self.pool)
    }

    /// The fitted-output pool.
    pub fn temp_pool(&self) -> Arc<FilePool> {
        Arc::clone(&self.temp_pool)
    }

    // ========================================================================
    // StartOperation
    // ========================================================================

    /// Start a new operation, returning its id.
    #[instrument(skip(self, prompt))]
    pub async fn start_operation(&self, op_type: OpType, prompt: Option<&str>) -> Result<String> {
        match op_type {
            OpType::Direct => {
                info!("start direct provider operation");
                let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
                let provider = self
                    .registry
                    .pick_any(prompt.is_some())
                    .ok_or(ArtgateError::NoProvider)?;
                self.start_provider_operation(provider, prompt, true).await
            }
            OpType::LocalPool => {
                info!("start old picture operation");
                self.start_local_operation(false).await
            }
            OpType::Auto => self.start_auto_operation().await,
        }
    }

    async fn start_auto_operation(&self) -> Result<String> {
        info!("start auto operation");

        if let Some(window) = self.active_sleep_window() {
            return if window.black_image_mode {
                info!("sleep window: serving black placeholder");
                self.start_local_operation(true).await
            } else {
                info!("sleep window: serving from local pool");
                self.start_local_operation(false).await
            };
        }

        let mut gate = self.gate.lock().await;
        if gate.threshold_out(Instant::now()) {
            debug!("gate threshold elapsed");
            match self.registry.pick_ready() {
                Some(provider) => {
                    let id = self.start_provider_operation(provider, None, false).await?;
                    gate.record_call(Instant::now());
                    Ok(id)
                }
                None => {
                    debug!("no provider ready, falling back to local pool");
                    drop(gate);
                    self.start_local_operation(false).await
                }
            }
        } else {
            drop(gate);
            self.start_local_operation(false).await
        }
    }

    async fn start_provider_operation(
        &self,
        provider: Arc<dyn ImageProvider>,
        prompt: Option<&str>,
        direct: bool,
    ) -> Result<String> {
        debug!(provider = provider.name(), direct, "start provider operation");
        let code = provider.code().to_string();

        let external_id = match provider.generate(prompt, direct).await {
            Ok(external_id) => external_id,
            Err(err) => {
                error!(provider = provider.name(), error = %err, "provider generate failed");
                metrics::counter!(telemetry::OPERATIONS_STARTED_TOTAL,
                    "provider" => code,
                    "status" => "error",
                )
                .increment(1);
                return Err(err);
            }
        };

        metrics::counter!(telemetry::OPERATIONS_STARTED_TOTAL,
            "provider" => code.clone(),
            "status" => "ok",
        )
        .increment(1);
        metrics::counter!(telemetry::OPERATIONS_DAILY_TOTAL,
            "provider" => code,
            "day" => Local::now().format("%Y-%m-%d").to_string(),
        )
        .increment(1);

        let id = self.generate_id();
        let operation = Operation::pending(id.clone(), provider, external_id);
        self.pending.insert(id.clone(), Arc::new(operation)).await;
        Ok(id)
    }

    async fn start_local_operation(&self, black: bool) -> Result<String> {
        let id = self.generate_id();

        let file = if black {
            self.placeholder_path.clone()
        } else {
            let source = self.pool.pick_random().ok_or(ArtgateError::PoolEmpty)?;
            let bytes = tokio::fs::read(&source).await?;
            self.save_files(&bytes, false).await?
        };

        info!(operation_id = %id, file = %file.display(), "local operation complete");
        let operation = Operation::local_done(id.clone(), file);
        self.complete.insert(id.clone(), Arc::new(operation)).await;
        Ok(id)
    }

    // ========================================================================
    // GetOperationStatus
    // ========================================================================

    /// Poll the status of `id`, advancing it when the provider is done.
    ///
    /// All calls for one id serialize on its per-id lock. Terminal
    /// statuses are returned unchanged, with no provider call and no
    /// reprocessing. A pending operation is polled; completion runs the
    /// image through the fitter and moves the entry to the complete cache
    /// as `Done`, or as `Error` when processing fails. Provider poll
    /// errors leave the entry pending for a later sweep.
    #[instrument(skip(self))]
    pub async fn status(&self, id: &str) -> Result<OperationStatus> {
        let _guard = self.locks.acquire(id).await;

        if let Some(operation) = self.complete.get(id).await {
            return Ok(operation.status_snapshot());
        }

        let Some(operation) = self.pending.get(id).await else {
            warn!(operation_id = id, "operation not found");
            return Err(ArtgateError::NotFound(id.to_string()));
        };

        let provider = operation
            .provider
            .clone()
            .ok_or_else(|| ArtgateError::Provider("pending operation has no provider".into()))?;

        match provider.poll(&operation.external_id).await? {
            None => Ok(OperationStatus::pending()),
            Some(bytes) => {
                debug!(operation_id = id, "generation complete");
                let terminal = match self.save_files(&bytes, provider.caps().persist_raw).await {
                    Ok(file) => operation.completed(file),
                    Err(err) => {
                        error!(operation_id = id, error = %err, "processing failed");
                        operation.failed(err.to_string())
                    }
                };
                let snapshot = terminal.status_snapshot();
                self.complete.insert(id.to_string(), Arc::new(terminal)).await;
                self.pending.invalidate(id).await;
                Ok(snapshot)
            }
        }
    }

    /// Status from the caches alone, no provider interaction.
    ///
    /// Used where a fresh poll is not wanted (e.g. echoing the status of
    /// an operation that was just started).
    pub async fn peek_status(&self, id: &str) -> Result<OperationStatus> {
        if let Some(operation) = self.complete.get(id).await {
            return Ok(operation.status_snapshot());
        }
        if self.pending.get(id).await.is_some() {
            return Ok(OperationStatus::pending());
        }
        Err(ArtgateError::NotFound(id.to_string()))
    }

    /// Path of the fitted artifact; valid only once the operation is Done.
    pub async fn file_name(&self, id: &str) -> Result<PathBuf> {
        let operation = self
            .complete
            .get(id)
            .await
            .ok_or_else(|| ArtgateError::NotComplete(id.to_string()))?;
        match (&operation.status, &operation.file_name) {
            (Status::Done, Some(file)) => Ok(file.clone()),
            _ => Err(ArtgateError::NotComplete(id.to_string())),
        }
    }

    /// Scheduled sweep: re-poll every pending operation once.
    ///
    /// Individual failures are logged, never propagated; the next sweep
    /// retries.
    pub async fn check_pending(&self) {
        let ids: Vec<String> = self.pending.iter().map(|(k, _)| (*k).clone()).collect();
        debug!(count = ids.len(), "check pending operations");

        for id in ids {
            if let Err(err) = self.status(&id).await {
                warn!(operation_id = %id, error = %err, "pending check failed");
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Persist raw bytes (optionally) and the fitted JPEG; returns the
    /// fitted path.
    async fn save_files(&self, bytes: &[u8], persist_raw: bool) -> Result<PathBuf> {
        if persist_raw {
            let original = self.pool.dir().join(format!("{}-orig.jpeg", self.unique_stem()));
            match tokio::fs::write(&original, bytes).await {
                Ok(()) => self.pool.add(&original),
                // Best-effort: a failed original write must not fail the
                // operation.
                Err(err) => warn!(path = %original.display(), error = %err, "original write failed"),
            }
        }

        let (fitted, _) = self.fitter.process(bytes, false)?;
        let path = self.temp_pool.dir().join(format!("{}.jpeg", self.unique_stem()));
        tokio::fs::write(&path, &fitted).await?;
        self.temp_pool.add(&path);
        Ok(path)
    }

    fn active_sleep_window(&self) -> Option<&SleepWindow> {
        let now = Local::now().time();
        self.sleep_windows.iter().find(|w| {
            w.time_range.contains(now).unwrap_or_else(|err| {
                warn!(error = %err, "sleep window check failed");
                false
            })
        })
    }

    async fn render_placeholder(&self) -> Result<()> {
        let FitConfig { width, height, .. } = self.fitter.config();
        if tokio::fs::try_exists(&self.placeholder_path).await? {
            tokio::fs::remove_file(&self.placeholder_path).await?;
        }
        let data = black_jpeg(width, height)?;
        tokio::fs::write(&self.placeholder_path, data).await?;
        debug!(path = %self.placeholder_path.display(), "placeholder rendered");
        Ok(())
    }

    /// Unix-seconds plus a process-wide sequence suffix, so two ids
    /// minted in the same second never collide.
    fn generate_id(&self) -> String {
        format!(
            "i{}-{}",
            chrono::Utc::now().timestamp(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn unique_stem(&self) -> String {
        format!(
            "f{}-{}",
            chrono::Utc::now().timestamp(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        )
    }
}

fn operation_cache() -> Cache<String, Arc<Operation>> {
    Cache::builder()
        .time_to_idle(CACHE_IDLE)
        .time_to_live(CACHE_LIVE)
        .build()
}

impl std::fmt::Debug for OperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationManager")
            .field("providers", &self.registry.len())
            .field("pool", &self.pool.dir().display().to_string())
            .finish_non_exhaustive()
    }
}
