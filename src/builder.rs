//! Builder for assembling the image service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::fit::FitConfig;
use crate::manager::{ManagerConfig, OperationManager};
use crate::pool::FilePool;
use crate::prompts::PromptLibrary;
use crate::providers::{ArtApiConfig, ArtApiProvider, LocalPoolProvider, ProviderRegistry};
use crate::sweep::{self, SweepHandle};
use crate::window::SleepWindow;
use crate::{ArtgateError, Result};

/// Main entry point for creating service instances.
pub struct Artgate;

impl Artgate {
    /// Create a new builder for configuring the service.
    pub fn builder() -> ArtgateBuilder {
        ArtgateBuilder::new()
    }
}

/// Builder for configuring service instances.
pub struct ArtgateBuilder {
    fit: FitConfig,
    gate_threshold: Duration,
    sleep_windows: Vec<SleepWindow>,
    images_dir: PathBuf,
    images_limit_min: usize,
    images_limit_max: usize,
    temp_dir: PathBuf,
    temp_limit_min: usize,
    temp_limit_max: usize,
    placeholder_path: PathBuf,
    prompts_file: Option<PathBuf>,
    art_api: Option<ArtApiCredentials>,
    art_api_threshold: Duration,
    art_api_base_url: Option<String>,
    local_dir: Option<PathBuf>,
    local_threshold: Duration,
}

struct ArtApiCredentials {
    api_key: String,
    folder_id: String,
}

impl ArtgateBuilder {
    pub fn new() -> Self {
        Self {
            fit: FitConfig {
                width: 1280,
                height: 720,
                fit_threshold: 0.05,
            },
            gate_threshold: Duration::from_secs(10 * 60),
            sleep_windows: Vec::new(),
            images_dir: PathBuf::from("images"),
            images_limit_min: 100,
            images_limit_max: 120,
            temp_dir: PathBuf::from("tmp_images"),
            temp_limit_min: 5,
            temp_limit_max: 10,
            placeholder_path: PathBuf::from("black.jpeg"),
            prompts_file: None,
            art_api: None,
            art_api_threshold: Duration::from_secs(60 * 60),
            art_api_base_url: None,
            local_dir: None,
            local_threshold: Duration::from_secs(10 * 60),
        }
    }

    /// Target image geometry and the stretch-vs-pad threshold.
    pub fn fit(mut self, config: FitConfig) -> Self {
        self.fit = config;
        self
    }

    /// Minimum interval between expensive generations on the `auto` path.
    pub fn gate_threshold(mut self, threshold: Duration) -> Self {
        self.gate_threshold = threshold;
        self
    }

    /// Add a sleep window honored on the `auto` path.
    pub fn sleep_window(mut self, window: SleepWindow) -> Self {
        self.sleep_windows.push(window);
        self
    }

    /// Directory and size bounds for the long-lived pool of originals.
    pub fn images_dir(mut self, dir: impl Into<PathBuf>, limit_min: usize, limit_max: usize) -> Self {
        self.images_dir = dir.into();
        self.images_limit_min = limit_min;
        self.images_limit_max = limit_max;
        self
    }

    /// Directory and size bounds for fitted outputs.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>, limit_min: usize, limit_max: usize) -> Self {
        self.temp_dir = dir.into();
        self.temp_limit_min = limit_min;
        self.temp_limit_max = limit_max;
        self
    }

    /// Where the black placeholder is rendered at startup.
    pub fn placeholder(mut self, path: impl Into<PathBuf>) -> Self {
        self.placeholder_path = path.into();
        self
    }

    /// TOML prompt library backing unattended generations.
    pub fn prompts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompts_file = Some(path.into());
        self
    }

    /// Configure the remote art API provider.
    pub fn art_api(mut self, api_key: impl Into<String>, folder_id: impl Into<String>) -> Self {
        self.art_api = Some(ArtApiCredentials {
            api_key: api_key.into(),
            folder_id: folder_id.into(),
        });
        self
    }

    /// Minimum interval between the art API's own non-direct generations.
    pub fn art_api_threshold(mut self, threshold: Duration) -> Self {
        self.art_api_threshold = threshold;
        self
    }

    /// Override the art API endpoint (testing).
    pub fn art_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.art_api_base_url = Some(url.into());
        self
    }

    /// Configure the local pre-rendered provider over `dir`.
    pub fn local_pool(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    /// Minimum interval between local-pool generations.
    pub fn local_threshold(mut self, threshold: Duration) -> Self {
        self.local_threshold = threshold;
        self
    }

    /// Build the service.
    ///
    /// Fails when no provider is configured or a pool bound is inverted.
    /// Provider connectivity is not checked here; that happens in
    /// [`ArtgateService::start`].
    pub fn build(self) -> Result<ArtgateService> {
        if self.art_api.is_none() && self.local_dir.is_none() {
            return Err(ArtgateError::NoProvider);
        }

        let prompts = Arc::new(match &self.prompts_file {
            Some(path) => PromptLibrary::load(path)?,
            None => PromptLibrary::in_memory(Vec::new()),
        });

        let mut registry = ProviderRegistry::new();

        if let Some(creds) = &self.art_api {
            let config = ArtApiConfig {
                api_key: creds.api_key.clone(),
                folder_id: creds.folder_id.clone(),
                width: self.fit.width,
                height: self.fit.height,
                generate_threshold: self.art_api_threshold,
                sleep_windows: self
                    .sleep_windows
                    .iter()
                    .map(|w| w.time_range.clone())
                    .collect(),
            };
            let provider = match &self.art_api_base_url {
                Some(url) => ArtApiProvider::with_base_url(config, Arc::clone(&prompts), url),
                None => ArtApiProvider::new(config, Arc::clone(&prompts)),
            };
            registry.add(Arc::new(provider));
        }

        let mut local = None;
        if let Some(dir) = &self.local_dir {
            let provider = Arc::new(LocalPoolProvider::new(dir, self.local_threshold)?);
            registry.add(Arc::clone(&provider) as Arc<dyn crate::providers::ImageProvider>);
            local = Some(provider);
        }

        let pool = Arc::new(FilePool::new(
            &self.images_dir,
            "jpeg",
            self.images_limit_min,
            self.images_limit_max,
        )?);

        let manager_config = ManagerConfig {
            fit: self.fit,
            gate_threshold: self.gate_threshold,
            sleep_windows: self.sleep_windows,
            temp_dir: self.temp_dir,
            temp_limit_min: self.temp_limit_min,
            temp_limit_max: self.temp_limit_max,
            placeholder_path: self.placeholder_path,
        };
        let manager = Arc::new(OperationManager::new(manager_config, registry, pool)?);

        Ok(ArtgateService {
            manager,
            local,
            prompts,
        })
    }
}

impl Default for ArtgateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Periods for the background sweeps.
#[derive(Debug, Clone)]
pub struct SweepPeriods {
    pub check_pending: Duration,
    pub scan_pool: Duration,
    pub refresh_local: Duration,
}

impl Default for SweepPeriods {
    fn default() -> Self {
        Self {
            check_pending: Duration::from_secs(60),
            scan_pool: Duration::from_secs(10 * 60),
            refresh_local: Duration::from_secs(10 * 60),
        }
    }
}

/// The assembled service: manager, prompt library, optional local provider.
pub struct ArtgateService {
    manager: Arc<OperationManager>,
    local: Option<Arc<LocalPoolProvider>>,
    prompts: Arc<PromptLibrary>,
}

impl ArtgateService {
    /// The operation manager.
    pub fn manager(&self) -> Arc<OperationManager> {
        Arc::clone(&self.manager)
    }

    /// The prompt library.
    pub fn prompts(&self) -> Arc<PromptLibrary> {
        Arc::clone(&self.prompts)
    }

    /// Bring up pools, the placeholder, and every provider.
    pub async fn start(&self) -> Result<()> {
        self.manager.start().await
    }

    /// Spawn the background sweeps. Dropping the handles stops them.
    pub fn start_sweeps(&self, periods: SweepPeriods) -> Vec<SweepHandle> {
        let mut handles = vec![
            sweep::check_pending(self.manager(), periods.check_pending),
            sweep::scan_pool(self.manager.pool(), periods.scan_pool),
        ];
        if let Some(local) = &self.local {
            handles.push(sweep::refresh_local(Arc::clone(local), periods.refresh_local));
        }
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_providers_fails() {
        assert!(matches!(
            Artgate::builder().build(),
            Err(ArtgateError::NoProvider)
        ));
    }

    #[test]
    fn build_with_local_pool_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let service = Artgate::builder()
            .local_pool(dir.path())
            .images_dir(dir.path().join("images"), 10, 20)
            .temp_dir(dir.path().join("tmp"), 5, 10)
            .build()
            .unwrap();
        assert!(service.local.is_some());
    }

    #[test]
    fn inverted_pool_limits_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            Artgate::builder()
                .local_pool(dir.path())
                .images_dir(dir.path().join("images"), 20, 10)
                .build(),
            Err(ArtgateError::Configuration(_))
        ));
    }
}
