//! Configuration loading for artgated.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.artgate/config.toml` (user)
//! 3. `/etc/artgate/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.artgate/secrets.toml` (user, must be 0600)
//! 2. `/etc/artgate/secrets.toml` (system, must be 0600)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::window::{SleepWindow, TimeWindow};
use crate::{ArtgateError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub sweeps: SweepsConfig,
    /// Time-of-day windows during which auto operations avoid the
    /// expensive providers.
    #[serde(default)]
    pub sleep_windows: Vec<SleepWindowConfig>,
    /// Minimum minutes between auto-path generations (default: 10).
    #[serde(default = "default_gate_minutes")]
    pub gate_threshold_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            image: ImageConfig::default(),
            pools: PoolsConfig::default(),
            providers: ProvidersConfig::default(),
            prompts: PromptsConfig::default(),
            sweeps: SweepsConfig::default(),
            sleep_windows: Vec::new(),
            gate_threshold_minutes: default_gate_minutes(),
        }
    }
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8404).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8404".to_string()
}

fn default_gate_minutes() -> u64 {
    10
}

/// Target image geometry.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Relative aspect-ratio deviation below which images are stretched
    /// rather than letterboxed (default: 0.05).
    #[serde(default = "default_fit_threshold")]
    pub fit_threshold: f64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fit_threshold: default_fit_threshold(),
        }
    }
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fit_threshold() -> f64 {
    0.05
}

/// Directories and bounds for the file pools.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolsConfig {
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    #[serde(default = "default_images_min")]
    pub images_limit_min: usize,
    #[serde(default = "default_images_max")]
    pub images_limit_max: usize,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_temp_min")]
    pub temp_limit_min: usize,
    #[serde(default = "default_temp_max")]
    pub temp_limit_max: usize,
    #[serde(default = "default_placeholder")]
    pub placeholder: PathBuf,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            images_limit_min: default_images_min(),
            images_limit_max: default_images_max(),
            temp_dir: default_temp_dir(),
            temp_limit_min: default_temp_min(),
            temp_limit_max: default_temp_max(),
            placeholder: default_placeholder(),
        }
    }
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_images_min() -> usize {
    100
}

fn default_images_max() -> usize {
    120
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("tmp_images")
}

fn default_temp_min() -> usize {
    5
}

fn default_temp_max() -> usize {
    10
}

fn default_placeholder() -> PathBuf {
    PathBuf::from("black.jpeg")
}

/// Provider configurations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub art_api: Option<ArtApiProviderConfig>,
    #[serde(default)]
    pub local: Option<LocalProviderConfig>,
}

/// Remote art API provider configuration. The API key lives in secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtApiProviderConfig {
    pub folder_id: String,
    /// Minimum minutes between its own non-direct generations (default: 60).
    #[serde(default = "default_art_api_minutes")]
    pub threshold_minutes: u64,
}

fn default_art_api_minutes() -> u64 {
    60
}

/// Local pre-rendered provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalProviderConfig {
    pub dir: PathBuf,
    #[serde(default = "default_gate_minutes")]
    pub threshold_minutes: u64,
}

/// Prompt library configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptsConfig {
    /// TOML prompt file for unattended generations.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Background sweep periods, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepsConfig {
    #[serde(default = "default_check_pending_secs")]
    pub check_pending_secs: u64,
    #[serde(default = "default_scan_secs")]
    pub scan_pool_secs: u64,
    #[serde(default = "default_scan_secs")]
    pub refresh_local_secs: u64,
}

impl Default for SweepsConfig {
    fn default() -> Self {
        Self {
            check_pending_secs: default_check_pending_secs(),
            scan_pool_secs: default_scan_secs(),
            refresh_local_secs: default_scan_secs(),
        }
    }
}

fn default_check_pending_secs() -> u64 {
    60
}

fn default_scan_secs() -> u64 {
    600
}

/// A sleep window as written in config (flat form).
#[derive(Debug, Clone, Deserialize)]
pub struct SleepWindowConfig {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub black_image_mode: bool,
}

impl SleepWindowConfig {
    pub fn to_window(&self) -> SleepWindow {
        SleepWindow {
            time_range: TimeWindow {
                start_time: self.start_time.clone(),
                end_time: self.end_time.clone(),
            },
            black_image_mode: self.black_image_mode,
        }
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.artgate/config.toml`
    /// 3. `/etc/artgate/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            ArtgateError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            ArtgateError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    pub fn gate_threshold(&self) -> Duration {
        Duration::from_secs(self.gate_threshold_minutes * 60)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ArtgateError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".artgate").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/artgate/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(ArtgateError::Configuration(
            "No config file found. Create ~/.artgate/config.toml or /etc/artgate/config.toml"
                .to_string(),
        ))
    }
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub art_api: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.artgate/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/artgate/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (the key may come from the
    /// `ART_API_KEY` environment variable instead).
    pub fn load() -> Result<Self> {
        // Try user secrets first
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".artgate").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        // Try system secrets
        let system_secrets = PathBuf::from("/etc/artgate/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ArtgateError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            ArtgateError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            ArtgateError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(ArtgateError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// The art API key, falling back to the `ART_API_KEY` environment
    /// variable.
    pub fn art_api_key(&self) -> Option<String> {
        self.art_api
            .as_ref()
            .map(|s| s.api_key.clone())
            .or_else(|| std::env::var("ART_API_KEY").ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.address, "127.0.0.1:8404");
        assert_eq!(config.image.width, 1280);
        assert_eq!(config.image.height, 720);
        assert_eq!(config.gate_threshold_minutes, 10);
        assert_eq!(config.pools.images_limit_max, 120);
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [server]
            address = "0.0.0.0:8404"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8404");
        // Defaults preserved
        assert_eq!(config.image.fit_threshold, 0.05);
        assert_eq!(config.sweeps.check_pending_secs, 60);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            gate_threshold_minutes = 15

            [server]
            address = "127.0.0.1:8404"

            [image]
            width = 1920
            height = 1080
            fit_threshold = 0.1

            [pools]
            images_dir = "/var/lib/artgate/images"
            images_limit_min = 50
            images_limit_max = 60

            [providers.art_api]
            folder_id = "b1gexample"
            threshold_minutes = 30

            [providers.local]
            dir = "/var/lib/artgate/local"

            [prompts]
            file = "/etc/artgate/prompts.toml"

            [[sleep_windows]]
            start_time = "23:00"
            end_time = "06:30"
            black_image_mode = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.gate_threshold_minutes, 15);
        assert_eq!(config.image.width, 1920);
        let art = config.providers.art_api.unwrap();
        assert_eq!(art.folder_id, "b1gexample");
        assert_eq!(art.threshold_minutes, 30);
        assert_eq!(
            config.providers.local.unwrap().dir,
            PathBuf::from("/var/lib/artgate/local")
        );
        assert_eq!(config.sleep_windows.len(), 1);
        assert!(config.sleep_windows[0].black_image_mode);
        let window = config.sleep_windows[0].to_window();
        assert_eq!(window.time_range.start_time, "23:00");
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [art_api]
            api_key = "AQVN-test-key"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.art_api.as_ref().unwrap().api_key, "AQVN-test-key");
    }

    #[test]
    fn api_key_from_secrets() {
        let secrets = Secrets {
            art_api: Some(ApiKeySecret {
                api_key: "from-file".to_string(),
            }),
        };
        assert_eq!(secrets.art_api_key(), Some("from-file".to_string()));
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }
}
