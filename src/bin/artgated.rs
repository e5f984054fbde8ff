//! The Artgate daemon.
//!
//! Serves the operation API over HTTP, keeping the background sweeps
//! running so pending generations complete without client polling.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use artgate::server::config::{Config, Secrets};
use artgate::server::{AppState, router};
use artgate::{Artgate, ArtgateError, ArtgateService, FitConfig, SweepPeriods};

/// Asynchronous image gateway daemon.
#[derive(Parser)]
#[command(name = "artgated")]
#[command(version)]
#[command(about = "Artgate image gateway daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let service = build_service(&config, &secrets)?;
    service.start().await?;

    let _sweeps = service.start_sweeps(SweepPeriods {
        check_pending: Duration::from_secs(config.sweeps.check_pending_secs),
        scan_pool: Duration::from_secs(config.sweeps.scan_pool_secs),
        refresh_local: Duration::from_secs(config.sweeps.refresh_local_secs),
    });

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| ArtgateError::Configuration(format!("Invalid address: {e}")))?;

    info!(%addr, "artgated starting");

    let state = AppState {
        manager: service.manager(),
        prompts: service.prompts(),
    };
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build an [`ArtgateService`] from configuration.
fn build_service(config: &Config, secrets: &Secrets) -> Result<ArtgateService, ArtgateError> {
    let mut builder = Artgate::builder()
        .fit(FitConfig {
            width: config.image.width,
            height: config.image.height,
            fit_threshold: config.image.fit_threshold,
        })
        .gate_threshold(config.gate_threshold())
        .images_dir(
            &config.pools.images_dir,
            config.pools.images_limit_min,
            config.pools.images_limit_max,
        )
        .temp_dir(
            &config.pools.temp_dir,
            config.pools.temp_limit_min,
            config.pools.temp_limit_max,
        )
        .placeholder(&config.pools.placeholder);

    for window in &config.sleep_windows {
        builder = builder.sleep_window(window.to_window());
    }

    if let Some(file) = &config.prompts.file {
        builder = builder.prompts_file(file);
    }

    // Register the remote provider only when the section is present AND a
    // key is available.
    if let Some(art) = &config.providers.art_api {
        if let Some(key) = secrets.art_api_key() {
            builder = builder
                .art_api(key, &art.folder_id)
                .art_api_threshold(Duration::from_secs(art.threshold_minutes * 60));
        }
    }

    if let Some(local) = &config.providers.local {
        builder = builder
            .local_pool(&local.dir)
            .local_threshold(Duration::from_secs(local.threshold_minutes * 60));
    }

    builder.build()
}
