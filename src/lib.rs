//! Artgate - Asynchronous image-serving gateway for slow generation APIs
//!
//! This crate fronts slow or rate-limited image sources (a remote
//! asynchronous art-generation API, a directory of pre-rendered images)
//! behind a uniform polling-based operation lifecycle: start an
//! operation, poll its status, fetch the fitted result once done. Every
//! served image is normalized to a configured target geometry.
//!
//! # Example
//!
//! ```rust,no_run
//! use artgate::{Artgate, OpType, SweepPeriods};
//!
//! #[tokio::main]
//! async fn main() -> artgate::Result<()> {
//!     let service = Artgate::builder()
//!         .art_api("your-api-key", "your-folder-id")
//!         .local_pool("local_images")
//!         .prompts_file("prompts.toml")
//!         .build()?;
//!
//!     service.start().await?;
//!     let _sweeps = service.start_sweeps(SweepPeriods::default());
//!
//!     let manager = service.manager();
//!     let id = manager.start_operation(OpType::Auto, None).await?;
//!     let status = manager.status(&id).await?;
//!     println!("{id}: {:?}", status.status);
//!     Ok(())
//! }
//! ```

mod builder;
pub mod error;
pub mod fit;
pub mod gate;
pub mod manager;
pub mod pool;
pub mod prompts;
pub mod providers;
#[cfg(feature = "server")]
pub mod server;
pub mod sweep;
pub mod telemetry;
pub mod window;

// Re-export main types at crate root
pub use builder::{Artgate, ArtgateBuilder, ArtgateService, SweepPeriods};
pub use error::{ArtgateError, Result};
pub use fit::{FitConfig, Fitter};
pub use manager::{OpType, OperationManager, OperationStatus, Status};
pub use pool::FilePool;
pub use prompts::{PromptLibrary, PromptValue};
pub use providers::{ArtApiConfig, ArtApiProvider, ImageProvider, LocalPoolProvider, ProviderRegistry};
pub use window::{SleepWindow, TimeWindow};
