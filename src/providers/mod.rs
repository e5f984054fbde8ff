//! Pluggable image sources and their selection.

mod art_api;
mod local;
mod registry;
mod traits;

pub use art_api::{ART_API_CODE, ArtApiConfig, ArtApiProvider, compose_prompt};
pub use local::{LOCAL_POOL_CODE, LocalPoolProvider};
pub use registry::ProviderRegistry;
pub use traits::{ImageProvider, ProviderCaps};
