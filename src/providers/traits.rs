//! Provider trait for pluggable image sources.
//!
//! A provider is anything that can produce an image: a remote generation
//! API that works asynchronously (start, then poll an opaque external id),
//! or the local pool that resolves in a single poll. Providers self-report
//! readiness (typically from their own rate gate and sleep windows) and
//! declare static capabilities the manager uses for selection and
//! persistence decisions.

use async_trait::async_trait;

use crate::Result;

/// Static capability flags, set once at startup and read-only after.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderCaps {
    /// The provider accepts prompt-directed generation.
    pub prompt_capable: bool,
    /// Raw bytes from this provider should be persisted into the
    /// long-lived pool before fitting.
    pub persist_raw: bool,
}

/// A pluggable image source.
///
/// `generate` returns an opaque external id; `poll` reports progress on
/// it. Local sources may complete on the first poll.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Stable short code, used as a metrics dimension.
    fn code(&self) -> &str;

    /// One-time startup work (directory checks, index builds).
    async fn start(&self) -> Result<()>;

    /// Begin generating an image, returning the provider's external id.
    ///
    /// `prompt` of `None` lets the provider choose its own input (e.g.
    /// from the prompt library). `direct` marks an explicit caller demand:
    /// providers skip stamping their rate gate for direct calls.
    async fn generate(&self, prompt: Option<&str>, direct: bool) -> Result<String>;

    /// Check generation progress for `external_id`.
    ///
    /// `Ok(None)` means still pending; `Ok(Some(bytes))` carries the raw
    /// image. Errors are provider errors, recoverable on a later poll.
    async fn poll(&self, external_id: &str) -> Result<Option<Vec<u8>>>;

    /// Whether the provider would accept a request right now.
    fn is_ready(&self) -> bool;

    /// Static capability flags.
    fn caps(&self) -> ProviderCaps;
}
