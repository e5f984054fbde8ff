//! Telemetry metric name constants.
//!
//! Centralised metric names for artgate operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `artgate_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `provider`: provider code (e.g. "art-api", "local-pool")
//! - `status`: outcome, "ok" or "error"
//! - `day`: calendar day (`YYYY-MM-DD`) on daily counters

/// Total operations started, per provider.
///
/// Labels: `provider`, `status` ("ok" | "error").
pub const OPERATIONS_STARTED_TOTAL: &str = "artgate_operations_started_total";

/// Operations started per calendar day, per provider.
///
/// Labels: `provider`, `day`.
pub const OPERATIONS_DAILY_TOTAL: &str = "artgate_operations_daily_total";

/// Total status checks handled.
///
/// Labels: `status` ("ok" | "error").
pub const STATUS_CHECKS_TOTAL: &str = "artgate_status_checks_total";

/// Total image results served.
///
/// Labels: `status` ("ok" | "error").
pub const IMAGES_SERVED_TOTAL: &str = "artgate_images_served_total";

/// Total files evicted from bounded pools.
///
/// Labels: `pool` (directory basename).
pub const POOL_EVICTIONS_TOTAL: &str = "artgate_pool_evictions_total";
