//! Operation model.
//!
//! An [`Operation`] tracks one image request from start to a terminal
//! state. Instances are immutable snapshots owned by the manager's caches;
//! a state transition replaces the cached value rather than mutating it in
//! place, so concurrent readers always observe a consistent operation.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::providers::ImageProvider;

/// Where the image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Generated asynchronously by a provider.
    Generated,
    /// Served synchronously from the local pool (or the black placeholder).
    LocalPool,
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Done,
    Error,
}

/// Status snapshot returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationStatus {
    pub status: Status,
    pub error: Option<String>,
}

impl OperationStatus {
    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            error: None,
        }
    }
}

/// One tracked image request.
#[derive(Clone)]
pub struct Operation {
    pub id: String,
    /// The generating provider; `None` for local-pool operations.
    pub provider: Option<Arc<dyn ImageProvider>>,
    /// Opaque handle the provider uses to look up progress.
    pub external_id: String,
    pub kind: OperationKind,
    pub status: Status,
    pub error: Option<String>,
    /// Path to the fitted artifact once `Done`.
    pub file_name: Option<PathBuf>,
}

impl Operation {
    /// A freshly started provider-backed operation.
    pub fn pending(id: String, provider: Arc<dyn ImageProvider>, external_id: String) -> Self {
        Self {
            id,
            provider: Some(provider),
            external_id,
            kind: OperationKind::Generated,
            status: Status::Pending,
            error: None,
            file_name: None,
        }
    }

    /// A local-pool operation, complete at creation.
    pub fn local_done(id: String, file_name: PathBuf) -> Self {
        Self {
            id,
            provider: None,
            external_id: "local-pool-operation".into(),
            kind: OperationKind::LocalPool,
            status: Status::Done,
            error: None,
            file_name: Some(file_name),
        }
    }

    /// The terminal snapshot after successful processing.
    pub fn completed(&self, file_name: PathBuf) -> Self {
        let mut op = self.clone();
        op.status = Status::Done;
        op.error = None;
        op.file_name = Some(file_name);
        op
    }

    /// The terminal snapshot after a processing failure.
    pub fn failed(&self, error: String) -> Self {
        let mut op = self.clone();
        op.status = Status::Error;
        op.error = Some(error);
        op.file_name = None;
        op
    }

    pub fn status_snapshot(&self) -> OperationStatus {
        OperationStatus {
            status: self.status,
            error: self.error.clone(),
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("external_id", &self.external_id)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("file_name", &self.file_name)
            .finish()
    }
}
