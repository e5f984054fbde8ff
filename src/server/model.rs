//! REST wire shapes.

use serde::{Deserialize, Serialize};

use crate::manager::{OperationStatus, Status};

/// `POST /operation/start` request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    /// Operation type: `auto` (default), `direct`, or `local`.
    #[serde(default, rename = "type")]
    pub op_type: String,
    /// Optional caller prompt (direct operations only).
    #[serde(default)]
    pub prompt: Option<String>,
    /// Optional negative prompt appended as an ignore clause.
    #[serde(default)]
    pub negative: Option<String>,
}

/// `POST /operation/start` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub id: String,
    pub status: Status,
}

/// `GET /operation/status/{id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn new(id: String, status: OperationStatus) -> Self {
        Self {
            id,
            status: status.status,
            error: status.error,
        }
    }
}

/// Default chunk size for the streamed result body, in bytes.
pub const DEFAULT_RESULT_CHUNK: usize = 512;

/// `GET /operation/result/{id}` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultQuery {
    /// Requested chunk size for the streamed JSON body.
    #[serde(default)]
    pub chunk_size: Option<String>,
}

impl ResultQuery {
    /// The effective chunk size. Invalid or non-positive values fall back
    /// to [`DEFAULT_RESULT_CHUNK`].
    pub fn chunk_size_or_default(&self) -> usize {
        self.chunk_size
            .as_deref()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_RESULT_CHUNK)
    }
}

/// `GET /operation/result/{id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub id: String,
    pub status: Status,
    pub response: ImageBody,
}

/// The produced image, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBody {
    pub image: String,
}

/// `POST /prompt/add` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptAddRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative: Option<String>,
}

/// Uniform error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message safe to show users.
    pub message: String,
    /// Diagnostic detail for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_message: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str, dev_message: Option<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                dev_message,
            },
        }
    }
}
