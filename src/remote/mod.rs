//! Contract of the remote note store, plus the simulated backend and the
//! HTTP surface it can be served behind.

pub mod api;
mod mock;

pub use mock::{FaultPlan, MockRemote, RemoteCall, RemoteOp};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{Note, NoteDraft, NoteId, NotePatch, RemoteNote};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Note not found: {0}")]
    NotFound(NoteId),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Asynchronous, fallible note storage the sync engine reconciles against.
///
/// Any call may fail for reasons unrelated to its arguments; callers treat
/// every error as transient.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_all(&self) -> RemoteResult<Vec<RemoteNote>>;

    /// Store a new note. The store picks the id.
    async fn create(&self, draft: NoteDraft) -> RemoteResult<RemoteNote>;

    async fn update(&self, id: NoteId, patch: NotePatch) -> RemoteResult<RemoteNote>;

    /// Overwrite every note whose id the store already knows. Unknown ids are
    /// skipped; the result holds only the notes that were written.
    async fn update_many(&self, notes: &[Note]) -> RemoteResult<Vec<RemoteNote>>;

    async fn delete(&self, id: NoteId) -> RemoteResult<()>;

    async fn clear(&self) -> RemoteResult<()>;

    /// Append the supplied notes the store does not know yet and return the
    /// full merged collection.
    async fn sync(&self, notes: &[Note]) -> RemoteResult<Vec<RemoteNote>>;
}

/// Response envelope used on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: Some("Operation completed successfully".to_string()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: Some("Operation failed".to_string()),
        }
    }

    /// Back to a `Result`, treating a success without data as a protocol error.
    pub fn into_result(self) -> RemoteResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(RemoteError::Network(
                "response marked successful but carried no data".to_string(),
            )),
            (false, _) => Err(RemoteError::Network(
                self.error.unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }
}

impl<T> From<RemoteResult<T>> for ApiResponse<T> {
    fn from(result: RemoteResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_from_result() {
        let ok: ApiResponse<u32> = Ok(3).into();
        assert!(ok.success);
        assert_eq!(ok.data, Some(3));

        let failed: ApiResponse<u32> = Err(RemoteError::NotFound(9)).into();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("Note not found: 9"));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json = serde_json::to_value(ApiResponse::<()>::failed("boom")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ApiResponse::ok(1).into_result(), Ok(1));
        assert!(matches!(
            ApiResponse::<u8>::failed("x").into_result(),
            Err(RemoteError::Network(msg)) if msg == "x"
        ));
    }
}
