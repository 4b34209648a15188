use std::fmt;

use log::error;

use crate::protocol::ErrorCode;

#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FolioError {
    pub code: ErrorCode,
    pub message: String,
}

impl FolioError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: msg.to_string(),
        }
    }
    pub fn auth_failed(msg: &str) -> Self {
        Self {
            code: ErrorCode::AuthFailed,
            message: msg.to_string(),
        }
    }
    pub fn not_found(msg: &str) -> Self {
        Self {
            code: ErrorCode::NotFound,
            message: msg.to_string(),
        }
    }
    pub fn access_denied(msg: &str) -> Self {
        Self {
            code: ErrorCode::AccessDenied,
            message: msg.to_string(),
        }
    }
    pub fn unprocessable(msg: &str) -> Self {
        Self {
            code: ErrorCode::Unprocessable,
            message: msg.to_string(),
        }
    }
    pub fn persistence(msg: &str) -> Self {
        Self {
            code: ErrorCode::PersistenceFailed,
            message: msg.to_string(),
        }
    }
    pub fn assistant(msg: &str) -> Self {
        Self {
            code: ErrorCode::AssistantFailed,
            message: msg.to_string(),
        }
    }
    pub fn internal(msg: &str) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.to_string(),
        }
    }
}

impl fmt::Display for FolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for FolioError {}

/// Maps a transport or store error into a non-fatal persistence failure
pub fn persistence_error<E>(err: E) -> FolioError
where
    E: std::error::Error,
{
    error!("store error: {:?}", err);
    FolioError::persistence(&err.to_string())
}

/// Utility function for mapping any error into an internal error
pub fn internal_error<E>(err: E) -> FolioError
where
    E: std::error::Error,
{
    error!("internal error: {:?}", err);
    FolioError::internal(&err.to_string())
}
