//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes. The error `data` carries
//! the structured `ErrorDetail` so clients branch on fields, not messages.

use jsonrpsee::types::ErrorObjectOwned;
use queueline_core::error::{AppError, ErrorKind};

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const INVALID_TRANSITION: i32 = 4003;
    pub const TIMEOUT: i32 = 4008;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const STORAGE_ERROR: i32 = 5001;
}

pub fn code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => code::VALIDATION_ERROR,
        ErrorKind::NotFound => code::NOT_FOUND,
        ErrorKind::Conflict => code::CONFLICT,
        ErrorKind::InvalidTransition => code::INVALID_TRANSITION,
        ErrorKind::Timeout => code::TIMEOUT,
        ErrorKind::Storage => code::STORAGE_ERROR,
        ErrorKind::Internal => code::INTERNAL_ERROR,
    }
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let detail = err.detail();
    ErrorObjectOwned::owned(code_for(detail.kind), err.to_string(), Some(detail))
}
