// Central Error Type for the Application

use crate::domain::{DomainError, EntryStatus};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("Entry not found: {entry_id}")]
    NotFound { entry_id: String },

    #[error("Timed out after {waited_ms}ms")]
    Timeout {
        business_id: Option<String>,
        waited_ms: u64,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error category callers branch on (never on the message text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InvalidTransition,
    Timeout,
    Storage,
    Internal,
}

/// Structured description of an error for UI collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<EntryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<EntryStatus>,
}

impl ErrorDetail {
    fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            entry_id: None,
            business_id: None,
            field: None,
            from: None,
            to: None,
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Domain(DomainError::Validation { .. }) => ErrorKind::Validation,
            AppError::Domain(DomainError::InvalidTransition { .. }) => ErrorKind::InvalidTransition,
            AppError::Domain(DomainError::ServingConflict { .. }) => ErrorKind::Conflict,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Timeout { .. } => ErrorKind::Timeout,
            AppError::Storage(_) => ErrorKind::Storage,
            AppError::Serialization(_) | AppError::Config(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        let mut detail = ErrorDetail::of(self.kind());
        match self {
            AppError::Domain(DomainError::Validation { field, .. }) => {
                detail.field = Some(field);
            }
            AppError::Domain(DomainError::InvalidTransition { entry_id, from, to }) => {
                detail.entry_id = Some(entry_id.clone());
                detail.from = Some(*from);
                detail.to = Some(*to);
            }
            AppError::Domain(DomainError::ServingConflict {
                business_id,
                serving_entry_id,
            }) => {
                detail.business_id = Some(business_id.clone());
                detail.entry_id = Some(serving_entry_id.clone());
            }
            AppError::NotFound { entry_id } => detail.entry_id = Some(entry_id.clone()),
            AppError::Timeout { business_id, .. } => {
                detail.business_id = business_id.clone();
            }
            _ => {}
        }
        detail
    }

    pub fn not_found(entry_id: impl Into<String>) -> Self {
        AppError::NotFound {
            entry_id: entry_id.into(),
        }
    }

    pub fn timeout(business_id: Option<&str>, waited: Duration) -> Self {
        AppError::Timeout {
            business_id: business_id.map(str::to_string),
            waited_ms: waited.as_millis() as u64,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in the infra-sqlite crate
// by converting to AppError::Storage(String)
