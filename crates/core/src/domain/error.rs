// Domain Error Types

use crate::domain::entry::{BusinessId, EntryId, EntryStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Invalid status transition for entry {entry_id}: {from} -> {to}")]
    InvalidTransition {
        entry_id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    },

    /// Single service station: only one entry per business may be serving
    #[error("Business {business_id} is already serving entry {serving_entry_id}")]
    ServingConflict {
        business_id: BusinessId,
        serving_entry_id: EntryId,
    },
}

impl DomainError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
