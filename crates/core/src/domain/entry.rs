// Queue Entry Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::transition::{self, Transition};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Entry ID (UUID v4)
pub type EntryId = String;

/// Owning business identifier
pub type BusinessId = String;

pub const MAX_CUSTOMER_NAME_CHARS: usize = 100;
pub const MAX_PHONE_NUMBER_CHARS: usize = 32;

/// Entry Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Waiting,
    Serving,
    Served,
    Cancelled,
}

impl EntryStatus {
    /// Waiting and serving entries form the active set
    pub fn is_active(self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Serving)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::Serving => "serving",
            EntryStatus::Served => "served",
            EntryStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(EntryStatus::Waiting),
            "serving" => Ok(EntryStatus::Serving),
            "served" => Ok(EntryStatus::Served),
            "cancelled" => Ok(EntryStatus::Cancelled),
            other => Err(DomainError::validation(
                "status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// A single participant in a business's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub business_id: BusinessId,
    pub customer_name: String,
    pub phone_number: Option<String>,

    /// 1-based rank within the active set; 0 once the entry has left it
    pub position: u32,
    pub status: EntryStatus,

    pub joined_at: i64, // epoch ms
    pub serving_started_at: Option<i64>,
    pub finished_at: Option<i64>,

    pub expected_wait_time_minutes: u32,
}

impl QueueEntry {
    /// Build a validated waiting entry.
    ///
    /// `id` and `joined_at` are injected (see `IdProvider` / `TimeProvider`).
    /// Position and wait estimate stay at 0 until the coordinator ranks the entry.
    pub fn create(
        id: impl Into<String>,
        joined_at: i64,
        business_id: impl Into<String>,
        customer_name: &str,
        phone_number: Option<&str>,
    ) -> Result<Self> {
        let business_id = business_id.into();
        if business_id.trim().is_empty() {
            return Err(DomainError::validation("business_id", "must not be empty"));
        }

        let customer_name = customer_name.trim();
        if customer_name.is_empty() {
            return Err(DomainError::validation(
                "customer_name",
                "must not be empty or whitespace",
            ));
        }
        if customer_name.chars().count() > MAX_CUSTOMER_NAME_CHARS {
            return Err(DomainError::validation(
                "customer_name",
                format!("longer than {} characters", MAX_CUSTOMER_NAME_CHARS),
            ));
        }

        // The join form submits an empty field when no phone is given
        let phone_number = phone_number
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        if let Some(phone) = &phone_number {
            if phone.chars().count() > MAX_PHONE_NUMBER_CHARS {
                return Err(DomainError::validation(
                    "phone_number",
                    format!("longer than {} characters", MAX_PHONE_NUMBER_CHARS),
                ));
            }
        }

        Ok(Self {
            id: id.into(),
            business_id,
            customer_name: customer_name.to_string(),
            phone_number,
            position: 0,
            status: EntryStatus::Waiting,
            joined_at,
            serving_started_at: None,
            finished_at: None,
            expected_wait_time_minutes: 0,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Move to `to` if the transition table allows it, stamping timestamps.
    pub fn transition_to(&mut self, to: EntryStatus, now_millis: i64) -> Result<Transition> {
        let transition = transition::validate(&self.id, self.status, to)?;
        self.apply(transition, now_millis);
        Ok(transition)
    }

    /// Operator override: cancel from any active status without consulting the table.
    pub(crate) fn force_cancel(&mut self, now_millis: i64) -> Transition {
        let transition = Transition::forced(self.status, EntryStatus::Cancelled);
        self.apply(transition, now_millis);
        transition
    }

    fn apply(&mut self, transition: Transition, now_millis: i64) {
        self.status = transition.to;
        match transition.to {
            EntryStatus::Serving => self.serving_started_at = Some(now_millis),
            EntryStatus::Served | EntryStatus::Cancelled => {
                self.finished_at = Some(now_millis);
                self.position = 0;
                self.expected_wait_time_minutes = 0;
            }
            EntryStatus::Waiting => {}
        }
    }
}
