//! Status state machine
//!
//! Legal moves, all monotonic:
//!
//! ```text
//! waiting ──► serving ──► served
//!    │           │
//!    └──► cancelled ◄─┘
//! ```
//!
//! `served` and `cancelled` are terminal. The single-server rule for
//! `waiting -> serving` needs the rest of the business's queue, so it is
//! enforced by `ActiveSet`, not here.

use crate::domain::entry::EntryStatus;
use crate::domain::error::{DomainError, Result};

/// A status change that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: EntryStatus,
    pub to: EntryStatus,
    /// Operator override that bypassed the table
    pub forced: bool,
}

impl Transition {
    pub(crate) fn forced(from: EntryStatus, to: EntryStatus) -> Self {
        Self {
            from,
            to,
            forced: true,
        }
    }

    /// Entry was active before and is not afterwards (triggers compaction)
    pub fn leaves_active_set(&self) -> bool {
        self.from.is_active() && self.to.is_terminal()
    }
}

/// Whether `from -> to` is in the transition table
pub fn is_allowed(from: EntryStatus, to: EntryStatus) -> bool {
    use EntryStatus::*;
    matches!(
        (from, to),
        (Waiting, Serving) | (Waiting, Cancelled) | (Serving, Served) | (Serving, Cancelled)
    )
}

/// Validate a requested transition for `entry_id`
pub fn validate(entry_id: &str, from: EntryStatus, to: EntryStatus) -> Result<Transition> {
    if !is_allowed(from, to) {
        return Err(DomainError::InvalidTransition {
            entry_id: entry_id.to_string(),
            from,
            to,
        });
    }
    Ok(Transition {
        from,
        to,
        forced: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntryStatus::*;

    const ALL: [EntryStatus; 4] = [Waiting, Serving, Served, Cancelled];

    #[test]
    fn test_table() {
        let allowed = [
            (Waiting, Serving),
            (Waiting, Cancelled),
            (Serving, Served),
            (Serving, Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    is_allowed(from, to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [Served, Cancelled] {
            for to in ALL {
                let err = validate("e-9", from, to).unwrap_err();
                assert_eq!(
                    err,
                    DomainError::InvalidTransition {
                        entry_id: "e-9".to_string(),
                        from,
                        to
                    }
                );
            }
        }
    }

    #[test]
    fn test_leaves_active_set() {
        assert!(!validate("e", Waiting, Serving).unwrap().leaves_active_set());
        assert!(validate("e", Waiting, Cancelled).unwrap().leaves_active_set());
        assert!(validate("e", Serving, Served).unwrap().leaves_active_set());
        assert!(Transition::forced(Serving, Cancelled).leaves_active_set());
    }

    #[test]
    fn test_skipping_serving_is_rejected() {
        assert!(validate("e", Waiting, Served).is_err());
        assert!(validate("e", Serving, Waiting).is_err());
    }
}
