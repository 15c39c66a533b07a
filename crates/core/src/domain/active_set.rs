// Active Set - ordered waiting/serving entries of one business

use crate::domain::entry::{BusinessId, EntryStatus, QueueEntry};
use crate::domain::error::{DomainError, Result};
use crate::domain::estimator::estimate;

/// Entries of a single business with status `waiting` or `serving`,
/// kept in queue order with positions `1..=len()`.
///
/// Pure and synchronous. Callers that need atomicity clone the set,
/// mutate the clone and swap it in after the store commit succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSet {
    business_id: BusinessId,
    entries: Vec<QueueEntry>,
}

impl ActiveSet {
    pub fn new(business_id: impl Into<String>) -> Self {
        Self {
            business_id: business_id.into(),
            entries: Vec::new(),
        }
    }

    /// Rebuild from stored rows.
    ///
    /// Stored positions are only used for ordering (ties broken by join time);
    /// ranks and estimates are re-derived so gaps or duplicates in storage
    /// never leak into the set.
    pub fn from_rows(
        business_id: impl Into<String>,
        rows: impl IntoIterator<Item = QueueEntry>,
        average_service_minutes: u32,
    ) -> Self {
        let business_id = business_id.into();
        let mut entries: Vec<QueueEntry> = rows
            .into_iter()
            .filter(|e| e.business_id == business_id && e.is_active())
            .collect();

        // Unranked rows (position 0) go to the back in join order
        entries.sort_by(|a, b| {
            (a.position == 0, a.position, a.joined_at, &a.id).cmp(&(
                b.position == 0,
                b.position,
                b.joined_at,
                &b.id,
            ))
        });

        let mut set = Self {
            business_id,
            entries,
        };
        set.recompact(average_service_minutes);
        set
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, entry_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.get(entry_id).is_some()
    }

    /// The entry currently at the service station, if any
    pub fn serving(&self) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .find(|e| e.status == EntryStatus::Serving)
    }

    /// Rank a freshly created entry at the back of the queue.
    pub fn append(
        &mut self,
        mut entry: QueueEntry,
        average_service_minutes: u32,
    ) -> Result<QueueEntry> {
        if entry.business_id != self.business_id {
            return Err(DomainError::validation(
                "business_id",
                format!(
                    "entry belongs to {}, not {}",
                    entry.business_id, self.business_id
                ),
            ));
        }
        if entry.status != EntryStatus::Waiting {
            return Err(DomainError::validation(
                "status",
                format!("new entries must be waiting, got {}", entry.status),
            ));
        }

        entry.position = self.entries.len() as u32 + 1;
        entry.expected_wait_time_minutes = estimate(entry.position, average_service_minutes);
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Apply a status transition to a member of the set.
    ///
    /// Returns the entry after the transition. If it left the active set it is
    /// removed and the remaining entries are re-ranked. On error the set is unchanged.
    pub fn advance(
        &mut self,
        entry_id: &str,
        to: EntryStatus,
        now_millis: i64,
        average_service_minutes: u32,
    ) -> Result<QueueEntry> {
        let index = self.index_of(entry_id)?;

        if to == EntryStatus::Serving {
            if let Some(current) = self.serving().filter(|e| e.id != entry_id) {
                return Err(DomainError::ServingConflict {
                    business_id: self.business_id.clone(),
                    serving_entry_id: current.id.clone(),
                });
            }
        }

        let transition = self.entries[index].transition_to(to, now_millis)?;
        Ok(self.settle(index, transition.leaves_active_set(), average_service_minutes))
    }

    /// Operator override: cancel regardless of the transition table.
    pub fn force_cancel(
        &mut self,
        entry_id: &str,
        now_millis: i64,
        average_service_minutes: u32,
    ) -> Result<QueueEntry> {
        let index = self.index_of(entry_id)?;
        let transition = self.entries[index].force_cancel(now_millis);
        Ok(self.settle(index, transition.leaves_active_set(), average_service_minutes))
    }

    /// Reassign positions `1..=len()` in current order and re-estimate every wait.
    pub fn recompact(&mut self, average_service_minutes: u32) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.position = i as u32 + 1;
            entry.expected_wait_time_minutes = estimate(entry.position, average_service_minutes);
        }
    }

    /// Positions are exactly 1..=N and at most one entry is serving
    pub fn is_consistent(&self) -> bool {
        let dense = self
            .entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.position == i as u32 + 1 && e.is_active());
        let serving = self
            .entries
            .iter()
            .filter(|e| e.status == EntryStatus::Serving)
            .count();
        dense && serving <= 1
    }

    fn index_of(&self, entry_id: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| {
                DomainError::validation(
                    "entry_id",
                    format!("{} is not in the active set of {}", entry_id, self.business_id),
                )
            })
    }

    fn settle(&mut self, index: usize, departed: bool, average_service_minutes: u32) -> QueueEntry {
        let entry = if departed {
            self.entries.remove(index)
        } else {
            self.entries[index].clone()
        };
        self.recompact(average_service_minutes);
        match self.entries.iter().find(|e| e.id == entry.id) {
            Some(ranked) => ranked.clone(),
            None => entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVG: u32 = 10;

    fn queue_of(names: &[&str]) -> ActiveSet {
        let mut set = ActiveSet::new("biz");
        for (i, name) in names.iter().enumerate() {
            let entry =
                QueueEntry::create(format!("e-{}", name), i as i64, "biz", name, None).unwrap();
            set.append(entry, AVG).unwrap();
        }
        set
    }

    fn names(set: &ActiveSet) -> Vec<&str> {
        set.entries().iter().map(|e| e.customer_name.as_str()).collect()
    }

    #[test]
    fn test_append_assigns_sequential_positions() {
        let set = queue_of(&["Alice", "Bob", "Carol"]);
        let positions: Vec<u32> = set.entries().iter().map(|e| e.position).collect();
        let waits: Vec<u32> = set
            .entries()
            .iter()
            .map(|e| e.expected_wait_time_minutes)
            .collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(waits, vec![0, 10, 20]);
        assert!(set.is_consistent());
    }

    #[test]
    fn test_append_rejects_foreign_business() {
        let mut set = ActiveSet::new("biz");
        let entry = QueueEntry::create("x", 0, "other", "Zed", None).unwrap();
        assert!(set.append(entry, AVG).is_err());
        assert!(set.is_empty());
    }

    #[test]
    fn test_serve_then_complete_compacts() {
        let mut set = queue_of(&["Alice", "Bob"]);

        let alice = set.advance("e-Alice", EntryStatus::Serving, 100, AVG).unwrap();
        assert_eq!(alice.status, EntryStatus::Serving);
        assert_eq!(alice.position, 1);
        assert_eq!(set.get("e-Bob").unwrap().position, 2);

        let alice = set.advance("e-Alice", EntryStatus::Served, 200, AVG).unwrap();
        assert_eq!(alice.status, EntryStatus::Served);
        assert_eq!(alice.position, 0);

        let bob = set.get("e-Bob").unwrap();
        assert_eq!(bob.position, 1);
        assert_eq!(bob.expected_wait_time_minutes, 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_removal_from_middle_keeps_relative_order() {
        let mut set = queue_of(&["A", "B", "C", "D", "E"]);
        set.advance("e-C", EntryStatus::Cancelled, 10, AVG).unwrap();
        assert_eq!(names(&set), vec!["A", "B", "D", "E"]);
        assert!(set.is_consistent());
        assert_eq!(set.get("e-E").unwrap().expected_wait_time_minutes, 30);
    }

    #[test]
    fn test_second_server_conflicts() {
        let mut set = queue_of(&["Alice", "Bob"]);
        set.advance("e-Alice", EntryStatus::Serving, 1, AVG).unwrap();
        let before = set.clone();

        let err = set.advance("e-Bob", EntryStatus::Serving, 2, AVG).unwrap_err();
        assert_eq!(
            err,
            DomainError::ServingConflict {
                business_id: "biz".to_string(),
                serving_entry_id: "e-Alice".to_string(),
            }
        );
        assert_eq!(set, before);
    }

    #[test]
    fn test_invalid_transition_leaves_set_unchanged() {
        let mut set = queue_of(&["Alice"]);
        let before = set.clone();
        let err = set.advance("e-Alice", EntryStatus::Served, 1, AVG).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(set, before);
    }

    #[test]
    fn test_force_cancel_serving_entry() {
        let mut set = queue_of(&["Alice", "Bob"]);
        set.advance("e-Alice", EntryStatus::Serving, 1, AVG).unwrap();
        let alice = set.force_cancel("e-Alice", 2, AVG).unwrap();
        assert_eq!(alice.status, EntryStatus::Cancelled);
        assert!(set.serving().is_none());
        assert_eq!(set.get("e-Bob").unwrap().position, 1);
    }

    #[test]
    fn test_recompact_applies_new_average() {
        let mut set = queue_of(&["A", "B", "C"]);
        set.recompact(4);
        assert_eq!(set.get("e-C").unwrap().expected_wait_time_minutes, 8);
    }

    #[test]
    fn test_from_rows_repairs_gaps_and_drops_terminal() {
        let mut rows = Vec::new();
        for (id, pos, joined, status) in [
            ("c", 7, 30, EntryStatus::Waiting),
            ("a", 2, 10, EntryStatus::Serving),
            ("x", 0, 5, EntryStatus::Served),
            ("b", 2, 20, EntryStatus::Waiting),
            ("d", 0, 40, EntryStatus::Waiting),
        ] {
            let mut e = QueueEntry::create(id, joined, "biz", id, None).unwrap();
            e.position = pos;
            e.status = status;
            rows.push(e);
        }

        let set = ActiveSet::from_rows("biz", rows, AVG);
        let ids: Vec<&str> = set.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(set.is_consistent());
    }
}
