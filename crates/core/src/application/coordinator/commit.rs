// Row diffing and transactional commit of a mutation

use crate::domain::{ActiveSet, EntryId, QueueEntry};
use crate::error::Result;
use crate::port::{EntryUpdate, TransactionalEntryRepository};

/// One row write of a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RowWrite {
    Insert(QueueEntry),
    Update(EntryId, EntryUpdate),
    Delete(EntryId),
}

/// Writes that turn `before` into `after`.
///
/// `touched` is the entry the mutation acted on; when it left the active set it
/// is absent from `after` and is written from its returned state instead.
pub(crate) fn diff(
    before: &ActiveSet,
    after: &ActiveSet,
    touched: Option<&QueueEntry>,
) -> Vec<RowWrite> {
    let mut writes = Vec::new();

    if let Some(entry) = touched.filter(|e| !e.is_active()) {
        if let Some(update) = before
            .get(&entry.id)
            .and_then(|old| EntryUpdate::between(old, entry))
        {
            writes.push(RowWrite::Update(entry.id.clone(), update));
        }
    }

    for entry in after.entries() {
        match before.get(&entry.id) {
            None => writes.push(RowWrite::Insert(entry.clone())),
            Some(old) => {
                if let Some(update) = EntryUpdate::between(old, entry) {
                    writes.push(RowWrite::Update(entry.id.clone(), update));
                }
            }
        }
    }

    writes
}

/// Writes that bring stored rows in line with a re-derived set
pub(crate) fn heal(stored: &[QueueEntry], derived: &ActiveSet) -> Vec<RowWrite> {
    derived
        .entries()
        .iter()
        .filter_map(|entry| {
            let old = stored.iter().find(|row| row.id == entry.id)?;
            EntryUpdate::between(old, entry).map(|u| RowWrite::Update(entry.id.clone(), u))
        })
        .collect()
}

/// Apply all writes in one transaction
pub(crate) async fn apply(
    repo: &dyn TransactionalEntryRepository,
    writes: &[RowWrite],
) -> Result<()> {
    if writes.is_empty() {
        return Ok(());
    }

    let mut tx = repo.begin_transaction().await?;
    for write in writes {
        let staged = match write {
            RowWrite::Insert(entry) => tx.insert(entry).await,
            RowWrite::Update(id, update) => tx.update(id, update).await,
            RowWrite::Delete(id) => tx.delete(id).await,
        };
        if let Err(e) = staged {
            // Best effort; the original error is what the caller needs
            let _ = tx.rollback().await;
            return Err(e);
        }
    }
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntryStatus;

    fn set_of(ids: &[&str]) -> ActiveSet {
        let mut set = ActiveSet::new("biz");
        for (i, id) in ids.iter().enumerate() {
            let e = QueueEntry::create(*id, i as i64, "biz", id, None).unwrap();
            set.append(e, 10).unwrap();
        }
        set
    }

    #[test]
    fn test_diff_for_join_is_single_insert() {
        let before = set_of(&["a", "b"]);
        let mut after = before.clone();
        let c = QueueEntry::create("c", 9, "biz", "c", None).unwrap();
        let c = after.append(c, 10).unwrap();

        assert_eq!(diff(&before, &after, Some(&c)), vec![RowWrite::Insert(c)]);
    }

    #[test]
    fn test_diff_for_departure_updates_shifted_rows() {
        let before = set_of(&["a", "b", "c"]);
        let mut after = before.clone();
        let a = after.advance("a", EntryStatus::Cancelled, 5, 10).unwrap();

        let writes = diff(&before, &after, Some(&a));
        let ids: Vec<&str> = writes
            .iter()
            .map(|w| match w {
                RowWrite::Update(id, _) => id.as_str(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        match &writes[0] {
            RowWrite::Update(_, u) => {
                assert_eq!(u.status, Some(EntryStatus::Cancelled));
                assert_eq!(u.finished_at, Some(5));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_heal_fixes_gapped_rows() {
        let mut stored = set_of(&["a", "b"]).entries().to_vec();
        stored[1].position = 5;
        let derived = ActiveSet::from_rows("biz", stored.clone(), 10);

        let writes = heal(&stored, &derived);
        assert_eq!(writes.len(), 1);
        assert!(matches!(
            &writes[0],
            RowWrite::Update(id, u) if id == "b" && u.position == Some(2)
        ));
    }
}
