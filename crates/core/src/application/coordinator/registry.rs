// Business Registry - per-business state containers
//
// A slot is created the first time a business is referenced and evicted by
// `evict_where` once nothing holds it. All mutations of a business go through
// its slot mutex, so different businesses never contend.

use crate::domain::{ActiveSet, BusinessId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Default)]
pub(crate) struct SlotState {
    /// Cached active set; `None` means it must be re-derived from the store
    pub active: Option<ActiveSet>,
    /// Version of the last published snapshot
    pub version: u64,
}

pub(crate) type Slot = Arc<AsyncMutex<SlotState>>;

#[derive(Default)]
pub(crate) struct BusinessRegistry {
    slots: Mutex<HashMap<BusinessId, Slot>>,
}

impl BusinessRegistry {
    /// Get or create the slot of a business
    pub fn slot(&self, business_id: &str) -> Slot {
        self.slots()
            .entry(business_id.to_string())
            .or_default()
            .clone()
    }

    pub fn contains(&self, business_id: &str) -> bool {
        self.slots().contains_key(business_id)
    }

    pub fn businesses(&self) -> Vec<BusinessId> {
        self.slots().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// Remove idle slots for which `evict` returns true.
    ///
    /// A slot is only considered when no operation holds or awaits it
    /// (the registry owns the sole reference) and its lock is free.
    /// `evict` runs with the slot locked.
    pub fn evict_where(&self, mut evict: impl FnMut(&str, &SlotState) -> bool) -> Vec<BusinessId> {
        let mut slots = self.slots();
        let mut evicted = Vec::new();

        slots.retain(|business_id, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(state) = slot.try_lock() else {
                return true;
            };
            if evict(business_id, &state) {
                evicted.push(business_id.clone());
                false
            } else {
                true
            }
        });

        evicted
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<BusinessId, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}
