//! Numeric slots that keep virtual robot port ranges from colliding.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::FleetError;

/// Slot identifier in `1..=capacity`.
pub type Slot = u8;

/// Tracks which of the slots `1..=capacity` are free.
///
/// Leasing always hands out the lowest free slot. Releasing is idempotent: a
/// slot that is already free (or out of range) is ignored and reported as
/// `false`.
#[derive(Debug)]
pub struct SlotAllocator {
    capacity: Slot,
    free: Mutex<BTreeSet<Slot>>,
}

impl SlotAllocator {
    pub fn new(capacity: Slot) -> Self {
        Self {
            capacity,
            free: Mutex::new((1..=capacity).collect()),
        }
    }

    pub fn capacity(&self) -> Slot {
        self.capacity
    }

    fn free_set(&self) -> MutexGuard<'_, BTreeSet<Slot>> {
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lease(&self) -> Result<Slot, FleetError> {
        let slot = self.free_set().pop_first().ok_or(FleetError::NoSlotsAvailable)?;
        debug!("leased slot {:02}", slot);
        Ok(slot)
    }

    /// Returns `slot` to the free set. Returns `true` if the slot was leased.
    pub fn release(&self, slot: Slot) -> bool {
        if slot == 0 || slot > self.capacity {
            warn!("ignoring release of slot {} outside 1..={}", slot, self.capacity);
            return false;
        }
        let returned = self.free_set().insert(slot);
        if returned {
            debug!("released slot {:02}", slot);
        } else {
            debug!("slot {:02} was already free", slot);
        }
        returned
    }

    pub fn is_leased(&self, slot: Slot) -> bool {
        slot >= 1 && slot <= self.capacity && !self.free_set().contains(&slot)
    }

    pub fn free_slots(&self) -> Vec<Slot> {
        self.free_set().iter().copied().collect()
    }

    pub fn leased_slots(&self) -> Vec<Slot> {
        let free = self.free_set();
        (1..=self.capacity).filter(|slot| !free.contains(slot)).collect()
    }
}
