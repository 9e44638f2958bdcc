//! Counting gate that bounds concurrently running virtual robots.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{info, warn};

use crate::events::{EventBus, FleetEvent};
use crate::FleetError;

/// Admission control for virtual robot instances.
///
/// The gate is created with `capacity` permits but starts drained. Until
/// [`AdmissionGate::open`] runs, every [`AdmissionGate::acquire`] waits with no
/// timeout, so requests queue up behind infrastructure readiness.
///
/// A `capacityReached` event is published once each time the gate is found
/// empty by a caller that has to wait; it is re-armed by the next release.
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    semaphore: Semaphore,
    opened: AtomicBool,
    drained_notified: AtomicBool,
    events: EventBus,
}

impl AdmissionGate {
    pub fn new(capacity: usize, events: EventBus) -> Self {
        Self {
            capacity,
            semaphore: Semaphore::new(0),
            opened: AtomicBool::new(false),
            drained_notified: AtomicBool::new(false),
            events,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    /// Releases all permits at once. Only the first call has an effect.
    pub fn open(&self) -> bool {
        if self.opened.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.drained_notified.store(false, Ordering::SeqCst);
        self.semaphore.add_permits(self.capacity);
        info!("admission gate open with {} permits", self.capacity);
        true
    }

    /// Wakes every pending `acquire` with [`FleetError::GateClosed`].
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn is_drained(&self) -> bool {
        self.available_permits() == 0
    }

    pub async fn acquire(&self) -> Result<(), FleetError> {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                return Ok(());
            }
            Err(TryAcquireError::Closed) => return Err(FleetError::GateClosed),
            Err(TryAcquireError::NoPermits) => self.notify_drained(),
        }
        let permit = self.semaphore.acquire().await.map_err(|_| FleetError::GateClosed)?;
        permit.forget();
        Ok(())
    }

    pub fn release(&self) {
        if !self.is_open() {
            warn!("ignoring permit release before the admission gate opened");
            return;
        }
        if self.available_permits() >= self.capacity {
            warn!("ignoring permit release: all {} permits already available", self.capacity);
            return;
        }
        self.semaphore.add_permits(1);
        self.drained_notified.store(false, Ordering::SeqCst);
    }

    fn notify_drained(&self) {
        if !self.drained_notified.swap(true, Ordering::SeqCst) {
            warn!("no admission permits available (capacity {})", self.capacity);
            self.events.publish(FleetEvent::CapacityReached);
        }
    }
}
