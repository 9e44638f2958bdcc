use std::collections::BTreeSet;

use ur_fleet::slots::SlotAllocator;
use ur_fleet::FleetError;

#[test]
fn test_lease_hands_out_lowest_free_slot() {
    let slots = SlotAllocator::new(3);
    assert_eq!(slots.lease(), Ok(1));
    assert_eq!(slots.lease(), Ok(2));
    assert!(slots.release(1));
    assert_eq!(slots.lease(), Ok(1));
    assert_eq!(slots.lease(), Ok(3));
    assert_eq!(slots.lease(), Err(FleetError::NoSlotsAvailable));
}

#[test]
fn test_release_is_idempotent() {
    let slots = SlotAllocator::new(2);
    let slot = slots.lease().unwrap();
    assert!(slots.release(slot));
    assert!(!slots.release(slot), "second release should be a no-op");
    assert_eq!(slots.free_slots(), vec![1, 2]);
}

#[test]
fn test_release_out_of_range_is_ignored() {
    let slots = SlotAllocator::new(2);
    assert!(!slots.release(0));
    assert!(!slots.release(3));
    assert_eq!(slots.free_slots(), vec![1, 2]);
}

#[test]
fn test_free_and_leased_always_partition_all_slots() {
    let slots = SlotAllocator::new(5);
    let mut outstanding: Vec<u8> = Vec::new();
    // Deterministic interleaving of leases and releases, never above capacity.
    let script = [true, true, true, false, true, false, false, true, true, true, false, true];
    for (step, lease) in script.iter().enumerate() {
        if *lease && outstanding.len() < 5 {
            let slot = slots.lease().unwrap();
            assert!(!outstanding.contains(&slot), "slot {} double-leased at step {}", slot, step);
            outstanding.push(slot);
        } else if let Some(slot) = outstanding.pop() {
            assert!(slots.release(slot));
        }

        let free: BTreeSet<u8> = slots.free_slots().into_iter().collect();
        let leased: BTreeSet<u8> = slots.leased_slots().into_iter().collect();
        assert!(free.is_disjoint(&leased));
        let all: BTreeSet<u8> = free.union(&leased).copied().collect();
        assert_eq!(all, (1..=5).collect::<BTreeSet<u8>>());
        assert_eq!(leased, outstanding.iter().copied().collect::<BTreeSet<u8>>());
    }
}

#[test]
fn test_concurrent_leases_never_collide() {
    use std::sync::Arc;
    use std::thread;

    let slots = Arc::new(SlotAllocator::new(16));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let slots = Arc::clone(&slots);
            thread::spawn(move || slots.lease().unwrap())
        })
        .collect();
    let leased: BTreeSet<u8> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(leased.len(), 16);
    assert!(slots.free_slots().is_empty());
}
