//! Core bump-allocation state shared by every online descriptor heap, plus
//! the CPU-side backing table the heaps copy descriptors into.
//!
//! An online heap hands out contiguous slot ranges front to back. When the
//! end of the heap is reached the owning heap kind decides what happens next
//! (`roll_over` on the concrete heap types); the state here only knows how to
//! bump, and, for wrap-allowed heaps, how to loop back to slot 0 inside
//! `reserve`.

use crate::descriptors::{OfflineDescriptor, TableId, TableIdAllocator};

/// CPU-side backing storage for one shader-visible descriptor table.
///
/// Stands in for the device heap memory: `copy_descriptor` models the
/// offline-to-online descriptor copy and is observable by tests.
#[derive(Debug)]
pub struct DescriptorTable {
    id: TableId,
    slots: Vec<Option<OfflineDescriptor>>,
}

impl DescriptorTable {
    /// Allocate a fresh backing table with a new identity.
    pub fn new(ids: &TableIdAllocator, capacity: u32) -> Self {
        Self::with_id(ids.next_id(), capacity)
    }

    /// Backing table that shares an existing identity (a block view into a
    /// larger device heap keeps that heap's identity).
    pub(crate) fn with_id(id: TableId, capacity: u32) -> Self {
        Self {
            id,
            slots: vec![None; capacity as usize],
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn copy_descriptor(&mut self, slot: u32, source: OfflineDescriptor) {
        self.slots[slot as usize] = Some(source);
    }

    pub fn slot(&self, slot: u32) -> Option<OfflineDescriptor> {
        self.slots.get(slot as usize).copied().flatten()
    }
}

/// Result of a successful reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// First slot of the reserved range, relative to the heap base.
    pub first_slot: u32,
    /// The reservation looped back to slot 0; generation-keyed caches over
    /// this heap's contents are now stale.
    pub looped_around: bool,
}

/// Bump-allocator bookkeeping for an online heap.
#[derive(Debug, Clone, Copy)]
pub struct OnlineHeapState {
    capacity: u32,
    next_slot: u32,
    first_used_slot: u32,
    can_loop_around: bool,
}

impl OnlineHeapState {
    pub fn new(capacity: u32, can_loop_around: bool) -> Self {
        Self {
            capacity,
            next_slot: 0,
            first_used_slot: 0,
            can_loop_around,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn next_slot(&self) -> u32 {
        self.next_slot
    }

    pub fn first_used_slot(&self) -> u32 {
        self.first_used_slot
    }

    /// Whether `num_slots` contiguous slots fit without rolling over.
    ///
    /// Wrap retry is disabled: even on a wrap-allowed heap a request that runs
    /// past the end reports "full" rather than attempting the loop-around, and
    /// the caller is expected to roll the heap over. A request larger than the
    /// whole heap can never be satisfied and is a configuration error.
    pub fn can_reserve(&self, num_slots: u32) -> bool {
        if num_slots == 0 {
            return true;
        }
        if num_slots > self.capacity {
            panic!(
                "descriptor table of {num_slots} slots exceeds heap capacity {}",
                self.capacity
            );
        }

        self.next_slot + num_slots <= self.capacity
    }

    /// Reserve `num_slots` contiguous slots and return the range start.
    ///
    /// Callers check [`can_reserve`](Self::can_reserve) first. On a
    /// wrap-allowed heap a reservation past the end loops back to slot 0 and
    /// reports it, so the owner can invalidate anything keyed on old slots;
    /// the loop leaves `first_used = next = num_slots`.
    pub fn reserve(&mut self, num_slots: u32) -> Reservation {
        assert!(
            num_slots <= self.capacity,
            "descriptor table of {num_slots} slots exceeds heap capacity {}",
            self.capacity
        );

        let mut first_slot = self.next_slot;
        let mut slot_after = self.next_slot + num_slots;
        let mut looped_around = false;

        if self.can_loop_around && slot_after > self.capacity {
            first_slot = 0;
            slot_after = num_slots;
            self.first_used_slot = slot_after;
            looped_around = true;
        }

        self.next_slot = slot_after;
        Reservation {
            first_slot,
            looped_around,
        }
    }

    /// Retirement bookkeeping: slots up to and including `last_slot` are no
    /// longer referenced by in-flight work.
    pub fn advance_first_used(&mut self, last_slot: u32) {
        self.first_used_slot = last_slot + 1;
    }

    /// Reset to an empty heap (new backing table adopted).
    pub fn reset(&mut self) {
        self.next_slot = 0;
        self.first_used_slot = 0;
    }
}
