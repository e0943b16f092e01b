//! Process-wide shader-visible sampler heap.
//!
//! One instance exists per device, shared by every execution context. It
//! never wraps and never rolls over: contexts hold live table handles into
//! it, so exhaustion is a configuration bug, not a transient condition.
//!
//! The heap doubles as the publication point for deduplicated sampler
//! tables: contexts discover unique tables on their local heaps during a
//! frame, then merge them here once per frame. Contexts pick up the merged
//! set by snapshotting it at frame start, so the lock is only touched at
//! frame boundaries, never per draw.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::descriptors::{
    GpuTableHandle, OfflineDescriptor, TableId, TableIdAllocator, MAX_SAMPLER_SLOTS,
};
use crate::error::ConfigError;
use crate::online_heap::{DescriptorTable, OnlineHeapState};
use crate::sampler_map::{SamplerTableKey, UniqueSamplerTable};

/// Published key -> table mapping, cloned into contexts at frame start.
pub type SamplerTableSet = HashMap<SamplerTableKey, GpuTableHandle>;

#[derive(Debug)]
struct SharedInner {
    state: OnlineHeapState,
    table: DescriptorTable,
    unique_tables: SamplerTableSet,
    /// Bumped whenever the published set grows; contexts compare against
    /// their last-seen version to skip redundant snapshots.
    version: u64,
    warned_full: bool,
}

#[derive(Debug)]
pub struct SharedSamplerHeap {
    table_id: TableId,
    capacity: u32,
    inner: Mutex<SharedInner>,
}

impl SharedSamplerHeap {
    pub fn new(ids: &TableIdAllocator, capacity: u32) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroHeapCapacity);
        }
        if capacity < MAX_SAMPLER_SLOTS {
            return Err(ConfigError::HeapTooSmall {
                capacity,
                required: MAX_SAMPLER_SLOTS,
            });
        }

        let table = DescriptorTable::new(ids, capacity);
        let table_id = table.id();
        Ok(Self {
            table_id,
            capacity,
            inner: Mutex::new(SharedInner {
                state: OnlineHeapState::new(capacity, false),
                table,
                unique_tables: SamplerTableSet::new(),
                version: 0,
                warned_full: false,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Current version of the published table set.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Clone the published set if it changed since `seen_version`.
    pub fn snapshot_if_newer(&self, seen_version: u64) -> Option<(SamplerTableSet, u64)> {
        let inner = self.lock();
        if inner.version == seen_version {
            return None;
        }
        Some((inner.unique_tables.clone(), inner.version))
    }

    /// Batched once-per-frame merge of tables a context discovered.
    ///
    /// Tables already published by another context are skipped. Tables that
    /// no longer fit are skipped too (warned once): contexts simply keep
    /// building them on their local heaps.
    pub fn merge_unique_tables(&self, tables: &[UniqueSamplerTable]) {
        let mut inner = self.lock();
        let mut published = 0u64;

        for unique in tables {
            if inner.unique_tables.contains_key(&unique.key) {
                continue;
            }

            let num_slots = unique.key.len() as u32;
            if !inner.state.can_reserve(num_slots) {
                if !inner.warned_full {
                    inner.warned_full = true;
                    tracing::warn!(
                        capacity = self.capacity,
                        "shared sampler heap is full; new unique sampler tables stay context-local"
                    );
                }
                continue;
            }

            let reservation = inner.state.reserve(num_slots);
            for (offset, source) in unique.sources.iter().enumerate() {
                inner
                    .table
                    .copy_descriptor(reservation.first_slot + offset as u32, *source);
            }

            let handle = GpuTableHandle {
                table: self.table_id,
                first_slot: reservation.first_slot,
            };
            inner.unique_tables.insert(unique.key, handle);
            published += 1;
        }

        if published > 0 {
            inner.version += 1;
            tracing::debug!(published, version = inner.version, "published sampler tables");
        }
    }

    /// The shared heap never rolls over. Running it out from the reservation
    /// path means every context's scaling assumptions are wrong; abort with
    /// a diagnostic rather than corrupt live tables.
    pub fn roll_over(&self) -> ! {
        panic!(
            "shared sampler heap ({} slots) exhausted; raise the configured capacity",
            self.capacity
        );
    }

    /// Descriptor stored at `slot`, for verification.
    pub fn slot(&self, slot: u32) -> Option<OfflineDescriptor> {
        self.lock().table.slot(slot)
    }
}
