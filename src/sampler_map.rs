//! Deduplication of sampler descriptor tables.
//!
//! Identical sampler tables are requested over and over (most materials use a
//! handful of sampler configurations), so a built table is remembered by the
//! exact sequence of sampler identities it was built from and reused without
//! touching the heap. Keys are order-sensitive on purpose: binding order is
//! part of the table's identity, and `[5, 0, 5]` is a different table than
//! `[5, 5, 0]`.

use std::collections::HashMap;

use crate::descriptors::{GpuTableHandle, OfflineDescriptor, MAX_SAMPLER_SLOTS};

/// Maximum sampler-table length a key can describe.
pub const MAX_SAMPLER_TABLE_SIZE: usize = MAX_SAMPLER_SLOTS as usize;

/// Exact-sequence identity of a sampler table.
///
/// The unused tail is zeroed so derived `Eq`/`Hash` over the whole array stay
/// consistent for equal prefixes of different histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerTableKey {
    ids: [u32; MAX_SAMPLER_TABLE_SIZE],
    count: u8,
}

impl SamplerTableKey {
    /// Build the key for the first `slots.len()` sampler slots.
    ///
    /// Unbound slots key as id 0 (the default sampler). Returns `None` for
    /// tables too long to dedup; callers build those without caching.
    pub fn from_slots(slots: &[Option<OfflineDescriptor>]) -> Option<Self> {
        if slots.len() > MAX_SAMPLER_TABLE_SIZE {
            return None;
        }

        let mut ids = [0u32; MAX_SAMPLER_TABLE_SIZE];
        for (id, slot) in ids.iter_mut().zip(slots) {
            *id = slot.map(|desc| desc.id).unwrap_or(0);
        }

        Some(Self {
            ids,
            count: slots.len() as u8,
        })
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A sampler table discovered this frame, kept with its originating offline
/// sources so it can be merged into the process-wide sampler heap at frame
/// end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueSamplerTable {
    pub key: SamplerTableKey,
    pub sources: Vec<OfflineDescriptor>,
}

/// Hit/miss accounting for the dedup caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Key -> built-table map for the context-local sampler heap.
///
/// Entries are only valid for the heap generation they were built on; the
/// owner resets the map wholesale whenever the active sampler heap's identity
/// changes or the heap loops around.
#[derive(Debug, Default)]
pub struct SamplerMap {
    map: HashMap<SamplerTableKey, GpuTableHandle>,
    hits: u64,
    misses: u64,
}

impl SamplerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, key: &SamplerTableKey) -> Option<GpuTableHandle> {
        match self.map.get(key) {
            Some(handle) => {
                self.hits += 1;
                Some(*handle)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: SamplerTableKey, handle: GpuTableHandle) {
        self.map.insert(key, handle);
    }

    /// Wholesale invalidation; hit/miss counters survive for diagnostics.
    pub fn reset(&mut self) {
        self.map.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.map.len(),
        }
    }
}
