//! Per-stage, per-kind slot caches with dirty-bit tracking.
//!
//! The caller records "currently bound thing" per slot as bindings change;
//! the descriptor cache consumes the dirty bits when it rebuilds and binds a
//! table, clearing exactly the bits inside the bound range. A dirty bit means
//! "the caller supplied a new binding since the table was last rebuilt".

use crate::descriptors::{DescriptorKind, OfflineDescriptor, ShaderStage};

/// One bit per table slot; bit N is slot N.
pub type SlotMask = u64;

/// Mask covering slots `[0, num_slots)`.
pub(crate) fn slot_range_mask(num_slots: u32) -> SlotMask {
    if num_slots >= SlotMask::BITS {
        SlotMask::MAX
    } else {
        (1u64 << num_slots) - 1
    }
}

/// Table size implied by a request mask: highest set slot + 1.
pub(crate) fn table_size_for_mask(mask: SlotMask) -> u32 {
    SlotMask::BITS - mask.leading_zeros()
}

/// Slot cache for one (shader stage, descriptor kind) pair.
#[derive(Debug)]
pub struct StageSlotCache {
    kind: DescriptorKind,
    slots: Vec<Option<OfflineDescriptor>>,
    dirty: SlotMask,
}

impl StageSlotCache {
    pub fn new(kind: DescriptorKind) -> Self {
        Self {
            kind,
            slots: vec![None; kind.max_slots() as usize],
            dirty: 0,
        }
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Record a binding change. No-op (and no dirty bit) if the slot already
    /// holds the same descriptor.
    pub fn set_slot(&mut self, slot: u32, descriptor: Option<OfflineDescriptor>) {
        let index = slot as usize;
        assert!(
            index < self.slots.len(),
            "slot {slot} out of range for a {} table of {} slots",
            self.kind,
            self.slots.len()
        );
        debug_assert!(descriptor.map_or(true, |d| d.kind == self.kind));

        if self.slots[index] != descriptor {
            self.slots[index] = descriptor;
            self.dirty |= 1 << slot;
        }
    }

    pub fn slot(&self, slot: u32) -> Option<OfflineDescriptor> {
        self.slots.get(slot as usize).copied().flatten()
    }

    pub fn slots(&self) -> &[Option<OfflineDescriptor>] {
        &self.slots
    }

    pub fn dirty_mask(&self) -> SlotMask {
        self.dirty
    }

    /// Every slot identity is suspect (heap change, new command list).
    pub fn mark_all_dirty(&mut self) {
        self.dirty = slot_range_mask(self.capacity());
    }

    /// Clear the dirty bits of the freshly bound range `[0, num_slots)`.
    /// Bits outside the range are untouched.
    pub(crate) fn clean_slots(&mut self, num_slots: u32) {
        self.dirty &= !slot_range_mask(num_slots);
    }
}

/// The full stage x kind grid for one execution context.
///
/// Owned by the caller and handed to the descriptor cache on every bind; the
/// cache clears dirty bits as it binds tables and re-dirties the whole grid
/// when the active heaps change identity.
#[derive(Debug)]
pub struct BindingState {
    // [stage][table kind]
    caches: [[StageSlotCache; DescriptorKind::TABLE_KINDS.len()]; ShaderStage::ALL.len()],
}

impl BindingState {
    pub fn new() -> Self {
        Self {
            caches: std::array::from_fn(|_| {
                std::array::from_fn(|kind| StageSlotCache::new(DescriptorKind::TABLE_KINDS[kind]))
            }),
        }
    }

    pub fn stage_cache(&self, stage: ShaderStage, kind: DescriptorKind) -> &StageSlotCache {
        let Some(index) = kind.table_index() else {
            panic!("{kind} descriptors do not bind through stage tables");
        };
        &self.caches[stage.index()][index]
    }

    pub fn stage_cache_mut(
        &mut self,
        stage: ShaderStage,
        kind: DescriptorKind,
    ) -> &mut StageSlotCache {
        let Some(index) = kind.table_index() else {
            panic!("{kind} descriptors do not bind through stage tables");
        };
        &mut self.caches[stage.index()][index]
    }

    pub fn mark_all_dirty(&mut self) {
        for per_stage in &mut self.caches {
            for cache in per_stage {
                cache.mark_all_dirty();
            }
        }
    }
}

impl Default for BindingState {
    fn default() -> Self {
        Self::new()
    }
}
