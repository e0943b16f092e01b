//! Per-context view heap backed by blocks from the shared pool.
//!
//! Each context bump-allocates out of one pool block at a time. Rolling over
//! swaps blocks, not heaps: every block is a view into the pool's single
//! backing heap, so the shader-visible heap identity never changes while the
//! context stays pooled. Only pool exhaustion forces a real heap switch,
//! which the owning descriptor cache handles by degrading to a context-local
//! heap.

use std::sync::Arc;

use crate::block_pool::{DescriptorBlockPool, HeapBlock};
use crate::descriptors::{GpuTableHandle, OfflineDescriptor, TableId};
use crate::fence::CompletionToken;
use crate::online_heap::{DescriptorTable, OnlineHeapState, Reservation};

#[derive(Debug)]
pub struct SubAllocatedHeap {
    pool: Arc<DescriptorBlockPool>,
    state: OnlineHeapState,
    block: Option<HeapBlock>,
    /// CPU-side storage for the current block's slots; recreated per block.
    storage: Option<DescriptorTable>,
    current_token: Option<CompletionToken>,
}

impl SubAllocatedHeap {
    /// The first block is drawn lazily when a command list is attached.
    pub fn new(pool: Arc<DescriptorBlockPool>) -> Self {
        Self {
            pool,
            state: OnlineHeapState::new(0, false),
            block: None,
            storage: None,
            current_token: None,
        }
    }

    /// Identity of the pool's backing heap; constant across block swaps.
    pub fn table_id(&self) -> TableId {
        self.pool.table_id()
    }

    pub fn has_block(&self) -> bool {
        self.block.is_some()
    }

    /// Attach the context's current command list.
    ///
    /// Returns false when no block could be obtained (pool exhausted); the
    /// caller must switch the context to its local view heap.
    pub fn set_current_command_list(&mut self, token: CompletionToken) -> bool {
        self.current_token = Some(token);

        if self.block.is_none() {
            self.allocate_block()
        } else {
            true
        }
    }

    /// Swap the current block for a fresh one.
    ///
    /// The outgoing block is returned to the pool with the slots it actually
    /// used and the current command list's completion token; the pool will
    /// not reissue it until that token completes.
    pub fn allocate_block(&mut self) -> bool {
        if let Some(mut block) = self.block.take() {
            block.size_used = self.state.next_slot();
            self.pool.free_block(block, self.current_token.clone());
            self.storage = None;
        }

        match self.pool.allocate_block() {
            Some(block) => {
                self.state = OnlineHeapState::new(block.size, false);
                self.storage = Some(DescriptorTable::with_id(self.pool.table_id(), block.size));
                self.block = Some(block);
                true
            }
            None => {
                self.state = OnlineHeapState::new(0, false);
                false
            }
        }
    }

    /// Roll over: try to adopt a new block. False means the pool is exhausted
    /// and the context must degrade to its local view heap.
    pub fn roll_over(&mut self) -> bool {
        self.allocate_block()
    }

    pub fn can_reserve(&self, num_slots: u32) -> bool {
        match &self.block {
            Some(_) => self.state.can_reserve(num_slots),
            None => false,
        }
    }

    pub fn reserve(&mut self, num_slots: u32) -> Reservation {
        debug_assert!(self.block.is_some());
        self.state.reserve(num_slots)
    }

    pub fn copy_descriptor(&mut self, slot: u32, source: OfflineDescriptor) {
        match self.storage.as_mut() {
            Some(table) => table.copy_descriptor(slot, source),
            None => panic!("sub-allocated heap used without an active block"),
        }
    }

    /// Device-visible handle for a block-relative slot.
    pub fn handle_for(&self, first_slot: u32) -> GpuTableHandle {
        let base_slot = match &self.block {
            Some(block) => block.base_slot,
            None => panic!("sub-allocated heap used without an active block"),
        };
        GpuTableHandle {
            table: self.pool.table_id(),
            first_slot: base_slot + first_slot,
        }
    }

    pub fn slot(&self, slot: u32) -> Option<OfflineDescriptor> {
        self.storage.as_ref().and_then(|table| table.slot(slot))
    }

    /// Base slot of the current block within the pool's backing heap.
    pub fn block_base_slot(&self) -> Option<u32> {
        self.block.as_ref().map(|block| block.base_slot)
    }

    pub fn next_slot(&self) -> u32 {
        self.state.next_slot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{DescriptorKind, TableIdAllocator};
    use crate::fence::FenceTimeline;

    fn srv(id: u32) -> OfflineDescriptor {
        OfflineDescriptor::new(DescriptorKind::ShaderResource, id)
    }

    #[test]
    fn handles_are_absolute_within_the_pool_heap() {
        let ids = TableIdAllocator::new();
        let timeline = FenceTimeline::new();
        let pool = Arc::new(DescriptorBlockPool::new(&ids, 2, 64).unwrap());

        let mut first = SubAllocatedHeap::new(Arc::clone(&pool));
        let mut second = SubAllocatedHeap::new(Arc::clone(&pool));
        assert!(first.set_current_command_list(timeline.issue_token()));
        assert!(second.set_current_command_list(timeline.issue_token()));

        let a = first.reserve(8);
        let b = second.reserve(8);
        assert_eq!(first.handle_for(a.first_slot).first_slot, 0);
        assert_eq!(second.handle_for(b.first_slot).first_slot, 64);
        assert_eq!(first.table_id(), second.table_id());
    }

    #[test]
    fn block_swap_keeps_heap_identity() {
        let ids = TableIdAllocator::new();
        let timeline = FenceTimeline::new();
        let pool = Arc::new(DescriptorBlockPool::new(&ids, 2, 64).unwrap());

        let mut heap = SubAllocatedHeap::new(Arc::clone(&pool));
        assert!(heap.set_current_command_list(timeline.issue_token()));
        let before = heap.table_id();

        heap.reserve(64);
        assert!(!heap.can_reserve(1));
        assert!(heap.roll_over());
        assert_eq!(heap.table_id(), before);
        assert!(heap.can_reserve(64));
    }

    #[test]
    fn returned_block_records_slots_used() {
        let ids = TableIdAllocator::new();
        let timeline = FenceTimeline::new();
        let pool = Arc::new(DescriptorBlockPool::new(&ids, 2, 64).unwrap());

        let mut heap = SubAllocatedHeap::new(Arc::clone(&pool));
        let token = timeline.issue_token();
        assert!(heap.set_current_command_list(token.clone()));
        let r = heap.reserve(10);
        heap.copy_descriptor(r.first_slot, srv(1));

        assert!(heap.roll_over());
        // The old block is retired until its command list completes.
        assert_eq!(pool.retired_blocks(), 1);
        assert_eq!(pool.free_blocks(), 0);

        timeline.signal_completed(token.value());
        assert!(pool.allocate_block().is_some());
    }

    #[test]
    fn exhausted_pool_reports_rollover_failure() {
        let ids = TableIdAllocator::new();
        let timeline = FenceTimeline::new();
        let pool = Arc::new(DescriptorBlockPool::new(&ids, 1, 64).unwrap());

        let mut heap = SubAllocatedHeap::new(Arc::clone(&pool));
        assert!(heap.set_current_command_list(timeline.issue_token()));

        // The only block is ours and its retirement token never completes, so
        // the swap fails and the heap is left blockless.
        assert!(!heap.roll_over());
        assert!(!heap.has_block());
        assert!(!heap.can_reserve(1));
    }
}
