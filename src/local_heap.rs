//! Context-local online heap: a ring allocator over recycled backing tables.
//!
//! The fallback when shared storage is unavailable (the sampler role's build
//! heap, and the view role after pool exhaustion). Rolling over retires the
//! live table behind the current command list's fence and reuses the oldest
//! retired table if its fence has completed; otherwise a fresh table is
//! allocated, growing total memory rather than ever waiting on the device.
//!
//! Completed command lists also retire slots in place: each list records the
//! last slot it used, and as those fences complete in FIFO order the
//! first-used frontier advances, bounding what a loop-around may overwrite.

use std::collections::VecDeque;
use std::mem;

use crate::descriptors::{GpuTableHandle, HeapRole, OfflineDescriptor, TableId, TableIdAllocator};
use crate::fence::CompletionToken;
use crate::online_heap::{DescriptorTable, OnlineHeapState, Reservation};

#[derive(Debug)]
struct ReclaimEntry {
    table: DescriptorTable,
    /// None means the table was never used under a command list and is
    /// immediately reusable.
    token: Option<CompletionToken>,
}

impl ReclaimEntry {
    fn is_reusable(&self) -> bool {
        self.token.as_ref().map_or(true, CompletionToken::is_complete)
    }
}

#[derive(Debug)]
struct SyncPoint {
    token: CompletionToken,
    last_slot_in_use: u32,
}

#[derive(Debug)]
pub struct LocalHeap {
    ids: TableIdAllocator,
    role: HeapRole,
    state: OnlineHeapState,
    table: DescriptorTable,
    reclaim_pool: VecDeque<ReclaimEntry>,
    sync_points: VecDeque<SyncPoint>,
    current_token: Option<CompletionToken>,
    tables_allocated: u64,
}

impl LocalHeap {
    pub fn new(ids: &TableIdAllocator, capacity: u32, role: HeapRole) -> Self {
        Self {
            ids: ids.clone(),
            role,
            state: OnlineHeapState::new(capacity, true),
            table: DescriptorTable::new(ids, capacity),
            reclaim_pool: VecDeque::new(),
            sync_points: VecDeque::new(),
            current_token: None,
            tables_allocated: 1,
        }
    }

    pub fn role(&self) -> HeapRole {
        self.role
    }

    pub fn table_id(&self) -> TableId {
        self.table.id()
    }

    /// Total backing tables ever allocated (1 = never grew).
    pub fn tables_allocated(&self) -> u64 {
        self.tables_allocated
    }

    pub fn first_used_slot(&self) -> u32 {
        self.state.first_used_slot()
    }

    pub fn next_slot(&self) -> u32 {
        self.state.next_slot()
    }

    /// Attach the context's current command list.
    ///
    /// If the previous list used any slots, record a sync point for it, then
    /// retire the slots of every list whose fence has completed, in FIFO
    /// order, so the frontier never skips past a still-running list.
    pub fn set_current_command_list(&mut self, token: CompletionToken) {
        if let Some(previous) = self.current_token.take() {
            if self.state.next_slot() > 0 {
                self.sync_points.push_back(SyncPoint {
                    token: previous,
                    last_slot_in_use: self.state.next_slot() - 1,
                });

                while self
                    .sync_points
                    .front()
                    .is_some_and(|sync| sync.token.is_complete())
                {
                    if let Some(sync) = self.sync_points.pop_front() {
                        self.state.advance_first_used(sync.last_slot_in_use);
                    }
                }
            }
        }

        self.current_token = Some(token);
    }

    /// Retire the live table and continue on a recycled or fresh one.
    ///
    /// The backing-table identity changes (or re-emerges from the reclaim
    /// queue); either way the caller must re-set descriptor heaps.
    pub fn roll_over(&mut self) {
        debug_assert!(
            self.current_token.is_some(),
            "local heap rollover without a current command list"
        );

        let head_reusable = match self.reclaim_pool.front() {
            Some(entry) => entry.is_reusable(),
            // Empty queue: the entry about to be enqueued is its own head.
            None => self
                .current_token
                .as_ref()
                .map_or(true, CompletionToken::is_complete),
        };

        if head_reusable {
            if let Some(mut entry) = self.reclaim_pool.pop_front() {
                mem::swap(&mut self.table, &mut entry.table);
                entry.token = self.current_token.clone();
                self.reclaim_pool.push_back(entry);
            }
            // Empty-queue case: the current table is immediately reusable
            // in place.
        } else {
            tracing::warn!(
                role = %self.role,
                capacity = self.state.capacity(),
                "local online heap rollover: all retired tables still in flight, growing"
            );

            let fresh = DescriptorTable::new(&self.ids, self.state.capacity());
            let retired = mem::replace(&mut self.table, fresh);
            self.reclaim_pool.push_back(ReclaimEntry {
                table: retired,
                token: self.current_token.clone(),
            });
            self.tables_allocated += 1;
        }

        self.sync_points.clear();
        self.state.reset();
    }

    pub fn can_reserve(&self, num_slots: u32) -> bool {
        self.state.can_reserve(num_slots)
    }

    pub fn reserve(&mut self, num_slots: u32) -> Reservation {
        self.state.reserve(num_slots)
    }

    pub fn copy_descriptor(&mut self, slot: u32, source: OfflineDescriptor) {
        self.table.copy_descriptor(slot, source);
    }

    pub fn slot(&self, slot: u32) -> Option<OfflineDescriptor> {
        self.table.slot(slot)
    }

    pub fn handle_for(&self, first_slot: u32) -> GpuTableHandle {
        GpuTableHandle {
            table: self.table.id(),
            first_slot,
        }
    }
}
