//! Per-context descriptor cache: turns dirty binding state into bound,
//! shader-visible descriptor tables.
//!
//! Each execution context owns one cache. The cache tracks which heap backs
//! each role (view tables, sampler tables), copies dirty offline descriptors
//! into contiguous online ranges, and appends one bind operation per
//! stage/kind to the current command list. Sampler requests are deduplicated
//! against previously built tables before touching the heap.
//!
//! Heap selection per role:
//! - view: pool-backed ([`SubAllocatedHeap`]) until the pool runs dry, then a
//!   context-local heap for the rest of the context's life.
//! - sampler: the process-wide [`SharedSamplerHeap`] at frame start (serving
//!   published tables without building), falling back to the context-local
//!   sampler heap the first time an unpublished table is needed.

use std::sync::Arc;

use crate::block_pool::DescriptorBlockPool;
use crate::command_list::{BindCommand, CommandList, CommandListId};
use crate::descriptors::{
    DescriptorKind, HeapRole, OfflineDescriptor, ShaderStage, TableId, TableIdAllocator,
    MAX_RENDER_TARGETS, MAX_SAMPLER_SLOTS, MAX_SHADER_RESOURCE_SLOTS,
};
use crate::error::ConfigError;
use crate::fence::CompletionToken;
use crate::local_heap::LocalHeap;
use crate::sampler_map::{CacheStats, SamplerMap, SamplerTableKey, UniqueSamplerTable};
use crate::shared_heap::{SamplerTableSet, SharedSamplerHeap};
use crate::stage_cache::{table_size_for_mask, BindingState, SlotMask};
use crate::sub_allocated_heap::SubAllocatedHeap;

#[derive(Debug, Clone, Copy)]
pub struct DescriptorCacheConfig {
    /// Capacity of the context-local view heap created on pool exhaustion.
    pub local_view_capacity: u32,
    /// Capacity of the context-local sampler heap.
    pub local_sampler_capacity: u32,
}

impl Default for DescriptorCacheConfig {
    fn default() -> Self {
        Self {
            local_view_capacity: 4096,
            local_sampler_capacity: 2048,
        }
    }
}

impl DescriptorCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (capacity, required) in [
            (self.local_view_capacity, MAX_SHADER_RESOURCE_SLOTS),
            (self.local_sampler_capacity, MAX_SAMPLER_SLOTS),
        ] {
            if capacity == 0 {
                return Err(ConfigError::ZeroHeapCapacity);
            }
            if capacity < required {
                return Err(ConfigError::HeapTooSmall { capacity, required });
            }
        }
        Ok(())
    }
}

/// Counters for heap churn and table builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorCacheStats {
    /// View-heap identity changes after the initial set on a command list.
    pub view_heap_changes: u64,
    /// Sampler-heap identity changes after the initial set on a command list.
    pub sampler_heap_changes: u64,
    pub view_tables_built: u64,
    pub sampler_tables_built: u64,
}

#[derive(Debug)]
pub struct DescriptorCache {
    ids: TableIdAllocator,
    config: DescriptorCacheConfig,

    // View role. `local_view` is created lazily on pool exhaustion; once it
    // exists the view role stays context-local for good.
    sub_allocated: SubAllocatedHeap,
    local_view: Option<LocalHeap>,

    // Sampler role.
    shared_samplers: Arc<SharedSamplerHeap>,
    local_sampler: LocalHeap,
    using_shared_samplers: bool,

    // Dedup state.
    sampler_map: SamplerMap,
    /// Tables first built this frame, merged into the shared heap at frame end.
    unique_tables: Vec<UniqueSamplerTable>,
    shared_snapshot: SamplerTableSet,
    shared_snapshot_version: u64,

    // Heap-change detection; None right after a new command list is attached.
    previous_view_table: Option<TableId>,
    previous_sampler_table: Option<TableId>,

    current_list: Option<(CommandListId, CompletionToken)>,
    stats: DescriptorCacheStats,
}

impl DescriptorCache {
    /// Build a cache for one execution context.
    ///
    /// The block pool and shared sampler heap are the process-wide services;
    /// `ids` must be the same allocator those services were built with so
    /// table identities stay globally unique.
    pub fn new(
        block_pool: Arc<DescriptorBlockPool>,
        shared_samplers: Arc<SharedSamplerHeap>,
        ids: TableIdAllocator,
        config: DescriptorCacheConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        // The local sampler heap exists from the start: the dedup cache
        // always misses initially and needs somewhere to build. The local
        // view heap is only a fallback, so it is created lazily.
        let local_sampler = LocalHeap::new(&ids, config.local_sampler_capacity, HeapRole::Sampler);

        Ok(Self {
            sub_allocated: SubAllocatedHeap::new(block_pool),
            local_view: None,
            shared_samplers,
            local_sampler,
            using_shared_samplers: false,
            sampler_map: SamplerMap::new(),
            unique_tables: Vec::new(),
            shared_snapshot: SamplerTableSet::new(),
            shared_snapshot_version: 0,
            previous_view_table: None,
            previous_sampler_table: None,
            current_list: None,
            ids,
            config,
            stats: DescriptorCacheStats::default(),
        })
    }

    pub fn stats(&self) -> DescriptorCacheStats {
        self.stats
    }

    pub fn sampler_map_stats(&self) -> CacheStats {
        self.sampler_map.stats()
    }

    pub fn active_view_table_id(&self) -> TableId {
        match &self.local_view {
            Some(local) => local.table_id(),
            None => self.sub_allocated.table_id(),
        }
    }

    pub fn active_sampler_table_id(&self) -> TableId {
        if self.using_shared_samplers {
            self.shared_samplers.table_id()
        } else {
            self.local_sampler.table_id()
        }
    }

    /// Whether the view role has degraded to the context-local heap.
    pub fn view_role_is_local(&self) -> bool {
        self.local_view.is_some()
    }

    pub fn using_shared_samplers(&self) -> bool {
        self.using_shared_samplers
    }

    /// Next free slot of the active sampler heap (shared heap reservations
    /// only move at frame-end merges, so this reads the local heap).
    pub fn local_sampler_next_slot(&self) -> u32 {
        self.local_sampler.next_slot()
    }

    /// Descriptor stored at `slot` of the local sampler heap.
    pub fn local_sampler_slot(&self, slot: u32) -> Option<OfflineDescriptor> {
        self.local_sampler.slot(slot)
    }

    /// Descriptor stored at an absolute `slot` of the active view heap (the
    /// slot a [`GpuTableHandle`](crate::GpuTableHandle) points at).
    pub fn view_heap_slot(&self, slot: u32) -> Option<OfflineDescriptor> {
        match &self.local_view {
            Some(local) => local.slot(slot),
            None => {
                let base = self.sub_allocated.block_base_slot()?;
                self.sub_allocated.slot(slot.checked_sub(base)?)
            }
        }
    }

    /// Attach the context's current command list.
    ///
    /// Drives generation and block retirement on the heaps that track
    /// command lists, then re-sets descriptor heaps (a new list always needs
    /// them set, so the previous identities are forgotten first).
    pub fn set_current_command_list(&mut self, list: &mut CommandList, bindings: &mut BindingState) {
        self.previous_view_table = None;
        self.previous_sampler_table = None;

        let token = list.completion_token();

        match self.local_view.as_mut() {
            Some(local) => local.set_current_command_list(token.clone()),
            None => {
                if !self.sub_allocated.set_current_command_list(token.clone()) {
                    self.switch_to_local_view_heap();
                }
            }
        }

        // The local sampler heap always tracks the list; the shared sampler
        // heap doesn't care about command lists.
        self.local_sampler.set_current_command_list(token.clone());

        self.current_list = Some((list.id(), token));
        self.set_descriptor_heaps(list, bindings);
    }

    /// Frame start: pick up tables other contexts published and serve
    /// samplers from the shared heap until something unpublished is needed.
    pub fn begin_frame(&mut self) {
        if let Some((snapshot, version)) = self
            .shared_samplers
            .snapshot_if_newer(self.shared_snapshot_version)
        {
            self.shared_snapshot = snapshot;
            self.shared_snapshot_version = version;
        }

        // The heap change is recorded on the next descriptor-heap set; there
        // may legitimately be no command list yet.
        self.using_shared_samplers = true;
    }

    /// Frame end: publish this frame's newly discovered sampler tables in
    /// one batched, locked merge.
    pub fn end_frame(&mut self) {
        if self.unique_tables.is_empty() {
            return;
        }
        self.shared_samplers.merge_unique_tables(&self.unique_tables);
        self.unique_tables.clear();
    }

    /// Compare active heap identities against what the command list last saw
    /// and re-set them if anything changed. Returns whether a set was issued.
    ///
    /// A change invalidates every slot identity the caller has cached, so the
    /// whole binding grid is re-dirtied, and sampler-map entries die with the
    /// outgoing sampler heap.
    pub fn set_descriptor_heaps(
        &mut self,
        list: &mut CommandList,
        bindings: &mut BindingState,
    ) -> bool {
        let view = self.active_view_table_id();
        let sampler = self.active_sampler_table_id();

        let view_changed = self.previous_view_table != Some(view);
        let sampler_changed = self.previous_sampler_table != Some(sampler);
        if !view_changed && !sampler_changed {
            return false;
        }

        // Don't count the initial set on a fresh command list.
        if view_changed && self.previous_view_table.is_some() {
            self.stats.view_heap_changes += 1;
        }
        if sampler_changed {
            if self.previous_sampler_table.is_some() {
                self.stats.sampler_heap_changes += 1;
            }
            self.sampler_map.reset();
        }

        bindings.mark_all_dirty();
        list.push(BindCommand::SetDescriptorHeaps {
            view_table: view,
            sampler_table: sampler,
        });
        self.previous_view_table = Some(view);
        self.previous_sampler_table = Some(sampler);
        true
    }

    /// Bind one stage's descriptor table of `kind`.
    ///
    /// `needed_mask` is the set of slots the bound pipeline can read. No-op
    /// unless a dirty bit intersects it. Always completes: heap exhaustion is
    /// absorbed by rollover or a heap switch, never surfaced.
    pub fn bind_stage_resources(
        &mut self,
        list: &mut CommandList,
        bindings: &mut BindingState,
        stage: ShaderStage,
        kind: DescriptorKind,
        needed_mask: SlotMask,
    ) {
        let Some(role) = kind.heap_role() else {
            panic!("{kind} descriptors do not bind through descriptor tables");
        };
        debug_assert!(
            self.current_list
                .as_ref()
                .is_some_and(|(id, _)| *id == list.id()),
            "binding on a command list that was never attached"
        );

        // Apply pending heap-identity changes (frame-start role flips,
        // rollovers triggered by earlier binds) before building anything.
        self.set_descriptor_heaps(list, bindings);

        let (dirty, capacity) = {
            let cache = bindings.stage_cache(stage, kind);
            (cache.dirty_mask(), cache.capacity())
        };
        if needed_mask == 0 || dirty & needed_mask == 0 {
            return;
        }

        let num_slots = table_size_for_mask(needed_mask);
        assert!(
            num_slots <= capacity,
            "pipeline requests {kind} slot {} but tables hold {capacity}",
            num_slots - 1
        );

        match role {
            HeapRole::View => self.bind_view_table(list, bindings, stage, kind, num_slots),
            HeapRole::Sampler => self.bind_sampler_table(list, bindings, stage, num_slots),
        }
    }

    /// Bind render targets. These bind their offline descriptors directly
    /// (no online heap); unbound color slots get the null render-target
    /// placeholder. Binding zero targets with only a depth target is valid.
    pub fn set_render_targets(
        &mut self,
        list: &mut CommandList,
        colors: &[Option<OfflineDescriptor>],
        depth: Option<OfflineDescriptor>,
    ) {
        assert!(
            colors.len() <= MAX_RENDER_TARGETS as usize,
            "{} render targets exceeds the supported {MAX_RENDER_TARGETS}",
            colors.len()
        );

        let colors = colors
            .iter()
            .map(|color| color.unwrap_or(OfflineDescriptor::null(DescriptorKind::RenderTarget)))
            .collect();
        list.push(BindCommand::SetRenderTargets { colors, depth });
    }

    fn bind_view_table(
        &mut self,
        list: &mut CommandList,
        bindings: &mut BindingState,
        stage: ShaderStage,
        kind: DescriptorKind,
        num_slots: u32,
    ) {
        self.ensure_view_capacity(list, bindings, num_slots);

        let cache = bindings.stage_cache(stage, kind);
        let handle = match self.local_view.as_mut() {
            Some(local) => {
                let reservation = local.reserve(num_slots);
                for slot in 0..num_slots {
                    let source = cache.slot(slot).unwrap_or(OfflineDescriptor::null(kind));
                    local.copy_descriptor(reservation.first_slot + slot, source);
                }
                local.handle_for(reservation.first_slot)
            }
            None => {
                let reservation = self.sub_allocated.reserve(num_slots);
                for slot in 0..num_slots {
                    let source = cache.slot(slot).unwrap_or(OfflineDescriptor::null(kind));
                    self.sub_allocated
                        .copy_descriptor(reservation.first_slot + slot, source);
                }
                self.sub_allocated.handle_for(reservation.first_slot)
            }
        };

        bindings.stage_cache_mut(stage, kind).clean_slots(num_slots);
        list.push(BindCommand::SetDescriptorTable {
            stage,
            kind,
            table: handle,
        });
        self.stats.view_tables_built += 1;
        tracing::trace!(%stage, %kind, first_slot = handle.first_slot, num_slots, "bound view table");
    }

    /// Make room for `num_slots` on the active view heap, rolling over or
    /// degrading to the local heap as needed.
    fn ensure_view_capacity(
        &mut self,
        list: &mut CommandList,
        bindings: &mut BindingState,
        num_slots: u32,
    ) {
        loop {
            let fits = match &self.local_view {
                Some(local) => local.can_reserve(num_slots),
                None => self.sub_allocated.can_reserve(num_slots),
            };
            if fits {
                return;
            }

            match self.local_view.as_mut() {
                Some(local) => {
                    // Backing-table identity changes (or re-emerges from the
                    // reclaim queue); rebind either way.
                    local.roll_over();
                    self.set_descriptor_heaps(list, bindings);
                }
                None => {
                    if !self.sub_allocated.roll_over() {
                        self.switch_to_local_view_heap();
                        self.set_descriptor_heaps(list, bindings);
                    }
                    // A fresh block keeps the pool heap's identity: no rebind.
                }
            }
        }
    }

    fn bind_sampler_table(
        &mut self,
        list: &mut CommandList,
        bindings: &mut BindingState,
        stage: ShaderStage,
        num_slots: u32,
    ) {
        let kind = DescriptorKind::Sampler;
        let key = {
            let cache = bindings.stage_cache(stage, kind);
            SamplerTableKey::from_slots(&cache.slots()[..num_slots as usize])
        };

        // Shared-heap mode serves published tables with zero heap mutation;
        // the first unpublished table forces this context onto its local
        // sampler heap for the rest of the frame.
        if self.using_shared_samplers {
            if let Some(key) = &key {
                if let Some(handle) = self.shared_snapshot.get(key).copied() {
                    bindings.stage_cache_mut(stage, kind).clean_slots(num_slots);
                    list.push(BindCommand::SetDescriptorTable {
                        stage,
                        kind,
                        table: handle,
                    });
                    return;
                }
            }
            self.switch_to_local_sampler_heap(list, bindings);
        }

        if let Some(key) = &key {
            if let Some(handle) = self.sampler_map.lookup(key) {
                // Hit: bind only. The heap is untouched and `next` does not
                // advance.
                bindings.stage_cache_mut(stage, kind).clean_slots(num_slots);
                list.push(BindCommand::SetDescriptorTable {
                    stage,
                    kind,
                    table: handle,
                });
                return;
            }
        }

        self.ensure_sampler_capacity(list, bindings, num_slots);

        let reservation = self.local_sampler.reserve(num_slots);
        if reservation.looped_around {
            // The bump pointer wrapped behind cached tables.
            self.sampler_map.reset();
        }

        let cache = bindings.stage_cache(stage, kind);
        let mut sources = Vec::with_capacity(num_slots as usize);
        for slot in 0..num_slots {
            // Unbound sampler slots get the default sampler (id 0).
            let source = cache.slot(slot).unwrap_or(OfflineDescriptor::null(kind));
            self.local_sampler
                .copy_descriptor(reservation.first_slot + slot, source);
            sources.push(source);
        }

        let handle = self.local_sampler.handle_for(reservation.first_slot);
        bindings.stage_cache_mut(stage, kind).clean_slots(num_slots);
        list.push(BindCommand::SetDescriptorTable {
            stage,
            kind,
            table: handle,
        });
        self.stats.sampler_tables_built += 1;
        tracing::trace!(%stage, first_slot = handle.first_slot, num_slots, "built sampler table");

        if let Some(key) = key {
            self.sampler_map.insert(key, handle);
            self.unique_tables.push(UniqueSamplerTable { key, sources });
        }
    }

    fn ensure_sampler_capacity(
        &mut self,
        list: &mut CommandList,
        bindings: &mut BindingState,
        num_slots: u32,
    ) {
        while !self.local_sampler.can_reserve(num_slots) {
            self.local_sampler.roll_over();
            // The reclaim queue can hand the same table straight back when
            // its fence already completed, so identity comparison alone
            // would miss that its slots are about to be rewritten. Drop the
            // map unconditionally.
            self.sampler_map.reset();
            self.set_descriptor_heaps(list, bindings);
        }
    }

    fn switch_to_local_view_heap(&mut self) {
        if self.local_view.is_some() {
            return;
        }

        // Once per context by construction: the view role never switches back.
        tracing::warn!(
            capacity = self.config.local_view_capacity,
            "descriptor block pool exhausted; this context now uses a local view heap"
        );

        let mut local = LocalHeap::new(&self.ids, self.config.local_view_capacity, HeapRole::View);
        if let Some((_, token)) = &self.current_list {
            local.set_current_command_list(token.clone());
        }
        self.local_view = Some(local);
    }

    fn switch_to_local_sampler_heap(&mut self, list: &mut CommandList, bindings: &mut BindingState) {
        if !self.using_shared_samplers {
            return;
        }
        self.using_shared_samplers = false;
        self.set_descriptor_heaps(list, bindings);
    }
}
