//! Cross-module scenario tests for the descriptor cache.
//!
//! Module-local behavior (heap arithmetic, fences, dedup keys) is covered by
//! the unit tests next to each module; these exercise whole bind flows
//! through [`DescriptorCache`].

mod binding_flow;

use std::sync::Arc;

use crate::{
    BindCommand, BindingState, CommandList, DescriptorBlockPool, DescriptorCache,
    DescriptorCacheConfig, DescriptorKind, FenceTimeline, GpuTableHandle, OfflineDescriptor,
    SharedSamplerHeap, TableIdAllocator,
};

/// The process-wide services one device would own, plus a fence timeline to
/// drive completion from tests.
struct Harness {
    pool: Arc<DescriptorBlockPool>,
    shared_samplers: Arc<SharedSamplerHeap>,
    ids: TableIdAllocator,
    timeline: FenceTimeline,
}

impl Harness {
    fn new(block_count: u32, block_size: u32) -> Self {
        let ids = TableIdAllocator::new();
        Self {
            pool: Arc::new(DescriptorBlockPool::new(&ids, block_count, block_size).unwrap()),
            shared_samplers: Arc::new(SharedSamplerHeap::new(&ids, 256).unwrap()),
            ids,
            timeline: FenceTimeline::new(),
        }
    }

    fn cache(&self) -> DescriptorCache {
        self.cache_with(DescriptorCacheConfig::default())
    }

    fn cache_with(&self, config: DescriptorCacheConfig) -> DescriptorCache {
        DescriptorCache::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.shared_samplers),
            self.ids.clone(),
            config,
        )
        .unwrap()
    }

    fn open_list(&self) -> CommandList {
        CommandList::open(&self.timeline)
    }

    /// Attach a fresh command list to `cache` and return it.
    fn attach_list(&self, cache: &mut DescriptorCache, bindings: &mut BindingState) -> CommandList {
        let mut list = self.open_list();
        cache.set_current_command_list(&mut list, bindings);
        list
    }
}

fn srv(id: u32) -> Option<OfflineDescriptor> {
    Some(OfflineDescriptor::new(DescriptorKind::ShaderResource, id))
}

fn sampler(id: u32) -> Option<OfflineDescriptor> {
    Some(OfflineDescriptor::new(DescriptorKind::Sampler, id))
}

fn heap_set_count(list: &CommandList) -> usize {
    list.commands()
        .iter()
        .filter(|command| matches!(command, BindCommand::SetDescriptorHeaps { .. }))
        .count()
}

fn table_bind_count(list: &CommandList) -> usize {
    list.commands()
        .iter()
        .filter(|command| matches!(command, BindCommand::SetDescriptorTable { .. }))
        .count()
}

/// Handle of the most recent table bind on `list`.
fn last_bound_table(list: &CommandList) -> GpuTableHandle {
    list.commands()
        .iter()
        .rev()
        .find_map(|command| match command {
            BindCommand::SetDescriptorTable { table, .. } => Some(*table),
            _ => None,
        })
        .expect("no table was bound")
}
