//! `descriptor-cache` implements shader-visible descriptor-table allocation
//! and caching for D3D12-style renderers.
//!
//! Per-draw binding requests become contiguous, device-visible descriptor
//! ranges bound to a command list. The crate provides:
//! - A family of bump-allocating online heaps: a pool-backed per-context view
//!   heap (see [`SubAllocatedHeap`]), a ring-allocating context-local heap
//!   with fence-gated recycling (see [`LocalHeap`]), and the process-wide
//!   sampler heap (see [`SharedSamplerHeap`]).
//! - Deduplication of sampler tables by exact identity sequence (see
//!   [`SamplerMap`]), with once-per-frame publication of newly discovered
//!   tables into the shared heap.
//! - The per-context [`DescriptorCache`] orchestrating dirty-slot state,
//!   heap selection and rollover, copy-and-bind, and heap-change rebinds.
//!
//! Nothing here ever blocks on device completion: fences are polled through
//! [`CompletionToken`]s, and allocation that would need still-in-flight
//! storage grows or degrades instead of waiting. Contexts are single-threaded;
//! the only cross-context lock is the block pool's allocate/free (plus the
//! frame-boundary sampler publication).

mod block_pool;
mod command_list;
mod descriptor_cache;
mod descriptors;
mod error;
mod fence;
mod local_heap;
mod online_heap;
mod sampler_map;
mod shared_heap;
mod stage_cache;
mod sub_allocated_heap;

#[cfg(test)]
mod tests;

pub use block_pool::{DescriptorBlockPool, HeapBlock};
pub use command_list::{BindCommand, CommandList, CommandListId};
pub use descriptor_cache::{DescriptorCache, DescriptorCacheConfig, DescriptorCacheStats};
pub use descriptors::{
    DescriptorKind, GpuTableHandle, HeapRole, OfflineDescriptor, ShaderStage, TableId,
    TableIdAllocator, MAX_CONSTANT_BUFFER_SLOTS, MAX_RENDER_TARGETS, MAX_SAMPLER_SLOTS,
    MAX_SHADER_RESOURCE_SLOTS, MAX_UNORDERED_ACCESS_SLOTS,
};
pub use error::ConfigError;
pub use fence::{CompletionToken, FenceTimeline};
pub use local_heap::LocalHeap;
pub use online_heap::{DescriptorTable, OnlineHeapState, Reservation};
pub use sampler_map::{
    CacheStats, SamplerMap, SamplerTableKey, UniqueSamplerTable, MAX_SAMPLER_TABLE_SIZE,
};
pub use shared_heap::{SamplerTableSet, SharedSamplerHeap};
pub use stage_cache::{BindingState, SlotMask, StageSlotCache};
pub use sub_allocated_heap::SubAllocatedHeap;
