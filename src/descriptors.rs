//! Common vocabulary for the descriptor-table subsystem: shader stages,
//! descriptor kinds, offline descriptor records and backing-table identity.
//!
//! Everything here is deliberately backend-agnostic. An "offline" descriptor
//! is a CPU-side record owned by a resource wrapper; binding copies it into a
//! shader-visible online heap. Real device handles never appear: backing
//! tables are identified by a monotonically increasing [`TableId`] generation
//! instead of a heap address, so identity comparisons are value comparisons.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum number of constant-buffer slots in one stage's table.
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = 16;
/// Maximum number of shader-resource slots in one stage's table.
pub const MAX_SHADER_RESOURCE_SLOTS: u32 = 64;
/// Maximum number of unordered-access slots in one stage's table.
pub const MAX_UNORDERED_ACCESS_SLOTS: u32 = 16;
/// Maximum number of sampler slots in one stage's table.
pub const MAX_SAMPLER_SLOTS: u32 = 16;
/// Maximum number of simultaneously bound render targets.
pub const MAX_RENDER_TARGETS: u32 = 8;

/// Shader stages that own per-stage binding tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Pixel,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 4] = [
        ShaderStage::Vertex,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    pub const fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Geometry => 1,
            ShaderStage::Pixel => 2,
            ShaderStage::Compute => 3,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Geometry => write!(f, "geometry"),
            ShaderStage::Pixel => write!(f, "pixel"),
            ShaderStage::Compute => write!(f, "compute"),
        }
    }
}

/// The two shader-visible heap roles. Views (CBV/SRV/UAV) and samplers live
/// in separate device heaps and are bound to the command list independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapRole {
    View,
    Sampler,
}

impl fmt::Display for HeapRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapRole::View => write!(f, "view"),
            HeapRole::Sampler => write!(f, "sampler"),
        }
    }
}

/// Kinds of descriptor a resource can expose.
///
/// The first four are table kinds: they are copied into an online heap and
/// bound as contiguous descriptor tables. Render and depth targets bind their
/// offline descriptors directly and never pass through an online heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    Sampler,
    RenderTarget,
    DepthStencil,
}

impl DescriptorKind {
    /// Kinds that bind through online descriptor tables, in stage-cache order.
    pub const TABLE_KINDS: [DescriptorKind; 4] = [
        DescriptorKind::ConstantBuffer,
        DescriptorKind::ShaderResource,
        DescriptorKind::UnorderedAccess,
        DescriptorKind::Sampler,
    ];

    /// Index into per-kind arrays; table kinds only.
    pub const fn table_index(self) -> Option<usize> {
        match self {
            DescriptorKind::ConstantBuffer => Some(0),
            DescriptorKind::ShaderResource => Some(1),
            DescriptorKind::UnorderedAccess => Some(2),
            DescriptorKind::Sampler => Some(3),
            DescriptorKind::RenderTarget | DescriptorKind::DepthStencil => None,
        }
    }

    /// Which online heap a table of this kind is allocated from.
    pub const fn heap_role(self) -> Option<HeapRole> {
        match self {
            DescriptorKind::ConstantBuffer
            | DescriptorKind::ShaderResource
            | DescriptorKind::UnorderedAccess => Some(HeapRole::View),
            DescriptorKind::Sampler => Some(HeapRole::Sampler),
            DescriptorKind::RenderTarget | DescriptorKind::DepthStencil => None,
        }
    }

    /// Upper bound on the number of slots a single table of this kind spans.
    pub const fn max_slots(self) -> u32 {
        match self {
            DescriptorKind::ConstantBuffer => MAX_CONSTANT_BUFFER_SLOTS,
            DescriptorKind::ShaderResource => MAX_SHADER_RESOURCE_SLOTS,
            DescriptorKind::UnorderedAccess => MAX_UNORDERED_ACCESS_SLOTS,
            DescriptorKind::Sampler => MAX_SAMPLER_SLOTS,
            DescriptorKind::RenderTarget => MAX_RENDER_TARGETS,
            DescriptorKind::DepthStencil => 1,
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::ConstantBuffer => write!(f, "cbv"),
            DescriptorKind::ShaderResource => write!(f, "srv"),
            DescriptorKind::UnorderedAccess => write!(f, "uav"),
            DescriptorKind::Sampler => write!(f, "sampler"),
            DescriptorKind::RenderTarget => write!(f, "rtv"),
            DescriptorKind::DepthStencil => write!(f, "dsv"),
        }
    }
}

/// A CPU-side descriptor record owned by a resource wrapper.
///
/// `id == 0` is reserved for the per-kind null placeholder (and the default
/// sampler); sampler-table dedup keys rely on unbound slots mapping to id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OfflineDescriptor {
    pub kind: DescriptorKind,
    pub id: u32,
}

impl OfflineDescriptor {
    pub const fn new(kind: DescriptorKind, id: u32) -> Self {
        Self { kind, id }
    }

    /// The shared null placeholder for `kind`.
    pub const fn null(kind: DescriptorKind) -> Self {
        Self { kind, id: 0 }
    }

    pub const fn is_null(self) -> bool {
        self.id == 0
    }
}

/// Identity generation of a backing descriptor table.
///
/// Minted by [`TableIdAllocator`]; never reused, so comparing two ids by value
/// answers "is this the same shader-visible heap" without address aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub u64);

/// Process-wide source of [`TableId`]s.
///
/// Constructed once at device init and cloned into every service that creates
/// backing tables, so identities stay unique across heap kinds and contexts.
#[derive(Debug, Clone)]
pub struct TableIdAllocator {
    next: Arc<AtomicU64>,
}

impl TableIdAllocator {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_id(&self) -> TableId {
        TableId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TableIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Device-visible base handle of a bound descriptor range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuTableHandle {
    pub table: TableId,
    pub first_slot: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ids_are_unique_across_clones() {
        let ids = TableIdAllocator::new();
        let other = ids.clone();

        let a = ids.next_id();
        let b = other.next_id();
        let c = ids.next_id();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn table_kinds_cover_both_heap_roles() {
        for kind in DescriptorKind::TABLE_KINDS {
            assert!(kind.heap_role().is_some());
            assert!(kind.table_index().is_some());
            assert!(kind.max_slots() > 0);
        }
        assert_eq!(DescriptorKind::RenderTarget.heap_role(), None);
        assert_eq!(DescriptorKind::DepthStencil.heap_role(), None);
    }
}
