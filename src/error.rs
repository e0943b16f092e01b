/// Errors produced while constructing the descriptor-heap services.
///
/// These only cover configuration validation. Runtime exhaustion of the
/// shared heaps is either absorbed (block pool) or fatal (shared sampler
/// heap); neither surfaces as a `Result`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("descriptor heap capacity must be > 0")]
    ZeroHeapCapacity,

    #[error("block pool requires at least one block")]
    ZeroBlockCount,

    #[error("block pool block size must be > 0")]
    ZeroBlockSize,

    #[error("heap capacity {capacity} cannot hold the largest descriptor table ({required} slots)")]
    HeapTooSmall { capacity: u32, required: u32 },
}
