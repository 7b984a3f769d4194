//! # Memory Error Types
//!
//! All errors that can occur in the allocators.
//!
//! Errors fall into two classes. Capacity exhaustion is an expected runtime
//! condition the caller may recover from. Everything else is a contract
//! violation: a programmer error that is reported instead of corrupting the
//! allocator's offsets or free list.

use thiserror::Error;

/// Errors that can occur in the allocators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The backing buffer has no room left for the request.
    #[error("out of memory: requested {requested} bytes, {remaining} bytes remaining")]
    OutOfMemory {
        /// Bytes requested by the caller.
        requested: usize,
        /// Bytes left between the current offset and the end of the buffer.
        remaining: usize,
    },

    /// Every chunk of the pool is currently handed out.
    #[error("pool exhausted: all {chunk_count} chunks are in use")]
    PoolExhausted {
        /// Number of chunks the pool manages.
        chunk_count: usize,
    },

    /// An alignment that is not a power of two.
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),

    /// An alignment larger than the allocator can honour.
    #[error("alignment {requested} exceeds the supported alignment of {supported}")]
    UnsupportedAlignment {
        /// Alignment requested by the caller.
        requested: usize,
        /// Largest alignment the allocator guarantees.
        supported: usize,
    },

    /// A block that does not lie inside the backing buffer.
    #[error("block at offset {offset} ({len} bytes) lies outside the {capacity}-byte buffer")]
    OutOfBounds {
        /// Offset of the block.
        offset: usize,
        /// Length of the block.
        len: usize,
        /// Length of the backing buffer.
        capacity: usize,
    },

    /// A block that lies past the allocator's live region.
    #[error("block ending at offset {end} is stale: live region ends at {live_end}")]
    StaleBlock {
        /// End offset of the block.
        end: usize,
        /// End of the live region.
        live_end: usize,
    },

    /// A stack block that is not the most recent live allocation.
    #[error("block ending at offset {end} is not the top of the stack (top is {top})")]
    NotTopOfStack {
        /// End offset of the block.
        end: usize,
        /// Current top-of-stack offset.
        top: usize,
    },

    /// The header in front of a stack block does not describe that block.
    #[error("corrupt stack header in front of offset {offset}")]
    CorruptHeader {
        /// Offset of the user block the header belongs to.
        offset: usize,
    },

    /// A free-list node points outside the pool's chunks.
    #[error("corrupt free list: node at offset {offset} links to {next}")]
    CorruptFreeList {
        /// Offset of the node being popped.
        offset: usize,
        /// The link value read from it.
        next: usize,
    },

    /// An offset inside the pool that is not on a chunk boundary.
    #[error("offset {offset} is not on a chunk boundary")]
    MisalignedChunk {
        /// Offset of the block.
        offset: usize,
    },

    /// A pool chunk returned while it is already on the free list.
    #[error("pool chunk at offset {offset} freed twice")]
    DoubleFree {
        /// Offset of the chunk.
        offset: usize,
    },

    /// A pool chunk too small to hold a free-list node.
    #[error("chunk size {chunk_size} is smaller than a free-list node ({min} bytes)")]
    ChunkTooSmall {
        /// Chunk size after alignment.
        chunk_size: usize,
        /// Minimum chunk size.
        min: usize,
    },

    /// A pool buffer that cannot hold a single chunk.
    #[error("backing buffer has {usable} usable bytes, less than one {chunk_size}-byte chunk")]
    BufferTooSmall {
        /// Usable bytes after aligning the buffer start.
        usable: usize,
        /// Chunk size after alignment.
        chunk_size: usize,
    },

    /// A pool request larger than one chunk.
    #[error("request of {requested} bytes exceeds the {chunk_size}-byte pool chunk")]
    ChunkOverflow {
        /// Bytes requested.
        requested: usize,
        /// Chunk size of the pool.
        chunk_size: usize,
    },

    /// Resize was called on the pool allocator.
    #[error("pool allocator does not support resize")]
    ResizeUnsupported,

    /// A block whose length or address does not fit the requested element type.
    #[error("block of {len} bytes cannot be viewed as `{type_name}`")]
    TypeMismatch {
        /// Name of the element type.
        type_name: &'static str,
        /// Length of the block in bytes.
        len: usize,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MemoryError {
    /// Returns true for recoverable capacity exhaustion.
    #[inline]
    #[must_use]
    pub const fn is_exhaustion(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::PoolExhausted { .. })
    }

    /// Returns true for programmer errors (bad handles, bad alignment, bad setup).
    #[inline]
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        !self.is_exhaustion() && !matches!(self, Self::InvalidConfig(_))
    }
}

/// Result type for allocator operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
