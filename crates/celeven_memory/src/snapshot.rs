//! # Allocator Snapshots
//!
//! Read-only diagnostic dumps of allocator state.

use std::fmt;

/// Which allocator produced a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    /// Bump allocator.
    Arena,
    /// LIFO allocator.
    Stack,
    /// Fixed-chunk allocator.
    Pool,
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Arena => "Arena",
            Self::Stack => "Stack",
            Self::Pool => "Pool",
        };
        f.write_str(name)
    }
}

/// Allocator-specific part of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotLayout {
    /// Offset-based allocators (arena and stack).
    Linear {
        /// Start of the most recent allocation (arena) or the offset before it (stack).
        prev_offset: usize,
        /// First free byte.
        curr_offset: usize,
    },
    /// Chunk-based allocators (pool).
    Chunked {
        /// Size of one chunk in bytes.
        chunk_size: usize,
        /// Number of chunks in the pool.
        chunk_count: usize,
        /// Number of chunks on the free list.
        free_chunks: usize,
    },
}

/// Point-in-time view of an allocator. Taking one never mutates the allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatorSnapshot<'l> {
    /// Caller-supplied label.
    pub label: &'l str,
    /// Allocator kind.
    pub kind: AllocatorKind,
    /// Address of the first usable byte.
    pub base_address: usize,
    /// Usable capacity in bytes.
    pub capacity: usize,
    /// Bytes in use.
    pub used: usize,
    /// Bytes still available.
    pub remaining: usize,
    /// Offsets or chunk counters.
    pub layout: SnapshotLayout,
}

impl AllocatorSnapshot<'_> {
    /// Logs the snapshot at debug level.
    pub fn emit(&self) {
        tracing::debug!(
            "[{}: {}] base={:#x} capacity={} used={} remaining={} layout={:?}",
            self.kind,
            self.label,
            self.base_address,
            self.capacity,
            self.used,
            self.remaining,
            self.layout
        );
    }
}

impl fmt::Display for AllocatorSnapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}: {}]", self.kind, self.label)?;
        writeln!(f, "- Buffer Address:      {:#x}", self.base_address)?;
        writeln!(f, "- Buffer Size:         {} bytes", self.capacity)?;
        match self.layout {
            SnapshotLayout::Linear {
                prev_offset,
                curr_offset,
            } => {
                writeln!(f, "- Previous Offset:     {prev_offset}")?;
                writeln!(f, "- Current Offset:      {curr_offset}")?;
            }
            SnapshotLayout::Chunked {
                chunk_size,
                chunk_count,
                free_chunks,
            } => {
                writeln!(f, "- Chunk Size:          {chunk_size} bytes")?;
                writeln!(f, "- Chunk Count:         {chunk_count}")?;
                writeln!(f, "- Free Chunks:         {free_chunks}")?;
            }
        }
        writeln!(f, "- Used Memory:         {} bytes", self.used)?;
        write!(f, "- Remaining Memory:    {} bytes", self.remaining)
    }
}
