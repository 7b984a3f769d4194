//! # Arena Allocator
//!
//! A bump allocator over a caller-owned buffer. Blocks are freed all at once.

use crate::align::{check_alignment, checked_align_forward};
use crate::allocator::{check_live, Allocator, Block};
use crate::config::AllocatorConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::snapshot::{AllocatorKind, AllocatorSnapshot, SnapshotLayout};

/// A bump-pointer arena allocator.
///
/// Allocations are fast (just bump an offset). Individual blocks cannot be
/// freed; [`Allocator::free_all`] drops everything at once. The most recent
/// allocation can be grown or shrunk in place.
///
/// Invariant: `prev_offset <= curr_offset <= buffer.len()`.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Use one arena per thread.
///
/// # Example
///
/// ```rust
/// use celeven_memory::{Allocator, Arena};
///
/// let mut backing = [0u8; 1024];
/// let mut arena = Arena::new(&mut backing);
///
/// let block = arena.allocate(100).unwrap();
/// arena.bytes_mut(block).unwrap()[0] = 7;
///
/// // Reset to free all allocations
/// arena.free_all();
/// assert_eq!(arena.used(), 0);
/// ```
pub struct Arena<'buf> {
    /// The borrowed backing storage.
    buffer: &'buf mut [u8],
    /// Start of the most recent allocation.
    prev_offset: usize,
    /// First free byte.
    curr_offset: usize,
    /// Alignment for calls without an explicit one.
    default_alignment: usize,
}

impl<'buf> Arena<'buf> {
    /// Creates an arena over `buffer` with the default configuration.
    #[must_use]
    pub fn new(buffer: &'buf mut [u8]) -> Self {
        tracing::debug!("arena initialised over {} bytes", buffer.len());
        Self {
            buffer,
            prev_offset: 0,
            curr_offset: 0,
            default_alignment: AllocatorConfig::default().default_alignment,
        }
    }

    /// Creates an arena over `buffer` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] if the config does not validate.
    pub fn with_config(buffer: &'buf mut [u8], config: &AllocatorConfig) -> MemoryResult<Self> {
        config.validate()?;
        let mut arena = Self::new(buffer);
        arena.default_alignment = config.default_alignment;
        Ok(arena)
    }

    /// Start of the most recent allocation.
    #[inline]
    #[must_use]
    pub const fn prev_offset(&self) -> usize {
        self.prev_offset
    }

    /// First free byte.
    #[inline]
    #[must_use]
    pub const fn curr_offset(&self) -> usize {
        self.curr_offset
    }

    fn exhausted(&self, requested: usize) -> MemoryError {
        tracing::debug!(
            "arena out of memory: requested {} bytes at offset {} of {}",
            requested,
            self.curr_offset,
            self.buffer.len()
        );
        MemoryError::OutOfMemory {
            requested,
            remaining: self.buffer.len() - self.curr_offset,
        }
    }

    /// Returns true if `block` is the most recent allocation and still spans
    /// up to the current offset.
    fn is_last(&self, block: Block) -> bool {
        block.offset() == self.prev_offset && block.end() == self.curr_offset
    }
}

impl Allocator for Arena<'_> {
    #[inline]
    fn default_alignment(&self) -> usize {
        self.default_alignment
    }

    fn allocate_aligned(&mut self, len: usize, alignment: usize) -> MemoryResult<Block> {
        check_alignment(alignment)?;

        let base = self.base_address();
        let offset = checked_align_forward(base + self.curr_offset, alignment)
            .map(|address| address - base)
            .ok_or_else(|| self.exhausted(len))?;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| self.exhausted(len))?;

        self.prev_offset = offset;
        self.curr_offset = end;

        // Zero new memory; earlier cycles may have left data behind.
        self.buffer[offset..end].fill(0);
        Ok(Block::new(offset, len))
    }

    fn resize_aligned(
        &mut self,
        old: Option<Block>,
        new_len: usize,
        alignment: usize,
    ) -> MemoryResult<Option<Block>> {
        let Some(old) = old.filter(|block| !block.is_empty()) else {
            return self.allocate_aligned(new_len, alignment).map(Some);
        };
        check_alignment(alignment)?;
        check_live(old, self.curr_offset, self.buffer.len())?;

        let aligned_in_place = self.address_of(old) & (alignment - 1) == 0;
        if self.is_last(old) && aligned_in_place {
            let end = old
                .offset()
                .checked_add(new_len)
                .filter(|&end| end <= self.buffer.len())
                .ok_or_else(|| self.exhausted(new_len - old.len()))?;
            if new_len > old.len() {
                self.buffer[old.end()..end].fill(0);
            }
            self.curr_offset = end;
            return Ok(Some(Block::new(old.offset(), new_len)));
        }

        let block = self.allocate_aligned(new_len, alignment)?;
        let copy_len = old.len().min(new_len);
        self.buffer
            .copy_within(old.offset()..old.offset() + copy_len, block.offset());
        Ok(Some(block))
    }

    /// Individual blocks are never freed; this is a no-op.
    fn free(&mut self, _block: Block) -> MemoryResult<()> {
        Ok(())
    }

    /// Resets both offsets to zero. Buffer contents are left as they are.
    fn free_all(&mut self) {
        tracing::trace!("arena reset at offset {}", self.curr_offset);
        self.prev_offset = 0;
        self.curr_offset = 0;
    }

    fn bytes(&self, block: Block) -> MemoryResult<&[u8]> {
        check_live(block, self.curr_offset, self.buffer.len())?;
        Ok(&self.buffer[block.offset()..block.end()])
    }

    fn bytes_mut(&mut self, block: Block) -> MemoryResult<&mut [u8]> {
        check_live(block, self.curr_offset, self.buffer.len())?;
        Ok(&mut self.buffer[block.offset()..block.end()])
    }

    #[inline]
    fn base_address(&self) -> usize {
        self.buffer.as_ptr() as usize
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    fn used(&self) -> usize {
        self.curr_offset
    }

    fn debug_snapshot<'l>(&self, label: &'l str) -> AllocatorSnapshot<'l> {
        AllocatorSnapshot {
            label,
            kind: AllocatorKind::Arena,
            base_address: self.base_address(),
            capacity: self.capacity(),
            used: self.used(),
            remaining: self.remaining(),
            layout: SnapshotLayout::Linear {
                prev_offset: self.prev_offset,
                curr_offset: self.curr_offset,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(64))]
    struct Backing([u8; 256]);

    impl Backing {
        fn new() -> Self {
            Self([0; 256])
        }
    }

    #[test]
    fn test_arena_allocation() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let block = arena.allocate(10).unwrap();
        assert_eq!(block.offset(), 0);
        assert_eq!(block.len(), 10);
        assert_eq!(arena.curr_offset(), 10);
        assert_eq!(arena.prev_offset(), 0);
    }

    #[test]
    fn test_arena_alignment() {
        let mut backing = Backing::new();
        let config = AllocatorConfig::with_alignment(8);
        let mut arena = Arena::with_config(&mut backing.0, &config).unwrap();

        let _ = arena.allocate(10).unwrap();
        let block = arena.allocate_aligned(10, 16).unwrap();
        assert_eq!(block.offset(), 16);
        assert_eq!(arena.curr_offset(), 26);
        assert_eq!(arena.address_of(block) % 16, 0);

        let block = arena.allocate(1).unwrap();
        assert_eq!(block.offset(), 32);
    }

    #[test]
    fn test_arena_zeroes_reused_memory() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let block = arena.allocate(32).unwrap();
        arena.bytes_mut(block).unwrap().fill(0xAB);

        arena.free_all();
        let block = arena.allocate(32).unwrap();
        assert!(arena.bytes(block).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_arena_out_of_memory_leaves_state() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let _ = arena.allocate(200).unwrap();

        let err = arena.allocate(100).unwrap_err();
        assert_eq!(
            err,
            MemoryError::OutOfMemory {
                requested: 100,
                remaining: 56,
            }
        );
        assert_eq!(arena.curr_offset(), 200);
        assert_eq!(arena.prev_offset(), 0);
    }

    #[test]
    fn test_arena_exact_fit() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        assert!(arena.allocate(256).is_ok());
        assert_eq!(arena.remaining(), 0);
        assert!(arena.allocate(1).unwrap_err().is_exhaustion());
        // Zero-length requests still fit at the end.
        assert!(arena.allocate_aligned(0, 1).is_ok());
    }

    #[test]
    fn test_arena_rejects_bad_alignment() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        assert_eq!(
            arena.allocate_aligned(8, 3),
            Err(MemoryError::InvalidAlignment(3))
        );
        assert_eq!(arena.curr_offset(), 0);
    }

    #[test]
    fn test_arena_resize_in_place() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let _ = arena.allocate(8).unwrap();
        let block = arena.allocate(16).unwrap();
        arena.bytes_mut(block).unwrap().fill(0xFF);

        let grown = arena.resize(Some(block), 40).unwrap().unwrap();
        assert_eq!(grown.offset(), block.offset());
        assert_eq!(arena.curr_offset(), block.offset() + 40);
        let bytes = arena.bytes(grown).unwrap();
        assert!(bytes[..16].iter().all(|&b| b == 0xFF));
        assert!(bytes[16..].iter().all(|&b| b == 0));

        let shrunk = arena.resize(Some(grown), 4).unwrap().unwrap();
        assert_eq!(shrunk.offset(), block.offset());
        assert_eq!(arena.curr_offset(), block.offset() + 4);
    }

    #[test]
    fn test_arena_resize_earlier_block_moves() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let first = arena.allocate(8).unwrap();
        arena.bytes_mut(first).unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let _second = arena.allocate(8).unwrap();

        let moved = arena.resize(Some(first), 4).unwrap().unwrap();
        assert_ne!(moved.offset(), first.offset());
        assert_eq!(arena.bytes(moved).unwrap(), &[1, 2, 3, 4]);

        let moved = arena.resize(Some(first), 12).unwrap().unwrap();
        assert_eq!(
            arena.bytes(moved).unwrap(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_arena_resize_none_allocates() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let block = arena.resize(None, 12).unwrap().unwrap();
        assert_eq!(block.len(), 12);
        assert_eq!(arena.curr_offset(), 12);
    }

    #[test]
    fn test_arena_resize_in_place_out_of_memory() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let block = arena.allocate(200).unwrap();
        let err = arena.resize(Some(block), 300).unwrap_err();
        assert!(err.is_exhaustion());
        assert_eq!(arena.curr_offset(), 200);
    }

    #[test]
    fn test_arena_stale_block_rejected() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let block = arena.allocate(32).unwrap();
        arena.free_all();
        assert!(matches!(
            arena.bytes(block),
            Err(MemoryError::StaleBlock { .. })
        ));
    }

    #[test]
    fn test_arena_free_is_noop() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let block = arena.allocate(32).unwrap();
        arena.free(block).unwrap();
        assert_eq!(arena.used(), 32);
    }

    #[test]
    fn test_arena_snapshot() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let _ = arena.allocate(10).unwrap();
        let snapshot = arena.debug_snapshot("frame");
        assert_eq!(snapshot.kind, AllocatorKind::Arena);
        assert_eq!(snapshot.capacity, 256);
        assert_eq!(snapshot.used, 10);
        assert_eq!(snapshot.remaining, 246);
        assert_eq!(
            snapshot.layout,
            SnapshotLayout::Linear {
                prev_offset: 0,
                curr_offset: 10,
            }
        );
        // Taking a snapshot does not touch the arena.
        assert_eq!(arena.curr_offset(), 10);
    }

    #[test]
    fn test_arena_typed_slice() {
        let mut backing = Backing::new();
        let mut arena = Arena::new(&mut backing.0);
        let _ = arena.allocate_aligned(1, 1).unwrap();
        let block = arena.alloc_slice::<u32>(4).unwrap();
        assert_eq!(arena.address_of(block) % 4, 0);
        let values = arena.typed_mut::<u32>(block).unwrap();
        values.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(arena.bytes(block).unwrap().len(), 16);
    }
}
