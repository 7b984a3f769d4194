//! # Allocator Surface
//!
//! The handle type and the operations shared by every allocator.

use bytemuck::Pod;

use crate::error::{MemoryError, MemoryResult};
use crate::snapshot::AllocatorSnapshot;

/// Handle to a region handed out by an allocator.
///
/// A block is an `{offset, len}` pair relative to the start of the backing
/// buffer of the allocator that produced it. Only allocators create blocks.
/// Passing a block to a different allocator is out of contract; it is caught
/// by bounds checks only when the block falls outside that allocator's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    offset: usize,
    len: usize,
}

impl Block {
    #[inline]
    pub(crate) const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Offset of the first byte from the start of the backing buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true for zero-length blocks.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset one past the last byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Operations shared by the arena, stack and pool allocators.
///
/// Every allocator borrows a caller-owned buffer for its whole lifetime and
/// never grows, frees or replaces it. Failed operations leave the allocator
/// state exactly as it was.
pub trait Allocator {
    /// Alignment used by [`Allocator::allocate`] and [`Allocator::resize`].
    fn default_alignment(&self) -> usize;

    /// Allocates `len` zeroed bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// Capacity exhaustion when the buffer cannot hold the request, or a
    /// contract violation for an invalid alignment.
    fn allocate_aligned(&mut self, len: usize, alignment: usize) -> MemoryResult<Block>;

    /// Allocates `len` zeroed bytes at the default alignment.
    ///
    /// # Errors
    ///
    /// See [`Allocator::allocate_aligned`].
    fn allocate(&mut self, len: usize) -> MemoryResult<Block> {
        self.allocate_aligned(len, self.default_alignment())
    }

    /// Resizes `old` to `new_len` bytes.
    ///
    /// `None` behaves like an allocation. Returns `None` only when the
    /// allocator released the block instead of resizing it.
    ///
    /// # Errors
    ///
    /// Capacity exhaustion, or a contract violation for a block that does
    /// not belong to this allocator's live region.
    fn resize_aligned(
        &mut self,
        old: Option<Block>,
        new_len: usize,
        alignment: usize,
    ) -> MemoryResult<Option<Block>>;

    /// Resizes `old` at the default alignment.
    ///
    /// # Errors
    ///
    /// See [`Allocator::resize_aligned`].
    fn resize(&mut self, old: Option<Block>, new_len: usize) -> MemoryResult<Option<Block>> {
        self.resize_aligned(old, new_len, self.default_alignment())
    }

    /// Returns a block to the allocator.
    ///
    /// # Errors
    ///
    /// A contract violation for blocks the allocator cannot take back.
    fn free(&mut self, block: Block) -> MemoryResult<()>;

    /// Drops every allocation at once.
    fn free_all(&mut self);

    /// Reads the bytes of a live block.
    ///
    /// # Errors
    ///
    /// A contract violation for blocks outside the live region.
    fn bytes(&self, block: Block) -> MemoryResult<&[u8]>;

    /// Writes the bytes of a live block.
    ///
    /// # Errors
    ///
    /// A contract violation for blocks outside the live region.
    fn bytes_mut(&mut self, block: Block) -> MemoryResult<&mut [u8]>;

    /// Address of the first byte the allocator hands out.
    fn base_address(&self) -> usize;

    /// Bytes the allocator can hand out in total.
    fn capacity(&self) -> usize;

    /// Bytes currently consumed, padding and headers included.
    fn used(&self) -> usize;

    /// Bytes still available.
    fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Absolute address of a block.
    fn address_of(&self, block: Block) -> usize {
        self.base_address() + block.offset()
    }

    /// Read-only diagnostic view of the allocator.
    fn debug_snapshot<'l>(&self, label: &'l str) -> AllocatorSnapshot<'l>;

    /// Allocates room for `count` values of `T` at `T`'s alignment.
    ///
    /// # Errors
    ///
    /// See [`Allocator::allocate_aligned`].
    fn alloc_slice<T: Pod>(&mut self, count: usize) -> MemoryResult<Block>
    where
        Self: Sized,
    {
        let Some(len) = std::mem::size_of::<T>().checked_mul(count) else {
            return Err(MemoryError::OutOfMemory {
                requested: usize::MAX,
                remaining: self.remaining(),
            });
        };
        self.allocate_aligned(len, std::mem::align_of::<T>())
    }

    /// Views a live block as a slice of `T`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::TypeMismatch`] when the block's length is not a multiple
    /// of `size_of::<T>()` or its address is not aligned for `T`.
    fn typed_mut<T: Pod>(&mut self, block: Block) -> MemoryResult<&mut [T]>
    where
        Self: Sized,
    {
        let bytes = self.bytes_mut(block)?;
        bytemuck::try_cast_slice_mut(bytes).map_err(|_| MemoryError::TypeMismatch {
            type_name: std::any::type_name::<T>(),
            len: block.len(),
        })
    }
}

/// Rejects blocks that reach past the end of a `capacity`-byte buffer.
pub(crate) fn check_bounds(block: Block, capacity: usize) -> MemoryResult<()> {
    let inside = block
        .offset
        .checked_add(block.len)
        .is_some_and(|end| end <= capacity);
    if inside {
        Ok(())
    } else {
        tracing::error!(
            "block at offset {} ({} bytes) is outside the {}-byte buffer",
            block.offset,
            block.len,
            capacity
        );
        Err(MemoryError::OutOfBounds {
            offset: block.offset,
            len: block.len,
            capacity,
        })
    }
}

/// Rejects blocks outside `[0, live_end)` of a linear allocator.
pub(crate) fn check_live(block: Block, live_end: usize, capacity: usize) -> MemoryResult<()> {
    check_bounds(block, capacity)?;
    if block.end() > live_end {
        tracing::error!(
            "block ending at {} is past the live region ending at {}",
            block.end(),
            live_end
        );
        return Err(MemoryError::StaleBlock {
            end: block.end(),
            live_end,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_accessors() {
        let block = Block::new(16, 8);
        assert_eq!(block.offset(), 16);
        assert_eq!(block.len(), 8);
        assert_eq!(block.end(), 24);
        assert!(!block.is_empty());
        assert!(Block::new(4, 0).is_empty());
    }

    #[test]
    fn test_check_bounds() {
        assert!(check_bounds(Block::new(0, 64), 64).is_ok());
        assert!(check_bounds(Block::new(64, 0), 64).is_ok());
        assert_eq!(
            check_bounds(Block::new(60, 8), 64),
            Err(MemoryError::OutOfBounds {
                offset: 60,
                len: 8,
                capacity: 64,
            })
        );
        assert!(check_bounds(Block::new(usize::MAX, 2), 64).is_err());
    }

    #[test]
    fn test_check_live() {
        assert!(check_live(Block::new(0, 10), 10, 64).is_ok());
        assert_eq!(
            check_live(Block::new(0, 12), 10, 64),
            Err(MemoryError::StaleBlock {
                end: 12,
                live_end: 10,
            })
        );
    }
}
