//! # Stack Allocator
//!
//! A LIFO allocator over a caller-owned buffer.
//!
//! Every allocation is preceded by a [`StackHeader`] written into the buffer
//! itself:
//!
//! ```text
//!  prior curr_offset          user block
//!        │                        │
//!        ▼                        ▼
//!  ──────┬──────────┬────────────┬────────────────┬──────
//!   ...  │ padding  │   header   │      data      │ free
//!  ──────┴──────────┴────────────┴────────────────┴──────
//!        ◄──── header.padding ───►                ▲
//!                                            curr_offset
//! ```
//!
//! Popping the top block reads its header and restores the offset that was
//! current before it was allocated. Only the top block may be freed or
//! resized in place.

use bytemuck::{Pod, Zeroable};

use crate::align::{check_alignment, checked_padding_with_header};
use crate::allocator::{check_bounds, check_live, Allocator, Block};
use crate::config::{AllocatorConfig, MAX_STACK_ALIGNMENT};
use crate::error::{MemoryError, MemoryResult};
use crate::snapshot::{AllocatorKind, AllocatorSnapshot, SnapshotLayout};

/// Record stored immediately before each user block.
///
/// Both fields are full machine words, so the padding never truncates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct StackHeader {
    /// Distance from the prior `curr_offset` to the user block.
    padding: usize,
    /// `curr_offset` before this allocation.
    prev_offset: usize,
}

/// A LIFO allocator with in-buffer headers.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one stack per thread.
///
/// # Example
///
/// ```rust
/// use celeven_memory::{Allocator, StackAllocator};
///
/// let mut backing = [0u8; 256];
/// let mut stack = StackAllocator::new(&mut backing);
///
/// let a = stack.allocate(8).unwrap();
/// let after_a = stack.curr_offset();
/// let b = stack.allocate(8).unwrap();
///
/// stack.free(b).unwrap();
/// assert_eq!(stack.curr_offset(), after_a);
/// stack.free(a).unwrap();
/// assert_eq!(stack.curr_offset(), 0);
/// ```
pub struct StackAllocator<'buf> {
    /// The borrowed backing storage.
    buffer: &'buf mut [u8],
    /// `curr_offset` before the most recent allocation.
    prev_offset: usize,
    /// First free byte.
    curr_offset: usize,
    /// Alignment for calls without an explicit one.
    default_alignment: usize,
}

impl<'buf> StackAllocator<'buf> {
    /// Size of the header stored in front of every block.
    pub const HEADER_SIZE: usize = std::mem::size_of::<StackHeader>();

    /// Creates a stack allocator over `buffer` with the default configuration.
    #[must_use]
    pub fn new(buffer: &'buf mut [u8]) -> Self {
        tracing::debug!("stack allocator initialised over {} bytes", buffer.len());
        Self {
            buffer,
            prev_offset: 0,
            curr_offset: 0,
            default_alignment: AllocatorConfig::default().default_alignment,
        }
    }

    /// Creates a stack allocator over `buffer` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] if the config does not validate.
    pub fn with_config(buffer: &'buf mut [u8], config: &AllocatorConfig) -> MemoryResult<Self> {
        config.validate()?;
        let mut stack = Self::new(buffer);
        stack.default_alignment = config.default_alignment;
        Ok(stack)
    }

    /// `curr_offset` before the most recent allocation, or 0 after a pop.
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
            "stack out of memory: requested {} bytes at offset {} of {}",
            requested,
            self.curr_offset,
            self.buffer.len()
        );
        MemoryError::OutOfMemory {
            requested,
            remaining: self.buffer.len() - self.curr_offset,
        }
    }

    fn check_top(&self, block: Block) -> MemoryResult<()> {
        if block.end() == self.curr_offset {
            return Ok(());
        }
        tracing::error!(
            "stack block ending at {} is not the top (top is {})",
            block.end(),
            self.curr_offset
        );
        Err(MemoryError::NotTopOfStack {
            end: block.end(),
            top: self.curr_offset,
        })
    }

    /// Reads and checks the header in front of the block at `offset`.
    fn read_header(&self, offset: usize) -> MemoryResult<StackHeader> {
        let corrupt = || {
            tracing::error!("corrupt stack header in front of offset {}", offset);
            MemoryError::CorruptHeader { offset }
        };
        let start = offset.checked_sub(Self::HEADER_SIZE).ok_or_else(corrupt)?;
        let header: StackHeader =
            bytemuck::try_pod_read_unaligned(&self.buffer[start..offset]).map_err(|_| corrupt())?;

        let consistent = header.padding >= Self::HEADER_SIZE
            && header.prev_offset.checked_add(header.padding) == Some(offset);
        if consistent {
            Ok(header)
        } else {
            Err(corrupt())
        }
    }
}

impl Allocator for StackAllocator<'_> {
    #[inline]
    fn default_alignment(&self) -> usize {
        self.default_alignment
    }

    /// Alignments above [`MAX_STACK_ALIGNMENT`] are capped.
    fn allocate_aligned(&mut self, len: usize, alignment: usize) -> MemoryResult<Block> {
        check_alignment(alignment)?;
        let alignment = alignment.min(MAX_STACK_ALIGNMENT);

        let current = self.base_address() + self.curr_offset;
        let offset = checked_padding_with_header(current, alignment, Self::HEADER_SIZE)
            .and_then(|padding| self.curr_offset.checked_add(padding))
            .ok_or_else(|| self.exhausted(len))?;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| self.exhausted(len))?;

        let header = StackHeader {
            padding: offset - self.curr_offset,
            prev_offset: self.curr_offset,
        };
        self.buffer[offset - Self::HEADER_SIZE..offset]
            .copy_from_slice(bytemuck::bytes_of(&header));

        self.prev_offset = self.curr_offset;
        self.curr_offset = end;
        self.buffer[offset..end].fill(0);
        Ok(Block::new(offset, len))
    }

    /// A zero `new_len` frees the block and returns `None`. The top block is
    /// resized in place; any other live block is copied to a fresh allocation
    /// and its old space stays reserved until it is unwound.
    fn resize_aligned(
        &mut self,
        old: Option<Block>,
        new_len: usize,
        alignment: usize,
    ) -> MemoryResult<Option<Block>> {
        let Some(old) = old else {
            return self.allocate_aligned(new_len, alignment).map(Some);
        };
        if new_len == 0 {
            self.free(old)?;
            return Ok(None);
        }
        check_alignment(alignment)?;
        check_live(old, self.curr_offset, self.buffer.len())?;

        if old.end() == self.curr_offset {
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

    /// Pops the top block, restoring the offset recorded in its header.
    ///
    /// Freeing anything but the top block is rejected with
    /// [`MemoryError::NotTopOfStack`].
    fn free(&mut self, block: Block) -> MemoryResult<()> {
        check_bounds(block, self.buffer.len())?;
        self.check_top(block)?;
        let header = self.read_header(block.offset())?;

        self.curr_offset = header.prev_offset;
        self.prev_offset = 0;
        Ok(())
    }

    fn free_all(&mut self) {
        tracing::trace!("stack reset at offset {}", self.curr_offset);
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
            kind: AllocatorKind::Stack,
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
