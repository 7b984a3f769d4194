//! # Pool Allocator
//!
//! Fixed-size chunk allocator for objects that are frequently allocated and freed.
//!
//! The free list is intrusive: each unused chunk stores, in its first bytes,
//! the offset of the next unused chunk. No memory outside the backing buffer
//! is needed to track free chunks.

use bytemuck::{Pod, Zeroable};

use crate::align::{check_alignment, checked_align_forward};
use crate::allocator::{Allocator, Block};
use crate::config::PoolConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::snapshot::{AllocatorKind, AllocatorSnapshot, SnapshotLayout};

/// Link value marking the end of the free list.
const END_OF_LIST: usize = usize::MAX;

/// Free-list node overlaid on the first bytes of an unused chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
struct FreeNode {
    /// Buffer offset of the next free chunk, or [`END_OF_LIST`].
    next: usize,
}

/// A pool allocator for fixed-size chunks.
///
/// Chunks are allocated in O(1) and freed in O(free chunks), but all chunks
/// have the same size. This is perfect for things like particles, network
/// packets, or temporary game objects. The most recently freed chunk is
/// handed out first.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust
/// use celeven_memory::{Allocator, PoolAllocator, PoolConfig};
///
/// let mut backing = [0u8; 1024];
/// let mut pool = PoolAllocator::new(&mut backing, PoolConfig::new(32, 8)).unwrap();
///
/// // Allocate - O(1), no heap allocation
/// let chunk = pool.allocate_chunk().unwrap();
///
/// // Free - walks the free list to reject double frees
/// pool.free(chunk).unwrap();
/// ```
pub struct PoolAllocator<'buf> {
    /// The borrowed backing storage.
    buffer: &'buf mut [u8],
    /// Offset of the first chunk (buffer start aligned to `chunk_alignment`).
    start: usize,
    /// Chunk size after rounding up to `chunk_alignment`.
    chunk_size: usize,
    /// Alignment of every chunk.
    chunk_alignment: usize,
    /// Number of whole chunks after `start`.
    chunk_count: usize,
    /// Offset of the first free chunk.
    head: Option<usize>,
    /// Length of the free list.
    free_chunks: usize,
}

impl<'buf> PoolAllocator<'buf> {
    /// Smallest chunk that can hold a free-list node.
    pub const MIN_CHUNK_SIZE: usize = std::mem::size_of::<FreeNode>();

    /// Creates a pool over `buffer` with every chunk free.
    ///
    /// The usable region starts at the first `chunk_alignment` boundary in
    /// the buffer, and the chunk size is rounded up to `chunk_alignment`.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::InvalidAlignment`] if `chunk_alignment` is not a power of two
    /// - [`MemoryError::ChunkTooSmall`] if a chunk cannot hold a free-list node
    /// - [`MemoryError::BufferTooSmall`] if the buffer cannot hold one chunk
    pub fn new(buffer: &'buf mut [u8], config: PoolConfig) -> MemoryResult<Self> {
        let PoolConfig {
            chunk_size,
            chunk_alignment,
        } = config;
        check_alignment(chunk_alignment)?;

        let chunk_size = checked_align_forward(chunk_size, chunk_alignment).unwrap_or(0);
        if chunk_size < Self::MIN_CHUNK_SIZE {
            tracing::error!(
                "pool chunk size {} cannot hold a {}-byte free node",
                chunk_size,
                Self::MIN_CHUNK_SIZE
            );
            return Err(MemoryError::ChunkTooSmall {
                chunk_size,
                min: Self::MIN_CHUNK_SIZE,
            });
        }

        let base = buffer.as_ptr() as usize;
        let start = checked_align_forward(base, chunk_alignment)
            .map(|address| address - base)
            .unwrap_or(usize::MAX);
        let usable = buffer.len().saturating_sub(start);
        if usable < chunk_size {
            tracing::error!(
                "pool buffer has {} usable bytes, less than one {}-byte chunk",
                usable,
                chunk_size
            );
            return Err(MemoryError::BufferTooSmall { usable, chunk_size });
        }

        let mut pool = Self {
            buffer,
            start,
            chunk_size,
            chunk_alignment,
            chunk_count: usable / chunk_size,
            head: None,
            free_chunks: 0,
        };
        pool.free_all();
        tracing::debug!(
            "pool initialised: {} chunks of {} bytes",
            pool.chunk_count,
            pool.chunk_size
        );
        Ok(pool)
    }

    /// Chunk size after alignment.
    #[inline]
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks the pool manages.
    #[inline]
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Number of chunks on the free list.
    #[inline]
    #[must_use]
    pub const fn free_chunks(&self) -> usize {
        self.free_chunks
    }

    /// Pops a whole zeroed chunk off the free list.
    ///
    /// # Errors
    ///
    /// [`MemoryError::PoolExhausted`] when every chunk is in use, or
    /// [`MemoryError::CorruptFreeList`] if the head node was overwritten.
    pub fn allocate_chunk(&mut self) -> MemoryResult<Block> {
        let Some(offset) = self.head else {
            tracing::debug!("pool exhausted: {} chunks in use", self.chunk_count);
            return Err(MemoryError::PoolExhausted {
                chunk_count: self.chunk_count,
            });
        };

        let node = self.read_node(offset);
        let next = self.decode_link(offset, node.next)?;
        // The list must end exactly when the count runs out.
        if next.is_some() != (self.free_chunks > 1) {
            tracing::error!(
                "pool free list length disagrees with {} free chunks",
                self.free_chunks
            );
            return Err(MemoryError::CorruptFreeList {
                offset,
                next: node.next,
            });
        }
        self.head = next;
        self.free_chunks -= 1;

        let chunk = Block::new(offset, self.chunk_size);
        self.buffer[chunk.offset()..chunk.end()].fill(0);
        Ok(chunk)
    }

    /// First byte past the last whole chunk.
    fn chunks_end(&self) -> usize {
        self.start + self.chunk_count * self.chunk_size
    }

    fn read_node(&self, offset: usize) -> FreeNode {
        bytemuck::pod_read_unaligned(&self.buffer[offset..offset + Self::MIN_CHUNK_SIZE])
    }

    /// Turns a stored link back into a chunk offset, rejecting garbage.
    fn decode_link(&self, offset: usize, next: usize) -> MemoryResult<Option<usize>> {
        if next == END_OF_LIST {
            return Ok(None);
        }
        let on_boundary = next >= self.start
            && next < self.chunks_end()
            && (next - self.start) % self.chunk_size == 0;
        if on_boundary {
            Ok(Some(next))
        } else {
            tracing::error!("pool free node at {} links to {}", offset, next);
            Err(MemoryError::CorruptFreeList { offset, next })
        }
    }

    /// Returns true if the chunk at `offset` is already on the free list.
    fn is_free(&self, offset: usize) -> MemoryResult<bool> {
        let mut cursor = self.head;
        for _ in 0..self.free_chunks {
            let Some(node) = cursor else {
                break;
            };
            if node == offset {
                return Ok(true);
            }
            cursor = self.decode_link(node, self.read_node(node).next)?;
        }
        Ok(false)
    }

    /// Pushes the chunk at `offset` onto the free list.
    fn push(&mut self, offset: usize) {
        let node = FreeNode {
            next: self.head.unwrap_or(END_OF_LIST),
        };
        self.buffer[offset..offset + Self::MIN_CHUNK_SIZE]
            .copy_from_slice(bytemuck::bytes_of(&node));
        self.head = Some(offset);
        self.free_chunks += 1;
    }

    /// Rejects blocks that are not a whole chunk of this pool.
    fn check_chunk(&self, block: Block) -> MemoryResult<()> {
        if block.offset() < self.start || block.offset() >= self.chunks_end() {
            tracing::error!(
                "block at offset {} is outside the pool's chunks",
                block.offset()
            );
            return Err(MemoryError::OutOfBounds {
                offset: block.offset(),
                len: block.len(),
                capacity: self.buffer.len(),
            });
        }
        if (block.offset() - self.start) % self.chunk_size != 0 || block.len() > self.chunk_size {
            tracing::error!("block at offset {} is not a pool chunk", block.offset());
            return Err(MemoryError::MisalignedChunk {
                offset: block.offset(),
            });
        }
        Ok(())
    }
}

impl Allocator for PoolAllocator<'_> {
    /// Chunks are aligned to the pool's chunk alignment.
    #[inline]
    fn default_alignment(&self) -> usize {
        self.chunk_alignment
    }

    /// Hands out one chunk and returns a block covering the first `len` bytes.
    fn allocate_aligned(&mut self, len: usize, alignment: usize) -> MemoryResult<Block> {
        check_alignment(alignment)?;
        if alignment > self.chunk_alignment {
            tracing::error!(
                "pool cannot honour alignment {} (chunks are {}-aligned)",
                alignment,
                self.chunk_alignment
            );
            return Err(MemoryError::UnsupportedAlignment {
                requested: alignment,
                supported: self.chunk_alignment,
            });
        }
        if len > self.chunk_size {
            tracing::error!(
                "pool request of {} bytes exceeds the {}-byte chunk",
                len,
                self.chunk_size
            );
            return Err(MemoryError::ChunkOverflow {
                requested: len,
                chunk_size: self.chunk_size,
            });
        }
        let chunk = self.allocate_chunk()?;
        Ok(Block::new(chunk.offset(), len))
    }

    /// Pools hand out fixed-size chunks; resizing is always rejected.
    fn resize_aligned(
        &mut self,
        _old: Option<Block>,
        _new_len: usize,
        _alignment: usize,
    ) -> MemoryResult<Option<Block>> {
        tracing::error!("resize called on a pool allocator");
        Err(MemoryError::ResizeUnsupported)
    }

    /// Pushes the chunk back on the free list; it is the next one handed out.
    ///
    /// A chunk that is already on the free list is rejected as a double
    /// free. The check walks the list, so `free` is O(free chunks).
    fn free(&mut self, block: Block) -> MemoryResult<()> {
        self.check_chunk(block)?;
        if self.free_chunks == self.chunk_count || self.is_free(block.offset())? {
            tracing::error!("pool chunk at offset {} freed twice", block.offset());
            return Err(MemoryError::DoubleFree {
                offset: block.offset(),
            });
        }
        self.push(block.offset());
        Ok(())
    }

    /// Rebuilds the free list over every chunk, last to first, so chunk 0
    /// is handed out first.
    fn free_all(&mut self) {
        tracing::trace!("pool reset: {} chunks", self.chunk_count);
        self.head = None;
        self.free_chunks = 0;
        for index in (0..self.chunk_count).rev() {
            self.push(self.start + index * self.chunk_size);
        }
    }

    fn bytes(&self, block: Block) -> MemoryResult<&[u8]> {
        self.check_chunk(block)?;
        Ok(&self.buffer[block.offset()..block.end()])
    }

    fn bytes_mut(&mut self, block: Block) -> MemoryResult<&mut [u8]> {
        self.check_chunk(block)?;
        Ok(&mut self.buffer[block.offset()..block.end()])
    }

    /// Address of the first chunk.
    #[inline]
    fn base_address(&self) -> usize {
        self.buffer.as_ptr() as usize + self.start
    }

    /// Bytes covered by whole chunks.
    #[inline]
    fn capacity(&self) -> usize {
        self.chunk_count * self.chunk_size
    }

    #[inline]
    fn used(&self) -> usize {
        self.chunk_count.saturating_sub(self.free_chunks) * self.chunk_size
    }

    /// Blocks are offsets into the backing buffer, so this includes the
    /// alignment gap in front of the first chunk.
    fn address_of(&self, block: Block) -> usize {
        self.buffer.as_ptr() as usize + block.offset()
    }

    fn debug_snapshot<'l>(&self, label: &'l str) -> AllocatorSnapshot<'l> {
        AllocatorSnapshot {
            label,
            kind: AllocatorKind::Pool,
            base_address: self.base_address(),
            capacity: self.capacity(),
            used: self.used(),
            remaining: self.remaining(),
            layout: SnapshotLayout::Chunked {
                chunk_size: self.chunk_size,
                chunk_count: self.chunk_count,
                free_chunks: self.free_chunks,
            },
        }
    }
}
