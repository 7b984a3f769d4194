//! # CELEVEN Memory
//!
//! Region allocators over fixed, caller-owned buffers:
//! - **Arena**: bump allocation, bulk reset, in-place resize of the last block
//! - **Stack**: LIFO allocation with a header in front of every block
//! - **Pool**: fixed-size chunks threaded on an intrusive free list
//!
//! ## Architecture Rules
//!
//! 1. **Borrow, never own** - Every allocator borrows its buffer for its whole
//!    lifetime and never grows, frees or replaces it
//! 2. **Handles, not pointers** - Allocations are [`Block`] offsets, so every
//!    access is bounds-checked and no `unsafe` is needed
//! 3. **Fail without corrupting** - A failed call leaves offsets and the free
//!    list exactly as they were
//!
//! ## Thread Safety
//!
//! None of the allocators are thread-safe. Use one allocator per thread, or
//! synchronize externally.
//!
//! ## Example
//!
//! ```rust
//! use celeven_memory::{Allocator, Arena};
//!
//! let mut backing = [0u8; 4096];
//! let mut arena = Arena::new(&mut backing);
//!
//! let block = arena.alloc_slice::<f32>(16).unwrap();
//! arena.typed_mut::<f32>(block).unwrap()[0] = 1.5;
//!
//! arena.free_all();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod align;
pub mod allocator;
pub mod arena;
pub mod config;
pub mod context;
pub mod error;
pub mod pool;
pub mod snapshot;
pub mod stack;

pub use allocator::{Allocator, Block};
pub use arena::Arena;
pub use config::{AllocatorConfig, MemoryConfig, PoolConfig, DEFAULT_ALIGNMENT, MAX_STACK_ALIGNMENT};
pub use context::MemoryContext;
pub use error::{MemoryError, MemoryResult};
pub use pool::PoolAllocator;
pub use snapshot::{AllocatorKind, AllocatorSnapshot, SnapshotLayout};
pub use stack::StackAllocator;
