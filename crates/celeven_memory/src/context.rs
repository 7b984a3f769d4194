//! # Memory Context
//!
//! The pair of arenas an application threads through its call graph:
//! a transient arena reset every frame and a persistent arena that lives
//! as long as the application.
//!
//! ```rust
//! use celeven_memory::{Allocator, AllocatorConfig, MemoryContext};
//!
//! let mut scratch = vec![0u8; 4096];
//! let mut long_lived = vec![0u8; 4096];
//! let mut memory =
//!     MemoryContext::new(&mut scratch, &mut long_lived, &AllocatorConfig::default()).unwrap();
//!
//! let names = memory.persistent_mut().allocate(64).unwrap();
//! let _frame_data = memory.transient_mut().allocate(1024).unwrap();
//!
//! memory.reset_transient();
//! assert_eq!(memory.transient().used(), 0);
//! assert!(memory.persistent().bytes(names).is_ok());
//! ```

use crate::allocator::Allocator;
use crate::arena::Arena;
use crate::config::{AllocatorConfig, MemoryConfig};
use crate::error::{MemoryError, MemoryResult};
use crate::snapshot::AllocatorSnapshot;

/// Transient and persistent arenas over two caller-owned buffers.
pub struct MemoryContext<'buf> {
    transient: Arena<'buf>,
    persistent: Arena<'buf>,
    resets: u64,
}

impl<'buf> MemoryContext<'buf> {
    /// Creates a context over two buffers.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`](crate::MemoryError::InvalidConfig) if
    /// the config does not validate.
    pub fn new(
        transient: &'buf mut [u8],
        persistent: &'buf mut [u8],
        config: &AllocatorConfig,
    ) -> MemoryResult<Self> {
        Ok(Self {
            transient: Arena::with_config(transient, config)?,
            persistent: Arena::with_config(persistent, config)?,
            resets: 0,
        })
    }

    /// Creates a context sized by a [`MemoryConfig`].
    ///
    /// Each arena uses the first `transient_bytes` / `persistent_bytes` of
    /// its buffer.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] if the config does not validate or a
    /// buffer is shorter than its configured size.
    pub fn from_config(
        transient: &'buf mut [u8],
        persistent: &'buf mut [u8],
        config: &MemoryConfig,
    ) -> MemoryResult<Self> {
        config.validate()?;
        let transient_len = transient.len();
        let persistent_len = persistent.len();
        let (Some(transient), Some(persistent)) = (
            transient.get_mut(..config.transient_bytes),
            persistent.get_mut(..config.persistent_bytes),
        ) else {
            return Err(MemoryError::InvalidConfig(format!(
                "buffers of {transient_len}/{persistent_len} bytes are below the configured {}/{}",
                config.transient_bytes, config.persistent_bytes
            )));
        };
        Self::new(transient, persistent, &config.allocator)
    }

    /// The per-frame scratch arena.
    #[inline]
    #[must_use]
    pub const fn transient(&self) -> &Arena<'buf> {
        &self.transient
    }

    /// Mutable access to the per-frame scratch arena.
    #[inline]
    pub fn transient_mut(&mut self) -> &mut Arena<'buf> {
        &mut self.transient
    }

    /// The long-lived arena.
    #[inline]
    #[must_use]
    pub const fn persistent(&self) -> &Arena<'buf> {
        &self.persistent
    }

    /// Mutable access to the long-lived arena.
    #[inline]
    pub fn persistent_mut(&mut self) -> &mut Arena<'buf> {
        &mut self.persistent
    }

    /// Drops every transient allocation. Persistent allocations survive.
    pub fn reset_transient(&mut self) {
        self.transient.free_all();
        self.resets += 1;
    }

    /// Number of transient resets so far.
    #[inline]
    #[must_use]
    pub const fn resets(&self) -> u64 {
        self.resets
    }

    /// Snapshots of the transient and persistent arenas, in that order.
    #[must_use]
    pub fn snapshots(&self) -> [AllocatorSnapshot<'static>; 2] {
        [
            self.transient.debug_snapshot("transient"),
            self.persistent.debug_snapshot("persistent"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotLayout;

    #[test]
    fn test_reset_keeps_persistent() {
        let mut scratch = [0u8; 256];
        let mut long_lived = [0u8; 256];
        let mut memory =
            MemoryContext::new(&mut scratch, &mut long_lived, &AllocatorConfig::default()).unwrap();

        let kept = memory.persistent_mut().allocate(32).unwrap();
        memory.persistent_mut().bytes_mut(kept).unwrap().fill(3);
        let _ = memory.transient_mut().allocate(100).unwrap();

        memory.reset_transient();
        assert_eq!(memory.resets(), 1);
        assert_eq!(memory.transient().used(), 0);
        assert_eq!(memory.persistent().used(), 32);
        assert!(memory.persistent().bytes(kept).unwrap().iter().all(|&b| b == 3));
    }

    #[test]
    fn test_snapshots() {
        let mut scratch = [0u8; 128];
        let mut long_lived = [0u8; 64];
        let mut memory =
            MemoryContext::new(&mut scratch, &mut long_lived, &AllocatorConfig::default()).unwrap();
        let _ = memory.transient_mut().allocate_aligned(10, 1).unwrap();

        let [transient, persistent] = memory.snapshots();
        assert_eq!(transient.label, "transient");
        assert_eq!(transient.capacity, 128);
        assert_eq!(
            transient.layout,
            SnapshotLayout::Linear {
                prev_offset: 0,
                curr_offset: 10,
            }
        );
        assert_eq!(persistent.label, "persistent");
        assert_eq!(persistent.used, 0);
    }

    #[test]
    fn test_from_config_limits_arenas() {
        let mut scratch = [0u8; 256];
        let mut long_lived = [0u8; 256];
        let config = MemoryConfig {
            allocator: AllocatorConfig::with_alignment(8),
            transient_bytes: 64,
            persistent_bytes: 128,
        };
        let mut memory =
            MemoryContext::from_config(&mut scratch, &mut long_lived, &config).unwrap();
        assert_eq!(memory.transient().capacity(), 64);
        assert_eq!(memory.persistent().capacity(), 128);
        assert_eq!(memory.transient().default_alignment(), 8);
        assert!(memory.transient_mut().allocate(65).unwrap_err().is_exhaustion());
    }

    #[test]
    fn test_from_config_rejects_short_buffers() {
        let mut scratch = [0u8; 32];
        let mut long_lived = [0u8; 32];
        let config = MemoryConfig {
            allocator: AllocatorConfig::default(),
            transient_bytes: 64,
            persistent_bytes: 16,
        };
        let result = MemoryContext::from_config(&mut scratch, &mut long_lived, &config);
        assert!(matches!(result, Err(MemoryError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut scratch = [0u8; 16];
        let mut long_lived = [0u8; 16];
        let result = MemoryContext::new(
            &mut scratch,
            &mut long_lived,
            &AllocatorConfig::with_alignment(6),
        );
        assert!(matches!(result, Err(MemoryError::InvalidConfig(_))));
    }
}
