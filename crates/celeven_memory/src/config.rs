//! # Allocator Configuration
//!
//! Plain configuration structs, optionally loaded once at startup from TOML.
//!
//! ```toml
//! transient_bytes = 1048576
//! persistent_bytes = 4194304
//!
//! [allocator]
//! default_alignment = 16
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};

/// Alignment used when the caller does not ask for one: two machine words.
pub const DEFAULT_ALIGNMENT: usize = 2 * std::mem::size_of::<usize>();

/// Largest alignment the stack allocator honours. Larger requests are capped.
pub const MAX_STACK_ALIGNMENT: usize = 128;

/// Settings shared by the arena and stack allocators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Alignment for `allocate` / `resize` calls without an explicit one.
    pub default_alignment: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            default_alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl AllocatorConfig {
    /// Config with a specific default alignment.
    #[must_use]
    pub const fn with_alignment(default_alignment: usize) -> Self {
        Self { default_alignment }
    }

    /// Checks the config.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] if the alignment is not a power of two.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.default_alignment.is_power_of_two() {
            Ok(())
        } else {
            Err(MemoryError::InvalidConfig(format!(
                "default_alignment {} is not a power of two",
                self.default_alignment
            )))
        }
    }
}

/// Geometry of a pool allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Requested chunk size. Rounded up to `chunk_alignment`.
    pub chunk_size: usize,
    /// Alignment of the first chunk and of the chunk stride.
    pub chunk_alignment: usize,
}

impl PoolConfig {
    /// Creates a pool config.
    #[must_use]
    pub const fn new(chunk_size: usize, chunk_alignment: usize) -> Self {
        Self {
            chunk_size,
            chunk_alignment,
        }
    }

    /// Chunks of `chunk_size` bytes at the default alignment.
    #[must_use]
    pub const fn with_default_alignment(chunk_size: usize) -> Self {
        Self::new(chunk_size, DEFAULT_ALIGNMENT)
    }
}

/// Sizing of the transient and persistent arenas of a
/// [`MemoryContext`](crate::context::MemoryContext).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Arena settings applied to both arenas.
    pub allocator: AllocatorConfig,
    /// Bytes for the per-frame scratch arena.
    pub transient_bytes: usize,
    /// Bytes for the arena that lives as long as the application.
    pub persistent_bytes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            allocator: AllocatorConfig::default(),
            transient_bytes: 1024 * 1024,
            persistent_bytes: 4 * 1024 * 1024,
        }
    }
}

impl MemoryConfig {
    /// Parses and validates a TOML document.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> MemoryResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| MemoryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the config.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] for a bad alignment or an empty arena.
    pub fn validate(&self) -> MemoryResult<()> {
        self.allocator.validate()?;
        if self.transient_bytes == 0 || self.persistent_bytes == 0 {
            return Err(MemoryError::InvalidConfig(
                "arena sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_alignment_is_two_words() {
        assert_eq!(
            AllocatorConfig::default().default_alignment,
            2 * std::mem::size_of::<usize>()
        );
        assert!(AllocatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let result = AllocatorConfig::with_alignment(12).validate();
        assert!(matches!(result, Err(MemoryError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_toml() {
        let config = MemoryConfig::from_toml_str(
            r"
            transient_bytes = 4096
            persistent_bytes = 8192

            [allocator]
            default_alignment = 8
            ",
        )
        .unwrap();
        assert_eq!(config.transient_bytes, 4096);
        assert_eq!(config.persistent_bytes, 8192);
        assert_eq!(config.allocator.default_alignment, 8);
    }

    #[test]
    fn test_from_toml_defaults() {
        let config = MemoryConfig::from_toml_str("transient_bytes = 64").unwrap();
        assert_eq!(config.transient_bytes, 64);
        assert_eq!(config.persistent_bytes, MemoryConfig::default().persistent_bytes);
        assert_eq!(config.allocator, AllocatorConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(MemoryConfig::from_toml_str("transient_bytes = \"lots\"").is_err());
        assert!(MemoryConfig::from_toml_str("[allocator]\ndefault_alignment = 3").is_err());
        assert!(MemoryConfig::from_toml_str("persistent_bytes = 0").is_err());
    }
}
