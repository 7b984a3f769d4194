//! # Alignment Arithmetic
//!
//! Pure address arithmetic shared by every allocator.
//!
//! Alignments are powers of two, so "round up to a multiple" is a mask:
//! `address & (alignment - 1)` is the distance past the previous boundary.

use crate::error::{MemoryError, MemoryResult};

/// Rounds `address` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Passing anything else is a contract
/// violation, caught by a debug assertion.
///
/// # Example
///
/// ```rust
/// use celeven_memory::align::align_forward;
///
/// assert_eq!(align_forward(17, 16), 32);
/// assert_eq!(align_forward(32, 16), 32);
/// ```
#[inline]
#[must_use]
pub const fn align_forward(address: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    let modulo = address & (alignment - 1);
    if modulo == 0 {
        address
    } else {
        address + (alignment - modulo)
    }
}

/// Like [`align_forward`], but returns `None` on overflow or on an
/// alignment that is not a power of two.
#[inline]
#[must_use]
pub const fn checked_align_forward(address: usize, alignment: usize) -> Option<usize> {
    if !alignment.is_power_of_two() {
        return None;
    }
    let modulo = address & (alignment - 1);
    if modulo == 0 {
        Some(address)
    } else {
        address.checked_add(alignment - modulo)
    }
}

/// Bytes to advance from `address` so that a `header_size` header fits in
/// front of an `alignment`-aligned user block.
///
/// The result is `align_forward(address + header_size, alignment) - address`,
/// so it is always at least `header_size`.
///
/// # Example
///
/// ```rust
/// use celeven_memory::align::padding_with_header;
///
/// // 16-byte header at address 24, 16-byte alignment: user block at 48.
/// assert_eq!(padding_with_header(24, 16, 16), 24);
/// ```
#[inline]
#[must_use]
pub const fn padding_with_header(address: usize, alignment: usize, header_size: usize) -> usize {
    align_forward(address + header_size, alignment) - address
}

/// Checked form of [`padding_with_header`].
#[inline]
#[must_use]
pub const fn checked_padding_with_header(
    address: usize,
    alignment: usize,
    header_size: usize,
) -> Option<usize> {
    let Some(header_end) = address.checked_add(header_size) else {
        return None;
    };
    match checked_align_forward(header_end, alignment) {
        Some(aligned) => Some(aligned - address),
        None => None,
    }
}

/// Rejects alignments that are not a power of two.
pub(crate) fn check_alignment(alignment: usize) -> MemoryResult<()> {
    if alignment.is_power_of_two() {
        Ok(())
    } else {
        tracing::error!("rejected alignment {} (not a power of two)", alignment);
        Err(MemoryError::InvalidAlignment(alignment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_forward_rounds_up() {
        assert_eq!(align_forward(0, 8), 0);
        assert_eq!(align_forward(1, 8), 8);
        assert_eq!(align_forward(7, 8), 8);
        assert_eq!(align_forward(8, 8), 8);
        assert_eq!(align_forward(9, 8), 16);
        assert_eq!(align_forward(10, 16), 16);
        assert_eq!(align_forward(129, 128), 256);
    }

    #[test]
    fn test_align_forward_unit_alignment_is_identity() {
        for address in 0..64 {
            assert_eq!(align_forward(address, 1), address);
        }
    }

    #[test]
    fn test_checked_align_forward() {
        assert_eq!(checked_align_forward(9, 8), Some(16));
        assert_eq!(checked_align_forward(9, 0), None);
        assert_eq!(checked_align_forward(9, 12), None);
        assert_eq!(checked_align_forward(usize::MAX, 8), None);
        assert_eq!(checked_align_forward(usize::MAX - 7, 8), Some(usize::MAX - 7));
    }

    #[test]
    fn test_padding_with_header() {
        // Already aligned: a whole alignment step is needed for the header.
        assert_eq!(padding_with_header(0, 16, 16), 16);
        // Header smaller than the alignment.
        assert_eq!(padding_with_header(0, 16, 8), 16);
        assert_eq!(padding_with_header(8, 16, 8), 8);
        // Header larger than the alignment.
        assert_eq!(padding_with_header(4, 8, 16), 20);

        for address in 0..256 {
            for alignment in [1, 2, 4, 8, 16, 32, 64, 128] {
                let padding = padding_with_header(address, alignment, 16);
                assert!(padding >= 16);
                assert_eq!((address + padding) % alignment, 0);
                assert!(padding < 16 + alignment);
            }
        }
    }

    #[test]
    fn test_checked_padding_overflow() {
        assert_eq!(checked_padding_with_header(usize::MAX - 4, 8, 16), None);
        assert_eq!(checked_padding_with_header(24, 16, 16), Some(24));
    }

    #[test]
    fn test_check_alignment() {
        assert!(check_alignment(1).is_ok());
        assert!(check_alignment(128).is_ok());
        assert_eq!(check_alignment(0), Err(MemoryError::InvalidAlignment(0)));
        assert_eq!(check_alignment(24), Err(MemoryError::InvalidAlignment(24)));
    }
}
