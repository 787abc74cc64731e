//! MMIO region abstraction
//!
//! Provides type-safe, offset-based access to memory-mapped I/O regions.
//! All reads and writes use volatile operations to prevent compiler
//! optimisations from reordering or eliding device memory accesses.
//!
//! # Safety
//!
//! The caller is responsible for ensuring the base address points to a
//! valid, mapped MMIO region with device memory attributes.

use core::ptr::{read_volatile, write_volatile};

/// A memory-mapped I/O region.
///
/// Provides offset-based access to device registers with volatile
/// semantics. The DTU exposes 64-bit registers exclusively, so only
/// register-width accessors are provided.
///
/// # Example
///
/// ```ignore
/// let mmio = unsafe { MmioRegion::new(0xF000_0000, 0x4000) };
///
/// let command = mmio.read64(0x00);
/// mmio.write64(0x08, 0x1234);
/// ```
#[derive(Clone, Copy)]
pub struct MmioRegion {
    base: usize,
    size: usize,
}

impl MmioRegion {
    /// Create a new MMIO region.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `base` points to a valid, mapped MMIO region
    /// - The region has device memory attributes (non-cacheable)
    /// - The region is at least `size` bytes
    /// - No other code accesses this region concurrently without
    ///   synchronisation
    #[inline]
    #[must_use]
    pub const unsafe fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Get the base address of this region.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Get the size of this region.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Create a subregion starting at the given offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset + size` would exceed the parent region's bounds.
    #[inline]
    #[must_use]
    pub const fn subregion(&self, offset: usize, size: usize) -> Self {
        assert!(
            offset + size <= self.size,
            "subregion exceeds parent bounds"
        );
        // SAFETY: Subregion is within the parent's valid bounds
        Self {
            base: self.base + offset,
            size,
        }
    }

    /// Read a 64-bit register at the given offset.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if offset is out of bounds or misaligned.
    #[inline]
    #[must_use]
    pub fn read64(&self, offset: usize) -> u64 {
        debug_assert!(offset + 8 <= self.size, "MMIO read64 offset out of bounds");
        debug_assert!(offset.is_multiple_of(8), "MMIO read64 offset not aligned");
        // SAFETY: Caller ensured base is valid MMIO, offset is within bounds
        unsafe { read_volatile((self.base + offset) as *const u64) }
    }

    /// Write a 64-bit register at the given offset.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if offset is out of bounds or misaligned.
    #[inline]
    pub fn write64(&self, offset: usize, value: u64) {
        debug_assert!(offset + 8 <= self.size, "MMIO write64 offset out of bounds");
        debug_assert!(offset.is_multiple_of(8), "MMIO write64 offset not aligned");
        // SAFETY: Caller ensured base is valid MMIO, offset is within bounds
        unsafe { write_volatile((self.base + offset) as *mut u64, value) }
    }
}

impl core::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}
