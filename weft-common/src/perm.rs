//! Memory permission bits
//!
//! Permissions attach to memory capabilities and to the tag block of a
//! configured memory endpoint. They can be attenuated when a capability is
//! derived but never escalated.

use core::fmt;

/// Permission bits for memory capabilities and memory endpoints.
///
/// # Layout
///
/// Packed into a single byte; the same encoding appears (zero-extended) in
/// the permission word of an endpoint tag block:
/// - Bit 0: Read
/// - Bit 1: Write
/// - Bit 2: Execute
/// - Bits 3-7: Reserved (must be zero)
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(transparent)]
pub struct Perm(u8);

impl Perm {
    /// No access. A detached endpoint carries this.
    pub const NONE: Self = Self(0);

    /// Read permission.
    pub const R: Self = Self(1 << 0);

    /// Write permission.
    pub const W: Self = Self(1 << 1);

    /// Execute permission.
    pub const X: Self = Self(1 << 2);

    /// Read and write.
    pub const RW: Self = Self(Self::R.0 | Self::W.0);

    /// Read, write and execute.
    pub const RWX: Self = Self(Self::R.0 | Self::W.0 | Self::X.0);

    /// Create permissions from raw bits.
    ///
    /// Only the lower 3 bits are used; upper bits are masked off.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    /// Get the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check if these permissions contain all the specified permissions.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Intersect permissions (logical AND).
    ///
    /// Used when deriving a capability with reduced access.
    #[inline]
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Union permissions (logical OR).
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if this set of permissions is a subset of another.
    ///
    /// Derivation must never escalate access; callers verify with this.
    #[inline]
    #[must_use]
    pub const fn is_subset_of(self, other: Self) -> bool {
        (self.0 & !other.0) == 0
    }

    /// Check if no permissions are set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Perm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Perm({self})")
    }
}

impl fmt::Display for Perm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.contains(Self::R) { "r" } else { "-" },
            if self.contains(Self::W) { "w" } else { "-" },
            if self.contains(Self::X) { "x" } else { "-" },
        )
    }
}

impl core::ops::BitAnd for Perm {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersect(rhs)
    }
}

impl core::ops::BitOr for Perm {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::format;

    use super::*;

    #[test]
    fn test_perm_construction() {
        assert_eq!(Perm::NONE.bits(), 0);
        assert_eq!(Perm::RW.bits(), 0x03);
        assert_eq!(Perm::RWX.bits(), 0x07);
        assert_eq!(Perm::from_bits(0xFF), Perm::RWX);
    }

    #[test]
    fn test_perm_contains() {
        assert!(Perm::RWX.contains(Perm::R));
        assert!(Perm::RW.contains(Perm::RW));
        assert!(!Perm::R.contains(Perm::W));
    }

    #[test]
    fn test_perm_subset() {
        assert!(Perm::R.is_subset_of(Perm::RW));
        assert!(!Perm::RWX.is_subset_of(Perm::RW));
        assert!(Perm::NONE.is_subset_of(Perm::NONE));
    }

    #[test]
    fn test_perm_display() {
        assert_eq!(format!("{}", Perm::RW), "rw-");
        assert_eq!(format!("{}", Perm::NONE), "---");
    }
}
