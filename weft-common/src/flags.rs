//! VPE role and state flags
//!
//! A VPE carries a bitmask describing its role (boot module, daemon, idle)
//! and bookkeeping state (initialised, has an application, waiting). The
//! bit positions are stable across the system: managers, services and the
//! kernel all agree on them, so they must never be renumbered.

use core::fmt;

/// VPE flags bitmask.
///
/// # Layout
///
/// Stable bit positions, part of the system ABI:
/// - Bit 0: BootMod, created from a boot module and started by the kernel
/// - Bit 1: Daemon, a long-running service not waited for at shutdown
/// - Bit 2: Idle, the per-core idle context
/// - Bit 3: Init, initialisation completed
/// - Bit 4: HasApp, an application is loaded and accounted for
/// - Bit 5: Muxable, may be multiplexed off its core
/// - Bit 6: Ready, runnable from the manager's point of view
/// - Bit 7: Waiting, parked until an explicit wakeup
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(transparent)]
pub struct VpeFlags(u8);

impl VpeFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Created from a boot module; the kernel starts it itself.
    pub const BOOTMOD: Self = Self(1 << 0);

    /// Long-running service; shutdown does not wait for its exit.
    pub const DAEMON: Self = Self(1 << 1);

    /// The per-core idle context.
    pub const IDLE: Self = Self(1 << 2);

    /// Initialisation completed.
    pub const INIT: Self = Self(1 << 3);

    /// An application is loaded; its implicit reference is held.
    pub const HASAPP: Self = Self(1 << 4);

    /// May be multiplexed off its core.
    pub const MUXABLE: Self = Self(1 << 5);

    /// Runnable from the manager's point of view.
    pub const READY: Self = Self(1 << 6);

    /// Parked until an explicit wakeup.
    pub const WAITING: Self = Self(1 << 7);

    /// Create flags from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Get the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check if all the specified flags are set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Set the specified flags.
    #[inline]
    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the specified flags.
    #[inline]
    pub fn clear(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Union of two flag sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if no flags are set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for VpeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_set();
        if self.contains(Self::BOOTMOD) {
            list.entry(&"BootMod");
        }
        if self.contains(Self::DAEMON) {
            list.entry(&"Daemon");
        }
        if self.contains(Self::IDLE) {
            list.entry(&"Idle");
        }
        if self.contains(Self::INIT) {
            list.entry(&"Init");
        }
        if self.contains(Self::HASAPP) {
            list.entry(&"HasApp");
        }
        if self.contains(Self::MUXABLE) {
            list.entry(&"Muxable");
        }
        if self.contains(Self::READY) {
            list.entry(&"Ready");
        }
        if self.contains(Self::WAITING) {
            list.entry(&"Waiting");
        }
        list.finish()
    }
}

impl core::ops::BitOr for VpeFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for VpeFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
