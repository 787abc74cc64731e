//! Message labels for sender identification
//!
//! A label is an opaque value bound to a send or memory endpoint when the
//! kernel configures it. The DTU delivers the label with every message that
//! passes through the endpoint, so the receiver can tell its senders apart
//! without a separate authentication handshake.
//!
//! Labels identify, they do not authorise: a receiver may trust a label to
//! mean "this arrived through endpoint X as the kernel configured it" and
//! nothing more.

use core::fmt;

/// An opaque sender-identifying tag, configured per endpoint.
///
/// Labels are 64-bit values chosen by the configuring kernel. They are
/// immutable for the lifetime of the endpoint binding; rebinding the
/// endpoint (via the exchange operation) installs a new label atomically
/// with the new destination.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Label(u64);

impl Label {
    /// No label. Installed on detached endpoints.
    pub const NONE: Self = Self(0);

    /// Create a new label with the given value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw label value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Check whether this is the empty label.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Label::NONE")
        } else {
            write!(f, "Label({:#x})", self.0)
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

impl From<u64> for Label {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Label> for u64 {
    #[inline]
    fn from(label: Label) -> Self {
        label.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_none() {
        assert!(Label::NONE.is_none());
        assert_eq!(Label::NONE.value(), 0);
    }

    #[test]
    fn test_label_value() {
        let label = Label::new(0xBEEF);
        assert!(!label.is_none());
        assert_eq!(label.value(), 0xBEEF);
        assert_eq!(u64::from(label), 0xBEEF);
    }
}
