//! # weft-common
//!
//! Shared types and constants for the Weft kernel and its collaborators.
//!
//! This crate defines the vocabulary the rest of the system speaks:
//! - [`Error`]/[`Result`]: the system-wide error taxonomy, numerically
//!   aligned with the DTU status-byte encoding
//! - [`Label`]: the sender-identifying tag carried with every message
//! - [`Perm`]: memory-endpoint permission bits
//! - [`VpeFlags`]: the VPE role/state bitmask with stable bit positions
//! - [`cfg`]: system-wide configuration constants
//!
//! # no_std
//!
//! This crate is `#![no_std]` and has zero dependencies, making it suitable
//! as a foundation crate that every other Weft crate can depend on.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cfg;
pub mod error;
pub mod flags;
pub mod label;
pub mod perm;

// Re-export commonly used types
pub use error::{Error, Result};
pub use flags::VpeFlags;
pub use label::Label;
pub use perm::Perm;

/// Physical core (processing element) identifier.
pub type PeId = u8;

/// VPE identifier. 16 bits, [`INVALID_ID`] is reserved as a sentinel.
pub type VpeId = u16;

/// DTU endpoint slot index on one core.
pub type EpId = u16;

/// Capability selector: a small process-local integer naming an entry in
/// one of a VPE's capability tables.
pub type CapSel = u32;

/// Sentinel VPE id, never assigned to a live VPE.
pub const INVALID_ID: VpeId = 0xFFFF;

/// Sentinel selector used by collaborators to request "no capability".
pub const INVALID_SEL: CapSel = CapSel::MAX;
