//! System-wide configuration constants
//!
//! Tunables shared between the kernel and its collaborators. DTU geometry
//! (endpoint counts, packet size, window layout) lives with the driver.

use crate::EpId;

/// Page size used for address-space root tables.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of physical cores the system addresses.
pub const MAX_PES: usize = 64;

/// Maximum number of live VPEs.
pub const MAX_VPES: usize = 64;

/// Size order of a syscall message (512 bytes).
pub const SYSC_MSGSIZE_ORD: u32 = 9;

/// Size order of an upcall notification message (64 bytes).
pub const NOTIFY_MSGSIZE_ORD: u32 = 6;

/// Credit budget for a freshly configured syscall channel: one message.
pub const SYSC_CREDITS: u64 = 1 << SYSC_MSGSIZE_ORD;

/// Credit budget for a freshly configured upcall channel: one message.
pub const NOTIFY_CREDITS: u64 = 1 << NOTIFY_MSGSIZE_ORD;

// Endpoint reservations below are system ABI: user code on every core is
// linked against these slots.

/// Endpoint a VPE sends syscalls through.
pub const SYSC_EP: EpId = 0;

/// Endpoint a VPE receives kernel upcalls through.
pub const UPCALL_EP: EpId = 1;

/// Default reply endpoint for messages that name no other.
pub const DEF_REP: EpId = 2;

/// Scratch endpoint the kernel borrows for proxied remote programming.
pub const TMP_EP: EpId = 3;

/// First endpoint slot available for user allocation.
pub const FIRST_FREE_EP: EpId = 4;
