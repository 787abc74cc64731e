//! Ordering primitives for register protocols
//!
//! The DTU consumes multi-register commands: operands are staged into a set
//! of registers and a final store to the command register triggers
//! execution. Nothing ties those stores together architecturally, so the
//! driver brackets them with the explicit barriers below.
//!
//! Two strengths are needed:
//!
//! - [`compiler_barrier`]: forbids the *compiler* from reordering or
//!   combining the surrounding accesses. Sufficient between staging operand
//!   registers and firing the command register of the local, strongly
//!   ordered DTU window.
//! - [`write_barrier`]/[`full_barrier`]: CPU fences. Required when a store
//!   must be visible to another agent before a later store takes effect;
//!   the remote-configuration path depends on the proxy endpoint's
//!   addressing registers landing before the payload write fires.
//!
//! Only portable fences live here; this crate is shared between target and
//! hosted builds.

use core::sync::atomic::{Ordering, compiler_fence, fence};

/// Compiler-ordering barrier.
///
/// Prevents the compiler from reordering memory accesses across this point.
/// Emits no CPU instruction. Use between staging a command's operand
/// registers and storing its command register.
#[inline]
pub fn compiler_barrier() {
    compiler_fence(Ordering::SeqCst);
}

/// Read barrier (acquire semantics).
///
/// Ensures all loads before this barrier complete before any loads after.
/// Use before reading memory another agent may have written.
#[inline]
pub fn read_barrier() {
    fence(Ordering::Acquire);
}

/// Write barrier (release semantics).
///
/// Ensures all stores before this barrier complete before any stores after.
/// Use after programming a channel's addressing registers and before the
/// payload store that depends on them.
#[inline]
pub fn write_barrier() {
    fence(Ordering::Release);
}

/// Full memory barrier.
///
/// Ensures all memory operations before this barrier complete before any
/// operations after, loads and stores alike.
#[inline]
pub fn full_barrier() {
    fence(Ordering::SeqCst);
}
