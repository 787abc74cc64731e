//! # weft-kernel
//!
//! Kernel-side entities for a DTU-based multicore system.
//!
//! The kernel runs on one core and owns every other core by programming
//! its DTU endpoints remotely. There are no traps and no shared kernel
//! text: applications talk to the kernel purely through messages, and
//! the kernel reaches back purely through the register windows the DTUs
//! expose over the interconnect.
//!
//! # Entities
//!
//! - [`pes::Vpe`]: one application bound to one core, with its lifecycle
//!   (`SUSPENDED → RUNNING → DEAD`), capability tables and observers
//! - [`cap`]: selector-indexed capability tables over shared gate objects
//! - [`com::KernelDtu`]: the proxy channel that stages a temporary memory
//!   endpoint to write another core's DTU registers
//! - [`com::SendQueue`] / [`com::RecvBufs`]: upcall queueing and receive
//!   buffer bookkeeping per VPE
//! - [`mem`]: first-fit range allocation behind the [`mem::MemPool`] seam
//! - [`logging`]: the `log` facade over a lock-free ring buffer
//!
//! The crate is a library on purpose: everything above drives hardware
//! through the register seam in `weft-dtu`, so the whole kernel runs
//! against the software DTU model in tests.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod cap;
pub mod com;
pub mod event;
pub mod logging;
pub mod mem;
pub mod pes;
