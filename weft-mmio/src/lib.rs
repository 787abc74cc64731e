//! MMIO access layer for the Weft kernel
//!
//! Building blocks for register-programmed devices, used by the DTU driver:
//!
//! - [`region`]: type-safe MMIO region access with offset-based
//!   volatile reads/writes
//! - [`barrier`]: explicit ordering primitives for multi-register command
//!   protocols
//!
//! The DTU's command interface is not atomic across register writes, so
//! every multi-register command follows the same discipline: stage the
//! operand registers, issue a barrier, then store the command register that
//! fires the operation. The barrier between staging and firing is part of
//! the protocol, not an optimisation detail.
//!
//! # Example
//!
//! ```ignore
//! use weft_mmio::{MmioRegion, barrier};
//!
//! let mmio = unsafe { MmioRegion::new(0xF000_0000, 0x4000) };
//!
//! // Stage operands, then fire the command.
//! mmio.write64(0x08, data_addr);
//! mmio.write64(0x10, data_size);
//! barrier::compiler_barrier();
//! mmio.write64(0x00, command);
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod barrier;
pub mod region;

// Re-exports for convenience
pub use barrier::{compiler_barrier, full_barrier, read_barrier, write_barrier};
pub use region::MmioRegion;
