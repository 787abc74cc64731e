//! Data transfer unit interface
//!
//! Every core in the system carries a DTU: a register-programmed engine
//! that moves messages and memory between cores. This crate owns the
//! register-level contract with that engine and the driver that programs
//! it. Nothing here allocates endpoints or decides policy; that lives in
//! the kernel above.
//!
//! # Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Register window layout, command word format, [`regs::RegisterFile`] seam |
//! | [`ep`] | Endpoint config, tag and core-config register images |
//! | [`dtu`] | The transfer engine: send and packetized read/write |
//! | [`sim`] | Software model of the register file for hosted builds and tests |
//!
//! The driver is generic over [`regs::RegisterFile`], so the same engine
//! code runs against the MMIO window on hardware and against [`sim::SimDtu`]
//! everywhere else.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod dtu;
pub mod ep;
pub mod regs;
pub mod sim;

pub use dtu::Dtu;
pub use ep::{CoreCfg, EpCfg, EpTag, EpType};
pub use regs::{MmioRegisters, Reg, RegisterFile};
pub use sim::SimDtu;
