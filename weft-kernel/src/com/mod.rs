//! Kernel-side communication
//!
//! The proxy channel for remote DTU programming, the upcall send queue,
//! and the receive-buffer registry.

mod kdtu;
mod queue;
mod rbufs;

pub use kdtu::{syscall_label, KernelDtu};
pub use queue::SendQueue;
pub use rbufs::{RecvBuf, RecvBufs};
