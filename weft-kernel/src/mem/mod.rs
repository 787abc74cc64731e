//! Physical memory collaborator
//!
//! The kernel core does not own a memory subsystem; it consumes one
//! through the [`MemPool`] trait. [`MemMap`] is the in-tree reference
//! implementation, used by address spaces, memory gates and tests.

extern crate alloc;

use alloc::rc::Rc;
use core::cell::RefCell;

use log::trace;
use weft_common::cfg::PAGE_SIZE;
use weft_common::Result;

mod map;

pub use map::MemMap;

/// Allocation interface of the physical-memory collaborator.
pub trait MemPool {
    /// Allocate `size` bytes at the given power-of-two alignment.
    fn allocate(&mut self, size: u64, align: u64) -> Result<u64>;

    /// Return a previously allocated range.
    fn free(&mut self, addr: u64, size: u64);
}

/// Shared handle to a memory pool. Objects that free on drop keep a clone.
pub type PoolRef = Rc<RefCell<dyn MemPool>>;

/// A VPE's address-space handle.
///
/// Owns the root page table frame: one page allocated from the pool on
/// creation and returned when the handle drops with the VPE.
pub struct AddrSpace {
    pool: PoolRef,
    root: u64,
}

impl AddrSpace {
    pub fn new(pool: &PoolRef) -> Result<Self> {
        let root = pool
            .borrow_mut()
            .allocate(PAGE_SIZE as u64, PAGE_SIZE as u64)?;
        trace!("addrspace: root table at {:#x}", root);
        Ok(Self {
            pool: Rc::clone(pool),
            root,
        })
    }

    /// Physical address of the root page table.
    pub fn root(&self) -> u64 {
        self.root
    }
}

impl Drop for AddrSpace {
    fn drop(&mut self) {
        self.pool.borrow_mut().free(self.root, PAGE_SIZE as u64);
    }
}
