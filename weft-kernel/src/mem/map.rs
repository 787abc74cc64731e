//! First-fit physical memory map
//!
//! Tracks the free areas of one contiguous memory module as an ordered
//! map from area base to area length. Allocation walks areas in address
//! order and carves the first one that fits after alignment; freeing
//! merges with adjacent areas so the map stays minimal.

extern crate alloc;

use alloc::collections::BTreeMap;
use log::trace;
use weft_common::{Error, Result};

use super::MemPool;

/// Free-area map over one contiguous range.
pub struct MemMap {
    free: BTreeMap<u64, u64>,
}

impl MemMap {
    /// A map with `[addr, addr + size)` entirely free.
    pub fn new(addr: u64, size: u64) -> Self {
        let mut free = BTreeMap::new();
        if size > 0 {
            free.insert(addr, size);
        }
        Self { free }
    }

    /// Total bytes currently free.
    pub fn available(&self) -> u64 {
        self.free.values().sum()
    }

    /// Number of distinct free areas. One means the map is fully merged.
    pub fn areas(&self) -> usize {
        self.free.len()
    }
}

impl MemPool for MemMap {
    fn allocate(&mut self, size: u64, align: u64) -> Result<u64> {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        if size == 0 {
            return Err(Error::InvalidArgument);
        }

        let mut found = None;
        for (&start, &len) in &self.free {
            let aligned = (start + align - 1) & !(align - 1);
            let head = aligned - start;
            if len >= head + size {
                found = Some((start, len, aligned, head));
                break;
            }
        }
        let (start, len, aligned, head) = found.ok_or(Error::NoSpace)?;

        self.free.remove(&start);
        if head > 0 {
            self.free.insert(start, head);
        }
        let tail = len - head - size;
        if tail > 0 {
            self.free.insert(aligned + size, tail);
        }

        trace!("mem: allocated {:#x}..{:#x}", aligned, aligned + size);
        Ok(aligned)
    }

    fn free(&mut self, addr: u64, size: u64) {
        if size == 0 {
            return;
        }
        let mut addr = addr;
        let mut size = size;

        // Merge with the area ending exactly at `addr`.
        if let Some((&prev, &prev_len)) = self.free.range(..addr).next_back() {
            debug_assert!(prev + prev_len <= addr, "double free");
            if prev + prev_len == addr {
                self.free.remove(&prev);
                addr = prev;
                size += prev_len;
            }
        }

        // Merge with the area starting exactly at the end of this one.
        if let Some((&next, &next_len)) = self.free.range(addr..).next() {
            debug_assert!(addr + size <= next, "double free");
            if addr + size == next {
                self.free.remove(&next);
                size += next_len;
            }
        }

        self.free.insert(addr, size);
        trace!("mem: freed {:#x}..{:#x}", addr, addr + size);
    }
}
