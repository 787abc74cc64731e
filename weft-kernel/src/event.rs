//! Observer registry
//!
//! Fire-once subscriptions for kernel events (VPE exit, resume attempts).
//! `subscribe` hands back a [`SubHandle`]; `unsubscribe` cancels by handle;
//! `notify` drains every subscription in registration order and consumes
//! it. A party interested in the next event subscribes again.
//!
//! Callers must finish mutating their own state before notifying: callbacks
//! run re-entrant into the kernel and may subscribe again or touch the
//! object that fired. The usual shape is to `take` the registry out while
//! ownership is borrowed and notify after the borrow ends.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Identifies one subscription within its registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubHandle(u64);

/// Fire-once observer registry for events carrying a `T`.
pub struct Subscriptions<T> {
    next: u64,
    subs: Vec<(SubHandle, Box<dyn FnOnce(&T)>)>,
}

impl<T> Subscriptions<T> {
    pub const fn new() -> Self {
        Self {
            next: 0,
            subs: Vec::new(),
        }
    }

    /// Register an observer for the next event. Runs at most once.
    pub fn subscribe<F>(&mut self, callback: F) -> SubHandle
    where
        F: FnOnce(&T) + 'static,
    {
        let handle = SubHandle(self.next);
        self.next += 1;
        self.subs.push((handle, Box::new(callback)));
        handle
    }

    /// Cancel a subscription. Returns `false` when the handle is unknown
    /// (already fired or never issued).
    pub fn unsubscribe(&mut self, handle: SubHandle) -> bool {
        let before = self.subs.len();
        self.subs.retain(|(h, _)| *h != handle);
        self.subs.len() != before
    }

    /// Fire every subscription in registration order and consume them.
    pub fn notify(&mut self, event: &T) {
        for (_, callback) in self.subs.drain(..) {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

impl<T> Default for Subscriptions<T> {
    fn default() -> Self {
        Self::new()
    }
}
