//! Upcall send queue
//!
//! The kernel never blocks on a send. When an upcall cannot go out
//! (the channel's one-message credit is in flight, or older upcalls are
//! already queued) the message is buffered here in FIFO order and
//! retried when a reply returns the credit. This is the continuation
//! state that stands in for a blocked sender thread.

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use log::trace;
use weft_common::cfg::DEF_REP;
use weft_common::{EpId, Error, Label, Result, VpeId};
use weft_dtu::regs::RegisterFile;
use weft_dtu::Dtu;

/// FIFO of pending upcalls in front of one local send endpoint.
pub struct SendQueue {
    vpe: VpeId,
    ep: EpId,
    queue: VecDeque<Vec<u8>>,
}

impl SendQueue {
    /// A queue for `vpe`'s upcalls, sending through local endpoint `ep`.
    pub fn new(vpe: VpeId, ep: EpId) -> Self {
        Self {
            vpe,
            ep,
            queue: VecDeque::new(),
        }
    }

    pub fn ep(&self) -> EpId {
        self.ep
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Deliver `msg` now if possible, otherwise queue it.
    ///
    /// Returns `true` when the message went out immediately, `false` when
    /// it was queued behind the credit. Errors other than
    /// [`Error::NoCredits`] propagate; the message is not queued then.
    pub fn send<R: RegisterFile>(&mut self, dtu: &mut Dtu<R>, msg: &[u8]) -> Result<bool> {
        if self.queue.is_empty() {
            match dtu.send(self.ep, msg, Label::NONE, DEF_REP) {
                Ok(()) => return Ok(true),
                Err(Error::NoCredits) => {}
                Err(err) => return Err(err),
            }
        }
        trace!("vpe {}: queued upcall ({} bytes)", self.vpe, msg.len());
        self.queue.push_back(msg.to_vec());
        Ok(false)
    }

    /// A reply returned the channel credit; push pending upcalls out.
    ///
    /// Retries from the head until the credit runs out again. A hard send
    /// error discards the failing entry and propagates; it would fail the
    /// same way on every retry.
    pub fn received_reply<R: RegisterFile>(&mut self, dtu: &mut Dtu<R>) -> Result<()> {
        while let Some(head) = self.queue.front() {
            match dtu.send(self.ep, head, Label::NONE, DEF_REP) {
                Ok(()) => {
                    self.queue.pop_front();
                    trace!("vpe {}: flushed queued upcall", self.vpe);
                }
                Err(Error::NoCredits) => break,
                Err(err) => {
                    self.queue.pop_front();
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}
