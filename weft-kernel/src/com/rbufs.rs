//! Receive-buffer registry
//!
//! Kernel-side record of the receive buffers attached to a VPE's
//! endpoints. Attaching programs the remote receive endpoint through the
//! proxy channel and records it; detaching invalidates the hardware slot
//! first and drops the record second, so a failed invalidation never
//! leaves an unrecorded live endpoint.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::debug;
use weft_common::{EpId, Error, Label, PeId, Perm, Result, VpeId};
use weft_dtu::regs::RegisterFile;
use weft_dtu::{EpCfg, EpTag};

use super::kdtu::KernelDtu;

/// One attached receive buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecvBuf {
    pub addr: u64,
    pub order: u32,
    pub msg_order: u32,
    pub flags: u8,
}

/// Receive buffers of one VPE, keyed by endpoint slot.
pub struct RecvBufs {
    vpe: VpeId,
    bufs: BTreeMap<EpId, RecvBuf>,
}

impl RecvBufs {
    pub fn new(vpe: VpeId) -> Self {
        Self {
            vpe,
            bufs: BTreeMap::new(),
        }
    }

    pub fn get(&self, ep: EpId) -> Option<&RecvBuf> {
        self.bufs.get(&ep)
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Configure the remote receive endpoint and record the buffer.
    ///
    /// An endpoint can carry one buffer; a second attach to the same slot
    /// fails with [`Error::InvalidArgument`] without touching hardware.
    #[allow(clippy::too_many_arguments)]
    pub fn attach<R: RegisterFile>(
        &mut self,
        kdtu: &mut KernelDtu<R>,
        pe: PeId,
        ep: EpId,
        addr: u64,
        order: u32,
        msg_order: u32,
        flags: u8,
    ) -> Result<()> {
        if self.bufs.contains_key(&ep) {
            return Err(Error::InvalidArgument);
        }
        let cfg = EpCfg::receive(addr, order, msg_order, flags);
        let tag = EpTag::new(Label::NONE, Perm::RW);
        kdtu.config_ep_remote(pe, self.vpe, ep, &cfg, &tag)?;

        self.bufs.insert(
            ep,
            RecvBuf {
                addr,
                order,
                msg_order,
                flags,
            },
        );
        debug!(
            "vpe {}: attached rbuf at {:#x} to ep {}",
            self.vpe, addr, ep
        );
        Ok(())
    }

    /// Invalidate the remote endpoint and drop the record. A detach of an
    /// endpoint with no buffer is a no-op.
    pub fn detach<R: RegisterFile>(
        &mut self,
        kdtu: &mut KernelDtu<R>,
        pe: PeId,
        ep: EpId,
    ) -> Result<()> {
        if !self.bufs.contains_key(&ep) {
            return Ok(());
        }
        kdtu.invalidate_ep_remote(pe, self.vpe, ep)?;
        self.bufs.remove(&ep);
        debug!("vpe {}: detached rbuf from ep {}", self.vpe, ep);
        Ok(())
    }

    /// Detach every recorded buffer, continuing past failures. Runs at
    /// VPE destruction; the first error is reported once every slot was
    /// attempted.
    pub fn detach_all<R: RegisterFile>(
        &mut self,
        kdtu: &mut KernelDtu<R>,
        pe: PeId,
    ) -> Result<()> {
        let mut first_err = None;
        let eps: Vec<EpId> = self.bufs.keys().copied().collect();
        for ep in eps {
            if let Err(err) = self.detach(kdtu, pe, ep) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use weft_dtu::{Dtu, EpType, SimDtu};

    use super::*;

    const PE: PeId = 3;
    const VPE: VpeId = 5;

    fn kdtu() -> KernelDtu<SimDtu> {
        KernelDtu::new(Dtu::new(SimDtu::new()), 0, 0, 4)
    }

    #[test]
    fn test_attach_programs_remote_endpoint() {
        let mut kdtu = kdtu();
        let mut rbufs = RecvBufs::new(VPE);
        rbufs.attach(&mut kdtu, PE, 6, 0x2000, 10, 6, 0).unwrap();

        let cfg = kdtu.dtu().regs().remote_ep_cfg(PE, 6);
        assert_eq!(cfg.ep_type(), Some(EpType::Receive));
        assert_eq!(cfg.addr(), 0x2000);
        assert_eq!(cfg.order(), 10);
        assert_eq!(cfg.msg_order(), 6);
        assert_eq!(
            rbufs.get(6),
            Some(&RecvBuf {
                addr: 0x2000,
                order: 10,
                msg_order: 6,
                flags: 0
            })
        );
    }

    #[test]
    fn test_duplicate_attach_rejected_without_hardware_traffic() {
        let mut kdtu = kdtu();
        let mut rbufs = RecvBufs::new(VPE);
        rbufs.attach(&mut kdtu, PE, 6, 0x2000, 10, 6, 0).unwrap();
        let issued = kdtu.dtu().regs().commands().len();

        assert_eq!(
            rbufs.attach(&mut kdtu, PE, 6, 0x4000, 10, 6, 0),
            Err(Error::InvalidArgument)
        );
        assert_eq!(kdtu.dtu().regs().commands().len(), issued);
        assert_eq!(rbufs.get(6).map(|b| b.addr), Some(0x2000));
    }

    #[test]
    fn test_detach_invalidates_and_forgets() {
        let mut kdtu = kdtu();
        let mut rbufs = RecvBufs::new(VPE);
        rbufs.attach(&mut kdtu, PE, 6, 0x2000, 10, 6, 0).unwrap();

        rbufs.detach(&mut kdtu, PE, 6).unwrap();
        assert!(rbufs.get(6).is_none());
        assert_eq!(kdtu.dtu().regs().remote_ep_cfg(PE, 6), EpCfg::INVALID);

        // Absent endpoint: no-op, no traffic.
        let issued = kdtu.dtu().regs().commands().len();
        rbufs.detach(&mut kdtu, PE, 9).unwrap();
        assert_eq!(kdtu.dtu().regs().commands().len(), issued);
    }

    #[test]
    fn test_detach_all_clears_registry() {
        let mut kdtu = kdtu();
        let mut rbufs = RecvBufs::new(VPE);
        rbufs.attach(&mut kdtu, PE, 4, 0x2000, 10, 6, 0).unwrap();
        rbufs.attach(&mut kdtu, PE, 5, 0x4000, 10, 6, 0).unwrap();

        rbufs.detach_all(&mut kdtu, PE).unwrap();
        assert!(rbufs.is_empty());
        assert_eq!(kdtu.dtu().regs().remote_ep_cfg(PE, 4), EpCfg::INVALID);
        assert_eq!(kdtu.dtu().regs().remote_ep_cfg(PE, 5), EpCfg::INVALID);
    }

    #[test]
    fn test_detach_all_attempts_every_slot() {
        let mut kdtu = kdtu();
        let mut rbufs = RecvBufs::new(VPE);
        rbufs.attach(&mut kdtu, PE, 4, 0x2000, 10, 6, 0).unwrap();
        rbufs.attach(&mut kdtu, PE, 5, 0x4000, 10, 6, 0).unwrap();

        // The first detach write fails; the second slot must still go
        // down, and the failed one stays recorded.
        kdtu.dtu_mut().regs_mut().fail_command(4, Error::PeerError);
        assert_eq!(rbufs.detach_all(&mut kdtu, PE), Err(Error::PeerError));

        assert!(rbufs.get(4).is_some());
        assert!(rbufs.get(5).is_none());
        assert_eq!(
            kdtu.dtu().regs().remote_ep_cfg(PE, 4).ep_type(),
            Some(EpType::Receive)
        );
        assert_eq!(kdtu.dtu().regs().remote_ep_cfg(PE, 5), EpCfg::INVALID);
    }
}
