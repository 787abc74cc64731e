//! Kernel-side DTU proxy channel
//!
//! Remote cores cannot program their own DTU while suspended, and no
//! command exists for writing another core's registers directly. The
//! kernel instead reaches into a remote register window with ordinary
//! memory writes: it programs its own reserved endpoint ([`TMP_EP`]) as a
//! memory endpoint covering the target's window, fences, and then writes
//! register images as payload.
//!
//! Every remote write follows that three-step shape: stage the proxy
//! endpoint, [`full_barrier`], packetized payload write. There is no
//! acknowledgement round-trip; completion of the payload write is the
//! contract. Serialisation is structural: all methods take `&mut self`
//! and the kernel has one thread of control.

use log::{debug, trace};
use zerocopy::IntoBytes;

use weft_common::cfg::{SYSC_CREDITS, SYSC_EP, SYSC_MSGSIZE_ORD, TMP_EP};
use weft_common::{EpId, Label, PeId, Perm, Result, VpeId};
use weft_dtu::regs::{
    ep_cfg_off, ep_tag_off, RegisterFile, CFG_OFF, DOORBELL_OFF, MMIO_BASE, MMIO_SIZE,
    WAKEUP_SIGNAL,
};
use weft_dtu::{CoreCfg, Dtu, EpCfg, EpTag};
use weft_mmio::barrier::full_barrier;

/// Syscall label for a VPE, derived from its id.
///
/// The high bit marks the label as kernel-issued so a forged zero-based
/// label cannot collide with it.
#[must_use]
pub const fn syscall_label(vpe: VpeId) -> Label {
    Label::new(1u64 << 63 | vpe as u64)
}

/// The kernel's handle on its own DTU, plus the identity of the kernel
/// endpoint syscalls arrive at.
pub struct KernelDtu<R: RegisterFile> {
    dtu: Dtu<R>,
    pe: PeId,
    vpe: VpeId,
    sysc_rep: EpId,
}

impl<R: RegisterFile> KernelDtu<R> {
    /// Wrap the kernel core's DTU.
    ///
    /// `pe`/`vpe` identify the kernel itself; `sysc_rep` is the kernel's
    /// local receive endpoint that VPE syscall gates aim at.
    pub fn new(dtu: Dtu<R>, pe: PeId, vpe: VpeId, sysc_rep: EpId) -> Self {
        Self {
            dtu,
            pe,
            vpe,
            sysc_rep,
        }
    }

    pub fn dtu(&self) -> &Dtu<R> {
        &self.dtu
    }

    pub fn dtu_mut(&mut self) -> &mut Dtu<R> {
        &mut self.dtu
    }

    /// Stage the proxy endpoint at the target core's register window,
    /// then write `data` at `offset` within that window.
    fn write_remote(&mut self, pe: PeId, vpe: VpeId, offset: usize, data: &[u8]) -> Result<()> {
        let window = EpCfg::memory(pe, vpe, MMIO_BASE as u64, MMIO_SIZE as u64);
        let tag = EpTag::new(Label::NONE, Perm::RW);
        self.dtu.config_ep(TMP_EP, &window, &tag);
        full_barrier();
        self.dtu.write(TMP_EP, data, offset as u64)
    }

    /// Deposit an endpoint's config and tag images on a remote core.
    pub fn config_ep_remote(
        &mut self,
        pe: PeId,
        vpe: VpeId,
        ep: EpId,
        cfg: &EpCfg,
        tag: &EpTag,
    ) -> Result<()> {
        debug!("kdtu: pe {} vpe {}: configure ep {}", pe, vpe, ep);
        self.write_remote(pe, vpe, ep_cfg_off(ep), cfg.as_bytes())?;
        self.write_remote(pe, vpe, ep_tag_off(ep), tag.as_bytes())
    }

    /// Disable a remote endpoint: all-zero config and tag images, so the
    /// slot reads as invalid with cleared permissions and credits.
    pub fn invalidate_ep_remote(&mut self, pe: PeId, vpe: VpeId, ep: EpId) -> Result<()> {
        debug!("kdtu: pe {} vpe {}: invalidate ep {}", pe, vpe, ep);
        self.write_remote(pe, vpe, ep_cfg_off(ep), EpCfg::INVALID.as_bytes())?;
        self.write_remote(pe, vpe, ep_tag_off(ep), EpTag::INVALID.as_bytes())
    }

    /// Deposit the core configuration block on a remote core.
    pub fn write_core_cfg(&mut self, pe: PeId, vpe: VpeId, cfg: &CoreCfg) -> Result<()> {
        trace!("kdtu: pe {}: core config", pe);
        self.write_remote(pe, vpe, CFG_OFF, cfg.as_bytes())
    }

    /// Ring a remote core's wake doorbell.
    pub fn wakeup(&mut self, pe: PeId, vpe: VpeId) -> Result<()> {
        trace!("kdtu: pe {}: wakeup", pe);
        let signal = WAKEUP_SIGNAL.to_ne_bytes();
        self.write_remote(pe, vpe, DOORBELL_OFF, &signal)
    }

    /// Program a VPE's syscall channel on its core.
    ///
    /// Writes, in order: the send endpoint image for [`SYSC_EP`] aimed at
    /// the kernel's syscall receive endpoint, the tag carrying the VPE's
    /// syscall label with the full permission mask, and the core
    /// configuration block marking the core ready.
    pub fn config_sysc_chan(&mut self, pe: PeId, vpe: VpeId) -> Result<()> {
        debug!("kdtu: pe {} vpe {}: syscall channel", pe, vpe);
        let chan = EpCfg::send(self.pe, self.vpe, self.sysc_rep, SYSC_MSGSIZE_ORD, SYSC_CREDITS);
        let tag = EpTag::new(syscall_label(vpe), Perm::RWX);
        self.config_ep_remote(pe, vpe, SYSC_EP, &chan, &tag)?;
        self.write_core_cfg(pe, vpe, &CoreCfg::new(pe))
    }
}

#[cfg(test)]
mod tests {
    use weft_dtu::regs::CmdOpCode;
    use weft_dtu::{EpType, SimDtu};

    use super::*;

    const KERNEL_PE: PeId = 0;
    const KERNEL_VPE: VpeId = 0;
    const KSYS_REP: EpId = 4;

    fn kdtu() -> KernelDtu<SimDtu> {
        KernelDtu::new(Dtu::new(SimDtu::new()), KERNEL_PE, KERNEL_VPE, KSYS_REP)
    }

    #[test]
    fn test_config_ep_remote_deposits_both_images() {
        let mut kdtu = kdtu();
        let cfg = EpCfg::send(3, 9, 1, 6, 64);
        let tag = EpTag::new(Label::new(0x44), Perm::RWX);
        kdtu.config_ep_remote(5, 9, 6, &cfg, &tag).unwrap();

        let sim = kdtu.dtu().regs();
        assert_eq!(sim.remote_ep_cfg(5, 6), cfg);
        assert_eq!(sim.remote_ep_tag(5, 6), tag);

        // Two payload writes, each a single packet through the proxy slot.
        let cmds = sim.commands();
        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| c.ep == TMP_EP));
        assert!(cmds.iter().all(|c| c.op == CmdOpCode::Write as u8));
    }

    #[test]
    fn test_invalidate_zeroes_remote_slot() {
        let mut kdtu = kdtu();
        let cfg = EpCfg::memory(2, 7, 0x9000, 0x100);
        let tag = EpTag::new(Label::new(0x1), Perm::RW);
        kdtu.config_ep_remote(2, 7, 10, &cfg, &tag).unwrap();
        assert_eq!(kdtu.dtu().regs().remote_ep_cfg(2, 10).ep_type(), Some(EpType::Memory));

        kdtu.invalidate_ep_remote(2, 7, 10).unwrap();
        let sim = kdtu.dtu().regs();
        assert_eq!(sim.remote_ep_cfg(2, 10), EpCfg::INVALID);
        assert_eq!(sim.remote_ep_tag(2, 10), EpTag::INVALID);
        assert_eq!(sim.remote_ep_tag(2, 10).perm_bits(), Perm::NONE);
    }

    #[test]
    fn test_wakeup_rings_doorbell_once() {
        let mut kdtu = kdtu();
        kdtu.wakeup(8, 1).unwrap();
        assert_eq!(kdtu.dtu().regs().doorbell_count(8), 1);
        assert_eq!(kdtu.dtu().regs().doorbell_count(7), 0);
    }

    #[test]
    fn test_sysc_chan_bootstrap_sequence() {
        let mut kdtu = kdtu();
        kdtu.config_sysc_chan(6, 11).unwrap();

        let sim = kdtu.dtu().regs();
        let chan = sim.remote_ep_cfg(6, SYSC_EP);
        assert_eq!(chan.ep_type(), Some(EpType::Send));
        assert_eq!(chan.dst_pe(), KERNEL_PE);
        assert_eq!(chan.dst_vpe(), KERNEL_VPE);
        assert_eq!(chan.dst_ep(), KSYS_REP);
        assert_eq!(chan.msg_order(), SYSC_MSGSIZE_ORD);
        assert_eq!(chan.credits(), SYSC_CREDITS);

        let tag = sim.remote_ep_tag(6, SYSC_EP);
        assert_eq!(tag.label, syscall_label(11).value());
        assert_eq!(tag.perm_bits(), Perm::RWX);

        let core = sim.remote_core_cfg(6);
        assert_eq!(core.core_id, 6);
        assert_eq!(core.ready, 1);

        // Bootstrap is exactly three payload writes in channel, tag,
        // core-config order.
        let cmds = sim.commands();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].offset, ep_cfg_off(SYSC_EP) as u64);
        assert_eq!(cmds[1].offset, ep_tag_off(SYSC_EP) as u64);
        assert_eq!(cmds[2].offset, CFG_OFF as u64);
    }

    #[test]
    fn test_labels_differ_per_vpe_and_are_marked() {
        assert_ne!(syscall_label(1), syscall_label(2));
        assert_ne!(syscall_label(0), Label::NONE);
        assert_ne!(syscall_label(0).value(), 0);
    }
}
