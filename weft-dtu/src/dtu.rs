//! DTU transfer engine
//!
//! Stateless driver for one core's DTU. The register interface is not
//! atomic across stores, so every command follows the same sequence:
//! stage the operand registers, issue [`compiler_barrier`], store the
//! command register, then poll the command register until the opcode field
//! reads back idle and decode the status byte the hardware deposited.
//!
//! The barrier between staging and firing is load-bearing: without it the
//! compiler may sink operand stores past the command store, and the
//! hardware then snapshots stale operands. Reordering is a correctness bug
//! here, not a performance concern.
//!
//! Transfers larger than [`MAX_PACKET_SIZE`] are split into packets. The
//! packet loop aborts on the first failing packet and returns its error;
//! packets already transferred are *not* rolled back, so a failed bulk
//! write leaves the remote range partially updated. Callers that need
//! stronger guarantees layer them above this engine.

use log::trace;

use weft_common::{EpId, Error, Label, Result};
use weft_mmio::barrier::compiler_barrier;

use crate::ep::{EpCfg, EpTag};
use crate::regs::{
    CmdOpCode, CmdReg, EP_CFG_RCNT, EP_COUNT, MAX_PACKET_SIZE, Reg, RegisterFile, build_cmd,
    cmd_error, cmd_opcode, ep_cfg_off, ep_tag_off,
};

/// Driver for the local core's DTU register window.
///
/// Generic over the [`RegisterFile`] seam: production wraps the MMIO
/// window, tests and hosted platforms wrap the software model.
pub struct Dtu<R: RegisterFile> {
    regs: R,
}

impl<R: RegisterFile> Dtu<R> {
    /// Create a driver over the given register file.
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Access the underlying register file.
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Mutable access to the underlying register file.
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    #[inline]
    fn read_cmd(&self, reg: CmdReg) -> Reg {
        self.regs.read_reg(reg.offset())
    }

    #[inline]
    fn write_cmd(&mut self, reg: CmdReg, value: Reg) {
        self.regs.write_reg(reg.offset(), value);
    }

    /// Program one of the local core's own endpoint slots.
    ///
    /// Remote slots are never written this way; they go through the proxy
    /// channel's memory endpoint.
    pub fn config_ep(&mut self, ep: EpId, cfg: &EpCfg, tag: &EpTag) {
        debug_assert!((ep as usize) < EP_COUNT, "endpoint index out of range");
        let cfg_off = ep_cfg_off(ep);
        for (i, word) in cfg.words.iter().enumerate() {
            self.regs.write_reg(cfg_off + i * 8, *word);
        }
        let tag_off = ep_tag_off(ep);
        self.regs.write_reg(tag_off, tag.label);
        self.regs.write_reg(tag_off + 8, tag.perm);
    }

    /// Read back a local endpoint's config block.
    #[must_use]
    pub fn ep_cfg(&self, ep: EpId) -> EpCfg {
        debug_assert!((ep as usize) < EP_COUNT, "endpoint index out of range");
        let off = ep_cfg_off(ep);
        let mut words = [0; EP_CFG_RCNT];
        for (i, word) in words.iter_mut().enumerate() {
            *word = self.regs.read_reg(off + i * 8);
        }
        EpCfg { words }
    }

    /// Read back a local endpoint's tag block.
    #[must_use]
    pub fn ep_tag(&self, ep: EpId) -> EpTag {
        debug_assert!((ep as usize) < EP_COUNT, "endpoint index out of range");
        let off = ep_tag_off(ep);
        EpTag {
            label: self.regs.read_reg(off),
            perm: self.regs.read_reg(off + 8),
        }
    }

    /// Transmit a message through a send endpoint.
    ///
    /// `reply_label` and `reply_ep` describe where and how the receiver's
    /// reply is to arrive. Fails with [`Error::NoCredits`] when the
    /// endpoint's credit budget cannot cover one message, with
    /// [`Error::InvalidEndpoint`] when the slot is not a send endpoint,
    /// or with the peer's reported error.
    pub fn send(&mut self, ep: EpId, msg: &[u8], reply_label: Label, reply_ep: EpId) -> Result<()> {
        trace!(
            "send: ep={} len={} reply_ep={}",
            ep,
            msg.len(),
            reply_ep
        );
        self.write_cmd(CmdReg::DataAddr, msg.as_ptr() as Reg);
        self.write_cmd(CmdReg::DataSize, msg.len() as Reg);
        self.write_cmd(CmdReg::ReplyLabel, reply_label.value());
        self.write_cmd(CmdReg::ReplyEp, reply_ep as Reg);
        compiler_barrier();
        self.write_cmd(CmdReg::Command, build_cmd(ep, CmdOpCode::Send));
        self.wait_idle()
    }

    /// Copy remote memory into `data` through a memory endpoint.
    ///
    /// A zero-length request is a no-op returning success.
    pub fn read(&mut self, ep: EpId, data: &mut [u8], off: u64) -> Result<()> {
        trace!("read: ep={} len={} off={:#x}", ep, data.len(), off);
        self.transfer(CmdOpCode::Read, ep, data.as_mut_ptr() as usize, data.len(), off)
    }

    /// Copy `data` into remote memory through a memory endpoint.
    ///
    /// A zero-length request is a no-op returning success.
    pub fn write(&mut self, ep: EpId, data: &[u8], off: u64) -> Result<()> {
        trace!("write: ep={} len={} off={:#x}", ep, data.len(), off);
        self.transfer(CmdOpCode::Write, ep, data.as_ptr() as usize, data.len(), off)
    }

    /// The packet loop shared by `read` and `write`.
    ///
    /// Advances buffer address and remote offset in lock-step so
    /// consecutive packets neither overlap nor gap; aborts with the first
    /// packet's error without touching the remaining packets.
    fn transfer(
        &mut self,
        op: CmdOpCode,
        ep: EpId,
        mut addr: usize,
        mut rem: usize,
        mut off: u64,
    ) -> Result<()> {
        while rem > 0 {
            let amount = rem.min(MAX_PACKET_SIZE);
            self.write_cmd(CmdReg::DataAddr, addr as Reg);
            self.write_cmd(CmdReg::DataSize, amount as Reg);
            self.write_cmd(CmdReg::Offset, off);
            compiler_barrier();
            self.write_cmd(CmdReg::Command, build_cmd(ep, op));
            self.wait_idle()?;

            addr += amount;
            off += amount as u64;
            rem -= amount;
        }
        Ok(())
    }

    /// Poll the command register until the in-flight command completes,
    /// then decode its status byte.
    fn wait_idle(&self) -> Result<()> {
        loop {
            let cmd = self.read_cmd(CmdReg::Command);
            if cmd_opcode(cmd) == CmdOpCode::Idle as u8 {
                return match Error::from_code(cmd_error(cmd)) {
                    None => Ok(()),
                    Some(err) => Err(err),
                };
            }
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use weft_common::Perm;

    use super::*;
    use crate::sim::SimDtu;

    const PE: weft_common::PeId = 4;
    const MEM_EP: EpId = 5;
    const RAM: u64 = 0x8000_0000;

    fn dtu_with_mem_ep(size: u64) -> Dtu<SimDtu> {
        let mut sim = SimDtu::new();
        sim.map_remote(PE, RAM, size as usize);
        let mut dtu = Dtu::new(sim);
        dtu.config_ep(
            MEM_EP,
            &EpCfg::memory(PE, 1, RAM, size),
            &EpTag::new(Label::new(0x11), Perm::RW),
        );
        dtu
    }

    #[test]
    fn test_write_packetizes_at_max_packet_size() {
        let total = 3 * MAX_PACKET_SIZE + 7;
        let data: alloc::vec::Vec<u8> = (0..total).map(|i| i as u8).collect();
        let mut dtu = dtu_with_mem_ep(0x10000);

        dtu.write(MEM_EP, &data, 0).unwrap();

        let cmds = dtu.regs().commands();
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[3].data_size, 7);

        // Offsets are contiguous: no overlap, no gap.
        let mut expected_off = 0u64;
        for cmd in cmds {
            assert_eq!(cmd.op, CmdOpCode::Write as u8);
            assert_eq!(cmd.ep, MEM_EP);
            assert_eq!(cmd.offset, expected_off);
            expected_off += cmd.data_size;
        }
        assert_eq!(expected_off, total as u64);

        // And the full image actually landed.
        assert_eq!(dtu.regs().remote_slice(PE, RAM, total).unwrap(), &data[..]);
    }

    #[test]
    fn test_zero_length_transfer_is_noop() {
        let mut dtu = dtu_with_mem_ep(0x1000);
        dtu.write(MEM_EP, &[], 0).unwrap();
        let mut empty: [u8; 0] = [];
        dtu.read(MEM_EP, &mut empty, 0).unwrap();
        assert_eq!(dtu.regs().commands().len(), 0);
    }

    #[test]
    fn test_failing_packet_short_circuits() {
        let total = 4 * MAX_PACKET_SIZE;
        let data = alloc::vec![0xA5u8; total];
        let mut dtu = dtu_with_mem_ep(0x10000);

        // Second packet of this call reports a peer fault.
        dtu.regs_mut().fail_command(1, Error::PeerError);

        assert_eq!(dtu.write(MEM_EP, &data, 0), Err(Error::PeerError));

        // Packets three and four were never issued.
        let cmds = dtu.regs().commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1].status, Error::PeerError.code());

        // The first packet's bytes stay put: no rollback.
        assert_eq!(
            dtu.regs().remote_slice(PE, RAM, MAX_PACKET_SIZE).unwrap(),
            &data[..MAX_PACKET_SIZE]
        );
    }

    #[test]
    fn test_read_returns_remote_bytes() {
        let mut dtu = dtu_with_mem_ep(0x1000);
        let seed: alloc::vec::Vec<u8> = (0..256).map(|i| (255 - i) as u8).collect();
        dtu.regs_mut()
            .remote_slice_mut(PE, RAM + 64, seed.len())
            .unwrap()
            .copy_from_slice(&seed);

        let mut buf = alloc::vec![0u8; 256];
        dtu.read(MEM_EP, &mut buf, 64).unwrap();
        assert_eq!(buf, seed);
    }

    #[test]
    fn test_transfer_against_wrong_endpoint_kind() {
        let mut sim = SimDtu::new();
        sim.map_remote(PE, RAM, 0x1000);
        let mut dtu = Dtu::new(sim);
        dtu.config_ep(
            MEM_EP,
            &EpCfg::send(PE, 1, 2, 6, 64),
            &EpTag::new(Label::new(1), Perm::NONE),
        );

        let mut buf = [0u8; 16];
        assert_eq!(
            dtu.read(MEM_EP, &mut buf, 0),
            Err(Error::InvalidEndpoint)
        );
    }

    #[test]
    fn test_send_consumes_credits() {
        let mut dtu = Dtu::new(SimDtu::new());
        // Two messages of credit at order 6.
        dtu.config_ep(
            2,
            &EpCfg::send(PE, 1, 9, 6, 128),
            &EpTag::new(Label::new(0x77), Perm::NONE),
        );

        let msg = [1u8; 32];
        dtu.send(2, &msg, Label::new(0xAA), 3).unwrap();
        assert_eq!(dtu.regs().ep_credits(2), 64);

        dtu.send(2, &msg, Label::new(0xAA), 3).unwrap();
        assert_eq!(dtu.regs().ep_credits(2), 0);

        assert_eq!(
            dtu.send(2, &msg, Label::new(0xAA), 3),
            Err(Error::NoCredits)
        );

        dtu.regs_mut().return_credits(2, 64);
        dtu.send(2, &msg, Label::new(0xAA), 3).unwrap();
    }

    #[test]
    fn test_send_stages_reply_routing() {
        let mut dtu = Dtu::new(SimDtu::new());
        dtu.config_ep(
            1,
            &EpCfg::send(PE, 1, 4, 6, 64),
            &EpTag::new(Label::new(0x9), Perm::NONE),
        );

        dtu.send(1, &[0u8; 8], Label::new(0xC0FFEE), 7).unwrap();

        let cmds = dtu.regs().commands();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].op, CmdOpCode::Send as u8);
        assert_eq!(cmds[0].reply_label, 0xC0FFEE);
        assert_eq!(cmds[0].reply_ep, 7);
    }

    #[test]
    fn test_local_ep_readback() {
        let mut dtu = Dtu::new(SimDtu::new());
        let cfg = EpCfg::memory(3, 2, 0x4000, 0x100);
        let tag = EpTag::new(Label::new(0x5), Perm::R);
        dtu.config_ep(9, &cfg, &tag);

        assert_eq!(dtu.ep_cfg(9), cfg);
        assert_eq!(dtu.ep_tag(9), tag);
    }
}
