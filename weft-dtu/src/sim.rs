//! Software register-file model of the DTU
//!
//! [`SimDtu`] stands in for the MMIO window on hosted builds and in tests.
//! It keeps the local register blocks as plain arrays and executes a
//! command synchronously when the command register is stored, the same
//! observable contract the hardware gives a polling driver.
//!
//! The model covers the side effects the kernel depends on: credit
//! accounting on sends, permission and bounds checks on memory commands,
//! and byte transfer into per-core memory windows. Every core implicitly
//! owns its register window at [`MMIO_BASE`], so proxy writes that deposit
//! endpoint images or ring a doorbell land somewhere inspectable. Message
//! delivery into receive buffers is not modelled; the command log is the
//! observable for that path.
//!
//! Failures can be scripted per command index with [`SimDtu::fail_command`]
//! to exercise short-circuit paths in callers.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use weft_common::{EpId, Error, PeId, Perm, Result};

use crate::ep::{CoreCfg, EpCfg, EpTag, EpType};
use crate::regs::{
    CFG_OFF, CMD_ERR_SHIFT, CmdOpCode, CmdReg, DOORBELL_OFF, EP_CFG_RCNT, EP_COUNT, EP_TAG_RCNT,
    EPS_OFF, MMIO_BASE, MMIO_SIZE, Reg, RegisterFile, TAGS_OFF, WAKEUP_SIGNAL, cmd_ep, cmd_opcode,
    ep_cfg_off, ep_tag_off,
};

/// One executed command, as snapshotted when the command register was
/// stored. `status` is the byte the model deposited on completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CmdRecord {
    pub op: u8,
    pub ep: EpId,
    pub data_addr: Reg,
    pub data_size: Reg,
    pub offset: Reg,
    pub reply_label: Reg,
    pub reply_ep: Reg,
    pub status: u8,
}

/// A contiguous span of some remote core's physical memory.
struct MemRegion {
    base: u64,
    bytes: Vec<u8>,
}

impl MemRegion {
    fn contains(&self, addr: u64, len: usize) -> bool {
        match addr.checked_add(len as u64) {
            Some(end) => addr >= self.base && end <= self.base + self.bytes.len() as u64,
            None => false,
        }
    }
}

/// In-memory DTU model implementing [`RegisterFile`].
pub struct SimDtu {
    cmd: [Reg; CmdReg::COUNT],
    eps: [[Reg; EP_CFG_RCNT]; EP_COUNT],
    tags: [[Reg; EP_TAG_RCNT]; EP_COUNT],
    cfg: [Reg; 2],
    doorbell: Reg,
    remotes: BTreeMap<PeId, Vec<MemRegion>>,
    log: Vec<CmdRecord>,
    fail_at: BTreeMap<usize, Error>,
    doorbells: BTreeMap<PeId, usize>,
}

impl Default for SimDtu {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDtu {
    pub fn new() -> Self {
        Self {
            cmd: [0; CmdReg::COUNT],
            eps: [[0; EP_CFG_RCNT]; EP_COUNT],
            tags: [[0; EP_TAG_RCNT]; EP_COUNT],
            cfg: [0; 2],
            doorbell: 0,
            remotes: BTreeMap::new(),
            log: Vec::new(),
            fail_at: BTreeMap::new(),
            doorbells: BTreeMap::new(),
        }
    }

    /// Back a span of `pe`'s physical memory so transfers to it succeed.
    /// Unbacked targets complete with [`Error::PeerError`].
    pub fn map_remote(&mut self, pe: PeId, base: u64, size: usize) {
        debug_assert!(size > 0, "empty remote mapping");
        let regions = self.ensure_pe(pe);
        debug_assert!(
            !regions
                .iter()
                .any(|r| r.contains(base, 1) || r.contains(base + size as u64 - 1, 1)),
            "overlapping remote mapping"
        );
        regions.push(MemRegion {
            base,
            bytes: alloc::vec![0; size],
        });
    }

    /// All commands executed so far, oldest first.
    pub fn commands(&self) -> &[CmdRecord] {
        &self.log
    }

    /// Script the `index`-th command (counting all commands issued over
    /// this model's lifetime, starting at 0) to fail with `err` instead
    /// of executing.
    pub fn fail_command(&mut self, index: usize, err: Error) {
        self.fail_at.insert(index, err);
    }

    /// Current credit word of a local send endpoint.
    pub fn ep_credits(&self, ep: EpId) -> u64 {
        self.eps[ep as usize][2]
    }

    /// Hand credits back to a local send endpoint, as a received reply
    /// would.
    pub fn return_credits(&mut self, ep: EpId, amount: u64) {
        self.eps[ep as usize][2] += amount;
    }

    /// Bytes of `pe`'s memory at `addr`, if that span is backed.
    pub fn remote_slice(&self, pe: PeId, addr: u64, len: usize) -> Option<&[u8]> {
        let regions = self.remotes.get(&pe)?;
        let region = regions.iter().find(|r| r.contains(addr, len))?;
        let rel = (addr - region.base) as usize;
        Some(&region.bytes[rel..rel + len])
    }

    /// Mutable access to `pe`'s memory at `addr`, if that span is backed.
    pub fn remote_slice_mut(&mut self, pe: PeId, addr: u64, len: usize) -> Option<&mut [u8]> {
        let regions = self.remotes.get_mut(&pe)?;
        let region = regions.iter_mut().find(|r| r.contains(addr, len))?;
        let rel = (addr - region.base) as usize;
        Some(&mut region.bytes[rel..rel + len])
    }

    /// Decode the endpoint config image deposited in `pe`'s register
    /// window. All-zero (invalid) if nothing was ever written there.
    pub fn remote_ep_cfg(&self, pe: PeId, ep: EpId) -> EpCfg {
        let addr = MMIO_BASE as u64 + ep_cfg_off(ep) as u64;
        let mut words = [0; EP_CFG_RCNT];
        self.read_remote_words(pe, addr, &mut words);
        EpCfg { words }
    }

    /// Decode the endpoint tag image deposited in `pe`'s register window.
    pub fn remote_ep_tag(&self, pe: PeId, ep: EpId) -> EpTag {
        let addr = MMIO_BASE as u64 + ep_tag_off(ep) as u64;
        let mut words = [0; EP_TAG_RCNT];
        self.read_remote_words(pe, addr, &mut words);
        EpTag {
            label: words[0],
            perm: words[1],
        }
    }

    /// Decode the core config block deposited in `pe`'s register window.
    pub fn remote_core_cfg(&self, pe: PeId) -> CoreCfg {
        let addr = MMIO_BASE as u64 + CFG_OFF as u64;
        let mut words = [0; 2];
        self.read_remote_words(pe, addr, &mut words);
        CoreCfg {
            core_id: words[0],
            ready: words[1],
        }
    }

    /// How many wake doorbell rings `pe` has received.
    pub fn doorbell_count(&self, pe: PeId) -> usize {
        self.doorbells.get(&pe).copied().unwrap_or(0)
    }

    fn read_remote_words(&self, pe: PeId, addr: u64, out: &mut [Reg]) {
        if let Some(bytes) = self.remote_slice(pe, addr, out.len() * 8) {
            for (i, word) in out.iter_mut().enumerate() {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
                *word = Reg::from_ne_bytes(raw);
            }
        }
    }

    fn ensure_pe(&mut self, pe: PeId) -> &mut Vec<MemRegion> {
        self.remotes.entry(pe).or_insert_with(|| {
            alloc::vec![MemRegion {
                base: MMIO_BASE as u64,
                bytes: alloc::vec![0; MMIO_SIZE],
            }]
        })
    }

    fn exec(&mut self) {
        let cmd = self.cmd[CmdReg::Command as usize];
        let op = cmd_opcode(cmd);
        if op == CmdOpCode::Idle as u8 {
            return;
        }
        let ep = cmd_ep(cmd);

        let index = self.log.len();
        let res = match self.fail_at.remove(&index) {
            Some(err) => Err(err),
            None => match CmdOpCode::from_bits(op) {
                Some(CmdOpCode::Send) => self.exec_send(ep),
                Some(CmdOpCode::Read) => self.exec_transfer(ep, false),
                Some(CmdOpCode::Write) => self.exec_transfer(ep, true),
                _ => Err(Error::NotSupported),
            },
        };
        let status = match res {
            Ok(()) => 0,
            Err(err) => err.code(),
        };

        self.log.push(CmdRecord {
            op,
            ep,
            data_addr: self.cmd[CmdReg::DataAddr as usize],
            data_size: self.cmd[CmdReg::DataSize as usize],
            offset: self.cmd[CmdReg::Offset as usize],
            reply_label: self.cmd[CmdReg::ReplyLabel as usize],
            reply_ep: self.cmd[CmdReg::ReplyEp as usize],
            status,
        });

        // Completion: opcode field back to idle, status byte set.
        self.cmd[CmdReg::Command as usize] =
            (CmdOpCode::Idle as Reg) | ((status as Reg) << CMD_ERR_SHIFT);
    }

    fn exec_send(&mut self, ep: EpId) -> Result<()> {
        if ep as usize >= EP_COUNT {
            return Err(Error::InvalidEndpoint);
        }
        let cfg = EpCfg {
            words: self.eps[ep as usize],
        };
        if cfg.ep_type() != Some(EpType::Send) {
            return Err(Error::InvalidEndpoint);
        }

        let size = self.cmd[CmdReg::DataSize as usize] as usize;
        let max = 1usize << cfg.msg_order();
        if size > max {
            return Err(Error::InvalidArgument);
        }

        // One message always costs a full slot of credit.
        let cost = max as u64;
        if self.eps[ep as usize][2] < cost {
            return Err(Error::NoCredits);
        }
        self.eps[ep as usize][2] -= cost;
        Ok(())
    }

    fn exec_transfer(&mut self, ep: EpId, is_write: bool) -> Result<()> {
        if ep as usize >= EP_COUNT {
            return Err(Error::InvalidEndpoint);
        }
        let cfg = EpCfg {
            words: self.eps[ep as usize],
        };
        if cfg.ep_type() != Some(EpType::Memory) {
            return Err(Error::InvalidEndpoint);
        }
        let perm = Perm::from_bits(self.tags[ep as usize][1] as u8);
        let need = if is_write { Perm::W } else { Perm::R };
        if !perm.contains(need) {
            return Err(Error::InvalidEndpoint);
        }

        let host = self.cmd[CmdReg::DataAddr as usize] as usize;
        let size = self.cmd[CmdReg::DataSize as usize] as usize;
        let off = self.cmd[CmdReg::Offset as usize];
        let end = off.checked_add(size as u64).ok_or(Error::InvalidArgument)?;
        if end > cfg.size() {
            return Err(Error::InvalidArgument);
        }

        let dst_pe = cfg.dst_pe();
        let addr = cfg.addr().checked_add(off).ok_or(Error::InvalidArgument)?;

        self.ensure_pe(dst_pe);
        let regions = match self.remotes.get_mut(&dst_pe) {
            Some(regions) => regions,
            None => return Err(Error::PeerError),
        };
        let region = match regions.iter_mut().find(|r| r.contains(addr, size)) {
            Some(region) => region,
            None => return Err(Error::PeerError),
        };
        let rel = (addr - region.base) as usize;

        let mut rang_doorbell = false;
        if is_write {
            // SAFETY: models the DMA the hardware performs. The driver
            // staged `host` from a slice borrow that is still live while
            // it polls for completion.
            let src = unsafe { core::slice::from_raw_parts(host as *const u8, size) };
            region.bytes[rel..rel + size].copy_from_slice(src);

            let db = MMIO_BASE as u64 + DOORBELL_OFF as u64;
            if addr <= db && db + 8 <= addr + size as u64 {
                let at = (db - region.base) as usize;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&region.bytes[at..at + 8]);
                rang_doorbell = Reg::from_ne_bytes(raw) == WAKEUP_SIGNAL;
            }
        } else {
            // SAFETY: as above, but staged from a live mutable borrow.
            let dst = unsafe { core::slice::from_raw_parts_mut(host as *mut u8, size) };
            dst.copy_from_slice(&region.bytes[rel..rel + size]);
        }

        if rang_doorbell {
            *self.doorbells.entry(dst_pe).or_insert(0) += 1;
        }
        Ok(())
    }
}

impl RegisterFile for SimDtu {
    fn read_reg(&self, offset: usize) -> Reg {
        match offset {
            o if o < CmdReg::COUNT * 8 => self.cmd[o / 8],
            o if (EPS_OFF..TAGS_OFF).contains(&o) => {
                let rel = o - EPS_OFF;
                let ep = rel / (EP_CFG_RCNT * 8);
                let word = (rel % (EP_CFG_RCNT * 8)) / 8;
                if ep < EP_COUNT { self.eps[ep][word] } else { 0 }
            }
            o if (TAGS_OFF..CFG_OFF).contains(&o) => {
                let rel = o - TAGS_OFF;
                let ep = rel / (EP_TAG_RCNT * 8);
                let word = (rel % (EP_TAG_RCNT * 8)) / 8;
                if ep < EP_COUNT { self.tags[ep][word] } else { 0 }
            }
            o if (CFG_OFF..CFG_OFF + 16).contains(&o) => self.cfg[(o - CFG_OFF) / 8],
            DOORBELL_OFF => self.doorbell,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: usize, value: Reg) {
        match offset {
            o if o < CmdReg::COUNT * 8 => {
                self.cmd[o / 8] = value;
                if o == CmdReg::Command.offset() {
                    self.exec();
                }
            }
            o if (EPS_OFF..TAGS_OFF).contains(&o) => {
                let rel = o - EPS_OFF;
                let ep = rel / (EP_CFG_RCNT * 8);
                let word = (rel % (EP_CFG_RCNT * 8)) / 8;
                if ep < EP_COUNT {
                    self.eps[ep][word] = value;
                }
            }
            o if (TAGS_OFF..CFG_OFF).contains(&o) => {
                let rel = o - TAGS_OFF;
                let ep = rel / (EP_TAG_RCNT * 8);
                let word = (rel % (EP_TAG_RCNT * 8)) / 8;
                if ep < EP_COUNT {
                    self.tags[ep][word] = value;
                }
            }
            o if (CFG_OFF..CFG_OFF + 16).contains(&o) => self.cfg[(o - CFG_OFF) / 8] = value,
            DOORBELL_OFF => self.doorbell = value,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use weft_common::Label;

    use super::*;
    use crate::regs::build_cmd;

    #[test]
    fn test_command_register_routing() {
        let mut sim = SimDtu::new();
        sim.write_reg(CmdReg::DataSize.offset(), 0x1234);
        assert_eq!(sim.read_reg(CmdReg::DataSize.offset()), 0x1234);
    }

    #[test]
    fn test_ep_block_routing() {
        let mut sim = SimDtu::new();
        let off = ep_cfg_off(7);
        sim.write_reg(off + 8, 0xDEAD);
        assert_eq!(sim.read_reg(off + 8), 0xDEAD);
        assert_eq!(sim.eps[7][1], 0xDEAD);
    }

    #[test]
    fn test_unsupported_opcode_reports_status() {
        let mut sim = SimDtu::new();
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Sleep));
        let cmd = sim.read_reg(CmdReg::Command.offset());
        assert_eq!(cmd_opcode(cmd), CmdOpCode::Idle as u8);
        assert_eq!(
            crate::regs::cmd_error(cmd),
            Error::NotSupported.code()
        );
    }

    #[test]
    fn test_send_against_invalid_ep() {
        let mut sim = SimDtu::new();
        sim.write_reg(CmdReg::DataSize.offset(), 8);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(3, CmdOpCode::Send));
        assert_eq!(sim.commands()[0].status, Error::InvalidEndpoint.code());
    }

    #[test]
    fn test_write_to_unbacked_memory_is_peer_error() {
        let mut sim = SimDtu::new();
        sim.eps[0] = EpCfg::memory(9, 1, 0x1000_0000, 0x1000).words;
        sim.tags[0] = [0, Perm::RW.bits() as Reg];

        let data = [0u8; 4];
        sim.write_reg(CmdReg::DataAddr.offset(), data.as_ptr() as Reg);
        sim.write_reg(CmdReg::DataSize.offset(), data.len() as Reg);
        sim.write_reg(CmdReg::Offset.offset(), 0);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Write));
        assert_eq!(sim.commands()[0].status, Error::PeerError.code());
    }

    #[test]
    fn test_write_without_permission() {
        let mut sim = SimDtu::new();
        sim.map_remote(2, 0x1000_0000, 0x1000);
        sim.eps[0] = EpCfg::memory(2, 1, 0x1000_0000, 0x1000).words;
        sim.tags[0] = [0, Perm::R.bits() as Reg];

        let data = [0u8; 4];
        sim.write_reg(CmdReg::DataAddr.offset(), data.as_ptr() as Reg);
        sim.write_reg(CmdReg::DataSize.offset(), data.len() as Reg);
        sim.write_reg(CmdReg::Offset.offset(), 0);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Write));
        assert_eq!(sim.commands()[0].status, Error::InvalidEndpoint.code());
    }

    #[test]
    fn test_out_of_bounds_transfer() {
        let mut sim = SimDtu::new();
        sim.map_remote(2, 0x1000_0000, 0x100);
        sim.eps[0] = EpCfg::memory(2, 1, 0x1000_0000, 0x100).words;
        sim.tags[0] = [0, Perm::RW.bits() as Reg];

        let data = [0u8; 32];
        sim.write_reg(CmdReg::DataAddr.offset(), data.as_ptr() as Reg);
        sim.write_reg(CmdReg::DataSize.offset(), data.len() as Reg);
        sim.write_reg(CmdReg::Offset.offset(), 0xF0);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Write));
        assert_eq!(sim.commands()[0].status, Error::InvalidArgument.code());
    }

    #[test]
    fn test_wrapping_span_is_rejected() {
        let mut sim = SimDtu::new();
        sim.map_remote(1, 0x1000, 0x100);
        assert!(sim.remote_slice(1, u64::MAX - 8, 32).is_none());
    }

    #[test]
    fn test_doorbell_ring_requires_signal_value() {
        let mut sim = SimDtu::new();
        // Memory endpoint aimed at core 5's register window.
        sim.eps[0] = EpCfg::memory(5, 0, MMIO_BASE as u64, MMIO_SIZE as u64).words;
        sim.tags[0] = [0, Perm::RW.bits() as Reg];

        // A store of the wrong value does not count as a ring.
        let bogus = 0u64.to_ne_bytes();
        sim.write_reg(CmdReg::DataAddr.offset(), bogus.as_ptr() as Reg);
        sim.write_reg(CmdReg::DataSize.offset(), 8);
        sim.write_reg(CmdReg::Offset.offset(), DOORBELL_OFF as Reg);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Write));
        assert_eq!(sim.doorbell_count(5), 0);

        let signal = WAKEUP_SIGNAL.to_ne_bytes();
        sim.write_reg(CmdReg::DataAddr.offset(), signal.as_ptr() as Reg);
        sim.write_reg(CmdReg::DataSize.offset(), 8);
        sim.write_reg(CmdReg::Offset.offset(), DOORBELL_OFF as Reg);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Write));
        assert_eq!(sim.doorbell_count(5), 1);
    }

    #[test]
    fn test_deposited_ep_image_readback() {
        let mut sim = SimDtu::new();
        sim.eps[0] = EpCfg::memory(3, 0, MMIO_BASE as u64, MMIO_SIZE as u64).words;
        sim.tags[0] = [0, Perm::RW.bits() as Reg];

        let image = EpCfg::send(1, 2, 3, 6, 64);
        let mut raw = [0u8; EP_CFG_RCNT * 8];
        for (i, word) in image.words.iter().enumerate() {
            raw[i * 8..i * 8 + 8].copy_from_slice(&word.to_ne_bytes());
        }
        sim.write_reg(CmdReg::DataAddr.offset(), raw.as_ptr() as Reg);
        sim.write_reg(CmdReg::DataSize.offset(), raw.len() as Reg);
        sim.write_reg(CmdReg::Offset.offset(), ep_cfg_off(4) as Reg);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Write));

        assert_eq!(sim.commands()[0].status, 0);
        assert_eq!(sim.remote_ep_cfg(3, 4), image);

        let tag = EpTag::new(Label::new(0xBEEF), Perm::RWX);
        let mut raw = [0u8; EP_TAG_RCNT * 8];
        raw[0..8].copy_from_slice(&tag.label.to_ne_bytes());
        raw[8..16].copy_from_slice(&tag.perm.to_ne_bytes());
        sim.write_reg(CmdReg::DataAddr.offset(), raw.as_ptr() as Reg);
        sim.write_reg(CmdReg::DataSize.offset(), raw.len() as Reg);
        sim.write_reg(CmdReg::Offset.offset(), ep_tag_off(4) as Reg);
        sim.write_reg(CmdReg::Command.offset(), build_cmd(0, CmdOpCode::Write));

        assert_eq!(sim.remote_ep_tag(3, 4), tag);
    }
}
