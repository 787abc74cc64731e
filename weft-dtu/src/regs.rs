//! DTU register map
//!
//! Every core exposes one DTU register window at the same physical address.
//! The window layout is a hardware contract shared with remote cores: the
//! kernel programs *other* cores' DTUs by writing into their windows through
//! a memory endpoint, so these offsets must match on every core in the
//! system.
//!
//! # Window layout
//!
//! | Offset              | Contents                                   |
//! |---------------------|--------------------------------------------|
//! | `0x0000`            | command registers (one [`Reg`] each)       |
//! | [`EPS_OFF`]         | endpoint config blocks, 3 regs per slot    |
//! | [`TAGS_OFF`]        | endpoint tag blocks, 2 regs per slot       |
//! | [`CFG_OFF`]         | core configuration block                   |
//! | [`DOORBELL_OFF`]    | wake doorbell register                     |

use weft_common::EpId;
use weft_mmio::MmioRegion;

/// A DTU register value.
pub type Reg = u64;

/// Physical base address of the DTU register window, identical on every
/// core.
pub const MMIO_BASE: usize = 0xF000_0000;

/// Size of the DTU register window in bytes.
pub const MMIO_SIZE: usize = 0x4000;

/// Offset of the endpoint config blocks within the window.
pub const EPS_OFF: usize = 0x1000;

/// Offset of the endpoint tag blocks within the window.
pub const TAGS_OFF: usize = 0x2000;

/// Offset of the core configuration block within the window.
pub const CFG_OFF: usize = 0x3000;

/// Offset of the wake doorbell register within the window.
///
/// Storing [`WAKEUP_SIGNAL`] here injects the core's wake IRQ; the trap
/// handler of a parked core resumes on it.
pub const DOORBELL_OFF: usize = 0x3010;

/// The value a doorbell store must carry to inject the wake IRQ.
pub const WAKEUP_SIGNAL: Reg = 0x57A4;

/// Number of endpoint slots per core.
pub const EP_COUNT: usize = 16;

/// Registers in one endpoint config block.
pub const EP_CFG_RCNT: usize = 3;

/// Registers in one endpoint tag block.
pub const EP_TAG_RCNT: usize = 2;

/// Largest payload the DTU moves in one command; larger transfers are
/// split into packets of this size by the driver.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Command registers, one [`Reg`] each, at `index * 8` from the window
/// base.
///
/// A command is staged into the operand registers and fired by storing
/// [`CmdReg::Command`]. On completion the hardware resets the opcode field
/// of the command register to [`CmdOpCode::Idle`] and deposits a status
/// byte (see [`cmd_error`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum CmdReg {
    /// Opcode, endpoint and (on completion) status.
    Command = 0,
    /// Local address of the message or transfer buffer.
    DataAddr = 1,
    /// Size of the message or transfer chunk in bytes.
    DataSize = 2,
    /// Byte offset into the remote memory region (read/write only).
    Offset = 3,
    /// Label the receiver's reply will carry (send only).
    ReplyLabel = 4,
    /// Local endpoint the reply is to arrive on (send only).
    ReplyEp = 5,
}

impl CmdReg {
    /// Number of command registers.
    pub const COUNT: usize = 6;

    /// Byte offset of this register within the window.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self as usize * 8
    }
}

/// Command opcodes understood by the DTU.
///
/// The full hardware table; the kernel core issues `Send`, `Read` and
/// `Write` only, the remaining opcodes belong to user-level receive paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdOpCode {
    /// No command in flight; also the completion state.
    Idle = 0,
    /// Transmit a message through a send endpoint.
    Send = 1,
    /// Transmit a reply through a received message's slot.
    Reply = 2,
    /// Copy remote memory into a local buffer.
    Read = 3,
    /// Copy a local buffer into remote memory.
    Write = 4,
    /// Fetch the next pending message from a receive endpoint.
    FetchMsg = 5,
    /// Acknowledge a fetched message, freeing its slot.
    AckMsg = 6,
    /// Park the core until a message arrives.
    Sleep = 7,
}

impl CmdOpCode {
    /// Decode an opcode nibble from a command word.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Idle),
            1 => Some(Self::Send),
            2 => Some(Self::Reply),
            3 => Some(Self::Read),
            4 => Some(Self::Write),
            5 => Some(Self::FetchMsg),
            6 => Some(Self::AckMsg),
            7 => Some(Self::Sleep),
            _ => None,
        }
    }
}

/// Bit position of the endpoint id within a command word.
pub const CMD_EP_SHIFT: u32 = 4;

/// Bit position of the completion status byte within a command word.
pub const CMD_ERR_SHIFT: u32 = 24;

/// Build a command word: opcode in bits 0..=3, endpoint in bits 4..=19.
#[inline]
#[must_use]
pub const fn build_cmd(ep: EpId, op: CmdOpCode) -> Reg {
    (op as Reg) | ((ep as Reg) << CMD_EP_SHIFT)
}

/// Extract the opcode nibble from a command word.
#[inline]
#[must_use]
pub const fn cmd_opcode(cmd: Reg) -> u8 {
    (cmd & 0xF) as u8
}

/// Extract the endpoint id from a command word.
#[inline]
#[must_use]
pub const fn cmd_ep(cmd: Reg) -> EpId {
    ((cmd >> CMD_EP_SHIFT) & 0xFFFF) as EpId
}

/// Extract the completion status byte from a command word.
#[inline]
#[must_use]
pub const fn cmd_error(cmd: Reg) -> u8 {
    ((cmd >> CMD_ERR_SHIFT) & 0xFF) as u8
}

/// Byte offset of an endpoint's config block within the window.
#[inline]
#[must_use]
pub const fn ep_cfg_off(ep: EpId) -> usize {
    EPS_OFF + ep as usize * EP_CFG_RCNT * 8
}

/// Byte offset of an endpoint's tag block within the window.
#[inline]
#[must_use]
pub const fn ep_tag_off(ep: EpId) -> usize {
    TAGS_OFF + ep as usize * EP_TAG_RCNT * 8
}

/// Register-file access seam.
///
/// The transfer engine is written against this trait so the same
/// stage→barrier→fire sequencing drives the real MMIO window and the
/// software model. Offsets are window-relative byte offsets; accesses are
/// whole registers.
pub trait RegisterFile {
    /// Load the register at `offset`.
    fn read_reg(&self, offset: usize) -> Reg;

    /// Store the register at `offset`.
    fn write_reg(&mut self, offset: usize, value: Reg);
}

/// The memory-mapped register window of the local core's DTU.
pub struct MmioRegisters {
    mmio: MmioRegion,
}

impl MmioRegisters {
    /// Map the local DTU window.
    ///
    /// # Safety
    ///
    /// The caller must ensure the DTU window is mapped at `base` with
    /// device memory attributes and that no other context drives the DTU
    /// concurrently.
    #[must_use]
    pub const unsafe fn new(base: usize) -> Self {
        // SAFETY: Forwarded to the caller.
        let mmio = unsafe { MmioRegion::new(base, MMIO_SIZE) };
        Self { mmio }
    }
}

impl RegisterFile for MmioRegisters {
    #[inline]
    fn read_reg(&self, offset: usize) -> Reg {
        self.mmio.read64(offset)
    }

    #[inline]
    fn write_reg(&mut self, offset: usize, value: Reg) {
        self.mmio.write64(offset, value);
    }
}
