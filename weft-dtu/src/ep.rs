//! Endpoint register images
//!
//! An endpoint slot is described by two fixed-size register blocks: the
//! *config* block (routing, geometry, credits) and the *tag* block (label
//! and permission mask). The kernel builds both images locally and deposits
//! them into the owning core's DTU window: directly for its own core,
//! through the proxy channel for every other core.
//!
//! The field layout is consumed by hardware on every core and by existing
//! images in flight; treat it as an externally fixed binary contract. All
//! image types are DMA-safe plain-old-data so they can be handed to the
//! transfer engine as raw bytes.

use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use weft_common::{EpId, Label, PeId, Perm, VpeId};

use crate::regs::{EP_CFG_RCNT, EP_TAG_RCNT, Reg};

/// The type field of an endpoint config block (word 0, bits 0..=2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EpType {
    /// Slot not bound; commands referencing it fail.
    Invalid = 0,
    /// Message transmission towards a fixed destination.
    Send = 1,
    /// Message reception into a local ring buffer.
    Receive = 2,
    /// DMA access into a remote memory range.
    Memory = 3,
}

impl EpType {
    /// Decode the type field of a config word.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Invalid),
            1 => Some(Self::Send),
            2 => Some(Self::Receive),
            3 => Some(Self::Memory),
            _ => None,
        }
    }
}

/// An endpoint config block: `EP_CFG_RCNT` registers, written to
/// [`ep_cfg_off`](crate::regs::ep_cfg_off) of the owning core's window.
///
/// # Layout
///
/// Word 0 carries the endpoint type in bits 0..=2; the remaining fields
/// depend on the type:
///
/// - **send**: word 0 = type | dst_pe<<8 | dst_vpe<<16 | dst_ep<<32 |
///   msg_order<<48; word 1 = 0; word 2 = credit budget in bytes.
/// - **receive**: word 0 = type | order<<8 | msg_order<<16 | flags<<24;
///   word 1 = buffer address; word 2 = 0 (occupancy, hardware-owned).
/// - **memory**: word 0 = type | dst_pe<<8 | dst_vpe<<16; word 1 = base
///   address; word 2 = size in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EpCfg {
    /// Raw register words, in window order.
    pub words: [Reg; EP_CFG_RCNT],
}

const_assert_eq!(core::mem::size_of::<EpCfg>(), EP_CFG_RCNT * 8);

impl EpCfg {
    /// The image of an unbound slot: all fields, credits included, zero.
    pub const INVALID: Self = Self {
        words: [0; EP_CFG_RCNT],
    };

    /// Build a send endpoint image.
    #[must_use]
    pub const fn send(
        dst_pe: PeId,
        dst_vpe: VpeId,
        dst_ep: EpId,
        msg_order: u32,
        credits: u64,
    ) -> Self {
        let w0 = (EpType::Send as Reg)
            | (dst_pe as Reg) << 8
            | (dst_vpe as Reg) << 16
            | (dst_ep as Reg) << 32
            | (msg_order as Reg) << 48;
        Self {
            words: [w0, 0, credits],
        }
    }

    /// Build a receive endpoint image.
    ///
    /// `order` is the log2 size of the buffer, `msg_order` the log2 size of
    /// one message slot within it.
    #[must_use]
    pub const fn receive(buf_addr: u64, order: u32, msg_order: u32, flags: u8) -> Self {
        let w0 = (EpType::Receive as Reg)
            | (order as Reg) << 8
            | (msg_order as Reg) << 16
            | (flags as Reg) << 24;
        Self {
            words: [w0, buf_addr, 0],
        }
    }

    /// Build a memory endpoint image.
    #[must_use]
    pub const fn memory(dst_pe: PeId, dst_vpe: VpeId, base: u64, size: u64) -> Self {
        let w0 = (EpType::Memory as Reg) | (dst_pe as Reg) << 8 | (dst_vpe as Reg) << 16;
        Self {
            words: [w0, base, size],
        }
    }

    /// The endpoint type encoded in word 0.
    #[must_use]
    pub const fn ep_type(&self) -> Option<EpType> {
        EpType::from_bits((self.words[0] & 0x7) as u8)
    }

    /// Destination core (send and memory endpoints).
    #[inline]
    #[must_use]
    pub const fn dst_pe(&self) -> PeId {
        ((self.words[0] >> 8) & 0xFF) as PeId
    }

    /// Destination VPE (send and memory endpoints).
    #[inline]
    #[must_use]
    pub const fn dst_vpe(&self) -> VpeId {
        ((self.words[0] >> 16) & 0xFFFF) as VpeId
    }

    /// Destination endpoint (send endpoints).
    #[inline]
    #[must_use]
    pub const fn dst_ep(&self) -> EpId {
        ((self.words[0] >> 32) & 0xFFFF) as EpId
    }

    /// Message size order (send endpoints).
    #[inline]
    #[must_use]
    pub const fn msg_order(&self) -> u32 {
        ((self.words[0] >> 48) & 0x3F) as u32
    }

    /// Buffer size order (receive endpoints).
    #[inline]
    #[must_use]
    pub const fn order(&self) -> u32 {
        ((self.words[0] >> 8) & 0x3F) as u32
    }

    /// Remaining credit budget in bytes (send endpoints).
    #[inline]
    #[must_use]
    pub const fn credits(&self) -> u64 {
        self.words[2]
    }

    /// Base address (memory endpoints) or buffer address (receive
    /// endpoints).
    #[inline]
    #[must_use]
    pub const fn addr(&self) -> u64 {
        self.words[1]
    }

    /// Region size in bytes (memory endpoints).
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.words[2]
    }
}

/// An endpoint tag block: label and permission mask, written to
/// [`ep_tag_off`](crate::regs::ep_tag_off) of the owning core's window.
///
/// Kept separate from the config block in hardware so the label/permission
/// pair can be rewritten without touching routing state. A detached slot
/// carries [`EpTag::INVALID`], with the permission mask entirely cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EpTag {
    /// Label delivered with traffic through this endpoint.
    pub label: Reg,
    /// Permission mask; [`Perm`] bits zero-extended to a register.
    pub perm: Reg,
}

const_assert_eq!(core::mem::size_of::<EpTag>(), EP_TAG_RCNT * 8);

impl EpTag {
    /// The tag of an unbound slot.
    pub const INVALID: Self = Self { label: 0, perm: 0 };

    /// Build a tag block.
    #[must_use]
    pub const fn new(label: Label, perm: Perm) -> Self {
        Self {
            label: label.value(),
            perm: perm.bits() as Reg,
        }
    }

    /// The permission mask, truncated back to [`Perm`].
    #[inline]
    #[must_use]
    pub const fn perm_bits(&self) -> Perm {
        Perm::from_bits(self.perm as u8)
    }
}

/// The core configuration block at [`CFG_OFF`](crate::regs::CFG_OFF).
///
/// Written last during bootstrap so freshly started code can self-identify;
/// `ready` flips to 1 once the block is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CoreCfg {
    /// The core's own id.
    pub core_id: Reg,
    /// Non-zero once the block (and the core's endpoints) are valid.
    pub ready: Reg,
}

const_assert_eq!(core::mem::size_of::<CoreCfg>(), 16);

impl CoreCfg {
    /// Build a ready core configuration block for `pe`.
    #[must_use]
    pub const fn new(pe: PeId) -> Self {
        Self {
            core_id: pe as Reg,
            ready: 1,
        }
    }
}
