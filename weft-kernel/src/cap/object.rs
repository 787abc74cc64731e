//! Shared kernel objects
//!
//! The objects capabilities point at. One object may back capabilities in
//! several tables at once; sharing is `Rc`, and an object's teardown hook
//! (its `Drop`) runs when the last capability referencing it goes away.
//!
//! Teardown here is local only. Anything that must reach remote DTU state
//! (endpoint invalidation) happens in the explicit revoke and exchange
//! operations before table bookkeeping, never from `Drop`.

extern crate alloc;

use alloc::rc::Rc;
use core::cell::RefCell;

use log::trace;
use weft_common::{EpId, Label, PeId, Perm, VpeId};

use crate::mem::PoolRef;

/// A send gate: the right to transmit to one fixed destination endpoint.
#[derive(Debug)]
pub struct SGateObject {
    /// Destination core.
    pub pe: PeId,
    /// Destination VPE.
    pub vpe: VpeId,
    /// Destination (receive) endpoint slot.
    pub ep: EpId,
    /// Label the receiver sees on every message through this gate.
    pub label: Label,
    /// Credit budget in bytes.
    pub credits: u64,
    /// Log2 of the largest message this gate carries.
    pub msg_order: u32,
}

impl SGateObject {
    pub fn new(pe: PeId, vpe: VpeId, ep: EpId, label: Label, credits: u64, msg_order: u32) -> Self {
        Self {
            pe,
            vpe,
            ep,
            label,
            credits,
            msg_order,
        }
    }
}

/// A receive gate: a buffer messages arrive into.
#[derive(Debug)]
pub struct RGateObject {
    /// Buffer base address in the owner's memory.
    pub addr: u64,
    /// Log2 of the buffer size.
    pub order: u32,
    /// Log2 of one message slot.
    pub msg_order: u32,
    /// Delivery flags.
    pub flags: u8,
}

impl RGateObject {
    pub fn new(addr: u64, order: u32, msg_order: u32, flags: u8) -> Self {
        Self {
            addr,
            order,
            msg_order,
            flags,
        }
    }
}

/// A memory gate: access to a range of some core's physical memory.
///
/// A root gate owns its range and returns it to the pool when the last
/// capability drops. Derived gates are windows onto an ancestor's range
/// and never free.
pub struct MGateObject {
    /// Core the memory lives on.
    pub pe: PeId,
    /// VPE the range is accounted to.
    pub vpe: VpeId,
    /// Range base address.
    pub base: u64,
    /// Range size in bytes.
    pub size: u64,
    /// Access permissions.
    pub perm: Perm,
    /// Window onto an ancestor gate rather than an owned range.
    pub derived: bool,
    pool: Option<PoolRef>,
}

impl MGateObject {
    /// A gate owning `size` bytes freshly allocated from `pool`.
    pub fn new_root(
        pool: &PoolRef,
        pe: PeId,
        vpe: VpeId,
        base: u64,
        size: u64,
        perm: Perm,
    ) -> Self {
        Self {
            pe,
            vpe,
            base,
            size,
            perm,
            derived: false,
            pool: Some(Rc::clone(pool)),
        }
    }

    /// A window onto part of an existing gate, with at most its rights.
    pub fn derive(&self, base: u64, size: u64, perm: Perm) -> Self {
        debug_assert!(base >= self.base && base + size <= self.base + self.size);
        Self {
            pe: self.pe,
            vpe: self.vpe,
            base,
            size,
            perm: perm.intersect(self.perm),
            derived: true,
            pool: None,
        }
    }
}

// `pool` holds a trait object without `Debug`; skip it.
impl core::fmt::Debug for MGateObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MGateObject")
            .field("pe", &self.pe)
            .field("vpe", &self.vpe)
            .field("base", &self.base)
            .field("size", &self.size)
            .field("perm", &self.perm)
            .field("derived", &self.derived)
            .finish_non_exhaustive()
    }
}

impl Drop for MGateObject {
    fn drop(&mut self) {
        if !self.derived {
            if let Some(pool) = &self.pool {
                trace!("mgate: returning {:#x}..{:#x}", self.base, self.base + self.size);
                pool.borrow_mut().free(self.base, self.size);
            }
        }
    }
}

/// A service session: an identity word the service resolves.
#[derive(Debug)]
pub struct SessObject {
    pub ident: u64,
}

impl SessObject {
    pub fn new(ident: u64) -> Self {
        Self { ident }
    }
}

/// The object behind a capability. Cloning clones the `Rc`, not the object.
#[derive(Clone)]
pub enum KObject {
    SGate(Rc<RefCell<SGateObject>>),
    RGate(Rc<RefCell<RGateObject>>),
    MGate(Rc<RefCell<MGateObject>>),
    Sess(Rc<RefCell<SessObject>>),
}

impl KObject {
    pub fn sgate(obj: SGateObject) -> Self {
        Self::SGate(Rc::new(RefCell::new(obj)))
    }

    pub fn rgate(obj: RGateObject) -> Self {
        Self::RGate(Rc::new(RefCell::new(obj)))
    }

    pub fn mgate(obj: MGateObject) -> Self {
        Self::MGate(Rc::new(RefCell::new(obj)))
    }

    pub fn sess(obj: SessObject) -> Self {
        Self::Sess(Rc::new(RefCell::new(obj)))
    }

    /// Whether this object can be bound to an endpoint slot.
    #[must_use]
    pub const fn is_gate(&self) -> bool {
        matches!(self, Self::SGate(_) | Self::RGate(_) | Self::MGate(_))
    }

    /// Number of capabilities currently sharing this object.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        match self {
            Self::SGate(o) => Rc::strong_count(o),
            Self::RGate(o) => Rc::strong_count(o),
            Self::MGate(o) => Rc::strong_count(o),
            Self::Sess(o) => Rc::strong_count(o),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SGate(_) => "sgate",
            Self::RGate(_) => "rgate",
            Self::MGate(_) => "mgate",
            Self::Sess(_) => "sess",
        }
    }
}

impl core::fmt::Debug for KObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SGate(o) => write!(f, "SGate({:?})", o.borrow()),
            Self::RGate(o) => write!(f, "RGate({:?})", o.borrow()),
            Self::MGate(o) => write!(f, "MGate({:?})", o.borrow()),
            Self::Sess(o) => write!(f, "Sess({:?})", o.borrow()),
        }
    }
}
