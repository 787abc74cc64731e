//! Per-VPE capability table
//!
//! Maps process-local selectors to capabilities. A capability couples one
//! shared [`KObject`] with the local endpoint slot it is bound to, if any.
//! The table itself never touches hardware; revoke-style operations
//! invalidate endpoints through the proxy channel first and only then
//! remove the entry here.

extern crate alloc;

use alloc::collections::btree_map::Entry;
use alloc::collections::BTreeMap;

use weft_common::{CapSel, EpId, Error, Result, VpeId};

use super::object::KObject;

/// One table entry: a shared object plus its endpoint binding.
pub struct Capability {
    sel: CapSel,
    obj: KObject,
    ep: Option<EpId>,
}

impl Capability {
    pub fn new(sel: CapSel, obj: KObject) -> Self {
        Self { sel, obj, ep: None }
    }

    pub fn sel(&self) -> CapSel {
        self.sel
    }

    pub fn obj(&self) -> &KObject {
        &self.obj
    }

    /// The local endpoint slot this capability is programmed into.
    pub fn ep(&self) -> Option<EpId> {
        self.ep
    }

    pub fn set_ep(&mut self, ep: EpId) {
        debug_assert!(self.obj.is_gate(), "bound a non-gate to an endpoint");
        self.ep = Some(ep);
    }

    pub fn clear_ep(&mut self) {
        self.ep = None;
    }
}

/// Selector-keyed capability table.
pub struct CapTable {
    vpe: VpeId,
    caps: BTreeMap<CapSel, Capability>,
}

impl CapTable {
    pub fn new(vpe: VpeId) -> Self {
        Self {
            vpe,
            caps: BTreeMap::new(),
        }
    }

    /// The VPE this table belongs to.
    pub fn vpe(&self) -> VpeId {
        self.vpe
    }

    /// Insert a capability at its selector.
    ///
    /// Fails with [`Error::InvalidArgument`] when the selector is taken;
    /// replacing an entry goes through [`CapTable::exchange`] or an explicit
    /// revoke.
    pub fn insert(&mut self, cap: Capability) -> Result<()> {
        match self.caps.entry(cap.sel()) {
            Entry::Occupied(_) => Err(Error::InvalidArgument),
            Entry::Vacant(slot) => {
                slot.insert(cap);
                Ok(())
            }
        }
    }

    pub fn get(&self, sel: CapSel) -> Option<&Capability> {
        self.caps.get(&sel)
    }

    pub fn get_mut(&mut self, sel: CapSel) -> Option<&mut Capability> {
        self.caps.get_mut(&sel)
    }

    /// Remove and return the entry at `sel`.
    ///
    /// Dropping the returned capability releases its object reference; the
    /// object's own teardown runs when that was the last one.
    pub fn remove(&mut self, sel: CapSel) -> Result<Capability> {
        self.caps.remove(&sel).ok_or(Error::NotFound)
    }

    /// Replace the shared object behind `sel`, keeping selector and
    /// endpoint binding. Both the existing and the new object must be
    /// gates. Returns the previous object.
    pub fn exchange(&mut self, sel: CapSel, obj: KObject) -> Result<KObject> {
        let cap = self.caps.get_mut(&sel).ok_or(Error::NotFound)?;
        if !cap.obj.is_gate() || !obj.is_gate() {
            return Err(Error::InvalidArgument);
        }
        Ok(core::mem::replace(&mut cap.obj, obj))
    }

    /// Reference count of the object behind `sel`, for diagnostics.
    pub fn refcount(&self, sel: CapSel) -> Option<usize> {
        self.caps.get(&sel).map(|cap| cap.obj.strong_count())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.values()
    }

    pub fn len(&self) -> usize {
        self.caps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }
}
