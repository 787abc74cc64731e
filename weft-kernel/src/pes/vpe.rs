//! VPE entity and lifecycle
//!
//! A VPE (virtual processing element) is one application bound to one
//! core. The kernel entity owns its capability tables, address space,
//! upcall queue, receive-buffer registry and observer lists, and walks
//! the lifecycle `SUSPENDED → RUNNING → DEAD` plus migration between
//! cores.
//!
//! Entities are shared as [`VpeRef`] handles. Operations that touch
//! remote DTU state are associated functions taking the handle and the
//! proxy channel: they decide under the borrow and fire observers only
//! after it ends, so a callback may re-enter the entity freely.

extern crate alloc;

use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;

use log::{debug, info, trace, warn};

use weft_common::{CapSel, EpId, Error, Label, PeId, Perm, Result, VpeFlags, VpeId};
use weft_dtu::regs::RegisterFile;
use weft_dtu::{EpCfg, EpTag};

use crate::cap::{CapTable, KObject, MGateObject, RGateObject, SGateObject};
use crate::com::{KernelDtu, RecvBufs, SendQueue};
use crate::event::{SubHandle, Subscriptions};
use crate::mem::{AddrSpace, PoolRef};

/// Lifecycle state of a VPE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum State {
    /// Application is live on its core.
    Running = 0,
    /// Parked; the core may be reused meanwhile.
    #[default]
    Suspended = 1,
    /// Exited. Terminal.
    Dead = 2,
}

impl State {
    #[inline]
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    #[inline]
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        matches!(self, Self::Suspended)
    }

    #[inline]
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }
}

/// Shared handle to a VPE entity.
pub type VpeRef = Rc<RefCell<Vpe>>;

/// One virtual processing element.
pub struct Vpe {
    id: VpeId,
    name: String,
    pe: PeId,
    state: State,
    flags: VpeFlags,
    exit_code: Option<i32>,
    objcaps: CapTable,
    mapcaps: CapTable,
    addr_space: AddrSpace,
    /// Self-handle held while an application runs; released on exit.
    app: Option<VpeRef>,
    upcalls: SendQueue,
    rbufs: RecvBufs,
    requirements: Vec<String>,
    exit_subs: Subscriptions<i32>,
    resume_subs: Subscriptions<bool>,
}

impl Vpe {
    /// Create a VPE bound to core `pe`, in state `SUSPENDED`.
    ///
    /// `upcall_ep` is the kernel-local send endpoint reserved for this
    /// VPE's upcalls. The root page table is allocated from `pool` here
    /// and returned when the entity drops.
    pub fn new(
        id: VpeId,
        name: &str,
        pe: PeId,
        flags: VpeFlags,
        upcall_ep: EpId,
        pool: &PoolRef,
    ) -> Result<VpeRef> {
        let addr_space = AddrSpace::new(pool)?;
        let vpe = Rc::new(RefCell::new(Self {
            id,
            name: name.to_string(),
            pe,
            state: State::Suspended,
            flags,
            exit_code: None,
            objcaps: CapTable::new(id),
            mapcaps: CapTable::new(id),
            addr_space,
            app: None,
            upcalls: SendQueue::new(id, upcall_ep),
            rbufs: RecvBufs::new(id),
            requirements: Vec::new(),
            exit_subs: Subscriptions::new(),
            resume_subs: Subscriptions::new(),
        }));
        info!("vpe {} [{}]: created on pe {}", id, name, pe);
        Ok(vpe)
    }

    pub fn id(&self) -> VpeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pe(&self) -> PeId {
        self.pe
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn flags(&self) -> VpeFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: VpeFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: VpeFlags) {
        self.flags.set(flag);
    }

    pub fn clear_flag(&mut self, flag: VpeFlags) {
        self.flags.clear(flag);
    }

    /// Exit code recorded by the first `exit_app`.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn objcaps(&self) -> &CapTable {
        &self.objcaps
    }

    pub fn objcaps_mut(&mut self) -> &mut CapTable {
        &mut self.objcaps
    }

    pub fn mapcaps(&self) -> &CapTable {
        &self.mapcaps
    }

    pub fn mapcaps_mut(&mut self) -> &mut CapTable {
        &mut self.mapcaps
    }

    pub fn addr_space(&self) -> &AddrSpace {
        &self.addr_space
    }

    pub fn rbufs(&self) -> &RecvBufs {
        &self.rbufs
    }

    pub fn upcall_queue(&self) -> &SendQueue {
        &self.upcalls
    }

    /// Record that this VPE needs the named service before it can start.
    pub fn add_requirement(&mut self, name: &str) {
        self.requirements.push(name.to_string());
    }

    pub fn requirements(&self) -> impl Iterator<Item = &str> {
        self.requirements.iter().map(String::as_str)
    }

    /// Observe the next application exit. Fires once with the exit code.
    pub fn subscribe_exit<F>(&mut self, callback: F) -> SubHandle
    where
        F: FnOnce(&i32) + 'static,
    {
        self.exit_subs.subscribe(callback)
    }

    pub fn unsubscribe_exit(&mut self, handle: SubHandle) -> bool {
        self.exit_subs.unsubscribe(handle)
    }

    /// Observe the next resume attempt. Fires once with `true` on
    /// success, `false` when the attempt was rejected.
    pub fn subscribe_resume<F>(&mut self, callback: F) -> SubHandle
    where
        F: FnOnce(&bool) + 'static,
    {
        self.resume_subs.subscribe(callback)
    }

    pub fn unsubscribe_resume(&mut self, handle: SubHandle) -> bool {
        self.resume_subs.unsubscribe(handle)
    }

    /// Mark this VPE as waiting for an event.
    pub fn start_wait(&mut self) {
        debug_assert!(
            !self.flags.contains(VpeFlags::WAITING),
            "vpe {} started waiting twice",
            self.id
        );
        self.flags.set(VpeFlags::WAITING);
    }

    // Lifecycle operations below take the handle: they may clone it into
    // the entity, drive the proxy channel, or fire observers after the
    // borrow ends.

    /// Start the application on this VPE's core.
    ///
    /// Pins the entity with a self-handle, marks `HASAPP` (the creator
    /// may have preset the flag), programs the syscall channel on the
    /// target core, rings its doorbell and enters `RUNNING`. A second
    /// start is rejected while the pin is held. When the channel cannot
    /// be brought up the pin and flag are rolled back so the start can
    /// be retried.
    pub fn start_app<R: RegisterFile>(vpe: &VpeRef, kdtu: &mut KernelDtu<R>) -> Result<()> {
        let (id, pe, had_flag) = {
            let mut v = vpe.borrow_mut();
            if v.state.is_dead() || v.app.is_some() {
                return Err(Error::NotReady);
            }
            let had_flag = v.flags.contains(VpeFlags::HASAPP);
            v.flags.set(VpeFlags::HASAPP);
            v.app = Some(Rc::clone(vpe));
            (v.id, v.pe, had_flag)
        };

        if let Err(err) = kdtu
            .config_sysc_chan(pe, id)
            .and_then(|()| kdtu.wakeup(pe, id))
        {
            // Roll the bookkeeping back; endpoint images that already
            // landed stay in place and a retry overwrites them.
            let mut v = vpe.borrow_mut();
            v.app = None;
            if !had_flag {
                v.flags.clear(VpeFlags::HASAPP);
            }
            return Err(err);
        }

        vpe.borrow_mut().state = State::Running;
        info!("vpe {}: application started on pe {}", id, pe);
        Ok(())
    }

    /// Record the application's exit. No-op when already dead; observers
    /// fire exactly once with the first exit code.
    pub fn exit_app(vpe: &VpeRef, code: i32) {
        let mut subs = {
            let mut v = vpe.borrow_mut();
            if v.state.is_dead() {
                return;
            }
            v.exit_code = Some(code);
            v.flags.clear(VpeFlags::HASAPP);
            v.app = None;
            v.state = State::Dead;
            info!("vpe {}: exited with code {}", v.id, code);
            core::mem::take(&mut v.exit_subs)
        };
        subs.notify(&code);
    }

    /// Kill the application. Idempotent; a dead VPE stays dead.
    pub fn stop_app(vpe: &VpeRef) {
        Self::exit_app(vpe, 1);
    }

    /// Pause a running VPE.
    pub fn suspend(vpe: &VpeRef) -> Result<()> {
        let mut v = vpe.borrow_mut();
        if !v.state.is_running() {
            return Err(Error::NotReady);
        }
        v.state = State::Suspended;
        info!("vpe {}: suspended", v.id);
        Ok(())
    }

    /// Bring a VPE back to `RUNNING`.
    ///
    /// With `need_app` set the attempt is rejected while no application
    /// is present. Observers fire exactly once per attempt: `true` after
    /// a successful transition, `false` when the attempt was rejected or
    /// the doorbell failed. A failed doorbell also restores the previous
    /// state.
    pub fn resume<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        need_app: bool,
        unblock: bool,
    ) -> Result<()> {
        let target = {
            let v = vpe.borrow();
            if need_app && !v.flags.contains(VpeFlags::HASAPP) {
                None
            } else {
                Some((v.id, v.pe))
            }
        };

        match target {
            None => {
                let mut subs = {
                    let mut v = vpe.borrow_mut();
                    core::mem::take(&mut v.resume_subs)
                };
                subs.notify(&false);
                Err(Error::NotReady)
            }
            Some((id, pe)) => {
                let prev = {
                    let mut v = vpe.borrow_mut();
                    core::mem::replace(&mut v.state, State::Running)
                };
                if unblock {
                    if let Err(err) = kdtu.wakeup(pe, id) {
                        let mut subs = {
                            let mut v = vpe.borrow_mut();
                            v.state = prev;
                            core::mem::take(&mut v.resume_subs)
                        };
                        subs.notify(&false);
                        return Err(err);
                    }
                }
                debug!("vpe {}: resumed", id);
                let mut subs = {
                    let mut v = vpe.borrow_mut();
                    core::mem::take(&mut v.resume_subs)
                };
                subs.notify(&true);
                Ok(())
            }
        }
    }

    /// Rebind a suspended VPE to another core.
    ///
    /// When an application is present its syscall channel is reprogrammed
    /// on the new core.
    pub fn migrate<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        new_pe: PeId,
    ) -> Result<()> {
        let (id, has_app) = {
            let mut v = vpe.borrow_mut();
            if !v.state.is_suspended() {
                return Err(Error::NotReady);
            }
            let old = v.pe;
            v.pe = new_pe;
            info!("vpe {}: migrated from pe {} to pe {}", v.id, old, new_pe);
            (v.id, v.flags.contains(VpeFlags::HASAPP))
        };

        if has_app {
            kdtu.config_sysc_chan(new_pe, id)?;
        }
        Ok(())
    }

    /// Clear `WAITING` and ring the VPE's doorbell.
    pub fn wakeup<R: RegisterFile>(vpe: &VpeRef, kdtu: &mut KernelDtu<R>) -> Result<()> {
        let (id, pe) = {
            let mut v = vpe.borrow_mut();
            debug_assert!(
                v.flags.contains(VpeFlags::WAITING),
                "vpe {} woken without waiting",
                v.id
            );
            v.flags.clear(VpeFlags::WAITING);
            (v.id, v.pe)
        };
        kdtu.wakeup(pe, id)
    }

    /// Send an upcall to this VPE, queueing behind the channel credit.
    /// Returns `true` when the message went out immediately.
    pub fn upcall<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        msg: &[u8],
    ) -> Result<bool> {
        let mut v = vpe.borrow_mut();
        let Vpe { upcalls, .. } = &mut *v;
        upcalls.send(kdtu.dtu_mut(), msg)
    }

    /// An upcall reply returned the channel credit; flush the queue.
    pub fn upcall_reply_received<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
    ) -> Result<()> {
        let mut v = vpe.borrow_mut();
        let Vpe { upcalls, .. } = &mut *v;
        upcalls.received_reply(kdtu.dtu_mut())
    }

    // Endpoint configuration on this VPE's core, through the proxy.

    /// Program a remote send endpoint from a send gate.
    pub fn config_snd_ep<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        ep: EpId,
        gate: &SGateObject,
    ) -> Result<()> {
        let (id, pe) = {
            let v = vpe.borrow();
            (v.id, v.pe)
        };
        let cfg = EpCfg::send(gate.pe, gate.vpe, gate.ep, gate.msg_order, gate.credits);
        let tag = EpTag::new(gate.label, Perm::RWX);
        kdtu.config_ep_remote(pe, id, ep, &cfg, &tag)
    }

    /// Attach a receive buffer: program the remote receive endpoint and
    /// record it in the registry.
    pub fn config_rcv_ep<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        ep: EpId,
        gate: &RGateObject,
    ) -> Result<()> {
        let mut v = vpe.borrow_mut();
        let pe = v.pe;
        let Vpe { rbufs, .. } = &mut *v;
        rbufs.attach(kdtu, pe, ep, gate.addr, gate.order, gate.msg_order, gate.flags)
    }

    /// Detach the receive buffer on `ep`, if any.
    pub fn detach_rcv_ep<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        ep: EpId,
    ) -> Result<()> {
        let mut v = vpe.borrow_mut();
        let pe = v.pe;
        let Vpe { rbufs, .. } = &mut *v;
        rbufs.detach(kdtu, pe, ep)
    }

    /// Program a remote memory endpoint from a memory gate.
    pub fn config_mem_ep<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        ep: EpId,
        gate: &MGateObject,
    ) -> Result<()> {
        let (id, pe) = {
            let v = vpe.borrow();
            (v.id, v.pe)
        };
        let cfg = EpCfg::memory(gate.pe, gate.vpe, gate.base, gate.size);
        let tag = EpTag::new(Label::NONE, gate.perm);
        kdtu.config_ep_remote(pe, id, ep, &cfg, &tag)
    }

    /// Disable a remote endpoint slot.
    pub fn invalidate_ep<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        ep: EpId,
    ) -> Result<()> {
        let (id, pe) = {
            let v = vpe.borrow();
            (v.id, v.pe)
        };
        kdtu.invalidate_ep_remote(pe, id, ep)
    }

    /// Exchange the gate behind an endpoint-bound capability in the
    /// object (or, with `mapping`, the mapping) table.
    ///
    /// With `Some(obj)` the new gate's images are written to the bound
    /// endpoint and the table entry swaps to the new object. With `None`
    /// the endpoint is detached: zeroed images, binding cleared, object
    /// kept. Bookkeeping commits only after the payload writes complete.
    pub fn xchg_ep<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        sel: CapSel,
        mapping: bool,
        new_obj: Option<KObject>,
    ) -> Result<()> {
        let (id, pe, ep, cfg, tag) = {
            let v = vpe.borrow();
            let table = if mapping { &v.mapcaps } else { &v.objcaps };
            let cap = table.get(sel).ok_or(Error::NotFound)?;
            if !cap.obj().is_gate() {
                return Err(Error::InvalidArgument);
            }
            let ep = cap.ep().ok_or(Error::InvalidArgument)?;
            let (cfg, tag) = match &new_obj {
                Some(obj) => ep_images(obj).ok_or(Error::InvalidArgument)?,
                None => (EpCfg::INVALID, EpTag::INVALID),
            };
            (v.id, v.pe, ep, cfg, tag)
        };

        kdtu.config_ep_remote(pe, id, ep, &cfg, &tag)?;

        let mut v = vpe.borrow_mut();
        let table = if mapping { &mut v.mapcaps } else { &mut v.objcaps };
        match new_obj {
            Some(obj) => {
                table.exchange(sel, obj)?;
            }
            None => {
                if let Some(cap) = table.get_mut(sel) {
                    cap.clear_ep();
                }
            }
        }
        debug!("vpe {}: exchanged gate on ep {}", id, ep);
        Ok(())
    }

    /// Revoke the capability at `sel` in the object (or, with `mapping`,
    /// the mapping) table. The bound endpoint, if any, is invalidated
    /// through the proxy before the entry is removed; the object's own
    /// teardown runs if this was its last capability.
    pub fn revoke<R: RegisterFile>(
        vpe: &VpeRef,
        kdtu: &mut KernelDtu<R>,
        sel: CapSel,
        mapping: bool,
    ) -> Result<()> {
        let (id, pe, ep) = {
            let v = vpe.borrow();
            let table = if mapping { &v.mapcaps } else { &v.objcaps };
            let cap = table.get(sel).ok_or(Error::NotFound)?;
            (v.id, v.pe, cap.ep())
        };

        if let Some(ep) = ep {
            kdtu.invalidate_ep_remote(pe, id, ep)?;
        }

        let mut v = vpe.borrow_mut();
        let table = if mapping { &mut v.mapcaps } else { &mut v.objcaps };
        let cap = table.remove(sel)?;
        drop(cap);
        debug!("vpe {}: revoked cap {}", id, sel);
        Ok(())
    }

    /// Tear the entity down: invalidate every bound endpoint, detach all
    /// receive buffers, then consume the final handle.
    ///
    /// Teardown runs to completion even when the proxy channel fails
    /// part-way: the remaining slots are still attempted and the first
    /// error is returned once the entity is gone. Outstanding handles at
    /// this point are a kernel bug; stop the application first.
    pub fn destroy<R: RegisterFile>(vpe: VpeRef, kdtu: &mut KernelDtu<R>) -> Result<()> {
        let mut first_err = None;
        {
            let mut v = vpe.borrow_mut();
            let id = v.id;
            let pe = v.pe;
            let bound: Vec<EpId> = v
                .objcaps
                .iter()
                .chain(v.mapcaps.iter())
                .filter_map(|c| c.ep())
                .collect();
            for ep in bound {
                if let Err(err) = kdtu.invalidate_ep_remote(pe, id, ep) {
                    warn!("vpe {}: ep {} kept its image during teardown: {}", id, ep, err);
                    first_err.get_or_insert(err);
                }
            }
            let Vpe { rbufs, .. } = &mut *v;
            if let Err(err) = rbufs.detach_all(kdtu, pe) {
                first_err.get_or_insert(err);
            }
            info!("vpe {}: destroying", id);
        }

        assert_eq!(
            Rc::strong_count(&vpe),
            1,
            "destroyed a vpe with outstanding handles"
        );
        drop(vpe);
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Vpe {
    fn drop(&mut self) {
        trace!("vpe {}: entity released", self.id);
    }
}

/// Endpoint register images for a gate object. `None` for non-gates.
fn ep_images(obj: &KObject) -> Option<(EpCfg, EpTag)> {
    match obj {
        KObject::SGate(g) => {
            let g = g.borrow();
            Some((
                EpCfg::send(g.pe, g.vpe, g.ep, g.msg_order, g.credits),
                EpTag::new(g.label, Perm::RWX),
            ))
        }
        KObject::RGate(r) => {
            let r = r.borrow();
            Some((
                EpCfg::receive(r.addr, r.order, r.msg_order, r.flags),
                EpTag::new(Label::NONE, Perm::RW),
            ))
        }
        KObject::MGate(m) => {
            let m = m.borrow();
            Some((
                EpCfg::memory(m.pe, m.vpe, m.base, m.size),
                EpTag::new(Label::NONE, m.perm),
            ))
        }
        KObject::Sess(_) => None,
    }
}
