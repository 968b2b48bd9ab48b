/*!
Clock tree: emulation of frequency derivations.

Clocks form a forest. A root clock carries a frequency set directly
(`set_freq`); every other clock is derived from its parent by an exact
fraction (`make_derived`), so its accumulated frequency is the root
frequency multiplied down the derivation chain. All fractions stay reduced.

On a frequency change the whole affected subtree recomputes before any
trace callback runs, and traces fire child-before-parent, so a callback
observing a relative clock always sees settled values on both sides.

One clock may be designated the system master (conventionally the CPU cycle
clock). Each clock caches its ratio to the master; a process-wide version
counter, bumped by a trace on the master, invalidates the caches lazily.

Parent links may be reassigned at runtime (a clock MUX switching sources):
`make_derived` detaches from the old parent's child list, attaches to the
new one and recomputes the subtree.
*/

pub mod fraction;

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;

use thiserror::Error;

use crate::registry::Registry;
pub use fraction::Fraction;

/// Arena index of a clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClockId(u32);

/// Trace callback: fired after the clock's frequency changed.
pub type ClockTraceProc = Box<dyn FnMut(&mut ClockTree, ClockId)>;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("clock \"{0}\": denominator is 0")]
    ZeroDenominator(String),
    #[error("system master clock does not exist")]
    NoMaster,
}

struct ClockTrace {
    proc: RefCell<ClockTraceProc>,
    active: Cell<bool>,
    removed: Cell<bool>,
}

pub struct ClockTraceHandle {
    clock: ClockId,
    trace: Rc<ClockTrace>,
}

struct Clock {
    name: String,
    parent: Option<ClockId>,
    children: Vec<ClockId>,
    /// Fraction of the parent's frequency this clock runs at.
    derivation: Fraction,
    /// Accumulated frequency in Hz, exact.
    acc: Fraction,
    /// Cached ratio to the system master clock.
    ratio: Fraction,
    /// Master version the cache was computed against; 0 means dirty.
    ratio_version: u64,
    traces: Vec<Rc<ClockTrace>>,
}

pub struct ClockTree {
    clocks: Vec<Option<Clock>>,
    free: Vec<u32>,
    names: Registry<ClockId>,
    master: Option<ClockId>,
    master_version: u64,
    master_trace: Option<ClockTraceHandle>,
}

impl ClockTree {
    pub fn new() -> Self {
        Self {
            clocks: Vec::new(),
            free: Vec::new(),
            names: Registry::new(),
            master: None,
            master_version: 1,
            master_trace: None,
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle / naming
    // ---------------------------------------------------------------

    /// Create a clock with frequency 0. Returns `None` when the name is
    /// already taken.
    pub fn new_clock(&mut self, name: &str) -> Option<ClockId> {
        if self.names.contains(name) {
            log::error!("clock \"{name}\" already exists");
            return None;
        }
        let clock = Clock {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            derivation: Fraction::ONE,
            acc: Fraction::ZERO,
            ratio: Fraction::ZERO,
            ratio_version: 0,
            traces: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.clocks[slot as usize] = Some(clock);
                ClockId(slot)
            }
            None => {
                self.clocks.push(Some(clock));
                ClockId((self.clocks.len() - 1) as u32)
            }
        };
        self.names.create(name, id);
        Some(id)
    }

    pub fn find(&self, name: &str) -> Option<ClockId> {
        self.names.find(name).copied()
    }

    pub fn name(&self, id: ClockId) -> &str {
        &self.clock(id).name
    }

    fn clock(&self, id: ClockId) -> &Clock {
        self.clocks[id.0 as usize].as_ref().expect("live clock")
    }

    fn clock_mut(&mut self, id: ClockId) -> &mut Clock {
        self.clocks[id.0 as usize].as_mut().expect("live clock")
    }

    // ---------------------------------------------------------------
    // Frequencies
    // ---------------------------------------------------------------

    /// Exact frequency in Hz.
    pub fn freq(&self, id: ClockId) -> Fraction {
        self.clock(id).acc
    }

    pub fn freq_hz(&self, id: ClockId) -> f64 {
        self.clock(id).acc.as_f64()
    }

    pub fn parent(&self, id: ClockId) -> Option<ClockId> {
        self.clock(id).parent
    }

    pub fn derivation(&self, id: ClockId) -> Fraction {
        self.clock(id).derivation
    }

    /// Set the frequency of a root clock. On a child clock this logs and
    /// refuses; children only change through their derivation.
    pub fn set_freq(&mut self, id: ClockId, hz: u64) {
        if self.clock(id).parent.is_some() {
            log::error!(
                "can not set frequency of a child clock: {}",
                self.clock(id).name
            );
            return;
        }
        let acc = Fraction::from_int(hz);
        if self.clock(id).acc == acc {
            return;
        }
        {
            let clock = self.clock_mut(id);
            clock.acc = acc;
            clock.derivation = Fraction::ONE;
            clock.ratio_version = 0;
        }
        let mut changed = Vec::new();
        self.recompute_children(id, &mut changed);
        changed.push(id);
        self.fire_traces(&changed);
    }

    /// Derive `child` from `parent` by `nom/denom`, re-parenting if needed,
    /// and recompute the subtree. Traces fire on every clock whose
    /// frequency actually changed.
    pub fn make_derived(
        &mut self,
        child: ClockId,
        parent: ClockId,
        nom: u64,
        denom: u64,
    ) -> Result<(), ClockError> {
        let Some(derivation) = Fraction::new(nom as u128, denom as u128) else {
            return Err(ClockError::ZeroDenominator(self.clock(child).name.clone()));
        };
        if self.clock(child).parent != Some(parent) {
            self.detach_from_parent(child);
            self.clock_mut(child).parent = Some(parent);
            self.clock_mut(parent).children.push(child);
        }
        self.clock_mut(child).derivation = derivation;
        let mut changed = Vec::new();
        self.recompute(child, &mut changed);
        self.fire_traces(&changed);
        Ok(())
    }

    /// Detach a clock from its parent; it keeps no frequency of its own.
    pub fn decouple(&mut self, child: ClockId) {
        if self.clock(child).parent.is_none() {
            return;
        }
        self.detach_from_parent(child);
        let clock = self.clock_mut(child);
        clock.derivation = Fraction::ZERO;
        clock.acc = Fraction::ZERO;
        clock.ratio_version = 0;
    }

    /// Derive `child` from `parent` 1:1, both given by name. Unknown names
    /// log and leave the tree unchanged.
    pub fn link_by_name(&mut self, child: &str, parent: &str) {
        let (Some(c), Some(p)) = (self.find(child), self.find(parent)) else {
            log::error!("trying to link nonexistent clocks \"{child}\" and \"{parent}\"");
            return;
        };
        // 1/1 never fails the denominator check.
        let _ = self.make_derived(c, p, 1, 1);
    }

    pub fn unlink_by_name(&mut self, child: &str) {
        let Some(c) = self.find(child) else {
            log::error!("trying to unlink nonexistent clock \"{child}\"");
            return;
        };
        self.decouple(c);
    }

    fn detach_from_parent(&mut self, child: ClockId) {
        let Some(parent) = self.clock(child).parent else {
            return;
        };
        let kids = &mut self.clock_mut(parent).children;
        if let Some(pos) = kids.iter().position(|&c| c == child) {
            kids.remove(pos);
        }
        self.clock_mut(child).parent = None;
    }

    /// Recompute `id`'s accumulated frequency from its parent, then its
    /// descendants. Changed clocks are collected child-before-parent so
    /// traces can fire post-order after the whole subtree settled.
    fn recompute(&mut self, id: ClockId, changed: &mut Vec<ClockId>) {
        let parent = self
            .clock(id)
            .parent
            .expect("recompute only runs on derived clocks");
        let acc = self.clock(parent).acc.mul(&self.clock(id).derivation);
        if self.clock(id).acc == acc {
            return;
        }
        {
            let clock = self.clock_mut(id);
            clock.acc = acc;
            clock.ratio_version = 0;
        }
        self.recompute_children(id, changed);
        changed.push(id);
    }

    fn recompute_children(&mut self, id: ClockId, changed: &mut Vec<ClockId>) {
        // Snapshot: a trace may re-parent a clock once callbacks run, and
        // the recursion must not walk a list that changes underneath it.
        let kids = self.clock(id).children.clone();
        for kid in kids {
            if self.clock(kid).parent == Some(id) {
                self.recompute(kid, changed);
            }
        }
    }

    fn fire_traces(&mut self, ids: &[ClockId]) {
        for &id in ids {
            if self.clocks[id.0 as usize].is_none() {
                continue;
            }
            let snapshot: Vec<Rc<ClockTrace>> = self.clock(id).traces.clone();
            for trace in &snapshot {
                if trace.removed.get() || trace.active.get() {
                    continue;
                }
                trace.active.set(true);
                {
                    let mut proc = trace.proc.borrow_mut();
                    (*proc)(self, id);
                }
                trace.active.set(false);
            }
            if let Some(clock) = self.clocks[id.0 as usize].as_mut() {
                clock.traces.retain(|t| !t.removed.get());
            }
        }
    }

    // ---------------------------------------------------------------
    // Traces
    // ---------------------------------------------------------------

    pub fn trace(&mut self, id: ClockId, proc: ClockTraceProc) -> ClockTraceHandle {
        let trace = Rc::new(ClockTrace {
            proc: RefCell::new(proc),
            active: Cell::new(false),
            removed: Cell::new(false),
        });
        self.clock_mut(id).traces.push(Rc::clone(&trace));
        ClockTraceHandle { clock: id, trace }
    }

    pub fn untrace(&mut self, handle: &ClockTraceHandle) {
        handle.trace.removed.set(true);
        if let Some(clock) = self.clocks[handle.clock.0 as usize].as_mut() {
            clock
                .traces
                .retain(|t| !(t.removed.get() && !t.active.get()));
        }
    }

    // ---------------------------------------------------------------
    // System master
    // ---------------------------------------------------------------

    /// Declare `id` the timing reference of the whole system. Ratios of
    /// other clocks are reported against it.
    pub fn make_system_master(&mut self, id: ClockId) {
        if let Some(old) = self.master_trace.take() {
            self.untrace(&old);
        }
        self.master = Some(id);
        let handle = self.trace(
            id,
            Box::new(|tree, _| {
                tree.master_version += 1;
            }),
        );
        self.master_trace = Some(handle);
        self.master_version += 1;
    }

    pub fn system_master(&self) -> Option<ClockId> {
        self.master
    }

    /// Ratio `freq(id) / freq(master)`, reduced. Lazily recomputed when
    /// the master's frequency changed since the last call.
    pub fn master_ratio(&mut self, id: ClockId) -> Result<Fraction, ClockError> {
        let Some(master) = self.master else {
            return Err(ClockError::NoMaster);
        };
        if self.clock(id).ratio_version != self.master_version {
            let master_acc = self.clock(master).acc;
            let Some(ratio) = self.clock(id).acc.div(&master_acc) else {
                log::warn!(
                    "master ratio of \"{}\" against a stopped master clock",
                    self.clock(id).name
                );
                return Ok(Fraction::ZERO);
            };
            let master_version = self.master_version;
            let clock = self.clock_mut(id);
            clock.ratio = ratio;
            clock.ratio_version = master_version;
        }
        Ok(self.clock(id).ratio)
    }

    // ---------------------------------------------------------------
    // Diagnostics
    // ---------------------------------------------------------------

    /// Render the subtree under `top` for diagnostics.
    pub fn dump_tree(&mut self, top: ClockId) -> String {
        let mut out = String::new();
        self.dump_clock(top, 0, &mut out);
        out
    }

    fn dump_clock(&mut self, id: ClockId, indent: usize, out: &mut String) {
        for _ in 0..indent {
            out.push_str("|  ");
        }
        if indent > 0 {
            out.push_str("|-");
        }
        let ratio = self.master_ratio(id).ok();
        let clock = self.clock(id);
        let _ = write!(
            out,
            "{}: {:.3}kHz {}->{}",
            clock.name,
            clock.acc.as_f64() / 1000.0,
            clock.derivation,
            clock.acc
        );
        match ratio {
            Some(r) => {
                let _ = writeln!(out, " MR {r}");
            }
            None => {
                let _ = writeln!(out);
            }
        }
        let kids = self.clock(id).children.clone();
        for kid in kids {
            self.dump_clock(kid, indent + 1, out);
        }
    }
}

impl Default for ClockTree {
    fn default() -> Self {
        Self::new()
    }
}
