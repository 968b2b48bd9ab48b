/*!
Signal-node graph: emulation of logical signals.

Devices create named nodes, boards link them into nets, and anything can
observe a net through trace callbacks. A node drives one `SigVal` onto its
net (`selfval`); the value observed on the node (`val`) is the measured
combination of every driver in the connected component.

Propagation runs in two stamped depth-first passes over the component:

1. Measure: combine all `selfval`s with the 9-value table, routing illegal
   combinations (shorts) through the configurable conflict handler without
   aborting the walk.
2. Propagate: write the measured level to every node, then fire traces on
   the nodes whose observed value changed. All nodes are updated before the
   first trace runs, so a callback reading any node in the component sees
   the settled net.

A single generation counter stamps visited nodes, so cycles and diamonds in
the link graph need no per-propagation visited set. Nodes live in an arena
and are referred to by `SigNodeId`; the name table maps `String -> id`.

`GND` and `VCC` exist from graph construction, driving ForceLow/ForceHigh.
*/

pub mod value;

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::registry::Registry;
pub use value::{CombineTable, Net, SigVal, measured};

/// Arena index of a signal node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SigNodeId(u32);

/// Trace callback: receives the graph, the traced node and its new
/// observed value. May call `set` (and anything else) reentrantly.
pub type SigTraceProc = Box<dyn FnMut(&mut SignalGraph, SigNodeId, SigVal)>;

/// Conflict handler: receives the short-circuit diagnostic.
pub type SigConflictProc = Box<dyn FnMut(&str)>;

struct SigTrace {
    proc: RefCell<SigTraceProc>,
    /// Set while the callback runs; suppresses recursive re-entry.
    active: Cell<bool>,
    /// Set by `untrace`; swept after the next iteration over the list.
    removed: Cell<bool>,
}

/// Handle returned by `trace`, consumed by `untrace`.
pub struct SigTraceHandle {
    node: SigNodeId,
    trace: Rc<SigTrace>,
}

struct SigNode {
    name: String,
    selfval: SigVal,
    propval: SigVal,
    illegal: bool,
    links: Vec<SigNodeId>,
    traces: Vec<Rc<SigTrace>>,
    stamp: u64,
}

pub struct SignalGraph {
    nodes: Vec<Option<SigNode>>,
    free: Vec<u32>,
    names: Registry<SigNodeId>,
    tab: CombineTable,
    stamp: u64,
    conflict_proc: Option<SigConflictProc>,
    gnd: SigNodeId,
    vcc: SigNodeId,
}

impl SignalGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            names: Registry::new(),
            tab: CombineTable::new(),
            stamp: 0,
            conflict_proc: None,
            gnd: SigNodeId(0),
            vcc: SigNodeId(0),
        };
        let gnd = graph.new_node("GND").expect("GND namespace is empty");
        let vcc = graph.new_node("VCC").expect("VCC namespace is empty");
        graph.set(gnd, SigVal::ForceLow);
        graph.set(vcc, SigVal::ForceHigh);
        graph.gnd = gnd;
        graph.vcc = vcc;
        graph
    }

    pub fn gnd(&self) -> SigNodeId {
        self.gnd
    }

    pub fn vcc(&self) -> SigNodeId {
        self.vcc
    }

    /// Replace the short-circuit handler. The default logs the diagnostic.
    pub fn set_conflict_proc(&mut self, proc: SigConflictProc) {
        self.conflict_proc = Some(proc);
    }

    // ---------------------------------------------------------------
    // Node lifecycle
    // ---------------------------------------------------------------

    /// Create a node named `name` with both values Open. Returns `None`
    /// when the name is already taken.
    pub fn new_node(&mut self, name: &str) -> Option<SigNodeId> {
        if self.names.contains(name) {
            log::error!("signal node \"{name}\" already exists");
            return None;
        }
        let node = SigNode {
            name: name.to_string(),
            selfval: SigVal::Open,
            propval: SigVal::Open,
            illegal: false,
            links: Vec::new(),
            traces: Vec::new(),
            stamp: 0,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                SigNodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                SigNodeId((self.nodes.len() - 1) as u32)
            }
        };
        self.names.create(name, id);
        Some(id)
    }

    pub fn find(&self, name: &str) -> Option<SigNodeId> {
        self.names.find(name).copied()
    }

    pub fn name(&self, id: SigNodeId) -> &str {
        &self.node(id).name
    }

    /// Sever all links, drop traces and free the node's name.
    pub fn remove_node(&mut self, id: SigNodeId) {
        while let Some(&partner) = self.node(id).links.first() {
            self.unlink(id, partner);
        }
        let node = self.nodes[id.0 as usize].take().expect("live node");
        self.names.remove(&node.name);
        self.free.push(id.0);
    }

    fn node(&self, id: SigNodeId) -> &SigNode {
        self.nodes[id.0 as usize].as_ref().expect("live node")
    }

    fn node_mut(&mut self, id: SigNodeId) -> &mut SigNode {
        self.nodes[id.0 as usize].as_mut().expect("live node")
    }

    // ---------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------

    /// Change the value this node drives and propagate across its net.
    /// Returns the node's observed value afterwards.
    pub fn set(&mut self, id: SigNodeId, val: SigVal) -> SigVal {
        let node = self.node(id);
        if node.selfval == val && !node.illegal {
            return node.propval;
        }
        self.node_mut(id).selfval = val;
        self.update(id);
        self.node(id).propval
    }

    /// The observed (measured) value: Low, High or Open.
    pub fn val(&self, id: SigNodeId) -> SigVal {
        self.node(id).propval
    }

    /// The value the node itself drives.
    pub fn selfval(&self, id: SigNodeId) -> SigVal {
        self.node(id).selfval
    }

    /// True when the node's net currently carries an electrical conflict.
    pub fn is_illegal(&self, id: SigNodeId) -> bool {
        self.node(id).illegal
    }

    // ---------------------------------------------------------------
    // Links
    // ---------------------------------------------------------------

    /// Connect two nodes. Links are undirected and stored on both
    /// endpoints; linking an already-linked pair is a no-op.
    pub fn link(&mut self, a: SigNodeId, b: SigNodeId) {
        if a == b || self.linked(a, b) {
            return;
        }
        self.node_mut(a).links.push(b);
        self.node_mut(b).links.push(a);
        self.update(a);
    }

    /// Disconnect two nodes. Returns `true` when a link was removed.
    pub fn unlink(&mut self, a: SigNodeId, b: SigNodeId) -> bool {
        let Some(pos) = self.node(a).links.iter().position(|&p| p == b) else {
            return false;
        };
        self.node_mut(a).links.swap_remove(pos);
        let back = self
            .node(b)
            .links
            .iter()
            .position(|&p| p == a)
            .expect("links are symmetric");
        self.node_mut(b).links.swap_remove(back);
        // The component may have split in two; settle both halves.
        self.update(a);
        self.update(b);
        true
    }

    pub fn linked(&self, a: SigNodeId, b: SigNodeId) -> bool {
        self.node(a).links.contains(&b)
    }

    /// Link two nodes by name. Unknown names log and leave the graph
    /// unchanged.
    pub fn link_by_name(&mut self, a: &str, b: &str) {
        let (Some(na), Some(nb)) = (self.find(a), self.find(b)) else {
            log::error!("signal link: node not found: \"{a}\" or \"{b}\"");
            return;
        };
        self.link(na, nb);
    }

    pub fn unlink_by_name(&mut self, a: &str, b: &str) {
        let (Some(na), Some(nb)) = (self.find(a), self.find(b)) else {
            log::error!("signal unlink: node not found: \"{a}\" or \"{b}\"");
            return;
        };
        self.unlink(na, nb);
    }

    // ---------------------------------------------------------------
    // Traces
    // ---------------------------------------------------------------

    /// Attach a callback fired whenever the node's observed value changes.
    pub fn trace(&mut self, id: SigNodeId, proc: SigTraceProc) -> SigTraceHandle {
        let trace = Rc::new(SigTrace {
            proc: RefCell::new(proc),
            active: Cell::new(false),
            removed: Cell::new(false),
        });
        self.node_mut(id).traces.push(Rc::clone(&trace));
        SigTraceHandle { node: id, trace }
    }

    /// Remove a trace. Safe from within the trace's own callback; the
    /// list entry is swept once the current iteration is done.
    pub fn untrace(&mut self, handle: &SigTraceHandle) {
        handle.trace.removed.set(true);
        if let Some(node) = self.nodes[handle.node.0 as usize].as_mut() {
            node.traces
                .retain(|t| !(t.removed.get() && !t.active.get()));
        }
    }

    /// True if any node of the component has a live trace. Lets callers
    /// skip computing values nobody observes.
    pub fn is_traced(&mut self, id: SigNodeId) -> bool {
        self.stamp += 1;
        let stamp = self.stamp;
        let mut pending = vec![id];
        while let Some(n) = pending.pop() {
            let node = self.node_mut(n);
            if node.stamp == stamp {
                continue;
            }
            node.stamp = stamp;
            if node.traces.iter().any(|t| !t.removed.get()) {
                return true;
            }
            pending.extend(self.node(n).links.iter().copied());
        }
        false
    }

    // ---------------------------------------------------------------
    // Propagation
    // ---------------------------------------------------------------

    /// Measure the component, then write the result to every node and
    /// fire traces. An all-Open measurement leaves observed values alone.
    fn update(&mut self, id: SigNodeId) {
        let net = self.measure(id);
        let level = measured(net.val);
        if level == SigVal::Open {
            return;
        }
        self.propagate(id, level, net.illegal);
    }

    /// Measure phase: combine `selfval` across the connected component.
    fn measure(&mut self, start: SigNodeId) -> Net {
        self.stamp += 1;
        let stamp = self.stamp;
        let mut acc = Net::legal(self.node(start).selfval);
        self.node_mut(start).stamp = stamp;
        let mut pending = vec![start];
        while let Some(n) = pending.pop() {
            for i in 0.. {
                let Some(&partner) = self.node(n).links.get(i) else {
                    break;
                };
                if self.node(partner).stamp == stamp {
                    continue;
                }
                self.node_mut(partner).stamp = stamp;
                let old = acc.val;
                let combined = self.tab.combine(acc.val, self.node(partner).selfval);
                if combined.illegal {
                    let msg = format!(
                        "Short circuit between {}:({}) and {}:({})",
                        self.node(n).name,
                        old,
                        self.node(partner).name,
                        self.node(partner).selfval
                    );
                    match &mut self.conflict_proc {
                        Some(proc) => proc(&msg),
                        None => log::error!("{msg}"),
                    }
                }
                acc = Net {
                    val: combined.val,
                    illegal: acc.illegal || combined.illegal,
                };
                pending.push(partner);
            }
        }
        acc
    }

    /// Propagate phase: assign the measured level everywhere, then fire
    /// traces on the nodes whose observed value changed.
    fn propagate(&mut self, start: SigNodeId, level: SigVal, illegal: bool) {
        self.stamp += 1;
        let stamp = self.stamp;
        let mut changed = Vec::new();
        let mut pending = vec![start];
        self.node_mut(start).stamp = stamp;
        while let Some(n) = pending.pop() {
            let node = self.node_mut(n);
            if node.propval != level || node.illegal != illegal {
                node.propval = level;
                node.illegal = illegal;
                changed.push(n);
            }
            for i in 0.. {
                let Some(&partner) = self.node(n).links.get(i) else {
                    break;
                };
                if self.node(partner).stamp != stamp {
                    self.node_mut(partner).stamp = stamp;
                    pending.push(partner);
                }
            }
        }
        for n in changed {
            self.invoke_traces(n);
        }
    }

    fn invoke_traces(&mut self, id: SigNodeId) {
        if self.nodes[id.0 as usize].is_none() {
            return;
        }
        let snapshot: Vec<Rc<SigTrace>> = self.node(id).traces.clone();
        for trace in &snapshot {
            if trace.removed.get() || trace.active.get() {
                continue;
            }
            trace.active.set(true);
            let val = self.node(id).propval;
            {
                let mut proc = trace.proc.borrow_mut();
                (*proc)(self, id, val);
            }
            trace.active.set(false);
        }
        if let Some(node) = self.nodes[id.0 as usize].as_mut() {
            node.traces.retain(|t| !t.removed.get());
        }
    }

    // ---------------------------------------------------------------
    // Debug helpers
    // ---------------------------------------------------------------

    /// The first node of the component driving a strong level, if any.
    pub fn find_dominant(&mut self, id: SigNodeId) -> Option<SigNodeId> {
        self.stamp += 1;
        let stamp = self.stamp;
        let mut pending = vec![id];
        while let Some(n) = pending.pop() {
            let node = self.node_mut(n);
            if node.stamp == stamp {
                continue;
            }
            node.stamp = stamp;
            if matches!(node.selfval, SigVal::Low | SigVal::High) {
                return Some(n);
            }
            pending.extend(self.node(n).links.iter().copied());
        }
        None
    }

    /// Render the component for diagnostics.
    pub fn dump(&mut self, id: SigNodeId) -> String {
        self.stamp += 1;
        let stamp = self.stamp;
        let mut out = String::new();
        let mut pending = vec![id];
        while let Some(n) = pending.pop() {
            let node = self.node_mut(n);
            if node.stamp == stamp {
                continue;
            }
            node.stamp = stamp;
            let node = self.node(n);
            let _ = writeln!(
                out,
                "node {} self {}, prop {}{}",
                node.name,
                node.selfval,
                node.propval,
                if node.illegal { " (illegal)" } else { "" }
            );
            pending.extend(node.links.iter().copied());
        }
        out
    }
}

impl Default for SignalGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn graph_with(names: &[&str]) -> (SignalGraph, Vec<SigNodeId>) {
        let mut g = SignalGraph::new();
        let ids = names
            .iter()
            .map(|n| g.new_node(n).expect("fresh name"))
            .collect();
        (g, ids)
    }

    #[test]
    fn gnd_and_vcc_exist() {
        let g = SignalGraph::new();
        let gnd = g.find("GND").unwrap();
        let vcc = g.find("VCC").unwrap();
        assert_eq!(g.val(gnd), SigVal::Low);
        assert_eq!(g.val(vcc), SigVal::High);
        assert_eq!(g.selfval(gnd), SigVal::ForceLow);
        assert_eq!(g.selfval(vcc), SigVal::ForceHigh);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut g = SignalGraph::new();
        assert!(g.new_node("cpu.irq").is_some());
        assert!(g.new_node("cpu.irq").is_none());
    }

    #[test]
    fn link_is_symmetric() {
        let (mut g, ids) = graph_with(&["a", "b"]);
        g.link(ids[0], ids[1]);
        assert!(g.linked(ids[0], ids[1]));
        assert!(g.linked(ids[1], ids[0]));
        assert!(g.unlink(ids[0], ids[1]));
        assert!(!g.linked(ids[0], ids[1]));
        assert!(!g.linked(ids[1], ids[0]));
    }

    #[test]
    fn link_idempotent() {
        let (mut g, ids) = graph_with(&["a", "b"]);
        g.link(ids[0], ids[1]);
        g.link(ids[0], ids[1]);
        assert!(g.unlink(ids[0], ids[1]));
        assert!(!g.linked(ids[0], ids[1]));
        assert!(!g.unlink(ids[0], ids[1]));
    }

    #[test]
    fn value_propagates_through_chain() {
        let (mut g, ids) = graph_with(&["a", "b", "c"]);
        g.link(ids[0], ids[1]);
        g.link(ids[1], ids[2]);
        g.set(ids[0], SigVal::High);
        assert_eq!(g.val(ids[2]), SigVal::High);
        g.set(ids[0], SigVal::Low);
        assert_eq!(g.val(ids[1]), SigVal::Low);
        assert_eq!(g.val(ids[2]), SigVal::Low);
    }

    #[test]
    fn pullup_reads_high_over_open() {
        let (mut g, ids) = graph_with(&["a", "b"]);
        g.set(ids[0], SigVal::PullUp);
        g.link(ids[0], ids[1]);
        assert_eq!(g.val(ids[1]), SigVal::High);
        assert!(!g.is_illegal(ids[1]));
    }

    #[test]
    fn open_component_keeps_old_value() {
        let (mut g, ids) = graph_with(&["a", "b"]);
        g.link(ids[0], ids[1]);
        g.set(ids[0], SigVal::High);
        assert_eq!(g.val(ids[1]), SigVal::High);
        g.set(ids[0], SigVal::Open);
        // Nobody drives the net; the last value is retained.
        assert_eq!(g.val(ids[1]), SigVal::High);
    }

    #[test]
    fn short_circuit_reports_conflict() {
        let (mut g, ids) = graph_with(&["a", "b"]);
        let msgs: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&msgs);
        g.set_conflict_proc(Box::new(move |m| sink.borrow_mut().push(m.to_string())));
        g.set(ids[0], SigVal::High);
        g.set(ids[1], SigVal::Low);
        g.link(ids[0], ids[1]);
        let msgs = msgs.borrow();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("a"), "{}", msgs[0]);
        assert!(msgs[0].contains("b"), "{}", msgs[0]);
        assert!(g.is_illegal(ids[0]));
        assert!(g.is_illegal(ids[1]));
        assert!(matches!(g.val(ids[0]), SigVal::High | SigVal::Low));
    }

    #[test]
    fn traces_fire_once_per_change() {
        let (mut g, ids) = graph_with(&["a"]);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        let _h = g.trace(
            ids[0],
            Box::new(move |_, _, _| {
                c.set(c.get() + 1);
            }),
        );
        g.set(ids[0], SigVal::High);
        g.set(ids[0], SigVal::High);
        assert_eq!(count.get(), 1);
        g.set(ids[0], SigVal::Low);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn all_values_settle_before_traces_fire() {
        let (mut g, ids) = graph_with(&["a", "b", "c"]);
        g.link(ids[0], ids[1]);
        g.link(ids[1], ids[2]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let far = ids[2];
        let _h = g.trace(
            ids[0],
            Box::new(move |g, _, _| {
                // The far end of the net must already carry the new value.
                sink.borrow_mut().push(g.val(far));
            }),
        );
        g.set(ids[2], SigVal::High);
        assert_eq!(*seen.borrow(), vec![SigVal::High]);
    }

    #[test]
    fn trace_removing_itself_is_safe() {
        let (mut g, ids) = graph_with(&["a"]);
        let handle: Rc<RefCell<Option<SigTraceHandle>>> = Rc::new(RefCell::new(None));
        let count = Rc::new(Cell::new(0u32));
        let h2 = Rc::clone(&handle);
        let c = Rc::clone(&count);
        let h = g.trace(
            ids[0],
            Box::new(move |g, _, _| {
                c.set(c.get() + 1);
                if let Some(h) = h2.borrow().as_ref() {
                    g.untrace(h);
                }
            }),
        );
        *handle.borrow_mut() = Some(h);
        g.set(ids[0], SigVal::High);
        g.set(ids[0], SigVal::Low);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn trace_can_set_reentrantly() {
        let (mut g, ids) = graph_with(&["req", "ack"]);
        let ack = ids[1];
        let _h = g.trace(
            ids[0],
            Box::new(move |g, _, val| {
                if val == SigVal::High {
                    g.set(ack, SigVal::High);
                }
            }),
        );
        g.set(ids[0], SigVal::High);
        assert_eq!(g.val(ack), SigVal::High);
    }

    #[test]
    fn cycle_terminates() {
        let (mut g, ids) = graph_with(&["a", "b", "c"]);
        g.link(ids[0], ids[1]);
        g.link(ids[1], ids[2]);
        g.link(ids[2], ids[0]);
        g.set(ids[0], SigVal::PullDown);
        assert_eq!(g.val(ids[1]), SigVal::Low);
        assert_eq!(g.val(ids[2]), SigVal::Low);
    }

    #[test]
    fn remove_node_severs_links_and_frees_name() {
        let (mut g, ids) = graph_with(&["a", "b"]);
        g.link(ids[0], ids[1]);
        g.remove_node(ids[0]);
        assert!(g.find("a").is_none());
        assert!(g.node(ids[1]).links.is_empty());
        assert!(g.new_node("a").is_some());
    }

    #[test]
    fn link_by_name_unknown_is_noop() {
        let (mut g, ids) = graph_with(&["a"]);
        g.link_by_name("a", "nonexistent");
        assert!(g.node(ids[0]).links.is_empty());
    }

    #[test]
    fn find_dominant_locates_strong_driver() {
        let (mut g, ids) = graph_with(&["a", "b", "c"]);
        g.link(ids[0], ids[1]);
        g.link(ids[1], ids[2]);
        g.set(ids[2], SigVal::High);
        g.set(ids[0], SigVal::PullDown);
        assert_eq!(g.find_dominant(ids[0]), Some(ids[2]));
    }

    #[test]
    fn is_traced_scans_component() {
        let (mut g, ids) = graph_with(&["a", "b"]);
        g.link(ids[0], ids[1]);
        assert!(!g.is_traced(ids[0]));
        let h = g.trace(ids[1], Box::new(|_, _, _| {}));
        assert!(g.is_traced(ids[0]));
        g.untrace(&h);
        assert!(!g.is_traced(ids[0]));
    }
}
