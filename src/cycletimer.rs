/*!
Cycle-timer queue.

Devices schedule work relative to the CPU cycle counter: a baud-rate
generator posts a timer `bit_cycles` ahead, the CPU loop calls `check`
after every instruction, and expired callbacks run synchronously in
timestamp order. Equal timestamps fire in insertion order.

Timers are one-shot; a callback re-posts itself for periodic behavior. It
receives the timer context mutably so it can do exactly that.
*/

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Timer callback; runs with the queue borrowed so it can re-post.
pub type TimerProc = Box<dyn FnMut(&mut CycleTimers)>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

pub struct CycleTimers {
    /// Ordered by (due cycle, insertion sequence).
    queue: BinaryHeap<Reverse<(u64, u64)>>,
    procs: HashMap<u64, TimerProc>,
    cycles: u64,
    next_seq: u64,
}

impl CycleTimers {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            procs: HashMap::new(),
            cycles: 0,
            next_seq: 0,
        }
    }

    /// Current CPU cycle count.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Advance the cycle counter; the CPU loop calls this once per
    /// executed instruction with the instruction's cycle cost.
    pub fn advance(&mut self, cycles: u64) {
        self.cycles = self.cycles.wrapping_add(cycles);
    }

    /// Schedule `proc` to run `delay` cycles from now.
    pub fn post(&mut self, delay: u64, proc: TimerProc) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((self.cycles.wrapping_add(delay), seq)));
        self.procs.insert(seq, proc);
        TimerId(seq)
    }

    /// Remove a pending timer. Returns `false` when it already fired or
    /// was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.procs.remove(&id.0).is_some()
    }

    /// Cycle of the earliest pending timer, if any.
    pub fn next_due(&mut self) -> Option<u64> {
        while let Some(Reverse((due, seq))) = self.queue.peek().copied() {
            if self.procs.contains_key(&seq) {
                return Some(due);
            }
            // Cancelled entry; drop it.
            self.queue.pop();
        }
        None
    }

    /// Fire every timer whose due cycle has been reached. Callbacks run
    /// synchronously and may post or cancel timers.
    pub fn check(&mut self) {
        while let Some(&Reverse((due, seq))) = self.queue.peek() {
            if due > self.cycles {
                break;
            }
            self.queue.pop();
            if let Some(mut proc) = self.procs.remove(&seq) {
                proc(self);
            }
        }
    }
}

impl Default for CycleTimers {
    fn default() -> Self {
        Self::new()
    }
}
