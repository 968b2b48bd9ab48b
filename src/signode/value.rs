/*!
Multi-valued signal logic.

A net can be driven with nine values: the two strong levels, the two force
levels (supply rails), resistive pullup/pulldown, the weak variants of the
pulls, and Open (not driving). Combining two drivers follows the pairwise
rules in `combine_pair`; the 9x9 result table is precomputed once per
signal graph so the propagation inner loop is a plain array lookup.

Ordering note: the combination is applied left-to-right with the running
net value as the left operand, and opposing strong pulls resolve to the
right operand. The table therefore is not symmetric; both orders are kept
exactly as the pairwise rules produce them.
*/

use std::fmt;

/// Value driven onto (or observed on) a signal net.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SigVal {
    Low = 0,
    High = 1,
    ForceLow = 2,
    ForceHigh = 3,
    Open = 4,
    PullDown = 5,
    PullUp = 6,
    WeakPullDown = 7,
    WeakPullUp = 8,
}

pub const SIGVAL_COUNT: usize = 9;

pub const ALL_SIGVALS: [SigVal; SIGVAL_COUNT] = [
    SigVal::Low,
    SigVal::High,
    SigVal::ForceLow,
    SigVal::ForceHigh,
    SigVal::Open,
    SigVal::PullDown,
    SigVal::PullUp,
    SigVal::WeakPullDown,
    SigVal::WeakPullUp,
];

impl fmt::Display for SigVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SigVal::Low => "Low",
            SigVal::High => "High",
            SigVal::ForceLow => "ForceLow",
            SigVal::ForceHigh => "ForceHigh",
            SigVal::Open => "Open",
            SigVal::PullDown => "Pulldown",
            SigVal::PullUp => "Pullup",
            SigVal::WeakPullDown => "Weak Pulldown",
            SigVal::WeakPullUp => "Weak Pullup",
        };
        f.write_str(s)
    }
}

/// Result of combining two drivers: the dominant value plus an illegal
/// marker when the combination is an electrical conflict.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Net {
    pub val: SigVal,
    pub illegal: bool,
}

impl Net {
    pub const fn legal(val: SigVal) -> Self {
        Net {
            val,
            illegal: false,
        }
    }

    const fn illegal(val: SigVal) -> Self {
        Net { val, illegal: true }
    }
}

/// Combine a running net value (`a`) with one more driver (`b`).
fn combine_pair(a: SigVal, b: SigVal) -> Net {
    use SigVal::*;
    match (a, b) {
        (Open, _) => Net::legal(b),
        (_, Open) => Net::legal(a),

        (ForceLow, High) | (ForceLow, ForceHigh) => Net::illegal(ForceLow),
        (ForceLow, _) => Net::legal(ForceLow),
        (ForceHigh, Low) | (ForceHigh, ForceLow) => Net::illegal(ForceHigh),
        (ForceHigh, _) => Net::legal(ForceHigh),

        (Low, ForceHigh) => Net::illegal(ForceHigh),
        (Low, High) => Net::illegal(Low),
        (Low, _) => Net::legal(Low),
        (High, ForceLow) => Net::illegal(ForceLow),
        (High, Low) => Net::illegal(High),
        (High, _) => Net::legal(High),

        // Pulls lose against strong and force levels. Between opposing
        // strong pulls the newly combined side wins.
        (PullUp, Low) | (PullUp, ForceLow) | (PullUp, ForceHigh) | (PullUp, High) => Net::legal(b),
        (PullUp, PullDown) => Net::legal(PullDown),
        (PullUp, _) => Net::legal(PullUp),
        (PullDown, Low) | (PullDown, ForceLow) | (PullDown, ForceHigh) | (PullDown, High) => {
            Net::legal(b)
        }
        (PullDown, PullUp) => Net::legal(PullUp),
        (PullDown, _) => Net::legal(PullDown),

        (WeakPullUp, Low)
        | (WeakPullUp, ForceLow)
        | (WeakPullUp, ForceHigh)
        | (WeakPullUp, High) => Net::legal(b),
        (WeakPullUp, PullDown) => Net::legal(PullDown),
        (WeakPullUp, PullUp) => Net::legal(PullUp),
        (WeakPullUp, WeakPullDown) => Net::legal(WeakPullDown),
        (WeakPullUp, WeakPullUp) => Net::legal(WeakPullUp),

        (WeakPullDown, Low)
        | (WeakPullDown, ForceLow)
        | (WeakPullDown, ForceHigh)
        | (WeakPullDown, High) => Net::legal(b),
        (WeakPullDown, PullDown) => Net::legal(PullDown),
        (WeakPullDown, PullUp) => Net::legal(PullUp),
        (WeakPullDown, WeakPullUp) => Net::legal(WeakPullUp),
        (WeakPullDown, _) => Net::legal(WeakPullDown),
    }
}

/// Collapse a net value to the level a connected input would sample:
/// forces and pulls read as their plain level, Open stays Open.
pub fn measured(val: SigVal) -> SigVal {
    use SigVal::*;
    match val {
        Low | ForceLow | PullDown | WeakPullDown => Low,
        High | ForceHigh | PullUp | WeakPullUp => High,
        Open => Open,
    }
}

/// Precomputed 9x9 combination table.
pub struct CombineTable {
    tab: [Net; SIGVAL_COUNT * SIGVAL_COUNT],
}

impl CombineTable {
    pub fn new() -> Self {
        let mut tab = [Net::legal(SigVal::Open); SIGVAL_COUNT * SIGVAL_COUNT];
        for a in ALL_SIGVALS {
            for b in ALL_SIGVALS {
                tab[a as usize * SIGVAL_COUNT + b as usize] = combine_pair(a, b);
            }
        }
        Self { tab }
    }

    #[inline]
    pub fn combine(&self, a: SigVal, b: SigVal) -> Net {
        self.tab[a as usize * SIGVAL_COUNT + b as usize]
    }
}

impl Default for CombineTable {
    fn default() -> Self {
        Self::new()
    }
}
