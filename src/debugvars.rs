/*!
Debug-variable export.

Components publish named values (cycle counters, register shadows, model
internals) for inspection from the CLI or test harnesses. A variable is a
getter plus an optional setter; components owning their state behind
`Rc<Cell<..>>` or `Rc<RefCell<..>>` capture it in the closures.

Duplicate exports are rejected with a log, like every other namespace.
*/

use crate::registry::Registry;

pub type DbgGetProc = Box<dyn Fn() -> u64>;
pub type DbgSetProc = Box<dyn FnMut(u64)>;

struct DebugVar {
    get: DbgGetProc,
    set: Option<DbgSetProc>,
}

pub struct DebugVars {
    vars: Registry<DebugVar>,
}

impl DebugVars {
    pub fn new() -> Self {
        Self {
            vars: Registry::new(),
        }
    }

    /// Export a read-only variable. Returns `false` when the name is taken.
    pub fn export(&mut self, name: &str, get: DbgGetProc) -> bool {
        self.export_rw(name, get, None)
    }

    /// Export a variable with a setter.
    pub fn export_rw(&mut self, name: &str, get: DbgGetProc, set: Option<DbgSetProc>) -> bool {
        if !self.vars.create(name, DebugVar { get, set }) {
            log::error!("debug variable \"{name}\" already exists");
            return false;
        }
        true
    }

    pub fn unexport(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.vars.find(name).map(|v| (v.get)())
    }

    /// Write a variable. `false` when unknown or read-only.
    pub fn set(&mut self, name: &str, value: u64) -> bool {
        match self.vars.find_mut(name).and_then(|v| v.set.as_mut()) {
            Some(set) => {
                set(value);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.vars.iter().map(|(name, _)| name).collect()
    }
}

impl Default for DebugVars {
    fn default() -> Self {
        Self::new()
    }
}
