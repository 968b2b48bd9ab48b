/*!
Command interpreter.

Components export interactive commands by name; a session front-end (a
telnet server, a test harness) feeds lines in and renders the result code
plus any appended output. The interpreter itself owns no transport.

A command returning `Delayed` completes later; it should register an
abort proc, which the front-end invokes if the session dies while the
command is still in flight, so the command can release whatever it holds.
*/

use std::cell::RefCell;
use std::rc::Rc;

use crate::registry::Registry;

/// Result code of a command, rendered to an error line by the session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmdResult {
    Ok,
    Error,
    BadArgs,
    Delayed,
    Quit,
    Abort,
}

impl CmdResult {
    /// Numeric code on the wire.
    pub fn code(self) -> i32 {
        match self {
            CmdResult::Ok => 0,
            CmdResult::Quit => 2,
            CmdResult::Delayed => 3,
            CmdResult::Error => -1,
            CmdResult::BadArgs => -2,
            CmdResult::Abort => -3,
        }
    }
}

/// Command procedure: argv\[0\] is the command name.
pub type CmdProc = Box<dyn FnMut(&mut Interp, &[&str]) -> CmdResult>;

pub struct Interp {
    cmds: Registry<Rc<RefCell<CmdProc>>>,
    output: String,
    abort_proc: Option<Box<dyn FnOnce(&mut Interp)>>,
}

impl Interp {
    pub fn new() -> Self {
        Self {
            cmds: Registry::new(),
            output: String::new(),
            abort_proc: None,
        }
    }

    /// Register a command. Returns `false` when the name is taken.
    pub fn register(&mut self, name: &str, proc: CmdProc) -> bool {
        if !self.cmds.create(name, Rc::new(RefCell::new(proc))) {
            log::error!("command \"{name}\" already registered");
            return false;
        }
        true
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.cmds.remove(name).is_some()
    }

    /// Append text to the session output buffer.
    pub fn append_result(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Drain the session output accumulated by command procs.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Split a line and dispatch it to the matching command.
    pub fn exec_line(&mut self, line: &str) -> CmdResult {
        let argv: Vec<&str> = line.split_whitespace().collect();
        let Some(&name) = argv.first() else {
            return CmdResult::Ok;
        };
        let Some(proc) = self.cmds.find(name).cloned() else {
            self.append_result(&format!("unknown command \"{name}\"\r\n"));
            return CmdResult::Error;
        };
        let Ok(mut proc) = proc.try_borrow_mut() else {
            log::error!("command \"{name}\" invoked recursively");
            return CmdResult::Error;
        };
        (*proc)(self, &argv)
    }

    /// Registered by a `Delayed` command; called by the front-end when the
    /// session closes before the command completed.
    pub fn set_abort_proc(&mut self, proc: Box<dyn FnOnce(&mut Interp)>) {
        self.abort_proc = Some(proc);
    }

    /// Notify the in-flight delayed command that its session died.
    pub fn abort(&mut self) {
        if let Some(proc) = self.abort_proc.take() {
            proc(self);
        }
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.cmds.iter().map(|(name, _)| name).collect()
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}
