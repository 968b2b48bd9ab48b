/*!
Demo board binary.

Assembles a minimal MCS-51 board out of the library pieces: an oscillator
clock with the machine-cycle clock derived 1:12 as system master, a signal
graph with an interrupt line wired into the CPU's latch, a P1-style port
SFR that drives a signal node, XRAM on the external bus, and the `sig` /
`clktree` inspection commands on a command interpreter.

Usage: `softgun [config-file]`. Without a config (or without an `image`
entry) a built-in counting loop runs so the board does something
observable. Relevant config keys:

```text
[global]
cpu_clock = 12000000
start_address = 0
imagedir = /some/dir
image = firmware.bin
max_instructions = 100000
```
*/

use std::cell::RefCell;
use std::path::Path;
use std::process;
use std::rc::Rc;

use softgun::cli::{CmdResult, Interp};
use softgun::clock::ClockTree;
use softgun::config::Config;
use softgun::debugvars::DebugVars;
use softgun::mcs51::{Mcs51, SfrDevice};
use softgun::signode::{SigNodeId, SigVal, SignalGraph};

/// Parallel-port SFR: writes drive the port's signal nodes.
struct Port {
    latch: u8,
    graph: Rc<RefCell<SignalGraph>>,
    bit0: SigNodeId,
}

impl SfrDevice for Port {
    fn read(&mut self, _addr: u8) -> u8 {
        self.latch
    }

    fn write(&mut self, _addr: u8, val: u8) {
        self.latch = val;
        let level = if val & 1 != 0 {
            SigVal::High
        } else {
            SigVal::Low
        };
        self.graph.borrow_mut().set(self.bit0, level);
    }
}

// Counting loop used when no image is configured:
//   MOV R2,#0 ; loop: INC R2 ; SJMP loop
const DEMO_PROGRAM: &[u8] = &[0x7a, 0x00, 0x0a, 0x80, 0xfd];

fn main() {
    env_logger::init();
    let config_path = std::env::args().nth(1);
    if let Err(err) = run(config_path.as_deref()) {
        log::error!("{err}");
        process::exit(1);
    }
}

fn run(config_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::parse("[global]\n", "<builtin>")?,
    };

    // Clock tree: oscillator root, machine-cycle clock as system master.
    let clocks = Rc::new(RefCell::new(ClockTree::new()));
    {
        let mut clocks = clocks.borrow_mut();
        let osc = clocks.new_clock("osc").expect("fresh namespace");
        let cpuclk = clocks.new_clock("cpu.clk").expect("fresh namespace");
        let hz = config.read_u64("global", "cpu_clock")?.unwrap_or(12_000_000);
        clocks.set_freq(osc, hz);
        clocks.make_derived(cpuclk, osc, 1, 12)?;
        clocks.make_system_master(cpuclk);
    }

    // Signal graph with the CPU interrupt line.
    let graph = Rc::new(RefCell::new(SignalGraph::new()));
    let mut cpu = Mcs51::new(0x10000, 1)?;
    let irq = cpu.irq_controller();
    let irq_node = {
        let mut graph = graph.borrow_mut();
        let node = graph.new_node("cpu.irq").expect("fresh namespace");
        graph.trace(
            node,
            Box::new(move |_, _, val| match val {
                SigVal::High => irq.post_ilvl(0, 0x0003),
                _ => irq.unpost(),
            }),
        );
        node
    };
    log::debug!(
        "irq line \"{}\" wired to the CPU latch",
        graph.borrow().name(irq_node)
    );

    // External bus: 64K XRAM.
    cpu.bus.map_ram(0, 0x10000).expect("XRAM window is free");

    // P1-style port at SFR 0x90 driving a named pin.
    let p1_bit0 = graph
        .borrow_mut()
        .new_node("p1.0")
        .expect("fresh namespace");
    let port = Rc::new(RefCell::new(Port {
        latch: 0,
        graph: Rc::clone(&graph),
        bit0: p1_bit0,
    }));
    cpu.register_sfr(0x90, Rc::clone(&port) as Rc<RefCell<dyn SfrDevice>>);

    // Debug-variable export, for the `dbg` command below.
    let dbgvars = Rc::new(RefCell::new(DebugVars::new()));
    {
        let port = Rc::clone(&port);
        dbgvars
            .borrow_mut()
            .export("p1.latch", Box::new(move || port.borrow().latch as u64));
    }

    // Inspection commands, the way the signal and clock layers register
    // them on a live board.
    let mut interp = Interp::new();
    {
        let graph = Rc::clone(&graph);
        interp.register(
            "sig",
            Box::new(move |interp, argv| {
                if argv.len() < 2 || argv.len() > 3 {
                    return CmdResult::BadArgs;
                }
                let mut graph = graph.borrow_mut();
                let Some(node) = graph.find(argv[1]) else {
                    return CmdResult::Error;
                };
                if let Some(&val) = argv.get(2) {
                    let level = match val {
                        "0" | "low" => SigVal::Low,
                        "1" | "high" => SigVal::High,
                        _ => return CmdResult::BadArgs,
                    };
                    graph.set(node, level);
                } else {
                    let val = graph.val(node);
                    interp.append_result(&format!("{val}\r\n"));
                }
                CmdResult::Ok
            }),
        );
    }
    {
        let clocks = Rc::clone(&clocks);
        interp.register(
            "clktree",
            Box::new(move |interp, argv| {
                if argv.len() != 2 {
                    return CmdResult::BadArgs;
                }
                let mut clocks = clocks.borrow_mut();
                let Some(clk) = clocks.find(argv[1]) else {
                    return CmdResult::Error;
                };
                let dump = clocks.dump_tree(clk);
                interp.append_result(&dump);
                CmdResult::Ok
            }),
        );
    }
    {
        let dbgvars = Rc::clone(&dbgvars);
        interp.register(
            "dbg",
            Box::new(move |interp, argv| {
                if argv.len() != 2 {
                    return CmdResult::BadArgs;
                }
                let Some(val) = dbgvars.borrow().get(argv[1]) else {
                    return CmdResult::Error;
                };
                interp.append_result(&format!("{val}\r\n"));
                CmdResult::Ok
            }),
        );
    }

    // Firmware: configured image, or the builtin loop.
    match config.read_str("global", "image") {
        Some(image) => {
            let dir = config.read_str("global", "imagedir").unwrap_or(".");
            let path = Path::new(dir).join(image);
            let bytes = std::fs::read(&path)
                .map_err(|e| format!("can not read image \"{}\": {e}", path.display()))?;
            cpu.load_image(0, &bytes);
            log::info!("loaded {} bytes from {}", bytes.len(), path.display());
        }
        None => {
            cpu.load_image(0, DEMO_PROGRAM);
            log::info!("no image configured, running builtin demo loop");
        }
    }
    let start = config.read_u32("global", "start_address")?.unwrap_or(0);
    cpu.set_pc(start as u16);

    let max_instructions = config
        .read_u64("global", "max_instructions")?
        .unwrap_or(100_000);
    cpu.run(max_instructions as usize);

    println!(
        "executed {max_instructions} instructions, {} machine cycles, pc {:#06x} ({})",
        cpu.timers.cycles(),
        cpu.pc(),
        cpu.instr_name()
    );
    interp.exec_line("clktree osc");
    print!("{}", interp.take_output());
    if interp.exec_line("dbg p1.latch") == CmdResult::Ok {
        print!("p1 latch: {}", interp.take_output());
    }
    Ok(())
}
