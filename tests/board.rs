//! Board-level scenarios exercising the subsystems together: electrical
//! shorts and pull resolution on linked nets, clock derivation and
//! re-parenting as seen by a frequency-dependent peripheral, and a timer
//! driving an interrupt line through the signal graph into the CPU.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use softgun::clock::{ClockTree, Fraction};
use softgun::mcs51::Mcs51;
use softgun::signode::{SigVal, SignalGraph};

#[test]
fn short_circuit_between_driven_nets() {
    let mut graph = SignalGraph::new();
    let a = graph.new_node("a").unwrap();
    let b = graph.new_node("b").unwrap();
    let conflicts: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&conflicts);
    graph.set_conflict_proc(Box::new(move |msg| sink.borrow_mut().push(msg.to_string())));

    graph.set(a, SigVal::High);
    graph.set(b, SigVal::Low);
    graph.link(a, b);

    let conflicts = conflicts.borrow();
    assert_eq!(conflicts.len(), 1);
    assert!(conflicts[0].contains('a') && conflicts[0].contains('b'));
    for node in [a, b] {
        assert!(graph.is_illegal(node));
        assert!(matches!(graph.val(node), SigVal::High | SigVal::Low));
    }
}

#[test]
fn pullup_wins_over_open() {
    let mut graph = SignalGraph::new();
    let a = graph.new_node("a").unwrap();
    let b = graph.new_node("b").unwrap();
    graph.set(a, SigVal::PullUp);
    graph.link(a, b);
    assert_eq!(graph.val(b), SigVal::High);
}

#[test]
fn grounding_a_pulled_net_through_vcc_rails() {
    let mut graph = SignalGraph::new();
    let pin = graph.new_node("pin").unwrap();
    graph.set(pin, SigVal::PullUp);
    let gnd = graph.gnd();
    graph.link(pin, gnd);
    assert_eq!(graph.val(pin), SigVal::Low);
    graph.unlink(pin, gnd);
    assert_eq!(graph.val(pin), SigVal::High);
}

#[test]
fn derived_clock_follows_master_change() {
    let mut clocks = ClockTree::new();
    let master = clocks.new_clock("m").unwrap();
    let child = clocks.new_clock("c").unwrap();
    clocks.set_freq(master, 100_000_000);
    clocks.make_derived(child, master, 1, 4).unwrap();
    clocks.make_system_master(master);
    assert_eq!(
        clocks.master_ratio(child).unwrap(),
        Fraction::new(1, 4).unwrap()
    );

    let observed: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&observed);
    let _h = clocks.trace(
        child,
        Box::new(move |t, id| sink.borrow_mut().push(t.freq(id).as_u64())),
    );
    clocks.set_freq(master, 80_000_000);
    assert_eq!(*observed.borrow(), vec![20_000_000]);
    // The ratio to the master is unchanged by a master-frequency change.
    assert_eq!(
        clocks.master_ratio(child).unwrap(),
        Fraction::new(1, 4).unwrap()
    );
    assert_eq!(clocks.master_ratio(master).unwrap(), Fraction::ONE);
}

#[test]
fn clock_mux_reparents_child() {
    let mut clocks = ClockTree::new();
    let m1 = clocks.new_clock("m1").unwrap();
    let m2 = clocks.new_clock("m2").unwrap();
    let c = clocks.new_clock("c").unwrap();
    clocks.set_freq(m1, 10_000_000);
    clocks.set_freq(m2, 9_000_000);
    clocks.make_derived(c, m1, 1, 2).unwrap();

    let fired = Rc::new(Cell::new(0u32));
    let sink = Rc::clone(&fired);
    let _h = clocks.trace(c, Box::new(move |_, _| sink.set(sink.get() + 1)));

    clocks.make_derived(c, m2, 1, 3).unwrap();
    assert_eq!(clocks.parent(c), Some(m2));
    assert_eq!(clocks.freq(c).as_u64(), 3_000_000);
    assert_eq!(fired.get(), 1);
    // Detached from m1: its changes no longer propagate.
    clocks.set_freq(m1, 20_000_000);
    assert_eq!(clocks.freq(c).as_u64(), 3_000_000);
    assert_eq!(fired.get(), 1);
}

#[test]
fn timer_raises_irq_line_and_cpu_vectors() {
    // Firmware: a busy loop at reset; the vector at 0x0003 increments
    // RAM 0x40 and returns.
    //   0x0000: SJMP 0x0000
    //   0x0003: INC 0x40 ; RETI
    let mut firmware = vec![0x80, 0xfe, 0x00];
    firmware.extend_from_slice(&[0x05, 0x40, 0x32]);

    let graph = Rc::new(RefCell::new(SignalGraph::new()));
    let mut cpu = Mcs51::new(0x1000, 1).unwrap();
    cpu.load_image(0, &firmware);

    // Wire "timer.irq" into the CPU's interrupt latch.
    let irq = cpu.irq_controller();
    let irq_node = {
        let mut g = graph.borrow_mut();
        let node = g.new_node("timer.irq").unwrap();
        g.trace(
            node,
            Box::new(move |_, _, val| match val {
                SigVal::High => irq.post_ilvl(0, 0x0003),
                _ => irq.unpost(),
            }),
        );
        node
    };

    // A cycle timer models the peripheral: after 10 cycles it raises the
    // interrupt line.
    let timer_graph = Rc::clone(&graph);
    cpu.timers.post(
        10,
        Box::new(move |_| {
            timer_graph.borrow_mut().set(irq_node, SigVal::High);
        }),
    );

    // Busy loop until the timer fires and the CPU vectors.
    for _ in 0..8 {
        cpu.step();
    }
    // The handler ran: the counter incremented and the CPU returned to
    // the busy loop.
    let counter = cpu.read_direct(0x40);
    assert_eq!(counter, 1);
    assert!(cpu.pc() <= 0x0002);
}
