#![doc = r#"
Softgun library crate.

Emulator infrastructure for embedded-SoC system emulation, exposed for use
by board binaries and tests.

Modules:
- registry: string-keyed hash tables backing the named-object namespaces
- signode: bidirectional signal-node graph with 9-value logic and traces
- clock: clock tree with exact fractional derivations and master ratios
- decoder: table-driven instruction decoder framework shared by CPU cores
- cycletimer: cycle counter plus due-ordered one-shot timer queue
- bus: IO-region registration and dispatch for CPU load/store paths
- config: `[section]`/`key=value` board configuration files
- debugvars: named debug-variable export for inspection tooling
- cli: command interpreter the session front-ends route lines through
- mcs51: MCS-51 CPU core built on the decoder framework
"#]

pub mod bus;
pub mod cli;
pub mod clock;
pub mod config;
pub mod cycletimer;
pub mod debugvars;
pub mod decoder;
pub mod mcs51;
pub mod registry;
pub mod signode;

// Re-export the core context objects at the crate root for convenience.
pub use bus::Bus;
pub use clock::ClockTree;
pub use config::Config;
pub use cycletimer::CycleTimers;
pub use signode::SignalGraph;
