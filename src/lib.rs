//! # smtline
//!
//! A discrete-event model of an SMT printed-circuit-board assembly line.
//!
//! ## Design Principles
//!
//! - **Processes over a shared world**: every conveyor, machine and operator
//!   is a [`Process`] resumed by a single-threaded [`Kernel`]. Processes hand
//!   boards to each other through capacity-1 slots and draw consumables from
//!   level-based reserves.
//! - **Half-integer timing**: machines act at integer seconds, belts and
//!   buffers hand boards on at the half second. The clock counts half-seconds
//!   so every instant is exact.
//! - **Interrupts**: machines ask operators for refills and reel replacements
//!   through kernel interrupts; operators preempt their current task and
//!   resume it later with the time it had left.
//! - **Accounting**: each entity tracks time per state, from which utilization
//!   and energy reports are derived.
//!
//! ## Features
//!
//! - `parallel` - Run parameter sweeps on the rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use smtline::{AssemblyLine, LineConfig};
//!
//! let mut config = LineConfig::reference();
//! config.simulation.batch_size = 32;
//!
//! let report = AssemblyLine::new(config)?.run()?;
//! assert_eq!(report.pcbs_finished, 32);
//! println!("{}", report.summary());
//! # Ok::<(), smtline::SimError>(())
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use smtline::LineConfig;
//!
//! let config = LineConfig::from_file("line.yaml")?;
//! let report = smtline::AssemblyLine::new(config)?.run()?;
//! ```

pub mod types;
pub mod clock;
pub mod error;
pub mod pcb;
pub mod trace;
pub mod stats;
pub mod kernel;
pub mod machines;
pub mod config;
pub mod line;
pub mod sweep;

// Re-export commonly used types
pub use types::{DrawOrder, ProcessId, SimTime, SlotId, TaskKind};
pub use error::{SimError, SimResult};
pub use pcb::{Item, Pcb, PcbCatalog, PcbTypeInfo, Stack};
pub use trace::{LogTrace, MemoryTrace, NullTrace, TextTrace, TraceEvent, TraceSink};
pub use stats::{EntityReport, LineReport, StateShare, Timer};
pub use kernel::{Condition, Context, Interrupt, Kernel, Process, RunOutcome, Suspend, Wake, World};
pub use config::{ConfigError, LineConfig, LineConfigBuilder, MachineConfig};
pub use line::AssemblyLine;
pub use sweep::{capacity_sweep, k_sweep, sweep, sweep_to_csv, SweepPoint};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
/// `RUST_LOG` overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// smtline::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
