//! Discrete-event kernel.
//!
//! Every entity of the line is a [`Process`]: a state machine that the kernel
//! resumes and that answers with the next [`Suspend`] point. A process can
//! suspend for a fixed duration, until a [`Condition`] on the shared
//! [`World`] holds, or indefinitely until somebody interrupts it.
//!
//! # Scheduling
//!
//! - Single-threaded and cooperative: a process runs from one suspension point
//!   to the next without any other process observing intermediate state.
//! - Wakeups are ordered by `(time, priority, sequence)`. Interrupts carry
//!   urgent priority; the sequence number is an insertion counter, so
//!   processes resuming at the same instant always resume in the same order.
//! - A process waiting on a condition is re-checked after every step, in
//!   registration order.
//!
//! # Interrupts
//!
//! [`Context::interrupt`] aborts the target's current suspension at the
//! current instant. Any pending timeout is cancelled and the target resumes
//! with [`Wake::Interrupted`]; it is then free to re-suspend with whatever
//! time it has left.

mod context;
mod resources;
mod scheduler;

use std::any::Any;

pub use context::Context;
pub use resources::{ControlLine, OvenCommand, Reserve, Signal, Store, World};
pub use scheduler::{Kernel, KernelStats, RunOutcome};

use crate::error::SimResult;
use crate::stats::EntityReport;
use crate::types::{ReserveId, SignalId, SimTime, SlotId, TaskKind};

/// Why a process is being resumed.
#[derive(Clone, Debug, PartialEq)]
pub enum Wake {
    /// First activation after registration
    Start,
    /// The requested duration elapsed
    Timeout,
    /// The awaited condition holds
    Ready,
    /// Another process interrupted the current suspension
    Interrupted(Interrupt),
}

/// How a process gives control back to the kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Suspend {
    /// Resume after the given duration
    For(SimTime),
    /// Resume once the condition holds (immediately if it already does)
    Until(Condition),
    /// Sleep until interrupted
    Passivate,
    /// Never resume again
    Finish,
}

/// A predicate over the [`World`] a process can wait on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Condition {
    /// The store holds at least one item
    CanGet(SlotId),
    /// The store has room for one more item
    CanPut(SlotId),
    /// The reserve holds at least `amount`
    Level { reserve: ReserveId, amount: f64 },
    /// The signal has a pending notification
    Signaled(SignalId),
}

impl Condition {
    /// Evaluates the condition against the current world.
    pub fn holds(&self, world: &World) -> bool {
        match *self {
            Condition::CanGet(slot) => world.slot(slot).can_get(),
            Condition::CanPut(slot) => world.slot(slot).can_put(),
            Condition::Level { reserve, amount } => world.reserve(reserve).can_get(amount),
            Condition::Signaled(signal) => world.signal(signal).is_set(),
        }
    }
}

/// Out-of-band request from one process to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Interrupt {
    /// Name of the requesting machine
    pub source: String,
    /// The task being requested
    pub task: TaskKind,
}

impl Interrupt {
    pub fn new(source: impl Into<String>, task: TaskKind) -> Self {
        Self {
            source: source.into(),
            task,
        }
    }
}

/// A logical process driven by the kernel.
///
/// Implementations keep an explicit phase describing where they are suspended
/// and continue from there on every call to [`resume`](Process::resume).
pub trait Process: Any + Send {
    /// Name used in traces and reports.
    fn name(&self) -> &str;

    /// Runs the process up to its next suspension point.
    ///
    /// # Arguments
    /// * `ctx` - Access to the clock, the shared world and the trace
    /// * `wake` - Why the process is running now
    fn resume(&mut self, ctx: &mut Context<'_>, wake: Wake) -> SimResult<Suspend>;

    /// Number of boards the process currently holds outside any slot.
    fn held_items(&self) -> usize {
        0
    }

    /// Utilization and energy report at time `now`, for entities that keep one.
    fn report(&self, _now: SimTime) -> Option<EntityReport> {
        None
    }

    /// Upcast used by [`Kernel::process`] for typed access after a run.
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcb::{Item, Pcb};

    #[test]
    fn test_condition_holds() {
        let mut world = World::new();
        let slot = world.add_slot("s");
        let solder = world.add_reserve("solder", 10.0, 4.0);
        let done = world.add_signal("done");

        assert!(!Condition::CanGet(slot).holds(&world));
        assert!(Condition::CanPut(slot).holds(&world));
        world.slot_mut(slot).put(Item::Pcb(Pcb::new(1, 1, 0))).unwrap();
        assert!(Condition::CanGet(slot).holds(&world));
        assert!(!Condition::CanPut(slot).holds(&world));

        let need = Condition::Level {
            reserve: solder,
            amount: 5.0,
        };
        assert!(!need.holds(&world));
        world.reserve_mut(solder).refill();
        assert!(need.holds(&world));

        assert!(!Condition::Signaled(done).holds(&world));
        world.signal_mut(done).notify();
        assert!(Condition::Signaled(done).holds(&world));
    }
}
