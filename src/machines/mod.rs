//! Built-in line entities.
//!
//! This module provides the processes an SMT line is assembled from:
//! - [`ConveyorBelt`] - shift-register transport between machines
//! - [`BufferingModule`] / [`DoubleBufferingModule`] - burst buffers driving an oven
//! - [`ReflowOven`] - belt-like oven with a thermal state machine
//! - [`ScreenPrinter`] / [`PickAndPlace`] - consumable-driven processing machines
//! - [`LineLoader`] - unloads PCB stacks onto the line
//! - [`HumanOperator`] - preemptible executor of refill and replacement tasks
//! - [`Source`] / [`Sink`] - boundary producer and consumer

mod buffering;
mod conveyor;
mod double_buffering;
mod line_loader;
pub mod mock;
mod operator;
mod pick_and_place;
mod reflow_oven;
mod screen_printer;
mod source;
mod sink;

pub use buffering::{BufferState, BufferingModule, BufferingParams};
pub use conveyor::{BeltParams, BeltState, ConveyorBelt, ShiftRegister};
pub use double_buffering::{DoubleBufferState, DoubleBufferingModule};
pub use line_loader::{LineLoader, LoaderParams, LoaderState};
pub use operator::{AssignedTask, HumanOperator, OperatorState, TaskAction};
pub use pick_and_place::{PickAndPlace, PickAndPlaceParams, PickAndPlaceState};
pub use reflow_oven::{cooled_temperature, setup_time, OvenParams, OvenState, ReflowOven};
pub use screen_printer::{Consumables, PrinterParams, PrinterState, ScreenPrinter};
pub use sink::{Sink, SinkParams};
pub use source::{Source, SourceParams};

use crate::clock::from_secs_f64;
use crate::error::{SimError, SimResult};
use crate::kernel::{Context, OvenCommand, Suspend};
use crate::pcb::Item;
use crate::trace::TraceEvent;
use crate::types::{ControlId, SimTime, SlotId};

/// Converts a configured start offset in seconds to clock units.
///
/// Offsets that are not a multiple of half a second are rounded up to the
/// next half second.
pub(crate) fn start_offset(seconds: f64) -> SimTime {
    from_secs_f64(seconds).unwrap_or_else(|| {
        let halves = (seconds.max(0.0) * 2.0).ceil();
        halves as SimTime
    })
}

/// Suspension for the initial start offset, or `None` when starting right away.
pub(crate) fn wait_for_start(start: SimTime) -> Option<Suspend> {
    (start > 0).then_some(Suspend::For(start))
}

/// Places an item the caller has already checked room for.
///
/// A full slot here means two writers share the slot, which is a wiring error.
pub(crate) fn place_checked(
    ctx: &mut Context<'_>,
    entity: &str,
    slot: SlotId,
    item: Item,
) -> SimResult<()> {
    ctx.place(entity, slot, item).map_err(|_| SimError::SlotOccupied {
        entity: entity.to_string(),
        slot,
    })
}

/// Writes an oven command to a control line and traces it.
pub(crate) fn send_oven_command(
    ctx: &mut Context<'_>,
    controller: &str,
    control: Option<ControlId>,
    command: OvenCommand,
) {
    let Some(control) = control else {
        return;
    };
    ctx.world_mut().control_mut(control).set(command);
    tracing::debug!(controller, %command, "oven control");
    let time = ctx.now();
    ctx.record(TraceEvent::OvenControl {
        time,
        controller: controller.to_string(),
        command,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{secs, HALF_TICK};

    #[test]
    fn test_start_offset() {
        assert_eq!(start_offset(0.0), 0);
        assert_eq!(start_offset(0.5), HALF_TICK);
        assert_eq!(start_offset(3.0), secs(3));
        assert_eq!(start_offset(0.2), HALF_TICK);
        assert_eq!(wait_for_start(0), None);
        assert_eq!(wait_for_start(HALF_TICK), Some(Suspend::For(HALF_TICK)));
    }
}
