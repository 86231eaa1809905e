//! Execution context handed to a process while it runs.

use crate::pcb::Item;
use crate::trace::{Handoff, TraceEvent, TraceSink};
use crate::types::{ProcessId, SimTime, SlotId};

use super::{Interrupt, World};

/// A process's view of the simulation during one step.
///
/// Holds the only mutable borrow of the shared [`World`] for the duration of
/// the step. Interrupts and stop requests are collected here and applied by
/// the kernel once the step returns.
pub struct Context<'a> {
    pub(crate) now: SimTime,
    pub(crate) pid: ProcessId,
    pub(crate) world: &'a mut World,
    pub(crate) trace: &'a mut dyn TraceSink,
    pub(crate) interrupts: &'a mut Vec<(ProcessId, Interrupt)>,
    pub(crate) stop_requested: &'a mut bool,
}

impl<'a> Context<'a> {
    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Id of the running process.
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    /// Asks the kernel to interrupt `target` at the current instant.
    pub fn interrupt(&mut self, target: ProcessId, interrupt: Interrupt) {
        self.interrupts.push((target, interrupt));
    }

    /// Ends the run after the current step.
    pub fn stop(&mut self) {
        *self.stop_requested = true;
    }

    /// Returns true if trace events are kept, so callers can skip building them.
    pub fn trace_enabled(&self) -> bool {
        self.trace.enabled()
    }

    /// Appends an event to the activity trace.
    pub fn record(&mut self, event: TraceEvent) {
        if self.trace.enabled() {
            self.trace.record(event);
        }
    }

    /// Takes the front item of a slot, tracing the hand-off.
    pub fn take(&mut self, entity: &str, slot: SlotId) -> Option<Item> {
        let item = self.world.slot_mut(slot).get()?;
        self.trace_handoff(entity, slot, Handoff::Took, &item);
        Some(item)
    }

    /// Places an item into a slot, tracing the hand-off.
    ///
    /// Returns the item back if the slot is full; nothing is ever dropped.
    pub fn place(&mut self, entity: &str, slot: SlotId, item: Item) -> Result<(), Item> {
        if !self.world.slot(slot).can_put() {
            return Err(item);
        }
        if self.trace.enabled() {
            self.trace_handoff(entity, slot, Handoff::Placed, &item);
        }
        self.world.slot_mut(slot).put(item)
    }

    fn trace_handoff(&mut self, entity: &str, slot: SlotId, direction: Handoff, item: &Item) {
        if !self.trace.enabled() {
            return;
        }
        let event = TraceEvent::Handoff {
            time: self.now,
            entity: entity.to_string(),
            slot: self.world.slot(slot).name().to_string(),
            direction,
            item: item.to_string(),
        };
        self.trace.record(event);
    }
}
