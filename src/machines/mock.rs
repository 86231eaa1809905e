//! Scripted processes for testing.
//!
//! These processes stand in for the neighbours of the entity under test:
//! they feed boards into a slot at fixed instants, drain a slot as soon as
//! something arrives, drive an oven control line, or interrupt an operator
//! on a schedule.

use std::any::Any;
use std::collections::VecDeque;

use crate::error::SimResult;
use crate::kernel::{Condition, Context, Interrupt, OvenCommand, Process, Suspend, Wake};
use crate::pcb::{Item, Pcb, Stack};
use crate::types::{ControlId, ProcessId, SimTime, SlotId, TaskKind};

use super::place_checked;

/// Places boards into a slot at scheduled instants.
///
/// If the slot is still occupied at a scheduled instant, the feeder waits for
/// it to free up and places the board then.
#[derive(Debug)]
pub struct Feeder {
    name: String,
    slot: SlotId,
    schedule: VecDeque<SimTime>,
    type_id: u32,
    stack_size: Option<usize>,
    next_serial: u64,
    /// Instants at which an item was actually placed
    pub placed: Vec<SimTime>,
}

impl Feeder {
    /// Creates a feeder placing one board of type 1 at each scheduled instant.
    pub fn new(name: impl Into<String>, slot: SlotId, schedule: impl IntoIterator<Item = SimTime>) -> Self {
        Self {
            name: name.into(),
            slot,
            schedule: schedule.into_iter().collect(),
            type_id: 1,
            stack_size: None,
            next_serial: 1,
            placed: Vec::new(),
        }
    }

    /// Places stacks of `size` boards instead of single boards.
    pub fn with_stacks(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Sets the board type.
    pub fn with_type(mut self, type_id: u32) -> Self {
        self.type_id = type_id;
        self
    }

    fn make_item(&mut self, now: SimTime) -> Item {
        let mut next = || {
            let pcb = Pcb::new(self.type_id, self.next_serial, now);
            self.next_serial += 1;
            pcb
        };
        match self.stack_size {
            Some(size) => Item::Stack((0..size).map(|_| next()).collect::<Stack>()),
            None => Item::Pcb(next()),
        }
    }
}

impl Process for Feeder {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        let Some(&due) = self.schedule.front() else {
            return Ok(Suspend::Finish);
        };
        let now = ctx.now();
        if now < due {
            return Ok(Suspend::For(due - now));
        }
        if !ctx.world().slot(self.slot).can_put() {
            return Ok(Suspend::Until(Condition::CanPut(self.slot)));
        }
        let item = self.make_item(now);
        place_checked(ctx, &self.name, self.slot, item)?;
        self.placed.push(now);
        self.schedule.pop_front();
        match self.schedule.front() {
            Some(&next) => Ok(Suspend::For(next.saturating_sub(now))),
            None => Ok(Suspend::Finish),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Takes every item arriving in a slot, from a given instant on.
#[derive(Debug)]
pub struct Collector {
    name: String,
    slot: SlotId,
    open_at: SimTime,
    /// Arrival instant and serial of the first board of each item taken
    pub received: Vec<(SimTime, u64)>,
    /// Boards taken, counting every board of a stack
    pub pcb_count: usize,
}

impl Collector {
    pub fn new(name: impl Into<String>, slot: SlotId) -> Self {
        Self {
            name: name.into(),
            slot,
            open_at: 0,
            received: Vec::new(),
            pcb_count: 0,
        }
    }

    /// Leaves the slot alone until `at`, so the upstream entity backs up.
    pub fn opening_at(mut self, at: SimTime) -> Self {
        self.open_at = at;
        self
    }

    /// Arrival instants of the items taken.
    pub fn times(&self) -> Vec<SimTime> {
        self.received.iter().map(|(t, _)| *t).collect()
    }

    /// First-board serials of the items taken, in arrival order.
    pub fn serials(&self) -> Vec<u64> {
        self.received.iter().map(|(_, s)| *s).collect()
    }
}

impl Process for Collector {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        let now = ctx.now();
        if now < self.open_at {
            return Ok(Suspend::For(self.open_at - now));
        }
        if let Some(item) = ctx.take(&self.name, self.slot) {
            self.pcb_count += item.pcb_count();
            let serial = item.into_pcbs().first().map_or(0, |p| p.serial_id);
            self.received.push((now, serial));
        }
        Ok(Suspend::Until(Condition::CanGet(self.slot)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Writes oven commands to a control line at scheduled instants.
#[derive(Debug)]
pub struct OvenController {
    control: ControlId,
    commands: VecDeque<(SimTime, OvenCommand)>,
}

impl OvenController {
    pub fn new(control: ControlId, commands: impl IntoIterator<Item = (SimTime, OvenCommand)>) -> Self {
        Self {
            control,
            commands: commands.into_iter().collect(),
        }
    }
}

impl Process for OvenController {
    fn name(&self) -> &str {
        "oven_controller"
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        let now = ctx.now();
        while let Some(&(at, command)) = self.commands.front() {
            if at > now {
                return Ok(Suspend::For(at - now));
            }
            ctx.world_mut().control_mut(self.control).set(command);
            self.commands.pop_front();
        }
        Ok(Suspend::Finish)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Interrupts an operator on behalf of a named machine at scheduled instants.
#[derive(Debug)]
pub struct Requester {
    machine: String,
    operator: ProcessId,
    requests: VecDeque<(SimTime, TaskKind)>,
}

impl Requester {
    pub fn new(
        machine: impl Into<String>,
        operator: ProcessId,
        requests: impl IntoIterator<Item = (SimTime, TaskKind)>,
    ) -> Self {
        Self {
            machine: machine.into(),
            operator,
            requests: requests.into_iter().collect(),
        }
    }
}

impl Process for Requester {
    fn name(&self) -> &str {
        &self.machine
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        let now = ctx.now();
        while let Some(&(at, task)) = self.requests.front() {
            if at > now {
                return Ok(Suspend::For(at - now));
            }
            ctx.interrupt(self.operator, Interrupt::new(self.machine.clone(), task));
            self.requests.pop_front();
        }
        Ok(Suspend::Finish)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
