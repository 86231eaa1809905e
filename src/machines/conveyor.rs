//! Conveyor belt modeled as a shift register.
//!
//! The belt is divided into `num_stages` positions, each holding at most one
//! item. Every `delay_per_stage` the belt shifts right by one position: the
//! item waiting in the input slot enters the first stage and the item in the
//! last stage drops into the output slot at the half-tick. If the output slot
//! is still occupied when a shift is due, the belt stalls.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;

use crate::clock::{secs, HALF_TICK};
use crate::error::SimResult;
use crate::kernel::{Context, Process, Suspend, Wake, World};
use crate::pcb::Item;
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::types::{SimTime, SlotId};

use super::{place_checked, start_offset, wait_for_start};

/// Fixed-length pipeline of optional entries.
///
/// An entry shifted in at shift `1` leaves at shift `len`. The last stage is
/// the exit itself, so at most `len - 1` entries are held between shifts.
#[derive(Debug)]
pub struct ShiftRegister<T> {
    len: usize,
    stages: VecDeque<Option<T>>,
}

impl<T> ShiftRegister<T> {
    /// Creates an empty register with `len` stages.
    pub fn new(len: usize) -> Self {
        Self {
            len,
            stages: (1..len).map(|_| None).collect(),
        }
    }

    /// Shifts by one position, returning the entry pushed out of the last stage.
    pub fn shift(&mut self, incoming: Option<T>) -> Option<T> {
        self.stages.push_front(incoming);
        self.stages.pop_back().flatten()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no stage holds an entry.
    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(Option::is_none)
    }

    /// Iterates over the occupied stages, first stage first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.stages.iter().flatten()
    }

    /// Pictorial occupancy of the held stages, e.g. `|*| |`.
    pub fn occupancy(&self) -> String {
        let mut s = String::from("|");
        for stage in &self.stages {
            s.push_str(if stage.is_some() { "*|" } else { " |" });
        }
        s
    }
}

impl ShiftRegister<Item> {
    /// Boards on the register, counting every board of a stack.
    pub fn pcb_count(&self) -> usize {
        self.iter().map(Item::pcb_count).sum()
    }
}

/// Belt parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeltParams {
    /// Number of items that fit end to end (at least 2)
    pub num_stages: usize,
    /// Seconds per one-position shift
    pub delay_per_stage: u64,
    /// Start offset in seconds (may be a half second)
    pub start_time: f64,
    /// Power draw in watts per state: idle, moving, stalled
    pub power_w: Vec<f64>,
}

impl Default for BeltParams {
    fn default() -> Self {
        Self {
            num_stages: 3,
            delay_per_stage: 1,
            start_time: 0.0,
            power_w: Vec::new(),
        }
    }
}

/// Belt states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeltState {
    Idle,
    Moving,
    Stalled,
}

impl StateSet for BeltState {
    const ALL: &'static [Self] = &[BeltState::Idle, BeltState::Moving, BeltState::Stalled];

    fn name(self) -> &'static str {
        match self {
            BeltState::Idle => "idle",
            BeltState::Moving => "moving",
            BeltState::Stalled => "stalled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Shift,
    Deliver,
}

/// A conveyor belt between two slots.
#[derive(Debug)]
pub struct ConveyorBelt {
    name: String,
    input: SlotId,
    output: SlotId,
    register: ShiftRegister<Item>,
    delay_per_stage: SimTime,
    start: SimTime,
    phase: Phase,
    /// Item pushed out by the last shift, waiting for the half-tick
    outgoing: Option<Item>,
    shifts: u64,
    tracker: StateTracker<BeltState>,
}

impl ConveyorBelt {
    pub fn new(name: impl Into<String>, params: &BeltParams, input: SlotId, output: SlotId) -> Self {
        let name = name.into();
        Self {
            tracker: StateTracker::new(name.clone(), BeltState::Idle).with_power(&params.power_w),
            name,
            input,
            output,
            register: ShiftRegister::new(params.num_stages),
            delay_per_stage: secs(params.delay_per_stage),
            start: start_offset(params.start_time),
            phase: Phase::Start,
            outgoing: None,
            shifts: 0,
        }
    }

    pub fn state(&self) -> BeltState {
        self.tracker.state()
    }

    /// Number of completed shifts.
    pub fn shifts(&self) -> u64 {
        self.shifts
    }

    pub fn input(&self) -> SlotId {
        self.input
    }

    pub fn output(&self) -> SlotId {
        self.output
    }

    /// Items on the belt and in its two end slots.
    pub fn item_count(&self, world: &World) -> usize {
        let in_slots = world.slot(self.input).len() + world.slot(self.output).len();
        self.register.iter().count() + usize::from(self.outgoing.is_some()) + in_slots
    }

    fn is_empty(&self, ctx: &Context<'_>) -> bool {
        self.register.is_empty()
            && ctx.world().slot(self.input).is_empty()
            && ctx.world().slot(self.output).is_empty()
    }

    fn shift(&mut self, ctx: &mut Context<'_>) -> Suspend {
        if self.is_empty(ctx) {
            self.tracker.enter(ctx, BeltState::Idle);
            return Suspend::For(self.delay_per_stage);
        }
        if !ctx.world().slot(self.output).is_empty() {
            self.tracker.enter(ctx, BeltState::Stalled);
            tracing::trace!(belt = %self.name, occupancy = %self.register.occupancy(), "stalled");
            return Suspend::For(self.delay_per_stage);
        }
        self.tracker.enter(ctx, BeltState::Moving);
        let incoming = ctx.take(&self.name, self.input);
        self.outgoing = self.register.shift(incoming);
        self.shifts += 1;
        self.phase = Phase::Deliver;
        Suspend::For(self.delay_per_stage - HALF_TICK)
    }
}

impl Process for ConveyorBelt {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        match self.phase {
            Phase::Start => {
                self.phase = Phase::Shift;
                match wait_for_start(self.start) {
                    Some(wait) => Ok(wait),
                    None => Ok(self.shift(ctx)),
                }
            }
            Phase::Shift => Ok(self.shift(ctx)),
            Phase::Deliver => {
                if let Some(item) = self.outgoing.take() {
                    place_checked(ctx, &self.name, self.output, item)?;
                }
                tracing::trace!(belt = %self.name, occupancy = %self.register.occupancy(), "shift-right");
                self.phase = Phase::Shift;
                Ok(Suspend::For(HALF_TICK))
            }
        }
    }

    fn held_items(&self) -> usize {
        self.register.pcb_count() + self.outgoing.as_ref().map_or(0, Item::pcb_count)
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("conveyor_belt", now)
                .with_counter("shifts", self.shifts),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
