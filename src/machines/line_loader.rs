//! Line loader: unloads PCB stacks onto the line one board at a time.
//!
//! The stack stays in the loader's input slot while it is being unloaded, so
//! the source cannot deliver the next tray until the loader removes the empty
//! one.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::clock::{secs, HALF_TICK, TICK};
use crate::error::SimResult;
use crate::kernel::{Context, Process, Suspend, Wake};
use crate::pcb::{Item, Pcb};
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::types::{SimTime, SlotId};

use super::{place_checked, start_offset, wait_for_start};

/// Loader parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderParams {
    /// Seconds to push one board onto the line (at least 1)
    pub delay: u64,
    pub start_time: f64,
    /// Power per state: idle, loading
    pub power_w: Vec<f64>,
}

impl Default for LoaderParams {
    fn default() -> Self {
        Self {
            delay: 2,
            start_time: 0.0,
            power_w: Vec::new(),
        }
    }
}

/// Loader states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Loading,
}

impl StateSet for LoaderState {
    const ALL: &'static [Self] = &[LoaderState::Idle, LoaderState::Loading];

    fn name(self) -> &'static str {
        match self {
            LoaderState::Idle => "idle",
            LoaderState::Loading => "loading",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Idle,
    WaitOutput,
    Place,
    AfterPlace,
}

/// Unloads stacks from its input slot onto its output slot.
#[derive(Debug)]
pub struct LineLoader {
    name: String,
    input: SlotId,
    output: SlotId,
    delay: SimTime,
    start: SimTime,
    phase: Phase,
    held: Option<Pcb>,
    loaded: u64,
    trays: u64,
    tracker: StateTracker<LoaderState>,
}

impl LineLoader {
    pub fn new(name: impl Into<String>, params: &LoaderParams, input: SlotId, output: SlotId) -> Self {
        let name = name.into();
        Self {
            tracker: StateTracker::new(name.clone(), LoaderState::Idle).with_power(&params.power_w),
            name,
            input,
            output,
            delay: secs(params.delay),
            start: start_offset(params.start_time),
            phase: Phase::Start,
            held: None,
            loaded: 0,
            trays: 0,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.tracker.state()
    }

    /// Boards pushed onto the line.
    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Empty trays removed from the input.
    pub fn trays(&self) -> u64 {
        self.trays
    }

    /// Picks the next board from the tray in the input slot.
    ///
    /// Returns false if there is nothing to load right now.
    fn pick(&mut self, ctx: &mut Context<'_>) -> bool {
        loop {
            let next = match ctx.world_mut().slot_mut(self.input).peek_mut() {
                None => return false,
                Some(Item::Stack(stack)) => stack.pop_front(),
                Some(Item::Pcb(_)) => None,
            };
            if let Some(pcb) = next {
                tracing::trace!(loader = %self.name, %pcb, "unloading board from stack");
                self.held = Some(pcb);
                return true;
            }
            match ctx.take(&self.name, self.input) {
                Some(Item::Pcb(pcb)) => {
                    self.held = Some(pcb);
                    return true;
                }
                Some(Item::Stack(_)) => {
                    self.trays += 1;
                    tracing::trace!(loader = %self.name, "removed empty tray");
                }
                None => return false,
            }
        }
    }
}

impl Process for LineLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        loop {
            match self.phase {
                Phase::Start => {
                    self.phase = Phase::Idle;
                    if let Some(wait) = wait_for_start(self.start) {
                        return Ok(wait);
                    }
                }
                Phase::Idle => {
                    if !self.pick(ctx) {
                        return Ok(Suspend::For(TICK));
                    }
                    self.phase = Phase::WaitOutput;
                }
                Phase::WaitOutput => {
                    if !ctx.world().slot(self.output).can_put() {
                        return Ok(Suspend::For(TICK));
                    }
                    self.tracker.enter(ctx, LoaderState::Loading);
                    self.phase = Phase::Place;
                    return Ok(Suspend::For(self.delay.saturating_sub(TICK) + HALF_TICK));
                }
                Phase::Place => {
                    if let Some(pcb) = self.held.take() {
                        place_checked(ctx, &self.name, self.output, Item::Pcb(pcb))?;
                        self.loaded += 1;
                    }
                    self.phase = Phase::AfterPlace;
                    return Ok(Suspend::For(HALF_TICK));
                }
                Phase::AfterPlace => {
                    self.tracker.enter(ctx, LoaderState::Idle);
                    self.phase = Phase::Idle;
                }
            }
        }
    }

    fn held_items(&self) -> usize {
        usize::from(self.held.is_some())
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("line_loader", now)
                .with_counter("loaded", self.loaded)
                .with_counter("trays", self.trays),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
