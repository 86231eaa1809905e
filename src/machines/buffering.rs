//! Burst buffer in front of a reflow oven.
//!
//! With buffering enabled the module alternates between filling and
//! emptying: it accumulates boards until the buffer is full, then releases
//! them one per second. An attached oven is turned on once the buffer holds
//! `capacity - k` boards and turned off when the buffer has been drained, so
//! the oven only runs while a burst is on its way.
//!
//! With buffering disabled the module is a plain pass-through.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::clock::{HALF_TICK, TICK};
use crate::error::SimResult;
use crate::kernel::{Context, OvenCommand, Process, Suspend, Wake};
use crate::pcb::{DrawBuffer, Item};
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::types::{ControlId, DrawOrder, SimTime, SlotId};

use super::{place_checked, send_oven_command, start_offset, wait_for_start};

/// Parameters shared by the single and double buffering modules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferingParams {
    /// Buffer capacity (per stage for the double module), at least 2
    pub capacity: usize,
    /// Oven turn-on lead: the oven is turned on at `capacity - k` boards
    pub k: usize,
    /// Which end boards leave the buffer from
    pub draw_order: DrawOrder,
    /// Buffer boards; when false the module only passes boards through
    pub enabled: bool,
    pub start_time: f64,
    /// Power per state
    pub power_w: Vec<f64>,
}

impl Default for BufferingParams {
    fn default() -> Self {
        Self {
            capacity: 32,
            k: 0,
            draw_order: DrawOrder::Lifo,
            enabled: true,
            start_time: 0.0,
            power_w: Vec::new(),
        }
    }
}

impl BufferingParams {
    /// Buffer size at which the oven is turned on.
    pub fn turn_on_level(&self) -> usize {
        self.capacity.saturating_sub(self.k)
    }
}

/// Pass-through shared by both buffering modules in bypass mode.
///
/// Takes a board at an integer instant and places it at the next half-tick,
/// retrying every second while the output is occupied.
#[derive(Debug, Default)]
pub(super) struct PassThrough {
    held: Option<Item>,
    passed: u64,
}

impl PassThrough {
    pub(super) fn step(
        &mut self,
        ctx: &mut Context<'_>,
        name: &str,
        input: SlotId,
        output: SlotId,
    ) -> SimResult<Suspend> {
        match self.held.take() {
            None => match ctx.take(name, input) {
                Some(item) => {
                    self.held = Some(item);
                    Ok(Suspend::For(HALF_TICK))
                }
                None => Ok(Suspend::For(TICK)),
            },
            Some(item) => {
                if !ctx.world().slot(output).can_put() {
                    self.held = Some(item);
                    return Ok(Suspend::For(TICK));
                }
                place_checked(ctx, name, output, item)?;
                self.passed += 1;
                Ok(Suspend::For(HALF_TICK))
            }
        }
    }

    pub(super) fn held_items(&self) -> usize {
        self.held.as_ref().map_or(0, Item::pcb_count)
    }

    pub(super) fn passed(&self) -> u64 {
        self.passed
    }
}

/// Single buffering module states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    Bypass,
    Filling,
    Emptying,
}

impl StateSet for BufferState {
    const ALL: &'static [Self] = &[BufferState::Bypass, BufferState::Filling, BufferState::Emptying];

    fn name(self) -> &'static str {
        match self {
            BufferState::Bypass => "bypass",
            BufferState::Filling => "filling",
            BufferState::Emptying => "emptying",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Bypass,
    Fill,
    Empty,
}

/// Single-buffer burst module.
#[derive(Debug)]
pub struct BufferingModule {
    name: String,
    input: SlotId,
    output: SlotId,
    control: Option<ControlId>,
    turn_on_level: usize,
    buffer: DrawBuffer<Item>,
    bypass: PassThrough,
    start: SimTime,
    phase: Phase,
    /// Set once the oven has been turned on during the current fill
    oven_requested: bool,
    bursts: u64,
    tracker: StateTracker<BufferState>,
}

impl BufferingModule {
    /// Creates a module, optionally driving the oven behind `control`.
    pub fn new(
        name: impl Into<String>,
        params: &BufferingParams,
        input: SlotId,
        output: SlotId,
        control: Option<ControlId>,
    ) -> Self {
        let name = name.into();
        let initial = if params.enabled {
            BufferState::Filling
        } else {
            BufferState::Bypass
        };
        Self {
            tracker: StateTracker::new(name.clone(), initial).with_power(&params.power_w),
            name,
            input,
            output,
            control,
            turn_on_level: params.turn_on_level(),
            buffer: DrawBuffer::new(params.capacity, params.draw_order),
            bypass: PassThrough::default(),
            start: start_offset(params.start_time),
            phase: Phase::Start,
            oven_requested: false,
            bursts: 0,
        }
    }

    pub fn state(&self) -> BufferState {
        self.tracker.state()
    }

    /// Boards currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of completed fill/empty cycles.
    pub fn bursts(&self) -> u64 {
        self.bursts
    }

    fn fill(&mut self, ctx: &mut Context<'_>) -> SimResult<Suspend> {
        loop {
            if self.buffer.is_full() {
                self.tracker.enter(ctx, BufferState::Emptying);
                self.phase = Phase::Empty;
                return Ok(Suspend::For(HALF_TICK));
            }
            let Some(item) = ctx.take(&self.name, self.input) else {
                return Ok(Suspend::For(TICK));
            };
            if let Err(item) = self.buffer.push(item) {
                // hand the board back to the slot it was just taken from
                place_checked(ctx, &self.name, self.input, item)?;
                return Ok(Suspend::For(TICK));
            }
            tracing::trace!(module = %self.name, buffered = self.buffer.len(), "buffered a board");
            if !self.oven_requested && self.buffer.len() >= self.turn_on_level {
                self.oven_requested = true;
                send_oven_command(ctx, &self.name, self.control, OvenCommand::TurnOn);
            }
        }
    }

    fn empty(&mut self, ctx: &mut Context<'_>) -> SimResult<Suspend> {
        if !ctx.world().slot(self.output).can_put() {
            return Ok(Suspend::For(TICK));
        }
        if let Some(item) = self.buffer.pop() {
            place_checked(ctx, &self.name, self.output, item)?;
        }
        if self.buffer.is_empty() {
            self.bursts += 1;
            self.oven_requested = false;
            self.tracker.enter(ctx, BufferState::Filling);
            send_oven_command(ctx, &self.name, self.control, OvenCommand::TurnOff);
            self.phase = Phase::Fill;
            return Ok(Suspend::For(HALF_TICK));
        }
        Ok(Suspend::For(TICK))
    }
}

impl Process for BufferingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        match self.phase {
            Phase::Start => {
                if self.tracker.state() == BufferState::Bypass {
                    self.phase = Phase::Bypass;
                } else {
                    send_oven_command(ctx, &self.name, self.control, OvenCommand::TurnOff);
                    self.phase = Phase::Fill;
                }
                match wait_for_start(self.start) {
                    Some(wait) => Ok(wait),
                    None => self.resume(ctx, Wake::Timeout),
                }
            }
            Phase::Bypass => self.bypass.step(ctx, &self.name, self.input, self.output),
            Phase::Fill => self.fill(ctx),
            Phase::Empty => self.empty(ctx),
        }
    }

    fn held_items(&self) -> usize {
        self.buffer.pcb_count() + self.bypass.held_items()
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("buffering_module", now)
                .with_counter("bursts", self.bursts)
                .with_counter("bypassed", self.bypass.passed()),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
