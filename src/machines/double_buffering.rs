//! Double-buffer burst module.
//!
//! Boards are accepted into an input buffer at integer instants. At the
//! following half-tick a full input buffer is moved in one piece into an empty
//! output buffer, which then drains one board per second. Because the input
//! buffer starts filling again right after the move, accumulation of the next
//! burst overlaps with the release of the current one.

use std::any::Any;

use crate::clock::HALF_TICK;
use crate::error::SimResult;
use crate::kernel::{Context, OvenCommand, Process, Suspend, Wake};
use crate::pcb::{DrawBuffer, Item};
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::types::{ControlId, SimTime, SlotId};

use super::buffering::{BufferingParams, PassThrough};
use super::{place_checked, send_oven_command, start_offset, wait_for_start};

/// Double buffering module states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DoubleBufferState {
    Bypass,
    BufferingEnabled,
}

impl StateSet for DoubleBufferState {
    const ALL: &'static [Self] = &[DoubleBufferState::Bypass, DoubleBufferState::BufferingEnabled];

    fn name(self) -> &'static str {
        match self {
            DoubleBufferState::Bypass => "bypass",
            DoubleBufferState::BufferingEnabled => "buffering_enabled",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Bypass,
    Input,
    Output,
}

/// Two-stage burst module with overlapping fill and drain.
#[derive(Debug)]
pub struct DoubleBufferingModule {
    name: String,
    input: SlotId,
    output: SlotId,
    control: Option<ControlId>,
    turn_on_level: usize,
    in_buffer: DrawBuffer<Item>,
    out_buffer: DrawBuffer<Item>,
    bypass: PassThrough,
    start: SimTime,
    phase: Phase,
    oven_requested: bool,
    swaps: u64,
    tracker: StateTracker<DoubleBufferState>,
}

impl DoubleBufferingModule {
    /// Creates a module; `params.capacity` is the capacity of each stage.
    pub fn new(
        name: impl Into<String>,
        params: &BufferingParams,
        input: SlotId,
        output: SlotId,
        control: Option<ControlId>,
    ) -> Self {
        let name = name.into();
        let initial = if params.enabled {
            DoubleBufferState::BufferingEnabled
        } else {
            DoubleBufferState::Bypass
        };
        Self {
            tracker: StateTracker::new(name.clone(), initial).with_power(&params.power_w),
            name,
            input,
            output,
            control,
            turn_on_level: params.turn_on_level(),
            in_buffer: DrawBuffer::new(params.capacity, params.draw_order),
            out_buffer: DrawBuffer::new(params.capacity, params.draw_order),
            bypass: PassThrough::default(),
            start: start_offset(params.start_time),
            phase: Phase::Start,
            oven_requested: false,
            swaps: 0,
        }
    }

    pub fn state(&self) -> DoubleBufferState {
        self.tracker.state()
    }

    /// Sizes of the input and output buffers.
    pub fn buffered(&self) -> (usize, usize) {
        (self.in_buffer.len(), self.out_buffer.len())
    }

    /// Number of input-to-output transfers.
    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    fn accept(&mut self, ctx: &mut Context<'_>) -> SimResult<()> {
        if self.in_buffer.is_full() {
            return Ok(());
        }
        let Some(item) = ctx.take(&self.name, self.input) else {
            return Ok(());
        };
        if let Err(item) = self.in_buffer.push(item) {
            // hand the board back to the slot it was just taken from
            return place_checked(ctx, &self.name, self.input, item);
        }
        if self.in_buffer.is_full() {
            tracing::trace!(module = %self.name, "input buffer is full");
        }
        if !self.oven_requested && self.in_buffer.len() >= self.turn_on_level {
            self.oven_requested = true;
            send_oven_command(ctx, &self.name, self.control, OvenCommand::TurnOn);
        }
        Ok(())
    }

    fn release(&mut self, ctx: &mut Context<'_>) -> SimResult<()> {
        if self.in_buffer.is_full() && self.out_buffer.is_empty() {
            let moved = self.out_buffer.take_all_from(&mut self.in_buffer);
            self.swaps += 1;
            self.oven_requested = false;
            tracing::trace!(module = %self.name, moved, "transferred input buffer to output buffer");
        }
        if self.out_buffer.is_empty() || !ctx.world().slot(self.output).can_put() {
            return Ok(());
        }
        if let Some(item) = self.out_buffer.pop() {
            place_checked(ctx, &self.name, self.output, item)?;
        }
        if self.out_buffer.is_empty() {
            send_oven_command(ctx, &self.name, self.control, OvenCommand::TurnOff);
        }
        Ok(())
    }
}

impl Process for DoubleBufferingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        match self.phase {
            Phase::Start => {
                if self.tracker.state() == DoubleBufferState::Bypass {
                    self.phase = Phase::Bypass;
                } else {
                    send_oven_command(ctx, &self.name, self.control, OvenCommand::TurnOff);
                    self.phase = Phase::Input;
                }
                match wait_for_start(self.start) {
                    Some(wait) => Ok(wait),
                    None => self.resume(ctx, Wake::Timeout),
                }
            }
            Phase::Bypass => self.bypass.step(ctx, &self.name, self.input, self.output),
            Phase::Input => {
                self.accept(ctx)?;
                self.phase = Phase::Output;
                Ok(Suspend::For(HALF_TICK))
            }
            Phase::Output => {
                self.release(ctx)?;
                self.phase = Phase::Input;
                Ok(Suspend::For(HALF_TICK))
            }
        }
    }

    fn held_items(&self) -> usize {
        self.in_buffer.pcb_count() + self.out_buffer.pcb_count() + self.bypass.held_items()
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("double_buffering_module", now)
                .with_counter("swaps", self.swaps)
                .with_counter("bypassed", self.bypass.passed()),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
