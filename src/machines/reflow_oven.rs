//! Reflow oven: a belt with a thermal state machine on top.
//!
//! While maintaining temperature the oven moves boards exactly like a
//! conveyor belt, except that it can never stall: a full output slot is an
//! operating fault that is logged and retried every second. Heating up takes
//! a time that depends on how far the oven has cooled since it was last
//! turned off.
//!
//! # Control modes
//!
//! - **Autonomous**: the oven sets up at start and then maintains forever.
//! - **External**: a buffering module drives the oven through a
//!   [`ControlLine`](crate::kernel::ControlLine). The oven starts off, sets up
//!   on `TurnOn`, and honours `TurnOff` only once its interior is empty.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::clock::{secs, to_hours, HALF_TICK, TICK};
use crate::error::SimResult;
use crate::kernel::{Context, OvenCommand, Process, Suspend, Wake};
use crate::pcb::Item;
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::trace::TraceEvent;
use crate::types::{ControlId, SimTime, SlotId};

use super::conveyor::ShiftRegister;
use super::{start_offset, wait_for_start};

/// Time to heat from `temp_c` to `temp_max_c` at `heating_rate` degrees per
/// hour, rounded to a whole second.
///
/// Formula: `round((temp_max - temp) / heating_rate × 3600)`
pub fn setup_time(temp_max_c: f64, temp_c: f64, heating_rate: f64) -> SimTime {
    let seconds = (temp_max_c - temp_c).max(0.0) / heating_rate * 3600.0;
    secs(seconds.round() as u64)
}

/// Oven temperature after cooling for `hours` with the oven off.
///
/// Formula: `room + (temp - room) × e^(-cooling_rate × hours)`
pub fn cooled_temperature(temp_c: f64, room_c: f64, cooling_rate: f64, hours: f64) -> f64 {
    room_c + (temp_c - room_c) * (-cooling_rate * hours).exp()
}

/// Oven parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvenParams {
    /// Boards that fit end to end, the exit stage included (at least 2)
    pub num_stages: usize,
    /// Seconds per one-position shift
    pub delay_per_stage: u64,
    /// Maintain temperature in °C
    pub temp_max_c: f64,
    /// Ambient temperature in °C
    pub temp_room_c: f64,
    /// Exponential cooling constant, per hour
    pub cooling_rate: f64,
    /// Heating rate in °C per hour
    pub heating_rate: f64,
    pub start_time: f64,
    /// Power per state: off, setup, maintain_unoccupied, maintain_occupied
    pub power_w: Vec<f64>,
}

impl Default for OvenParams {
    fn default() -> Self {
        Self {
            num_stages: 10,
            delay_per_stage: 5,
            temp_max_c: 200.0,
            temp_room_c: 30.0,
            cooling_rate: 0.5,
            heating_rate: 170.0,
            start_time: 0.0,
            power_w: Vec::new(),
        }
    }
}

/// Oven states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OvenState {
    Off,
    Setup,
    MaintainUnoccupied,
    MaintainOccupied,
}

impl StateSet for OvenState {
    const ALL: &'static [Self] = &[
        OvenState::Off,
        OvenState::Setup,
        OvenState::MaintainUnoccupied,
        OvenState::MaintainOccupied,
    ];

    fn name(self) -> &'static str {
        match self {
            OvenState::Off => "off",
            OvenState::Setup => "setup",
            OvenState::MaintainUnoccupied => "temperature_maintain_unoccupied",
            OvenState::MaintainOccupied => "temperature_maintain_occupied",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    BeginSetup,
    SetupDone,
    Off,
    Maintain,
    Deliver,
}

/// A reflow oven between two slots.
#[derive(Debug)]
pub struct ReflowOven {
    name: String,
    input: SlotId,
    output: SlotId,
    control: Option<ControlId>,
    params: OvenParams,
    register: ShiftRegister<Item>,
    delay_per_stage: SimTime,
    start: SimTime,
    phase: Phase,
    outgoing: Option<Item>,
    temp_c: f64,
    turned_off_at: SimTime,
    setups: u64,
    blocked_outputs: u64,
    tracker: StateTracker<OvenState>,
}

impl ReflowOven {
    /// Creates an oven. With `control` set the oven is externally controlled,
    /// otherwise autonomous.
    pub fn new(
        name: impl Into<String>,
        params: &OvenParams,
        input: SlotId,
        output: SlotId,
        control: Option<ControlId>,
    ) -> Self {
        let name = name.into();
        let initial = if control.is_some() {
            OvenState::Off
        } else {
            OvenState::Setup
        };
        Self {
            tracker: StateTracker::new(name.clone(), initial).with_power(&params.power_w),
            name,
            input,
            output,
            control,
            // the last stage is the exit itself
            register: ShiftRegister::new(params.num_stages.saturating_sub(1)),
            delay_per_stage: secs(params.delay_per_stage),
            start: start_offset(params.start_time),
            phase: Phase::Start,
            outgoing: None,
            temp_c: params.temp_room_c,
            turned_off_at: 0,
            setups: 0,
            blocked_outputs: 0,
            params: params.clone(),
        }
    }

    pub fn state(&self) -> OvenState {
        self.tracker.state()
    }

    /// Current temperature in °C. Cooling is only applied when the oven turns on.
    pub fn temperature(&self) -> f64 {
        self.temp_c
    }

    pub fn is_externally_controlled(&self) -> bool {
        self.control.is_some()
    }

    /// Number of setups started.
    pub fn setups(&self) -> u64 {
        self.setups
    }

    /// Number of delivery attempts that found the output slot occupied.
    pub fn blocked_outputs(&self) -> u64 {
        self.blocked_outputs
    }

    fn command(&self, ctx: &Context<'_>) -> Option<OvenCommand> {
        self.control.map(|c| ctx.world().control(c).command())
    }

    fn turn_off(&mut self, ctx: &mut Context<'_>) {
        self.turned_off_at = ctx.now();
        self.tracker.enter(ctx, OvenState::Off);
        self.phase = Phase::Off;
    }

    fn begin_setup(&mut self, ctx: &mut Context<'_>) -> Suspend {
        let duration = setup_time(self.params.temp_max_c, self.temp_c, self.params.heating_rate);
        self.setups += 1;
        tracing::info!(
            oven = %self.name,
            temp_c = self.temp_c,
            setup_hours = to_hours(duration),
            "starting setup"
        );
        let event = TraceEvent::OvenSetup {
            time: ctx.now(),
            oven: self.name.clone(),
            temp_c: self.temp_c,
            setup_time: duration,
        };
        ctx.record(event);
        self.tracker.enter(ctx, OvenState::Setup);
        self.phase = Phase::SetupDone;
        Suspend::For(duration)
    }

    /// One maintain cycle up to the shift. Returns `None` if the oven turned off.
    fn maintain(&mut self, ctx: &mut Context<'_>) -> Option<Suspend> {
        let incoming = ctx.take(&self.name, self.input);
        if incoming.is_none() && self.register.is_empty() {
            if self.command(ctx) == Some(OvenCommand::TurnOff) {
                self.turn_off(ctx);
                return None;
            }
            self.tracker.enter(ctx, OvenState::MaintainUnoccupied);
        } else {
            self.tracker.enter(ctx, OvenState::MaintainOccupied);
        }
        self.outgoing = self.register.shift(incoming);
        self.phase = Phase::Deliver;
        Some(Suspend::For(self.delay_per_stage - HALF_TICK))
    }

    fn deliver(&mut self, ctx: &mut Context<'_>) -> Suspend {
        if let Some(item) = self.outgoing.take() {
            if let Err(item) = ctx.place(&self.name, self.output, item) {
                self.outgoing = Some(item);
                self.blocked_outputs += 1;
                tracing::warn!(
                    oven = %self.name,
                    time_s = crate::clock::to_secs(ctx.now()),
                    "output blocked, line is under-dimensioned"
                );
                return Suspend::For(TICK);
            }
        }
        self.phase = Phase::Maintain;
        Suspend::For(HALF_TICK)
    }
}

impl Process for ReflowOven {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        loop {
            match self.phase {
                Phase::Start => {
                    self.phase = if self.control.is_some() {
                        Phase::Off
                    } else {
                        Phase::BeginSetup
                    };
                    if let Some(wait) = wait_for_start(self.start) {
                        return Ok(wait);
                    }
                }
                Phase::BeginSetup => return Ok(self.begin_setup(ctx)),
                Phase::SetupDone => {
                    self.temp_c = self.params.temp_max_c;
                    if self.command(ctx) == Some(OvenCommand::TurnOff) {
                        self.turn_off(ctx);
                    } else {
                        self.tracker.enter(ctx, OvenState::MaintainUnoccupied);
                        self.phase = Phase::Maintain;
                    }
                }
                Phase::Off => {
                    if self.command(ctx) != Some(OvenCommand::TurnOn) {
                        return Ok(Suspend::For(TICK));
                    }
                    let hours = to_hours(ctx.now() - self.turned_off_at);
                    self.temp_c = cooled_temperature(
                        self.temp_c,
                        self.params.temp_room_c,
                        self.params.cooling_rate,
                        hours,
                    );
                    tracing::debug!(oven = %self.name, hours_off = hours, temp_c = self.temp_c, "turning on");
                    self.phase = Phase::BeginSetup;
                }
                Phase::Maintain => {
                    if let Some(suspend) = self.maintain(ctx) {
                        return Ok(suspend);
                    }
                }
                Phase::Deliver => return Ok(self.deliver(ctx)),
            }
        }
    }

    fn held_items(&self) -> usize {
        self.register.pcb_count() + self.outgoing.as_ref().map_or(0, Item::pcb_count)
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("reflow_oven", now)
                .with_counter("setups", self.setups)
                .with_counter("blocked_outputs", self.blocked_outputs),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
