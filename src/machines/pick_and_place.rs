//! Pick-and-place machine.
//!
//! Places components on each board. After `reel_replacement_interval` boards
//! the component reel is empty: the machine asks its operator for a
//! replacement and waits for the operator's completion signal before it
//! starts on the next board.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::clock::{secs, until_next_tick, HALF_TICK, TICK};
use crate::error::SimResult;
use crate::kernel::{Condition, Context, Interrupt, Process, Suspend, Wake};
use crate::pcb::Item;
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::types::{ProcessId, SignalId, SimTime, SlotId, TaskKind};

use super::{place_checked, start_offset, wait_for_start};

/// Pick-and-place parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickAndPlaceParams {
    /// Seconds per board
    pub processing_delay: u64,
    /// Boards per reel
    pub reel_replacement_interval: u32,
    pub start_time: f64,
    /// Power per state: idle, waiting_for_reel_replacement, processing, waiting_to_output
    pub power_w: Vec<f64>,
}

impl Default for PickAndPlaceParams {
    fn default() -> Self {
        Self {
            processing_delay: 50,
            reel_replacement_interval: 50,
            start_time: 0.0,
            power_w: Vec::new(),
        }
    }
}

/// Pick-and-place states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickAndPlaceState {
    Idle,
    WaitingForReelReplacement,
    Processing,
    WaitingToOutput,
}

impl StateSet for PickAndPlaceState {
    const ALL: &'static [Self] = &[
        PickAndPlaceState::Idle,
        PickAndPlaceState::WaitingForReelReplacement,
        PickAndPlaceState::Processing,
        PickAndPlaceState::WaitingToOutput,
    ];

    fn name(self) -> &'static str {
        match self {
            PickAndPlaceState::Idle => "idle",
            PickAndPlaceState::WaitingForReelReplacement => "waiting_for_reel_replacement",
            PickAndPlaceState::Processing => "processing",
            PickAndPlaceState::WaitingToOutput => "waiting_to_output",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Idle,
    WaitReel,
    BeginProcess,
    Output,
    OutputRetry,
    Place,
    AfterPlace,
}

/// A pick-and-place machine between two slots.
#[derive(Debug)]
pub struct PickAndPlace {
    name: String,
    input: SlotId,
    output: SlotId,
    operator: ProcessId,
    reel_done: SignalId,
    processing_delay: SimTime,
    interval: u32,
    start: SimTime,
    phase: Phase,
    held: Option<Item>,
    since_replacement: u32,
    processed: u64,
    replacements: u64,
    tracker: StateTracker<PickAndPlaceState>,
}

impl PickAndPlace {
    /// Creates a machine whose reel replacements are done by `operator`,
    /// which raises `reel_done` when finished.
    pub fn new(
        name: impl Into<String>,
        params: &PickAndPlaceParams,
        input: SlotId,
        output: SlotId,
        operator: ProcessId,
        reel_done: SignalId,
    ) -> Self {
        let name = name.into();
        Self {
            tracker: StateTracker::new(name.clone(), PickAndPlaceState::Idle)
                .with_power(&params.power_w),
            name,
            input,
            output,
            operator,
            reel_done,
            processing_delay: secs(params.processing_delay),
            interval: params.reel_replacement_interval,
            start: start_offset(params.start_time),
            phase: Phase::Start,
            held: None,
            since_replacement: 0,
            processed: 0,
            replacements: 0,
        }
    }

    pub fn state(&self) -> PickAndPlaceState {
        self.tracker.state()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Completed reel replacements.
    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    /// Signal the operator raises when a replacement is done.
    pub fn reel_signal(&self) -> SignalId {
        self.reel_done
    }
}

impl Process for PickAndPlace {
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
                    let Some(item) = ctx.take(&self.name, self.input) else {
                        return Ok(Suspend::For(TICK));
                    };
                    self.held = Some(item);
                    if self.since_replacement >= self.interval {
                        tracing::debug!(machine = %self.name, "reel empty, requesting replacement");
                        ctx.interrupt(
                            self.operator,
                            Interrupt::new(self.name.clone(), TaskKind::ReelReplacement),
                        );
                        self.tracker
                            .enter(ctx, PickAndPlaceState::WaitingForReelReplacement);
                        self.phase = Phase::WaitReel;
                    } else {
                        self.phase = Phase::BeginProcess;
                    }
                }
                Phase::WaitReel => {
                    if !ctx.world_mut().signal_mut(self.reel_done).take() {
                        return Ok(Suspend::Until(Condition::Signaled(self.reel_done)));
                    }
                    self.since_replacement = 0;
                    self.replacements += 1;
                    self.phase = Phase::BeginProcess;
                    let wait = until_next_tick(ctx.now());
                    if wait > 0 {
                        return Ok(Suspend::For(wait));
                    }
                }
                Phase::BeginProcess => {
                    self.tracker.enter(ctx, PickAndPlaceState::Processing);
                    self.phase = Phase::Output;
                    return Ok(Suspend::For(self.processing_delay.saturating_sub(TICK)));
                }
                Phase::Output => {
                    if ctx.world().slot(self.output).can_put() {
                        self.phase = Phase::Place;
                        return Ok(Suspend::For(HALF_TICK));
                    }
                    self.phase = Phase::OutputRetry;
                    return Ok(Suspend::For(TICK));
                }
                Phase::OutputRetry => {
                    self.tracker.enter(ctx, PickAndPlaceState::WaitingToOutput);
                    self.phase = Phase::Output;
                }
                Phase::Place => {
                    if let Some(item) = self.held.take() {
                        place_checked(ctx, &self.name, self.output, item)?;
                        self.since_replacement += 1;
                        self.processed += 1;
                    }
                    self.phase = Phase::AfterPlace;
                    return Ok(Suspend::For(HALF_TICK));
                }
                Phase::AfterPlace => {
                    self.tracker.enter(ctx, PickAndPlaceState::Idle);
                    self.phase = Phase::Idle;
                }
            }
        }
    }

    fn held_items(&self) -> usize {
        self.held.as_ref().map_or(0, Item::pcb_count)
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("pick_and_place", now)
                .with_counter("processed", self.processed)
                .with_counter("reel_replacements", self.replacements),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, World};
    use crate::machines::mock::{Collector, Feeder};
    use crate::machines::{AssignedTask, HumanOperator, TaskAction};

    struct Rig {
        kernel: Kernel,
        pnp: ProcessId,
        collector: ProcessId,
        reel: SignalId,
    }

    fn rig(params: PickAndPlaceParams, feeds: Vec<SimTime>, collector_opens: SimTime) -> Rig {
        let mut world = World::new();
        let input = world.add_slot("pp_in");
        let output = world.add_slot("pp_out");
        let reel = world.add_signal("pnp.reel_done");
        let mut kernel = Kernel::new(world);
        let pnp = kernel.spawn(Box::new(PickAndPlace::new(
            "pnp",
            &params,
            input,
            output,
            ProcessId(1),
            reel,
        )));
        kernel.spawn(Box::new(HumanOperator::new("op", &[]).with_task(AssignedTask {
            machine: "pnp".into(),
            task: TaskKind::ReelReplacement,
            delay: secs(30),
            action: TaskAction::Notify(reel),
        })));
        kernel.spawn(Box::new(Feeder::new("feeder", input, feeds)));
        let collector = kernel.spawn(Box::new(
            Collector::new("collector", output).opening_at(collector_opens),
        ));
        Rig {
            kernel,
            pnp,
            collector,
            reel,
        }
    }

    #[test]
    fn test_reel_replacement_after_interval() {
        let params = PickAndPlaceParams {
            processing_delay: 5,
            reel_replacement_interval: 2,
            ..PickAndPlaceParams::default()
        };
        let mut rig = rig(params, vec![HALF_TICK; 3], 0);
        rig.kernel.run_until(secs(100)).unwrap();

        // the third board waits for the 30 s replacement requested at 11 s
        let collector = rig.kernel.process::<Collector>(rig.collector).unwrap();
        assert_eq!(
            collector.times(),
            vec![secs(6) - HALF_TICK, secs(11) - HALF_TICK, secs(46) - HALF_TICK]
        );
        let pnp = rig.kernel.process::<PickAndPlace>(rig.pnp).unwrap();
        assert_eq!(pnp.replacements(), 1);
        assert_eq!(pnp.processed(), 3);
        assert!(!rig.kernel.world().signal(rig.reel).is_set());

        let report = pnp.report(secs(100)).unwrap();
        let waiting = report.percent("waiting_for_reel_replacement").unwrap();
        assert!((waiting - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_blocked_output_waits() {
        let params = PickAndPlaceParams {
            processing_delay: 5,
            ..PickAndPlaceParams::default()
        };
        let mut rig = rig(params, vec![HALF_TICK, HALF_TICK], secs(20));

        rig.kernel.run_until(secs(15)).unwrap();
        let pnp = rig.kernel.process::<PickAndPlace>(rig.pnp).unwrap();
        assert_eq!(pnp.state(), PickAndPlaceState::WaitingToOutput);
        assert_eq!(rig.kernel.resident_pcbs(), 2);

        rig.kernel.run_until(secs(40)).unwrap();
        let collector = rig.kernel.process::<Collector>(rig.collector).unwrap();
        // the collector frees the slot first at 20 s, the retry at 20 s then succeeds
        assert_eq!(collector.times(), vec![secs(20), secs(20) + HALF_TICK]);
        let pnp = rig.kernel.process::<PickAndPlace>(rig.pnp).unwrap();
        assert_eq!(pnp.state(), PickAndPlaceState::Idle);
        assert!(pnp.report(secs(40)).unwrap().percent("waiting_to_output").unwrap() > 0.0);
    }
}
