//! Boundary consumer and cycle-time statistics.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::clock::{secs, to_secs, TICK};
use crate::error::SimResult;
use crate::kernel::{Condition, Context, Process, Suspend, Wake};
use crate::trace::TraceEvent;
use crate::types::{SimTime, SlotId};

use super::{start_offset, wait_for_start};

/// Sink parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkParams {
    /// Seconds spent per consumed item
    pub delay: u64,
    pub start_time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Start,
    Consume,
    AfterDelay,
}

/// Consumes finished boards and stops the run once the batch is complete.
#[derive(Debug)]
pub struct Sink {
    name: String,
    input: SlotId,
    delay: SimTime,
    start: SimTime,
    batch_size: u64,
    phase: Phase,
    finished: u64,
    avg_cycle_time: f64,
    max_cycle_time: SimTime,
    stopped: bool,
}

impl Sink {
    /// Creates a sink that stops the run after `batch_size` boards.
    pub fn new(name: impl Into<String>, params: &SinkParams, input: SlotId, batch_size: u64) -> Self {
        Self {
            name: name.into(),
            input,
            delay: secs(params.delay),
            start: start_offset(params.start_time),
            batch_size,
            phase: Phase::Start,
            finished: 0,
            avg_cycle_time: 0.0,
            max_cycle_time: 0,
            stopped: false,
        }
    }

    /// Boards consumed so far.
    pub fn finished(&self) -> u64 {
        self.finished
    }

    /// Mean time from creation to consumption, in seconds.
    pub fn avg_cycle_time_secs(&self) -> f64 {
        self.avg_cycle_time / TICK as f64
    }

    /// Longest time from creation to consumption, in seconds.
    pub fn max_cycle_time_secs(&self) -> f64 {
        to_secs(self.max_cycle_time)
    }

    /// Returns true once the batch has been completed.
    pub fn is_done(&self) -> bool {
        self.stopped
    }

    fn record(&mut self, now: SimTime, created_at: SimTime) {
        let cycle = now.saturating_sub(created_at);
        self.max_cycle_time = self.max_cycle_time.max(cycle);
        let n = self.finished as f64;
        self.avg_cycle_time = (self.avg_cycle_time * n + cycle as f64) / (n + 1.0);
        self.finished += 1;
    }
}

impl Process for Sink {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
        loop {
            match self.phase {
                Phase::Start => {
                    self.phase = Phase::Consume;
                    if let Some(wait) = wait_for_start(self.start) {
                        return Ok(wait);
                    }
                }
                Phase::Consume => {
                    let Some(item) = ctx.take(&self.name, self.input) else {
                        return Ok(Suspend::Until(Condition::CanGet(self.input)));
                    };
                    let now = ctx.now();
                    for pcb in item.into_pcbs() {
                        self.record(now, pcb.created_at);
                    }
                    tracing::trace!(
                        sink = %self.name,
                        finished = self.finished,
                        max_cycle_s = to_secs(self.max_cycle_time),
                        "consumed"
                    );
                    self.phase = Phase::AfterDelay;
                    return Ok(Suspend::For(self.delay));
                }
                Phase::AfterDelay => {
                    self.phase = Phase::Consume;
                    if !self.stopped && self.finished >= self.batch_size {
                        self.stopped = true;
                        tracing::info!(sink = %self.name, finished = self.finished, "batch finished, stopping");
                        let event = TraceEvent::Stopped {
                            time: ctx.now(),
                            by: self.name.clone(),
                        };
                        ctx.record(event);
                        ctx.stop();
                    }
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, RunOutcome, World};
    use crate::machines::mock::Feeder;

    #[test]
    fn test_cycle_time_and_stop() {
        let mut world = World::new();
        let input = world.add_slot("done");
        let mut kernel = Kernel::new(world);
        let sink = kernel.spawn(Box::new(Sink::new("sink", &SinkParams::default(), input, 3)));
        // created at the instant they are fed, so the sink sees zero-age boards
        kernel.spawn(Box::new(Feeder::new("feeder", input, [0, secs(2), secs(4), secs(6)])));

        let outcome = kernel.run().unwrap();
        assert_eq!(outcome, RunOutcome::Stopped { at: secs(4) });

        let sink = kernel.process::<Sink>(sink).unwrap();
        assert_eq!(sink.finished(), 3);
        assert!(sink.is_done());
        assert_eq!(sink.max_cycle_time_secs(), 0.0);
    }

    #[test]
    fn test_stacks_count_every_board() {
        let mut world = World::new();
        let input = world.add_slot("done");
        let mut kernel = Kernel::new(world);
        let sink = kernel.spawn(Box::new(Sink::new(
            "sink",
            &SinkParams {
                delay: 1,
                ..SinkParams::default()
            },
            input,
            8,
        )));
        kernel.spawn(Box::new(Feeder::new("feeder", input, [0, secs(1)]).with_stacks(4)));

        let outcome = kernel.run().unwrap();
        assert_eq!(outcome, RunOutcome::Stopped { at: secs(2) });
        assert_eq!(kernel.process::<Sink>(sink).unwrap().finished(), 8);
    }

    #[test]
    fn test_average_cycle_time() {
        let mut sink = Sink::new("sink", &SinkParams::default(), crate::types::SlotId(0), 10);
        sink.record(secs(10), 0);
        sink.record(secs(30), secs(10));
        assert_eq!(sink.avg_cycle_time_secs(), 15.0);
        assert_eq!(sink.max_cycle_time_secs(), 20.0);
    }
}
