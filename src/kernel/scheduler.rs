//! Event queue and run loop.

use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::{SimError, SimResult};
use crate::trace::{NullTrace, TraceEvent, TraceSink};
use crate::types::{ProcessId, SimTime};

use super::{Condition, Context, Interrupt, Process, Suspend, Wake, World};

/// Priority class of a scheduled wakeup. Lower runs first at equal time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    Urgent = 0,
    Normal = 1,
}

/// A pending wakeup.
#[derive(Debug)]
struct Scheduled {
    time: SimTime,
    priority: Priority,
    seq: u64,
    pid: ProcessId,
    /// Generation of the target when this wakeup was issued
    generation: u64,
    wake: Wake,
}

impl Scheduled {
    fn key(&self) -> (SimTime, Priority, u64) {
        (self.time, self.priority, self.seq)
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Bookkeeping for one registered process.
struct ProcessEntry {
    name: String,
    process: Option<Box<dyn Process>>,
    /// Bumped on every suspension and interrupt; stale wakeups carry an old value
    generation: u64,
    waiting: Option<Condition>,
    finished: bool,
}

/// How a call to [`Kernel::run_until`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// A process requested the stop
    Stopped { at: SimTime },
    /// The time limit was reached with work still pending
    LimitReached { at: SimTime },
    /// No process will ever wake up again
    Exhausted { at: SimTime },
}

impl RunOutcome {
    /// Virtual time at which the run ended.
    pub fn at(&self) -> SimTime {
        match *self {
            RunOutcome::Stopped { at }
            | RunOutcome::LimitReached { at }
            | RunOutcome::Exhausted { at } => at,
        }
    }
}

/// Statistics collected by the kernel.
#[derive(Clone, Debug, Default, Serialize)]
pub struct KernelStats {
    /// Number of process resumptions
    pub steps: u64,
    /// Number of interrupts delivered
    pub interrupts: u64,
    /// Number of wakeups discarded because they were superseded
    pub stale_wakeups: u64,
}

/// The discrete-event kernel.
///
/// Owns the [`World`], the registered processes and the wakeup queue.
pub struct Kernel {
    now: SimTime,
    queue: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
    entries: Vec<ProcessEntry>,
    world: World,
    trace: Box<dyn TraceSink>,
    stop_requested: bool,
    stats: KernelStats,
}

impl Kernel {
    /// Creates a kernel around a world, with tracing disabled.
    pub fn new(world: World) -> Self {
        Self {
            now: 0,
            queue: BinaryHeap::new(),
            seq: 0,
            entries: Vec::new(),
            world,
            trace: Box::new(NullTrace),
            stop_requested: false,
            stats: KernelStats::default(),
        }
    }

    /// Replaces the trace sink.
    pub fn with_trace(mut self, trace: Box<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    /// Registers a process and schedules its first activation at the current time.
    pub fn spawn(&mut self, process: Box<dyn Process>) -> ProcessId {
        let pid = ProcessId(self.entries.len());
        self.entries.push(ProcessEntry {
            name: process.name().to_string(),
            process: Some(process),
            generation: 0,
            waiting: None,
            finished: false,
        });
        self.schedule(self.now, Priority::Normal, pid, 0, Wake::Start);
        pid
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn stats(&self) -> &KernelStats {
        &self.stats
    }

    /// Number of registered processes.
    pub fn process_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns a registered process as its concrete type.
    pub fn process<T: Process>(&self, pid: ProcessId) -> Option<&T> {
        self.entries
            .get(pid.0)?
            .process
            .as_ref()?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Iterates over all registered processes in registration order.
    pub fn processes(&self) -> impl Iterator<Item = &dyn Process> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.process.as_deref())
    }

    /// Boards currently in the line: in slots plus held by processes.
    pub fn resident_pcbs(&self) -> usize {
        self.world.pcbs_in_slots() + self.processes().map(|p| p.held_items()).sum::<usize>()
    }

    /// Returns true if the process with this id has finished.
    pub fn is_finished(&self, pid: ProcessId) -> bool {
        self.entries.get(pid.0).map_or(false, |e| e.finished)
    }

    /// Runs until a process stops the run, the queue drains or time passes `limit`.
    ///
    /// Wakeups scheduled exactly at `limit` are still processed. When the limit
    /// is reached the clock is left at `limit`, so a later call continues
    /// seamlessly.
    pub fn run_until(&mut self, limit: SimTime) -> SimResult<RunOutcome> {
        self.stop_requested = false;
        loop {
            let next_time = match self.queue.peek() {
                Some(Reverse(next)) => next.time,
                None => return Ok(RunOutcome::Exhausted { at: self.now }),
            };
            if next_time > limit {
                self.now = limit.max(self.now);
                return Ok(RunOutcome::LimitReached { at: self.now });
            }
            let Some(Reverse(scheduled)) = self.queue.pop() else {
                return Ok(RunOutcome::Exhausted { at: self.now });
            };
            self.now = scheduled.time;
            self.dispatch(scheduled)?;
            if self.stop_requested {
                return Ok(RunOutcome::Stopped { at: self.now });
            }
        }
    }

    /// Runs without a time limit.
    pub fn run(&mut self) -> SimResult<RunOutcome> {
        self.run_until(SimTime::MAX)
    }

    fn schedule(
        &mut self,
        time: SimTime,
        priority: Priority,
        pid: ProcessId,
        generation: u64,
        wake: Wake,
    ) {
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            time,
            priority,
            seq: self.seq,
            pid,
            generation,
            wake,
        }));
    }

    fn dispatch(&mut self, scheduled: Scheduled) -> SimResult<()> {
        let index = scheduled.pid.0;
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(SimError::UnknownProcess(scheduled.pid))?;

        if entry.finished {
            self.stats.stale_wakeups += 1;
            return Ok(());
        }
        match scheduled.wake {
            Wake::Interrupted(_) => {
                entry.generation += 1;
                entry.waiting = None;
                self.stats.interrupts += 1;
            }
            _ if scheduled.generation != entry.generation => {
                self.stats.stale_wakeups += 1;
                return Ok(());
            }
            _ => {}
        }

        let mut process = entry
            .process
            .take()
            .ok_or(SimError::UnknownProcess(scheduled.pid))?;
        let mut interrupts = Vec::new();
        let mut stop = false;
        let result = {
            let mut ctx = Context {
                now: self.now,
                pid: scheduled.pid,
                world: &mut self.world,
                trace: self.trace.as_mut(),
                interrupts: &mut interrupts,
                stop_requested: &mut stop,
            };
            process.resume(&mut ctx, scheduled.wake)
        };
        self.entries[index].process = Some(process);
        self.stats.steps += 1;

        let suspend = result?;
        self.suspend(scheduled.pid, suspend);
        for (target, interrupt) in interrupts {
            self.deliver(scheduled.pid, target, interrupt)?;
        }
        if stop {
            self.stop_requested = true;
        }
        self.wake_waiters();
        Ok(())
    }

    fn suspend(&mut self, pid: ProcessId, suspend: Suspend) {
        let entry = &mut self.entries[pid.0];
        entry.generation += 1;
        let generation = entry.generation;
        match suspend {
            Suspend::For(delay) => {
                let at = self.now.saturating_add(delay);
                self.schedule(at, Priority::Normal, pid, generation, Wake::Timeout);
            }
            Suspend::Until(condition) => {
                if condition.holds(&self.world) {
                    self.schedule(self.now, Priority::Normal, pid, generation, Wake::Ready);
                } else {
                    entry.waiting = Some(condition);
                }
            }
            Suspend::Passivate => {}
            Suspend::Finish => entry.finished = true,
        }
    }

    fn deliver(&mut self, from: ProcessId, target: ProcessId, interrupt: Interrupt) -> SimResult<()> {
        let Some(entry) = self.entries.get(target.0) else {
            return Err(SimError::UnknownProcess(target));
        };
        tracing::trace!(from = %from, to = %target, task = %interrupt.task, "interrupt queued");
        if self.trace.enabled() {
            let event = TraceEvent::InterruptRaised {
                time: self.now,
                source: interrupt.source.clone(),
                operator: entry.name.clone(),
                task: interrupt.task,
            };
            self.trace.record(event);
        }
        self.schedule(self.now, Priority::Urgent, target, 0, Wake::Interrupted(interrupt));
        Ok(())
    }

    fn wake_waiters(&mut self) {
        for index in 0..self.entries.len() {
            let entry = &mut self.entries[index];
            let Some(condition) = entry.waiting else {
                continue;
            };
            if condition.holds(&self.world) {
                entry.waiting = None;
                let generation = entry.generation;
                self.schedule(self.now, Priority::Normal, ProcessId(index), generation, Wake::Ready);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Interrupt;
    use crate::pcb::{Item, Pcb};
    use crate::trace::MemoryTrace;
    use crate::types::{SlotId, TaskKind};
    use std::any::Any;

    /// Puts `count` boards into a slot, one every `period`.
    struct Producer {
        slot: SlotId,
        count: u64,
        period: SimTime,
        made: u64,
    }

    impl Process for Producer {
        fn name(&self) -> &str {
            "producer"
        }

        fn resume(&mut self, ctx: &mut Context<'_>, wake: Wake) -> SimResult<Suspend> {
            if wake == Wake::Ready {
                self.made += 1;
                let pcb = Pcb::new(1, self.made, ctx.now());
                ctx.world_mut()
                    .slot_mut(self.slot)
                    .put(Item::Pcb(pcb))
                    .map_err(|_| SimError::SlotOccupied {
                        entity: "producer".into(),
                        slot: self.slot,
                    })?;
                if self.made == self.count {
                    return Ok(Suspend::Finish);
                }
                return Ok(Suspend::For(self.period));
            }
            Ok(Suspend::Until(Condition::CanPut(self.slot)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Takes boards from a slot and records the times it got them.
    struct Consumer {
        slot: SlotId,
        seen: Vec<SimTime>,
        stop_after: usize,
    }

    impl Process for Consumer {
        fn name(&self) -> &str {
            "consumer"
        }

        fn resume(&mut self, ctx: &mut Context<'_>, wake: Wake) -> SimResult<Suspend> {
            if wake == Wake::Ready && ctx.take("consumer", self.slot).is_some() {
                self.seen.push(ctx.now());
                if self.seen.len() == self.stop_after {
                    ctx.stop();
                }
            }
            Ok(Suspend::Until(Condition::CanGet(self.slot)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Sleeps for a long task and records interrupts.
    struct Sleeper {
        interrupted_at: Vec<SimTime>,
        timeouts: Vec<SimTime>,
    }

    impl Process for Sleeper {
        fn name(&self) -> &str {
            "sleeper"
        }

        fn resume(&mut self, ctx: &mut Context<'_>, wake: Wake) -> SimResult<Suspend> {
            match wake {
                Wake::Interrupted(_) => self.interrupted_at.push(ctx.now()),
                Wake::Timeout => self.timeouts.push(ctx.now()),
                _ => {}
            }
            Ok(Suspend::For(100))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Interrupts a target once after a delay.
    struct Caller {
        target: ProcessId,
        delay: SimTime,
        done: bool,
    }

    impl Process for Caller {
        fn name(&self) -> &str {
            "caller"
        }

        fn resume(&mut self, ctx: &mut Context<'_>, _wake: Wake) -> SimResult<Suspend> {
            if self.done {
                ctx.interrupt(self.target, Interrupt::new("caller", TaskKind::ReelReplacement));
                return Ok(Suspend::Finish);
            }
            self.done = true;
            Ok(Suspend::For(self.delay))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_producer_consumer_handoff() {
        let mut world = World::new();
        let slot = world.add_slot("buff");
        let mut kernel = Kernel::new(world);
        kernel.spawn(Box::new(Producer {
            slot,
            count: 3,
            period: 4,
            made: 0,
        }));
        let consumer = kernel.spawn(Box::new(Consumer {
            slot,
            seen: Vec::new(),
            stop_after: 3,
        }));

        let outcome = kernel.run().unwrap();
        assert_eq!(outcome, RunOutcome::Stopped { at: 8 });
        let consumer = kernel.process::<Consumer>(consumer).unwrap();
        assert_eq!(consumer.seen, vec![0, 4, 8]);
        assert_eq!(kernel.resident_pcbs(), 0);
    }

    #[test]
    fn test_run_until_limit() {
        let mut world = World::new();
        let slot = world.add_slot("buff");
        let mut kernel = Kernel::new(world);
        kernel.spawn(Box::new(Producer {
            slot,
            count: 2,
            period: 4,
            made: 0,
        }));

        let outcome = kernel.run_until(3).unwrap();
        assert_eq!(outcome, RunOutcome::LimitReached { at: 3 });
        assert_eq!(kernel.now(), 3);
        assert_eq!(kernel.resident_pcbs(), 1);

        // nobody drains the slot, so the producer blocks forever
        let outcome = kernel.run().unwrap();
        assert_eq!(outcome, RunOutcome::Exhausted { at: 4 });
    }

    #[test]
    fn test_interrupt_cancels_timeout() {
        let mut kernel = Kernel::new(World::new()).with_trace(Box::new(MemoryTrace::new()));
        let sleeper = kernel.spawn(Box::new(Sleeper {
            interrupted_at: Vec::new(),
            timeouts: Vec::new(),
        }));
        kernel.spawn(Box::new(Caller {
            target: sleeper,
            delay: 30,
            done: false,
        }));

        kernel.run_until(250).unwrap();
        let sleeper = kernel.process::<Sleeper>(sleeper).unwrap();
        assert_eq!(sleeper.interrupted_at, vec![30]);
        // the timeout pending at 100 was cancelled; the next ones are relative to 30
        assert_eq!(sleeper.timeouts, vec![130, 230]);
        assert_eq!(kernel.stats().interrupts, 1);
        assert_eq!(kernel.stats().stale_wakeups, 1);
    }

    #[test]
    fn test_interrupt_trace_names_target() {
        let trace = MemoryTrace::new();
        let mut kernel = Kernel::new(World::new()).with_trace(Box::new(trace.clone()));
        let sleeper = kernel.spawn(Box::new(Sleeper {
            interrupted_at: Vec::new(),
            timeouts: Vec::new(),
        }));
        kernel.spawn(Box::new(Caller {
            target: sleeper,
            delay: 10,
            done: false,
        }));
        kernel.run_until(20).unwrap();

        let raised = trace.filter(|e| matches!(e, TraceEvent::InterruptRaised { .. }));
        assert_eq!(raised.len(), 1);
        assert_eq!(
            raised[0],
            TraceEvent::InterruptRaised {
                time: 10,
                source: "caller".into(),
                operator: "sleeper".into(),
                task: TaskKind::ReelReplacement,
            }
        );
    }

    #[test]
    fn test_unknown_interrupt_target() {
        let mut kernel = Kernel::new(World::new());
        kernel.spawn(Box::new(Caller {
            target: ProcessId(42),
            delay: 1,
            done: false,
        }));
        let err = kernel.run().unwrap_err();
        assert!(matches!(err, SimError::UnknownProcess(ProcessId(42))));
    }
}
