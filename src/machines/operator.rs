//! Human operator servicing machine requests.
//!
//! An operator holds a static table of tasks it may be asked for and a FIFO of
//! pending requests. Machines request a task by interrupting the operator. An
//! interrupt arriving while a task is running preempts it: the elapsed part is
//! subtracted from the task's remaining time, and the operator resumes the
//! preempted task before starting anything new.

use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;

use crate::error::{SimError, SimResult};
use crate::kernel::{Context, Interrupt, Process, Suspend, Wake};
use crate::stats::{EntityReport, StateSet, StateTracker};
use crate::trace::TraceEvent;
use crate::types::{ReserveId, SignalId, SimTime, TaskKind};

/// Effect applied when a task completes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum TaskAction {
    /// Fill a reserve back to capacity
    Refill(ReserveId),
    /// Raise a completion signal the machine is waiting on
    Notify(SignalId),
}

/// One entry of an operator's capability table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssignedTask {
    /// Machine allowed to request the task
    pub machine: String,
    pub task: TaskKind,
    /// Time the task takes
    pub delay: SimTime,
    pub action: TaskAction,
}

/// Operator states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorState {
    Idle,
    Busy,
}

impl StateSet for OperatorState {
    const ALL: &'static [Self] = &[OperatorState::Idle, OperatorState::Busy];

    fn name(self) -> &'static str {
        match self {
            OperatorState::Idle => "idle",
            OperatorState::Busy => "busy",
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct CurrentTask {
    /// Index into the task table
    index: usize,
    remaining: SimTime,
    started: SimTime,
}

/// A preemptible executor of refill and replacement tasks.
#[derive(Debug)]
pub struct HumanOperator {
    name: String,
    tasks: Vec<AssignedTask>,
    pending: VecDeque<usize>,
    current: Option<CurrentTask>,
    completed: u64,
    preemptions: u64,
    tracker: StateTracker<OperatorState>,
}

impl HumanOperator {
    pub fn new(name: impl Into<String>, power_w: &[f64]) -> Self {
        let name = name.into();
        Self {
            tracker: StateTracker::new(name.clone(), OperatorState::Idle).with_power(power_w),
            name,
            tasks: Vec::new(),
            pending: VecDeque::new(),
            current: None,
            completed: 0,
            preemptions: 0,
        }
    }

    /// Adds a task to the capability table.
    pub fn assign(&mut self, task: AssignedTask) {
        self.tasks.push(task);
    }

    /// Builder form of [`assign`](Self::assign).
    pub fn with_task(mut self, task: AssignedTask) -> Self {
        self.assign(task);
        self
    }

    pub fn tasks(&self) -> &[AssignedTask] {
        &self.tasks
    }

    pub fn state(&self) -> OperatorState {
        self.tracker.state()
    }

    /// Remaining time of the running or preempted task, if any.
    pub fn current_remaining(&self) -> Option<SimTime> {
        self.current.map(|c| c.remaining)
    }

    /// Number of requests queued behind the current task.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of tasks finished so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Time spent busy up to `now`.
    pub fn busy_time(&self, now: SimTime) -> SimTime {
        self.tracker.time_in(OperatorState::Busy, now)
    }

    fn lookup(&self, interrupt: &Interrupt) -> SimResult<usize> {
        let mut matches = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.machine == interrupt.source && t.task == interrupt.task)
            .map(|(i, _)| i);
        let first = matches.next();
        let extra = matches.count();
        match (first, extra) {
            (Some(index), 0) => Ok(index),
            (None, _) => Err(SimError::UnassignedTask {
                operator: self.name.clone(),
                machine: interrupt.source.clone(),
                task: interrupt.task,
            }),
            (Some(_), extra) => Err(SimError::AmbiguousTask {
                operator: self.name.clone(),
                machine: interrupt.source.clone(),
                task: interrupt.task,
                count: extra + 1,
            }),
        }
    }

    fn on_interrupt(&mut self, ctx: &mut Context<'_>, interrupt: Interrupt) -> SimResult<()> {
        let index = self.lookup(&interrupt)?;
        tracing::debug!(
            operator = %self.name,
            machine = %interrupt.source,
            task = %interrupt.task,
            "interrupted"
        );
        self.pending.push_back(index);
        if let Some(current) = self.current.as_mut() {
            let elapsed = ctx.now().saturating_sub(current.started);
            current.remaining = current.remaining.saturating_sub(elapsed);
            current.started = ctx.now();
            self.preemptions += 1;
        }
        Ok(())
    }

    fn finish_current(&mut self, ctx: &mut Context<'_>) {
        let Some(current) = self.current.take() else {
            return;
        };
        let task = &self.tasks[current.index];
        match task.action {
            TaskAction::Refill(reserve) => {
                ctx.world_mut().reserve_mut(reserve).refill();
            }
            TaskAction::Notify(signal) => ctx.world_mut().signal_mut(signal).notify(),
        }
        self.completed += 1;
        let event = TraceEvent::TaskFinished {
            time: ctx.now(),
            operator: self.name.clone(),
            machine: task.machine.clone(),
            task: task.task,
        };
        ctx.record(event);
        self.tracker.enter(ctx, OperatorState::Idle);
    }

    fn dispatch(&mut self, ctx: &mut Context<'_>) -> Suspend {
        let now = ctx.now();
        if let Some(current) = self.current.as_mut() {
            current.started = now;
            let remaining = current.remaining;
            let task = &self.tasks[current.index];
            let event = TraceEvent::TaskResumed {
                time: now,
                operator: self.name.clone(),
                machine: task.machine.clone(),
                task: task.task,
                remaining,
            };
            ctx.record(event);
            self.tracker.enter(ctx, OperatorState::Busy);
            return Suspend::For(remaining);
        }
        if let Some(index) = self.pending.pop_front() {
            let task = &self.tasks[index];
            self.current = Some(CurrentTask {
                index,
                remaining: task.delay,
                started: now,
            });
            let event = TraceEvent::TaskStarted {
                time: now,
                operator: self.name.clone(),
                machine: task.machine.clone(),
                task: task.task,
                delay: task.delay,
            };
            let delay = task.delay;
            ctx.record(event);
            self.tracker.enter(ctx, OperatorState::Busy);
            return Suspend::For(delay);
        }
        self.tracker.enter(ctx, OperatorState::Idle);
        Suspend::Passivate
    }
}

impl Process for HumanOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, ctx: &mut Context<'_>, wake: Wake) -> SimResult<Suspend> {
        match wake {
            Wake::Interrupted(interrupt) => self.on_interrupt(ctx, interrupt)?,
            Wake::Timeout => self.finish_current(ctx),
            Wake::Start | Wake::Ready => {}
        }
        Ok(self.dispatch(ctx))
    }

    fn report(&self, now: SimTime) -> Option<EntityReport> {
        Some(
            self.tracker
                .report("human_operator", now)
                .with_counter("tasks_completed", self.completed)
                .with_counter("preemptions", self.preemptions),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
