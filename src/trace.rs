//! Activity trace of a simulation run.
//!
//! Components never print. They hand [`TraceEvent`]s to the kernel, which
//! forwards them to the [`TraceSink`] injected at construction. The trace is a
//! pure function of the configuration, so two runs of the same line produce
//! identical traces.
//!
//! Available sinks:
//! - [`NullTrace`] - discards everything (default)
//! - [`LogTrace`] - forwards each event to `tracing` at debug level
//! - [`MemoryTrace`] - keeps events in a shared vector, for tests and tooling
//! - [`TextTrace`] - writes one `T=<secs> ...` line per event (activity log)

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::clock::format_secs;
use crate::kernel::OvenCommand;
use crate::types::{SimTime, TaskKind};

/// Direction of a hand-off relative to the acting entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Handoff {
    /// The entity took the item from the slot
    Took,
    /// The entity placed the item into the slot
    Placed,
}

/// One record of the activity trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// An entity entered a different state
    StateChanged {
        time: SimTime,
        entity: String,
        from: &'static str,
        to: &'static str,
    },
    /// An item moved between an entity and a slot
    Handoff {
        time: SimTime,
        entity: String,
        slot: String,
        direction: Handoff,
        item: String,
    },
    /// A machine asked an operator for a task
    InterruptRaised {
        time: SimTime,
        source: String,
        operator: String,
        task: TaskKind,
    },
    /// An operator started a task from scratch
    TaskStarted {
        time: SimTime,
        operator: String,
        machine: String,
        task: TaskKind,
        delay: SimTime,
    },
    /// An operator continued a previously interrupted task
    TaskResumed {
        time: SimTime,
        operator: String,
        machine: String,
        task: TaskKind,
        remaining: SimTime,
    },
    /// An operator completed a task and applied its effect
    TaskFinished {
        time: SimTime,
        operator: String,
        machine: String,
        task: TaskKind,
    },
    /// A buffering module changed its oven's control command
    OvenControl {
        time: SimTime,
        controller: String,
        command: OvenCommand,
    },
    /// An oven started heating up
    OvenSetup {
        time: SimTime,
        oven: String,
        temp_c: f64,
        setup_time: SimTime,
    },
    /// The run was stopped by an entity
    Stopped { time: SimTime, by: String },
}

impl TraceEvent {
    /// Virtual time of the event.
    pub fn time(&self) -> SimTime {
        match self {
            TraceEvent::StateChanged { time, .. }
            | TraceEvent::Handoff { time, .. }
            | TraceEvent::InterruptRaised { time, .. }
            | TraceEvent::TaskStarted { time, .. }
            | TraceEvent::TaskResumed { time, .. }
            | TraceEvent::TaskFinished { time, .. }
            | TraceEvent::OvenControl { time, .. }
            | TraceEvent::OvenSetup { time, .. }
            | TraceEvent::Stopped { time, .. } => *time,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T= {} ", format_secs(self.time()))?;
        match self {
            TraceEvent::StateChanged { entity, to, .. } => {
                write!(f, "{} changed state to {}", entity, to)
            }
            TraceEvent::Handoff {
                entity,
                slot,
                direction,
                item,
                ..
            } => match direction {
                Handoff::Took => write!(f, "{} took {} from {}", entity, item, slot),
                Handoff::Placed => write!(f, "{} placed {} on {}", entity, item, slot),
            },
            TraceEvent::InterruptRaised {
                source,
                operator,
                task,
                ..
            } => write!(f, "{} interrupted {} for {}", source, operator, task),
            TraceEvent::TaskStarted {
                operator,
                machine,
                task,
                delay,
                ..
            } => write!(
                f,
                "{} starting task {} on {} ({} s)",
                operator,
                task,
                machine,
                format_secs(*delay)
            ),
            TraceEvent::TaskResumed {
                operator,
                machine,
                task,
                remaining,
                ..
            } => write!(
                f,
                "{} resuming task {} on {} ({} s left)",
                operator,
                task,
                machine,
                format_secs(*remaining)
            ),
            TraceEvent::TaskFinished {
                operator,
                machine,
                task,
                ..
            } => write!(f, "{} finished task {} on {}", operator, task, machine),
            TraceEvent::OvenControl {
                controller,
                command,
                ..
            } => write!(f, "{} requested {}", controller, command),
            TraceEvent::OvenSetup {
                oven,
                temp_c,
                setup_time,
                ..
            } => write!(
                f,
                "{} starting setup at {:.2} C, expected {:.2} hours",
                oven,
                temp_c,
                crate::clock::to_hours(*setup_time)
            ),
            TraceEvent::Stopped { by, .. } => write!(f, "{} stopped the run", by),
        }
    }
}

/// Destination of trace events.
pub trait TraceSink: Send {
    /// Records one event.
    fn record(&mut self, event: TraceEvent);

    /// Returns false if events are discarded, letting callers skip formatting.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards all events.
#[derive(Debug, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn record(&mut self, _event: TraceEvent) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Forwards events to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn record(&mut self, event: TraceEvent) {
        tracing::debug!(target: "smtline::trace", "{}", event);
    }
}

/// Keeps events in memory behind a shared handle.
///
/// Clone the sink before handing it to the kernel and read the events back
/// through the clone after the run.
#[derive(Clone, Debug, Default)]
pub struct MemoryTrace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Returns the events matching a predicate.
    pub fn filter<F>(&self, predicate: F) -> Vec<TraceEvent>
    where
        F: Fn(&TraceEvent) -> bool,
    {
        self.events
            .lock()
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl TraceSink for MemoryTrace {
    fn record(&mut self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

/// Writes the activity log as plain text, one line per event.
///
/// Every event is one `write` call on the writer, so pass a buffered writer
/// (e.g. `BufWriter<File>`) for file output. A buffered writer is flushed
/// when the trace is dropped with its line.
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufWriter;
/// use smtline::{AssemblyLine, LineConfig, TextTrace};
///
/// let log = BufWriter::new(File::create("activity_log.txt")?);
/// let line = AssemblyLine::with_trace(LineConfig::reference(), Box::new(TextTrace::new(log)))?;
/// line.run()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct TextTrace<W: Write + Send> {
    writer: W,
    failed: bool,
}

impl<W: Write + Send> TextTrace<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            failed: false,
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TraceSink for TextTrace<W> {
    fn record(&mut self, event: TraceEvent) {
        if self.failed {
            return;
        }
        if let Err(e) = writeln!(self.writer, "{}", event) {
            tracing::warn!("activity log write failed, disabling it: {}", e);
            self.failed = true;
        }
    }
}
