//! Assembly of a runnable line from a [`LineConfig`].
//!
//! Spawn order is belts, then operators, then machines in configuration
//! order. Operators go first so machines can address them by process id.

use std::collections::HashMap;

use crate::clock::{from_hours, secs, to_hours, to_secs};
use crate::config::{ConfigError, LineConfig, MachineConfig};
use crate::error::SimResult;
use crate::kernel::{Kernel, RunOutcome, World};
use crate::machines::{
    AssignedTask, BufferingModule, Consumables, ConveyorBelt, DoubleBufferingModule,
    HumanOperator, LineLoader, PickAndPlace, ReflowOven, ScreenPrinter, Sink, Source,
    TaskAction,
};
use crate::stats::{LineReport, Timer};
use crate::trace::{LogTrace, NullTrace, TraceSink};
use crate::types::{ControlId, ProcessId, SignalId, SimTime, SlotId, TaskKind};

/// Slots a port resolves to: where writers put and where readers take.
#[derive(Clone, Copy, Debug)]
struct Port {
    write: SlotId,
    read: SlotId,
}

fn missing(what: String) -> ConfigError {
    ConfigError::Validation(what)
}

/// World resources created for the line before any process is spawned.
#[derive(Default)]
struct Wiring {
    ports: HashMap<String, Port>,
    consumables: HashMap<String, Consumables>,
    reel_signals: HashMap<String, SignalId>,
    oven_controls: HashMap<String, ControlId>,
}

impl Wiring {
    fn build(config: &LineConfig, world: &mut World) -> Self {
        let mut wiring = Wiring::default();
        for slot in &config.slots {
            let id = world.add_slot(slot.clone());
            wiring.ports.insert(slot.clone(), Port { write: id, read: id });
        }
        for belt in &config.belts {
            let port = Port {
                write: world.add_slot(format!("{}.in", belt.name)),
                read: world.add_slot(format!("{}.out", belt.name)),
            };
            wiring.ports.insert(belt.name.clone(), port);
        }
        for machine in &config.machines {
            match machine {
                MachineConfig::ScreenPrinter { name, params, .. } => {
                    let consumables = Consumables::install(world, name, params);
                    wiring.consumables.insert(name.clone(), consumables);
                }
                MachineConfig::PickAndPlace { name, .. } => {
                    let signal = world.add_signal(format!("{}.reel_done", name));
                    wiring.reel_signals.insert(name.clone(), signal);
                }
                MachineConfig::BufferingModule {
                    oven: Some(oven), ..
                } => {
                    let control = world.add_control(format!("{}.control", oven));
                    wiring.oven_controls.insert(oven.clone(), control);
                }
                _ => {}
            }
        }
        wiring
    }

    fn input(&self, machine: &MachineConfig) -> Result<SlotId, ConfigError> {
        let port = machine.input().unwrap_or_default();
        self.ports
            .get(port)
            .map(|p| p.read)
            .ok_or_else(|| missing(format!("{}: unknown port '{}'", machine.name(), port)))
    }

    fn output(&self, machine: &MachineConfig) -> Result<SlotId, ConfigError> {
        let port = machine.output().unwrap_or_default();
        self.ports
            .get(port)
            .map(|p| p.write)
            .ok_or_else(|| missing(format!("{}: unknown port '{}'", machine.name(), port)))
    }

    /// Effect of a task once the operator finishes it.
    fn action(&self, machine: &str, task: TaskKind) -> Result<TaskAction, ConfigError> {
        let action = match task {
            TaskKind::SolderRefill => {
                self.consumables.get(machine).map(|c| TaskAction::Refill(c.solder))
            }
            TaskKind::AdhesiveRefill => {
                self.consumables.get(machine).map(|c| TaskAction::Refill(c.adhesive))
            }
            TaskKind::ReelReplacement => {
                self.reel_signals.get(machine).copied().map(TaskAction::Notify)
            }
        };
        action.ok_or_else(|| missing(format!("machine '{}' never requests '{}'", machine, task)))
    }
}

/// A wired line ready to run.
///
/// # Example
///
/// ```no_run
/// use smtline::{AssemblyLine, LineConfig};
///
/// let line = AssemblyLine::new(LineConfig::reference())?;
/// let report = line.run()?;
/// println!("{}", report.summary());
/// # Ok::<(), smtline::SimError>(())
/// ```
pub struct AssemblyLine {
    name: String,
    kernel: Kernel,
    source: ProcessId,
    sink: ProcessId,
    limit: SimTime,
}

impl AssemblyLine {
    /// Builds a line, tracing to the log when the configuration asks for it.
    pub fn new(config: LineConfig) -> SimResult<Self> {
        let trace: Box<dyn TraceSink> = if config.simulation.trace {
            Box::new(LogTrace)
        } else {
            Box::new(NullTrace)
        };
        Self::with_trace(config, trace)
    }

    /// Builds a line that records its activity trace into `trace`.
    pub fn with_trace(config: LineConfig, trace: Box<dyn TraceSink>) -> SimResult<Self> {
        config.validate()?;

        let mut world = World::new();
        let wiring = Wiring::build(&config, &mut world);
        let mut kernel = Kernel::new(world).with_trace(trace);

        for belt in &config.belts {
            let port = wiring.ports[&belt.name];
            kernel.spawn(Box::new(ConveyorBelt::new(
                belt.name.clone(),
                &belt.params,
                port.write,
                port.read,
            )));
        }

        let mut operators = HashMap::new();
        for op in &config.operators {
            let mut operator = HumanOperator::new(op.name.clone(), &op.power_w);
            for task in &op.tasks {
                operator.assign(AssignedTask {
                    machine: task.machine.clone(),
                    task: task.task,
                    delay: secs(task.delay),
                    action: wiring.action(&task.machine, task.task)?,
                });
            }
            operators.insert(op.name.as_str(), kernel.spawn(Box::new(operator)));
        }

        let batch_size = config.simulation.batch_size;
        let catalog = config.catalog();
        let mut source = None;
        let mut sink = None;
        for machine in &config.machines {
            let name = machine.name().to_string();
            let operator = || -> Result<ProcessId, ConfigError> {
                let op = machine.operator().unwrap_or_default();
                operators
                    .get(op)
                    .copied()
                    .ok_or_else(|| {
                        missing(format!("{}: unassigned operator '{}'", machine.name(), op))
                    })
            };
            let pid = match machine {
                MachineConfig::Source { params, .. } => {
                    let process = Source::new(
                        name,
                        params,
                        wiring.output(machine)?,
                        batch_size,
                        config.simulation.stack_size,
                    )?;
                    let pid = kernel.spawn(Box::new(process));
                    source = Some(pid);
                    pid
                }
                MachineConfig::LineLoader { params, .. } => kernel.spawn(Box::new(LineLoader::new(
                    name,
                    params,
                    wiring.input(machine)?,
                    wiring.output(machine)?,
                ))),
                MachineConfig::ScreenPrinter { params, .. } => {
                    let consumables = *wiring
                        .consumables
                        .get(&name)
                        .ok_or_else(|| missing(format!("{}: no consumables", name)))?;
                    kernel.spawn(Box::new(ScreenPrinter::new(
                        name,
                        params,
                        catalog.clone(),
                        wiring.input(machine)?,
                        wiring.output(machine)?,
                        operator()?,
                        consumables,
                    )))
                }
                MachineConfig::PickAndPlace { params, .. } => {
                    let reel = *wiring
                        .reel_signals
                        .get(&name)
                        .ok_or_else(|| missing(format!("{}: no reel signal", name)))?;
                    kernel.spawn(Box::new(PickAndPlace::new(
                        name,
                        params,
                        wiring.input(machine)?,
                        wiring.output(machine)?,
                        operator()?,
                        reel,
                    )))
                }
                MachineConfig::BufferingModule {
                    oven, double, params, ..
                } => {
                    let control = oven
                        .as_ref()
                        .and_then(|oven| wiring.oven_controls.get(oven).copied());
                    let (input, output) = (wiring.input(machine)?, wiring.output(machine)?);
                    if *double {
                        kernel.spawn(Box::new(DoubleBufferingModule::new(
                            name, params, input, output, control,
                        )))
                    } else {
                        kernel.spawn(Box::new(BufferingModule::new(
                            name, params, input, output, control,
                        )))
                    }
                }
                MachineConfig::ReflowOven { params, .. } => {
                    let control = wiring.oven_controls.get(&name).copied();
                    kernel.spawn(Box::new(ReflowOven::new(
                        name,
                        params,
                        wiring.input(machine)?,
                        wiring.output(machine)?,
                        control,
                    )))
                }
                MachineConfig::Sink { params, .. } => {
                    let pid = kernel.spawn(Box::new(Sink::new(
                        name,
                        params,
                        wiring.input(machine)?,
                        batch_size,
                    )));
                    sink = Some(pid);
                    pid
                }
            };
            tracing::debug!(machine = machine.name(), %pid, "spawned");
        }

        let (Some(source), Some(sink)) = (source, sink) else {
            return Err(missing("a line needs exactly one source and one sink".into()).into());
        };
        let max_hours = config.simulation.max_hours;
        let limit = from_hours(max_hours)
            .ok_or_else(|| missing(format!("max_hours {} is out of range", max_hours)))?;

        Ok(Self {
            name: config.name,
            kernel,
            source,
            sink,
            limit,
        })
    }

    /// The underlying kernel, for inspecting processes and resources.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Upper bound on virtual run time.
    pub fn limit(&self) -> SimTime {
        self.limit
    }

    /// Boards created by the source so far.
    pub fn pcbs_created(&self) -> u64 {
        self.kernel
            .process::<Source>(self.source)
            .map_or(0, Source::created)
    }

    /// Boards consumed by the sink so far.
    pub fn pcbs_finished(&self) -> u64 {
        self.kernel.process::<Sink>(self.sink).map_or(0, Sink::finished)
    }

    /// Boards inside the line: in slots or held by a process.
    pub fn pcbs_in_line(&self) -> u64 {
        self.kernel.resident_pcbs() as u64
    }

    /// Advances the line to `time`, capped at the configured limit.
    ///
    /// Can be called repeatedly to observe the line between instants.
    pub fn run_until(&mut self, time: SimTime) -> SimResult<RunOutcome> {
        self.kernel.run_until(time.min(self.limit))
    }

    /// Runs until the sink completes the batch or the time limit passes.
    pub fn run(mut self) -> SimResult<LineReport> {
        let timer = Timer::start();
        tracing::info!(
            line = %self.name,
            processes = self.kernel.process_count(),
            max_hours = to_hours(self.limit),
            "running line"
        );
        let outcome = self.kernel.run_until(self.limit)?;
        let report = self.report(outcome, timer.elapsed_ms());
        tracing::info!(
            line = %self.name,
            finished = report.pcbs_finished,
            elapsed_s = report.elapsed_secs,
            "run complete"
        );
        Ok(report)
    }

    /// Builds the report for the current state of the line.
    pub fn report(&self, outcome: RunOutcome, wall_time_ms: f64) -> LineReport {
        let now = self.kernel.now();
        let finished = self.pcbs_finished();
        let sink = self.kernel.process::<Sink>(self.sink);

        let entities: Vec<_> = self.kernel.processes().filter_map(|p| p.report(now)).collect();
        let total_energy_j: f64 = entities.iter().map(|e| e.energy_j).sum();
        let hours = to_hours(now);

        LineReport {
            name: self.name.clone(),
            outcome,
            elapsed_secs: to_secs(now),
            pcbs_created: self.pcbs_created(),
            pcbs_finished: finished,
            pcbs_in_line: self.pcbs_in_line(),
            avg_cycle_time_secs: sink.map_or(0.0, Sink::avg_cycle_time_secs),
            max_cycle_time_secs: sink.map_or(0.0, Sink::max_cycle_time_secs),
            throughput_per_hour: if hours > 0.0 {
                finished as f64 / hours
            } else {
                0.0
            },
            total_energy_j,
            energy_per_pcb_kj: total_energy_j / (finished.max(1) as f64 * 1e3),
            entities,
            kernel: self.kernel.stats().clone(),
            wall_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineConfigBuilder;
    use crate::machines::{BeltParams, LoaderParams, SinkParams, SourceParams};

    fn small_line() -> LineConfig {
        LineConfigBuilder::new()
            .batch_size(6)
            .stack_size(3)
            .max_hours(1.0)
            .slots(["tray", "done"])
            .belt("belt", BeltParams::default())
            .machine(MachineConfig::Source {
                name: "src".into(),
                output: "tray".into(),
                params: SourceParams::default(),
            })
            .machine(MachineConfig::LineLoader {
                name: "loader".into(),
                input: "tray".into(),
                output: "belt".into(),
                params: LoaderParams::default(),
            })
            .machine(MachineConfig::Sink {
                name: "sink".into(),
                input: "belt".into(),
                params: SinkParams::default(),
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_belt_ports_resolve_to_distinct_slots() {
        let mut world = World::new();
        let wiring = Wiring::build(&small_line(), &mut world);
        let belt = wiring.ports["belt"];
        assert_ne!(belt.write, belt.read);
        let tray = wiring.ports["tray"];
        assert_eq!(tray.write, tray.read);
        assert_eq!(world.slot_count(), 4);
    }

    #[test]
    fn test_small_line_completes_batch() {
        let line = AssemblyLine::new(small_line()).unwrap();
        assert_eq!(line.limit(), secs(3600));
        let report = line.run().unwrap();

        assert!(matches!(report.outcome, RunOutcome::Stopped { .. }));
        assert_eq!(report.pcbs_created, 6);
        assert_eq!(report.pcbs_finished, 6);
        assert_eq!(report.pcbs_in_line, 0);
        assert!(report.max_cycle_time_secs > 0.0);
        assert!(report.entity("loader").is_some());
        assert!(report.entity("belt").is_some());
    }

    #[test]
    fn test_time_limit_reports_partial_batch() {
        let mut config = small_line();
        config.simulation.max_hours = 10.0 / 3600.0;
        let report = AssemblyLine::new(config).unwrap().run().unwrap();

        assert_eq!(report.outcome, RunOutcome::LimitReached { at: secs(10) });
        assert!(report.pcbs_finished < 6);
        assert_eq!(
            report.pcbs_created,
            report.pcbs_finished + report.pcbs_in_line
        );
        assert_eq!(report.elapsed_secs, 10.0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = small_line();
        config.simulation.stack_size = 4;
        assert!(matches!(
            AssemblyLine::new(config),
            Err(crate::error::SimError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn test_unbounded_run_length_is_rejected() {
        for hours in [f64::INFINITY, 1e15] {
            let mut config = LineConfig::reference();
            config.simulation.max_hours = hours;
            assert!(matches!(
                AssemblyLine::new(config),
                Err(crate::error::SimError::Config(ConfigError::Validation(_)))
            ));
        }
    }
}
