//! Configuration system for assembly lines.
//!
//! A line is described declaratively: named slots and belts, the machines
//! connected to them, and the human operators that service the machines.
//! Files may be YAML or JSON; the format is picked from the extension.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   batch_size: 64
//!   stack_size: 16
//!   max_hours: 10
//!
//! slots: [buff_0, buff_1]
//!
//! belts:
//!   - name: belt_1
//!     params:
//!       num_stages: 3
//!       delay_per_stage: 1
//!
//! machines:
//!   - type: source
//!     name: source_1
//!     output: buff_0
//!   - type: line_loader
//!     name: line_loader
//!     input: buff_0
//!     output: belt_1
//!   - type: sink
//!     name: sink_1
//!     input: belt_1
//!
//! operators:
//!   - name: human_operator_1
//!     tasks:
//!       - { machine: screen_printer, task: solder_refill, delay: 60 }
//! ```
//!
//! A port names either a slot or a belt. A machine writing to a belt feeds
//! the belt's input; a machine reading from a belt takes from its output.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::clock::{from_hours, MAX_DURATION_SECS};
use crate::machines::{
    BeltParams, BeltState, BufferState, BufferingParams, DoubleBufferState, LoaderParams,
    LoaderState, OperatorState, OvenParams, OvenState, PickAndPlaceParams, PickAndPlaceState,
    PrinterParams, PrinterState, SinkParams, SourceParams,
};
use crate::pcb::{PcbCatalog, PcbTypeInfo};
use crate::stats::StateSet;
use crate::types::TaskKind;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

fn invalid<T>(msg: impl Into<String>) -> ConfigResult<T> {
    Err(ConfigError::Validation(msg.into()))
}

/// Global run parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Boards to finish before the run stops
    pub batch_size: u64,
    /// Boards per stack delivered by the source
    pub stack_size: u64,
    /// Upper bound on virtual time, in hours
    pub max_hours: f64,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Forward the activity trace to the log
    pub trace: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            stack_size: 16,
            max_hours: 100.0,
            log_level: "info".to_string(),
            trace: false,
        }
    }
}

/// A named conveyor belt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeltConfig {
    pub name: String,
    #[serde(default)]
    pub params: BeltParams,
}

/// One machine of the line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MachineConfig {
    Source {
        name: String,
        output: String,
        #[serde(default)]
        params: SourceParams,
    },
    LineLoader {
        name: String,
        input: String,
        output: String,
        #[serde(default)]
        params: LoaderParams,
    },
    ScreenPrinter {
        name: String,
        input: String,
        output: String,
        /// Operator doing solder and adhesive refills
        operator: String,
        #[serde(default)]
        params: PrinterParams,
    },
    PickAndPlace {
        name: String,
        input: String,
        output: String,
        /// Operator doing reel replacements
        operator: String,
        #[serde(default)]
        params: PickAndPlaceParams,
    },
    BufferingModule {
        name: String,
        input: String,
        output: String,
        /// Reflow oven switched on and off by this module
        #[serde(default)]
        oven: Option<String>,
        /// Use two alternating buffers instead of one
        #[serde(default)]
        double: bool,
        #[serde(default)]
        params: BufferingParams,
    },
    ReflowOven {
        name: String,
        input: String,
        output: String,
        #[serde(default)]
        params: OvenParams,
    },
    Sink {
        name: String,
        input: String,
        #[serde(default)]
        params: SinkParams,
    },
}

impl MachineConfig {
    pub fn name(&self) -> &str {
        match self {
            MachineConfig::Source { name, .. }
            | MachineConfig::LineLoader { name, .. }
            | MachineConfig::ScreenPrinter { name, .. }
            | MachineConfig::PickAndPlace { name, .. }
            | MachineConfig::BufferingModule { name, .. }
            | MachineConfig::ReflowOven { name, .. }
            | MachineConfig::Sink { name, .. } => name,
        }
    }

    /// Port the machine takes boards from, if any.
    pub fn input(&self) -> Option<&str> {
        match self {
            MachineConfig::Source { .. } => None,
            MachineConfig::LineLoader { input, .. }
            | MachineConfig::ScreenPrinter { input, .. }
            | MachineConfig::PickAndPlace { input, .. }
            | MachineConfig::BufferingModule { input, .. }
            | MachineConfig::ReflowOven { input, .. }
            | MachineConfig::Sink { input, .. } => Some(input),
        }
    }

    /// Port the machine puts boards into, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            MachineConfig::Sink { .. } => None,
            MachineConfig::Source { output, .. }
            | MachineConfig::LineLoader { output, .. }
            | MachineConfig::ScreenPrinter { output, .. }
            | MachineConfig::PickAndPlace { output, .. }
            | MachineConfig::BufferingModule { output, .. }
            | MachineConfig::ReflowOven { output, .. } => Some(output),
        }
    }

    /// Tasks this machine may request from its operator.
    pub fn requested_tasks(&self) -> &'static [TaskKind] {
        match self {
            MachineConfig::ScreenPrinter { .. } => {
                &[TaskKind::SolderRefill, TaskKind::AdhesiveRefill]
            }
            MachineConfig::PickAndPlace { .. } => &[TaskKind::ReelReplacement],
            _ => &[],
        }
    }

    /// Operator assigned to this machine, if it needs one.
    pub fn operator(&self) -> Option<&str> {
        match self {
            MachineConfig::ScreenPrinter { operator, .. }
            | MachineConfig::PickAndPlace { operator, .. } => Some(operator),
            _ => None,
        }
    }

    /// Configured durations in whole seconds, by field name.
    fn durations(&self) -> Vec<(&'static str, u64)> {
        match self {
            MachineConfig::Source { params, .. } => vec![("delay", params.delay)],
            MachineConfig::LineLoader { params, .. } => vec![("delay", params.delay)],
            MachineConfig::ScreenPrinter { params, .. } => vec![
                ("printing_delay", params.printing_delay),
                ("cleaning_delay", params.cleaning_delay),
            ],
            MachineConfig::PickAndPlace { params, .. } => {
                vec![("processing_delay", params.processing_delay)]
            }
            MachineConfig::BufferingModule { .. } => Vec::new(),
            MachineConfig::ReflowOven { params, .. } => {
                vec![("delay_per_stage", params.delay_per_stage)]
            }
            MachineConfig::Sink { params, .. } => vec![("delay", params.delay)],
        }
    }

    fn start_time(&self) -> f64 {
        match self {
            MachineConfig::Source { params, .. } => params.start_time,
            MachineConfig::LineLoader { params, .. } => params.start_time,
            MachineConfig::ScreenPrinter { params, .. } => params.start_time,
            MachineConfig::PickAndPlace { params, .. } => params.start_time,
            MachineConfig::BufferingModule { params, .. } => params.start_time,
            MachineConfig::ReflowOven { params, .. } => params.start_time,
            MachineConfig::Sink { params, .. } => params.start_time,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        let name = self.name();
        for (field, seconds) in self.durations() {
            check_duration(name, field, seconds)?;
        }
        check_start_time(name, self.start_time())?;
        match self {
            MachineConfig::Source { .. } | MachineConfig::Sink { .. } => Ok(()),
            MachineConfig::LineLoader { params, .. } => {
                if params.delay < 1 {
                    return invalid(format!("{}: delay must be at least 1 s", name));
                }
                check_power::<LoaderState>(name, &params.power_w)
            }
            MachineConfig::ScreenPrinter { params, .. } => {
                if params.printing_delay < 1 {
                    return invalid(format!("{}: printing_delay must be at least 1 s", name));
                }
                if params.num_pcbs_per_cleaning < 1 {
                    return invalid(format!("{}: num_pcbs_per_cleaning must be at least 1", name));
                }
                for (what, capacity, initial) in [
                    ("solder", params.solder_capacity_g, params.solder_initial_g),
                    ("adhesive", params.adhesive_capacity_g, params.adhesive_initial_g),
                ] {
                    if capacity <= 0.0 || initial < 0.0 || initial > capacity {
                        return invalid(format!(
                            "{}: {} reserve must satisfy 0 <= initial ({}) <= capacity ({})",
                            name, what, initial, capacity
                        ));
                    }
                }
                check_power::<PrinterState>(name, &params.power_w)
            }
            MachineConfig::PickAndPlace { params, .. } => {
                if params.processing_delay < 1 {
                    return invalid(format!("{}: processing_delay must be at least 1 s", name));
                }
                check_power::<PickAndPlaceState>(name, &params.power_w)
            }
            MachineConfig::BufferingModule { params, double, .. } => {
                if params.capacity < 2 {
                    return invalid(format!(
                        "{}: capacity {} is below the minimum of 2",
                        name, params.capacity
                    ));
                }
                if params.k >= params.capacity {
                    return invalid(format!(
                        "{}: k must be in 0..={}, got {}",
                        name,
                        params.capacity - 1,
                        params.k
                    ));
                }
                if *double {
                    check_power::<DoubleBufferState>(name, &params.power_w)
                } else {
                    check_power::<BufferState>(name, &params.power_w)
                }
            }
            MachineConfig::ReflowOven { params, .. } => {
                if params.num_stages < 2 {
                    return invalid(format!("{}: num_stages must be at least 2", name));
                }
                if params.delay_per_stage < 1 {
                    return invalid(format!("{}: delay_per_stage must be at least 1 s", name));
                }
                if params.heating_rate <= 0.0 {
                    return invalid(format!("{}: heating_rate must be positive", name));
                }
                check_power::<OvenState>(name, &params.power_w)
            }
        }
    }
}

/// A task an operator performs for one machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub machine: String,
    pub task: TaskKind,
    /// Seconds the task takes
    pub delay: u64,
}

/// A human operator and its task table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub name: String,
    /// Power per state: idle, busy
    #[serde(default)]
    pub power_w: Vec<f64>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

fn check_duration(name: &str, field: &str, seconds: u64) -> ConfigResult<()> {
    if seconds > MAX_DURATION_SECS {
        return invalid(format!(
            "{}: {} of {} s exceeds the maximum of {} s",
            name, field, seconds, MAX_DURATION_SECS
        ));
    }
    Ok(())
}

fn check_start_time(name: &str, start_time: f64) -> ConfigResult<()> {
    if !start_time.is_finite() || start_time < 0.0 || start_time > MAX_DURATION_SECS as f64 {
        return invalid(format!(
            "{}: start_time must be within 0..={} s, got {}",
            name, MAX_DURATION_SECS, start_time
        ));
    }
    Ok(())
}

fn check_power<S: StateSet>(name: &str, power_w: &[f64]) -> ConfigResult<()> {
    if !power_w.is_empty() && power_w.len() != S::ALL.len() {
        return invalid(format!(
            "{}: expected {} power ratings, got {}",
            name,
            S::ALL.len(),
            power_w.len()
        ));
    }
    if power_w.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return invalid(format!("{}: power ratings must be non-negative", name));
    }
    Ok(())
}

/// Complete assembly-line configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    /// Line name used in reports
    #[serde(default = "default_line_name")]
    pub name: String,

    #[serde(default)]
    pub simulation: SimulationParams,

    /// Board types known to the line
    #[serde(default = "PcbCatalog::reference_types")]
    pub pcb_types: Vec<PcbTypeInfo>,

    /// Single-board handoff slots
    #[serde(default)]
    pub slots: Vec<String>,

    #[serde(default)]
    pub belts: Vec<BeltConfig>,

    /// Machines in spawn order
    #[serde(default)]
    pub machines: Vec<MachineConfig>,

    #[serde(default)]
    pub operators: Vec<OperatorConfig>,
}

fn default_line_name() -> String {
    "smt_line".to_string()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            name: default_line_name(),
            simulation: SimulationParams::default(),
            pcb_types: PcbCatalog::reference_types(),
            slots: Vec::new(),
            belts: Vec::new(),
            machines: Vec::new(),
            operators: Vec::new(),
        }
    }
}

impl LineConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference SMT line.
    ///
    /// source → line loader → screen printer → belt → pick-and-place ×2 →
    /// buffering module → belt → reflow oven → sink, with one operator doing
    /// every refill and reel replacement.
    pub fn reference() -> Self {
        let operator = "human_operator_1";
        LineConfigBuilder::new()
            .name("reference_line")
            .slots(["buff_0", "buff_1", "buff_2", "buff_3", "buff_4"])
            .belt("belt_sp_to_pp1", BeltParams::default())
            .belt("belt_buffering_module_to_rfo", BeltParams::default())
            .machine(MachineConfig::Source {
                name: "source_1".into(),
                output: "buff_0".into(),
                params: SourceParams::default(),
            })
            .machine(MachineConfig::LineLoader {
                name: "line_loader".into(),
                input: "buff_0".into(),
                output: "buff_1".into(),
                params: LoaderParams::default(),
            })
            .machine(MachineConfig::ScreenPrinter {
                name: "screen_printer".into(),
                input: "buff_1".into(),
                output: "belt_sp_to_pp1".into(),
                operator: operator.into(),
                params: PrinterParams {
                    power_w: vec![100.0, 100.0, 500.0, 1000.0, 100.0],
                    ..PrinterParams::default()
                },
            })
            .machine(MachineConfig::PickAndPlace {
                name: "pick_and_place_1".into(),
                input: "belt_sp_to_pp1".into(),
                output: "buff_2".into(),
                operator: operator.into(),
                params: PickAndPlaceParams {
                    processing_delay: 85,
                    power_w: vec![100.0, 100.0, 500.0, 100.0],
                    ..PickAndPlaceParams::default()
                },
            })
            .machine(MachineConfig::PickAndPlace {
                name: "pick_and_place_2".into(),
                input: "buff_2".into(),
                output: "buff_3".into(),
                operator: operator.into(),
                params: PickAndPlaceParams {
                    power_w: vec![100.0, 100.0, 500.0, 100.0],
                    ..PickAndPlaceParams::default()
                },
            })
            .machine(MachineConfig::BufferingModule {
                name: "buffering_module".into(),
                input: "buff_3".into(),
                output: "belt_buffering_module_to_rfo".into(),
                oven: Some("reflow_oven".into()),
                double: false,
                params: BufferingParams {
                    power_w: vec![250.0, 250.0, 250.0],
                    ..BufferingParams::default()
                },
            })
            .machine(MachineConfig::ReflowOven {
                name: "reflow_oven".into(),
                input: "belt_buffering_module_to_rfo".into(),
                output: "buff_4".into(),
                params: OvenParams {
                    power_w: vec![320.0, 33000.0, 25800.0, 25800.0],
                    ..OvenParams::default()
                },
            })
            .machine(MachineConfig::Sink {
                name: "sink_1".into(),
                input: "buff_4".into(),
                params: SinkParams::default(),
            })
            .operator(operator, &[])
            .task(operator, "screen_printer", TaskKind::SolderRefill, 60)
            .task(operator, "screen_printer", TaskKind::AdhesiveRefill, 60)
            .task(operator, "pick_and_place_1", TaskKind::ReelReplacement, 60)
            .task(operator, "pick_and_place_2", TaskKind::ReelReplacement, 60)
            .config
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: LineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: LineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let sim = &self.simulation;
        if sim.batch_size == 0 || sim.stack_size == 0 {
            return invalid("batch_size and stack_size must be positive");
        }
        if sim.batch_size % sim.stack_size != 0 {
            return invalid(format!(
                "batch_size {} is not a multiple of stack_size {}",
                sim.batch_size, sim.stack_size
            ));
        }
        if !(sim.max_hours > 0.0) || from_hours(sim.max_hours).is_none() {
            return invalid(format!(
                "max_hours must be positive, finite and at most {} h, got {}",
                MAX_DURATION_SECS / 3600,
                sim.max_hours
            ));
        }

        let mut type_ids = HashSet::new();
        for t in &self.pcb_types {
            if !type_ids.insert(t.type_id) {
                return invalid(format!("Duplicate PCB type: {}", t.type_id));
            }
        }

        let mut names = HashSet::new();
        let port_names = self
            .slots
            .iter()
            .map(String::as_str)
            .chain(self.belts.iter().map(|b| b.name.as_str()));
        for name in port_names {
            if !names.insert(name) {
                return invalid(format!("Duplicate port name: {}", name));
            }
        }
        for belt in &self.belts {
            if belt.params.num_stages < 2 {
                return invalid(format!(
                    "{}: num_stages {} is below the minimum of 2",
                    belt.name, belt.params.num_stages
                ));
            }
            if belt.params.delay_per_stage < 1 {
                return invalid(format!("{}: delay_per_stage must be at least 1 s", belt.name));
            }
            check_duration(&belt.name, "delay_per_stage", belt.params.delay_per_stage)?;
            check_start_time(&belt.name, belt.params.start_time)?;
            check_power::<BeltState>(&belt.name, &belt.params.power_w)?;
        }

        // every port has at most one writer and one reader
        let mut writers: HashMap<&str, &str> = HashMap::new();
        let mut readers: HashMap<&str, &str> = HashMap::new();
        let mut machine_names = HashSet::new();
        for machine in &self.machines {
            let name = machine.name();
            if !machine_names.insert(name) || names.contains(name) {
                return invalid(format!("Duplicate name: {}", name));
            }
            machine.validate()?;
            for (port, users) in [
                (machine.input(), &mut readers),
                (machine.output(), &mut writers),
            ] {
                let Some(port) = port else { continue };
                if !names.contains(port) {
                    return invalid(format!("{}: unknown port '{}'", name, port));
                }
                if let Some(other) = users.insert(port, name) {
                    return invalid(format!("port '{}' is shared by {} and {}", port, other, name));
                }
            }
        }

        self.validate_boundaries()?;
        self.validate_oven_control()?;
        self.validate_operators()?;
        Ok(())
    }

    fn validate_boundaries(&self) -> ConfigResult<()> {
        let count = |f: fn(&MachineConfig) -> bool| self.machines.iter().filter(|m| f(m)).count();
        let sources = count(|m| matches!(m, MachineConfig::Source { .. }));
        let sinks = count(|m| matches!(m, MachineConfig::Sink { .. }));
        if sources != 1 || sinks != 1 {
            return invalid(format!(
                "a line needs exactly one source and one sink, found {} and {}",
                sources, sinks
            ));
        }
        for machine in &self.machines {
            if let MachineConfig::Source { name, params, .. } = machine {
                if !self.pcb_types.iter().any(|t| t.type_id == params.pcb_type) {
                    return invalid(format!("{}: unknown PCB type {}", name, params.pcb_type));
                }
            }
        }
        Ok(())
    }

    fn validate_oven_control(&self) -> ConfigResult<()> {
        let mut controlled = HashSet::new();
        for machine in &self.machines {
            let MachineConfig::BufferingModule {
                name, oven, params, ..
            } = machine
            else {
                continue;
            };
            if params.enabled && self.simulation.batch_size % params.capacity as u64 != 0 {
                return invalid(format!(
                    "{}: batch_size {} is not a multiple of the buffer capacity {}",
                    name, self.simulation.batch_size, params.capacity
                ));
            }
            let Some(oven) = oven else { continue };
            let is_oven = self.machines.iter().any(|m| {
                matches!(m, MachineConfig::ReflowOven { name, .. } if name == oven)
            });
            if !is_oven {
                return invalid(format!("{}: '{}' is not a reflow oven", name, oven));
            }
            if !controlled.insert(oven.as_str()) {
                return invalid(format!("{}: oven '{}' already has a controller", name, oven));
            }
        }
        Ok(())
    }

    fn validate_operators(&self) -> ConfigResult<()> {
        let mut operator_names = HashSet::new();
        for op in &self.operators {
            if !operator_names.insert(op.name.as_str()) {
                return invalid(format!("Duplicate operator: {}", op.name));
            }
            check_power::<OperatorState>(&op.name, &op.power_w)?;
            for task in &op.tasks {
                if task.delay < 1 {
                    return invalid(format!(
                        "{}: task '{}' for {} must take at least 1 s",
                        op.name, task.task, task.machine
                    ));
                }
                check_duration(&op.name, "task delay", task.delay)?;
                let requested = self
                    .find_machine(&task.machine)
                    .map_or(false, |m| m.requested_tasks().contains(&task.task));
                if !requested {
                    return invalid(format!(
                        "{}: machine '{}' never requests '{}'",
                        op.name, task.machine, task.task
                    ));
                }
            }
        }

        for machine in &self.machines {
            let Some(operator) = machine.operator() else {
                continue;
            };
            let name = machine.name();
            let Some(op) = self.find_operator(operator) else {
                return invalid(format!("{}: unassigned operator '{}'", name, operator));
            };
            for &task in machine.requested_tasks() {
                let matching = op
                    .tasks
                    .iter()
                    .filter(|t| t.machine == name && t.task == task)
                    .count();
                match matching {
                    1 => {}
                    0 => {
                        return invalid(format!(
                            "{}: operator '{}' has no '{}' task for this machine",
                            name, operator, task
                        ))
                    }
                    n => {
                        return invalid(format!(
                            "{}: operator '{}' has {} '{}' tasks for this machine",
                            name, operator, n, task
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Board type catalog built from `pcb_types`.
    pub fn catalog(&self) -> PcbCatalog {
        PcbCatalog::new(self.pcb_types.iter().cloned())
    }

    /// Finds a machine configuration by name.
    pub fn find_machine(&self, name: &str) -> Option<&MachineConfig> {
        self.machines.iter().find(|m| m.name() == name)
    }

    /// Finds an operator configuration by name.
    pub fn find_operator(&self, name: &str) -> Option<&OperatorConfig> {
        self.operators.iter().find(|op| op.name == name)
    }

    /// Sets the oven turn-on margin `k` of every buffering module.
    pub fn set_turn_on_margin(&mut self, k: usize) {
        for params in self.buffering_params_mut() {
            params.k = k;
        }
    }

    /// Sets the capacity (per stage) of every buffering module.
    pub fn set_buffer_capacity(&mut self, capacity: usize) {
        for params in self.buffering_params_mut() {
            params.capacity = capacity;
        }
    }

    /// Parameters of the first buffering module, if the line has one.
    pub fn buffering_params(&self) -> Option<&BufferingParams> {
        self.machines.iter().find_map(|m| match m {
            MachineConfig::BufferingModule { params, .. } => Some(params),
            _ => None,
        })
    }

    fn buffering_params_mut(&mut self) -> impl Iterator<Item = &mut BufferingParams> + '_ {
        self.machines.iter_mut().filter_map(|m| match m {
            MachineConfig::BufferingModule { params, .. } => Some(params),
            _ => None,
        })
    }
}

/// Builder for creating LineConfig programmatically.
#[derive(Default)]
pub struct LineConfigBuilder {
    config: LineConfig,
}

impl LineConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.config.simulation.batch_size = batch_size;
        self
    }

    pub fn stack_size(mut self, stack_size: u64) -> Self {
        self.config.simulation.stack_size = stack_size;
        self
    }

    pub fn max_hours(mut self, hours: f64) -> Self {
        self.config.simulation.max_hours = hours;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables forwarding the activity trace to the log.
    pub fn trace(mut self, enable: bool) -> Self {
        self.config.simulation.trace = enable;
        self
    }

    /// Replaces the board type catalog.
    pub fn pcb_types(mut self, types: Vec<PcbTypeInfo>) -> Self {
        self.config.pcb_types = types;
        self
    }

    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.config.slots.push(name.into());
        self
    }

    pub fn slots<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.slots.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn belt(mut self, name: impl Into<String>, params: BeltParams) -> Self {
        self.config.belts.push(BeltConfig {
            name: name.into(),
            params,
        });
        self
    }

    pub fn machine(mut self, machine: MachineConfig) -> Self {
        self.config.machines.push(machine);
        self
    }

    /// Adds an operator with no tasks.
    pub fn operator(mut self, name: impl Into<String>, power_w: &[f64]) -> Self {
        self.config.operators.push(OperatorConfig {
            name: name.into(),
            power_w: power_w.to_vec(),
            tasks: Vec::new(),
        });
        self
    }

    /// Assigns a task to an operator added earlier.
    ///
    /// Tasks for unknown operators are dropped here and reported by
    /// [`build`](Self::build) as an unassigned operator.
    pub fn task(
        mut self,
        operator: &str,
        machine: impl Into<String>,
        task: TaskKind,
        delay: u64,
    ) -> Self {
        if let Some(op) = self
            .config
            .operators
            .iter_mut()
            .find(|op| op.name == operator)
        {
            op.tasks.push(TaskConfig {
                machine: machine.into(),
                task,
                delay,
            });
        }
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<LineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
