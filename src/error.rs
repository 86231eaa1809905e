//! Error types for line assembly and simulation runs.

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::{ProcessId, SlotId, TaskKind};

/// Errors that abort a simulation run.
///
/// Everything here is a configuration mistake surfacing either at assembly
/// time or the first time the faulty path executes. Operational anomalies such
/// as a blocked oven exit are logged, not reported through this type.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("operator '{operator}' has no '{task}' task assigned for machine '{machine}'")]
    UnassignedTask {
        operator: String,
        machine: String,
        task: TaskKind,
    },

    #[error("operator '{operator}' has {count} '{task}' tasks assigned for machine '{machine}'")]
    AmbiguousTask {
        operator: String,
        machine: String,
        task: TaskKind,
        count: usize,
    },

    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    #[error("'{entity}' tried to put into occupied slot {slot:?}")]
    SlotOccupied { entity: String, slot: SlotId },

    #[error("'{entity}' received a board of unknown type {type_id}")]
    UnknownPcbType { entity: String, type_id: u32 },
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
