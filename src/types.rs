//! Core type definitions for the assembly-line model.
//!
//! This module defines the fundamental types used throughout the simulation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual simulation time, counted in half-seconds.
///
/// Machines act at integer seconds and belts shift at half-integer seconds,
/// so a fixed-point clock with a resolution of half a second represents every
/// instant of the timing convention exactly.
pub type SimTime = u64;

/// Identifier of a process registered with the kernel.
///
/// Ids are handed out in registration order, which is also the tie-break order
/// for processes resuming at the same instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub usize);

/// Identifier of a [`Store`](crate::kernel::Store) (slots are stores of capacity 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub usize);

/// Identifier of a level-based [`Reserve`](crate::kernel::Reserve).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReserveId(pub usize);

/// Identifier of a completion [`Signal`](crate::kernel::Signal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId(pub usize);

/// Identifier of an oven [`ControlLine`](crate::kernel::ControlLine).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlId(pub usize);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Draw order of a buffer: which end items leave from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DrawOrder {
    /// Last in, first out (pop from the back).
    #[default]
    Lifo,
    /// First in, first out (pop from the front).
    Fifo,
}

/// Work a human operator can be asked to perform on a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Top up a screen printer's solder reserve
    SolderRefill,
    /// Top up a screen printer's adhesive reserve
    AdhesiveRefill,
    /// Replace a pick-and-place component reel
    ReelReplacement,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SolderRefill => "solder_refill",
            TaskKind::AdhesiveRefill => "adhesive_refill",
            TaskKind::ReelReplacement => "reel_replacement",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_order_by_registration() {
        let a = ProcessId(1);
        let b = ProcessId(2);
        assert!(a < b);
        assert_eq!(a.to_string(), "p1");
    }

    #[test]
    fn test_draw_order_serde_names() {
        let json = serde_json::to_string(&DrawOrder::Fifo).unwrap();
        assert_eq!(json, "\"FIFO\"");
        let order: DrawOrder = serde_json::from_str("\"LIFO\"").unwrap();
        assert_eq!(order, DrawOrder::Lifo);
        assert_eq!(DrawOrder::default(), DrawOrder::Lifo);
    }

    #[test]
    fn test_task_kind_names() {
        assert_eq!(TaskKind::ReelReplacement.to_string(), "reel_replacement");
        let task: TaskKind = serde_json::from_str("\"solder_refill\"").unwrap();
        assert_eq!(task, TaskKind::SolderRefill);
    }
}
