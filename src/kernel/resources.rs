//! Shared resources processes rendezvous on.
//!
//! The [`World`] is an arena owned by the kernel. Processes address resources
//! by typed id and only touch them through the [`Context`](super::Context)
//! handed to them while they run, so at most one process mutates the world at
//! any moment.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use crate::pcb::Item;
use crate::types::{ControlId, ReserveId, SignalId, SlotId};

/// A bounded FIFO container of items. A slot is a store of capacity 1.
#[derive(Debug)]
pub struct Store {
    name: String,
    capacity: usize,
    items: VecDeque<Item>,
}

impl Store {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if one more item fits.
    pub fn can_put(&self) -> bool {
        self.items.len() < self.capacity
    }

    /// Returns true if an item is available.
    pub fn can_get(&self) -> bool {
        !self.items.is_empty()
    }

    /// Adds an item at the back. Returns it back if the store is full.
    pub fn put(&mut self, item: Item) -> Result<(), Item> {
        if !self.can_put() {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Removes the front item.
    pub fn get(&mut self) -> Option<Item> {
        self.items.pop_front()
    }

    /// Returns the item that `get` would return, without removing it.
    pub fn peek(&self) -> Option<&Item> {
        self.items.front()
    }

    /// Mutable access to the front item, used to unload a tray in place.
    pub fn peek_mut(&mut self) -> Option<&mut Item> {
        self.items.front_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of boards held, counting every board of a stack.
    pub fn pcb_count(&self) -> usize {
        self.items.iter().map(Item::pcb_count).sum()
    }
}

/// A level-based quantity such as solder paste.
///
/// The level stays within `[0, capacity]`: `get` only succeeds when enough is
/// available and `put` saturates at capacity.
#[derive(Debug, Clone, Serialize)]
pub struct Reserve {
    name: String,
    capacity: f64,
    level: f64,
}

impl Reserve {
    /// Creates a reserve. The initial level is clamped into `[0, capacity]`.
    pub fn new(name: impl Into<String>, capacity: f64, initial: f64) -> Self {
        Self {
            name: name.into(),
            capacity,
            level: initial.clamp(0.0, capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Returns true if `amount` can be taken right now.
    pub fn can_get(&self, amount: f64) -> bool {
        self.level >= amount
    }

    /// Takes `amount`. Returns false and leaves the level alone if short.
    pub fn get(&mut self, amount: f64) -> bool {
        if !self.can_get(amount) {
            return false;
        }
        self.level -= amount;
        true
    }

    /// Adds `amount`, saturating at capacity. Returns the amount actually added.
    pub fn put(&mut self, amount: f64) -> f64 {
        let added = amount.max(0.0).min(self.capacity - self.level);
        self.level += added;
        added
    }

    /// Fills the reserve to capacity. Returns the amount added.
    pub fn refill(&mut self) -> f64 {
        self.put(self.capacity - self.level)
    }
}

/// A completion flag raised by one process and consumed by another.
///
/// Operators raise it when they finish a task a machine is blocked on.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    name: String,
    pending: u32,
}

impl Signal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raises the flag.
    pub fn notify(&mut self) {
        self.pending += 1;
    }

    pub fn is_set(&self) -> bool {
        self.pending > 0
    }

    /// Consumes one notification. Returns false if none was pending.
    pub fn take(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        self.pending -= 1;
        true
    }
}

/// Command sent to an externally controlled oven.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OvenCommand {
    TurnOn,
    TurnOff,
}

impl fmt::Display for OvenCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OvenCommand::TurnOn => f.write_str("TURN_ON"),
            OvenCommand::TurnOff => f.write_str("TURN_OFF"),
        }
    }
}

/// Latched on/off command from a controller to an oven.
///
/// The controller overwrites the command whenever it likes; the oven samples it
/// when its own state machine allows a transition.
#[derive(Debug, Clone)]
pub struct ControlLine {
    name: String,
    command: OvenCommand,
}

impl ControlLine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: OvenCommand::TurnOn,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> OvenCommand {
        self.command
    }

    pub fn set(&mut self, command: OvenCommand) {
        self.command = command;
    }
}

/// Arena of every shared resource in a simulation.
#[derive(Debug, Default)]
pub struct World {
    slots: Vec<Store>,
    reserves: Vec<Reserve>,
    signals: Vec<Signal>,
    controls: Vec<ControlLine>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-item slot.
    pub fn add_slot(&mut self, name: impl Into<String>) -> SlotId {
        self.add_store(name, 1)
    }

    /// Adds a store with the given capacity.
    pub fn add_store(&mut self, name: impl Into<String>, capacity: usize) -> SlotId {
        self.slots.push(Store::new(name, capacity));
        SlotId(self.slots.len() - 1)
    }

    pub fn add_reserve(&mut self, name: impl Into<String>, capacity: f64, initial: f64) -> ReserveId {
        self.reserves.push(Reserve::new(name, capacity, initial));
        ReserveId(self.reserves.len() - 1)
    }

    pub fn add_signal(&mut self, name: impl Into<String>) -> SignalId {
        self.signals.push(Signal::new(name));
        SignalId(self.signals.len() - 1)
    }

    pub fn add_control(&mut self, name: impl Into<String>) -> ControlId {
        self.controls.push(ControlLine::new(name));
        ControlId(self.controls.len() - 1)
    }

    // Ids are only minted by the `add_*` methods above, so indexing cannot
    // go out of bounds for ids obtained from this world.

    pub fn slot(&self, id: SlotId) -> &Store {
        &self.slots[id.0]
    }

    pub fn slot_mut(&mut self, id: SlotId) -> &mut Store {
        &mut self.slots[id.0]
    }

    pub fn reserve(&self, id: ReserveId) -> &Reserve {
        &self.reserves[id.0]
    }

    pub fn reserve_mut(&mut self, id: ReserveId) -> &mut Reserve {
        &mut self.reserves[id.0]
    }

    pub fn signal(&self, id: SignalId) -> &Signal {
        &self.signals[id.0]
    }

    pub fn signal_mut(&mut self, id: SignalId) -> &mut Signal {
        &mut self.signals[id.0]
    }

    pub fn control(&self, id: ControlId) -> &ControlLine {
        &self.controls[id.0]
    }

    pub fn control_mut(&mut self, id: ControlId) -> &mut ControlLine {
        &mut self.controls[id.0]
    }

    /// Boards currently sitting in slots and stores.
    pub fn pcbs_in_slots(&self) -> usize {
        self.slots.iter().map(Store::pcb_count).sum()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcb::{Pcb, Stack};

    #[test]
    fn test_slot_capacity_one() {
        let mut slot = Store::new("buff_0", 1);
        assert!(slot.can_put());
        assert!(!slot.can_get());
        slot.put(Item::Pcb(Pcb::new(1, 1, 0))).unwrap();
        assert!(!slot.can_put());
        assert!(slot.put(Item::Pcb(Pcb::new(1, 2, 0))).is_err());
        assert_eq!(slot.len(), 1);
        let item = slot.get().unwrap();
        assert_eq!(item.pcb_count(), 1);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_store_counts_stack_boards() {
        let mut store = Store::new("tray", 2);
        let stack: Stack = (1..=3).map(|i| Pcb::new(1, i, 0)).collect();
        store.put(Item::Stack(stack)).unwrap();
        store.put(Item::Pcb(Pcb::new(1, 4, 0))).unwrap();
        assert_eq!(store.pcb_count(), 4);

        if let Some(Item::Stack(stack)) = store.peek_mut() {
            stack.pop_front();
        }
        assert_eq!(store.pcb_count(), 3);
    }

    #[test]
    fn test_reserve_level_bounds() {
        let mut solder = Reserve::new("solder", 500.0, 600.0);
        assert_eq!(solder.level(), 500.0);
        assert!(solder.get(5.0));
        assert_eq!(solder.level(), 495.0);
        assert_eq!(solder.put(100.0), 5.0);
        assert_eq!(solder.level(), 500.0);

        let mut glue = Reserve::new("adhesive", 10.0, 3.0);
        assert!(!glue.get(5.0));
        assert_eq!(glue.level(), 3.0);
        assert_eq!(glue.refill(), 7.0);
        assert!(glue.get(5.0));
    }

    #[test]
    fn test_signal_counts_notifications() {
        let mut done = Signal::new("reel_done");
        assert!(!done.take());
        done.notify();
        assert!(done.is_set());
        assert!(done.take());
        assert!(!done.is_set());
    }

    #[test]
    fn test_world_arena() {
        let mut world = World::new();
        let a = world.add_slot("a");
        let b = world.add_store("b", 4);
        assert_ne!(a, b);
        assert_eq!(world.slot(b).capacity(), 4);
        world
            .slot_mut(a)
            .put(Item::Pcb(Pcb::new(1, 1, 0)))
            .unwrap();
        assert_eq!(world.pcbs_in_slots(), 1);

        let ctl = world.add_control("oven_ctl");
        assert_eq!(world.control(ctl).command(), OvenCommand::TurnOn);
        world.control_mut(ctl).set(OvenCommand::TurnOff);
        assert_eq!(world.control(ctl).command(), OvenCommand::TurnOff);
    }
}
