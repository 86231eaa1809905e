//! Entities flowing through the line.
//!
//! A [`Pcb`] is created by a source, moved from container to container and
//! finally consumed by a sink. PCBs are never copied: every hand-off moves the
//! value.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::types::{DrawOrder, SimTime};

/// A single printed circuit board.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcb {
    /// Board type, used to look up consumable requirements
    pub type_id: u32,
    /// Unique serial number, assigned by the source
    pub serial_id: u64,
    /// Virtual time at which the board was created
    pub created_at: SimTime,
}

impl Pcb {
    /// Creates a new board.
    pub fn new(type_id: u32, serial_id: u64, created_at: SimTime) -> Self {
        Self {
            type_id,
            serial_id,
            created_at,
        }
    }
}

impl fmt::Display for Pcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PCB(type={}, serial={})", self.type_id, self.serial_id)
    }
}

/// An ordered tray of boards, handled as one unit between source and loader.
pub type Stack = VecDeque<Pcb>;

/// Anything a slot can hold.
#[derive(Debug, PartialEq, Eq)]
pub enum Item {
    /// A single board
    Pcb(Pcb),
    /// A tray of boards (possibly empty once unloaded)
    Stack(Stack),
}

impl Item {
    /// Number of boards carried by this item.
    pub fn pcb_count(&self) -> usize {
        match self {
            Item::Pcb(_) => 1,
            Item::Stack(stack) => stack.len(),
        }
    }

    /// Consumes the item and returns its boards in order.
    pub fn into_pcbs(self) -> Vec<Pcb> {
        match self {
            Item::Pcb(pcb) => vec![pcb],
            Item::Stack(stack) => stack.into_iter().collect(),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Pcb(pcb) => pcb.fmt(f),
            Item::Stack(stack) => match (stack.front(), stack.back()) {
                (Some(first), Some(last)) => write!(
                    f,
                    "Stack[{} PCBs, serial {}..={}]",
                    stack.len(),
                    first.serial_id,
                    last.serial_id
                ),
                _ => write!(f, "Stack[empty]"),
            },
        }
    }
}

/// Physical and process data for a board type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcbTypeInfo {
    /// Type identifier
    pub type_id: u32,
    /// Width in centimetres
    pub width_cm: f64,
    /// Height in centimetres
    pub height_cm: f64,
    /// Number of placed components
    pub num_components: u32,
    /// Solder paste consumed when printing, in grams
    pub solder_g: f64,
    /// Adhesive consumed when printing, in grams
    pub adhesive_g: f64,
}

/// Lookup table from type id to [`PcbTypeInfo`].
#[derive(Clone, Debug, Default)]
pub struct PcbCatalog {
    types: HashMap<u32, PcbTypeInfo>,
}

impl PcbCatalog {
    /// Builds a catalog from a list of type descriptions.
    pub fn new(types: impl IntoIterator<Item = PcbTypeInfo>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.type_id, t)).collect(),
        }
    }

    /// The five board types of the reference line.
    pub fn reference_types() -> Vec<PcbTypeInfo> {
        let rows = [
            (1, 5.0, 5.0, 28),
            (2, 6.0, 5.0, 28),
            (3, 7.0, 5.0, 23),
            (4, 5.0, 10.0, 48),
            (5, 5.0, 15.0, 70),
        ];
        rows.iter()
            .map(|&(type_id, width_cm, height_cm, num_components)| PcbTypeInfo {
                type_id,
                width_cm,
                height_cm,
                num_components,
                solder_g: 5.0,
                adhesive_g: 5.0,
            })
            .collect()
    }

    /// Returns the entry for a type id.
    pub fn get(&self, type_id: u32) -> Option<&PcbTypeInfo> {
        self.types.get(&type_id)
    }

    /// Returns true if the type id is known.
    pub fn contains(&self, type_id: u32) -> bool {
        self.types.contains_key(&type_id)
    }
}

/// A bounded deque whose draw end is fixed at construction.
///
/// Items are always pushed at the back; [`DrawOrder::Lifo`] pops from the
/// back and [`DrawOrder::Fifo`] from the front.
#[derive(Debug)]
pub struct DrawBuffer<T = Item> {
    items: VecDeque<T>,
    capacity: usize,
    order: DrawOrder,
}

impl<T> DrawBuffer<T> {
    /// Creates an empty buffer.
    pub fn new(capacity: usize, order: DrawOrder) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            order,
        }
    }

    /// Pushes an entry. Returns it back if the buffer is full.
    pub fn push(&mut self, entry: T) -> Result<(), T> {
        if self.is_full() {
            return Err(entry);
        }
        self.items.push_back(entry);
        Ok(())
    }

    /// Pops the next entry according to the draw order.
    pub fn pop(&mut self) -> Option<T> {
        match self.order {
            DrawOrder::Lifo => self.items.pop_back(),
            DrawOrder::Fifo => self.items.pop_front(),
        }
    }

    /// Moves every entry of `other` to the back of this buffer, keeping order.
    ///
    /// Returns the number of entries moved. Entries that do not fit stay in `other`.
    pub fn take_all_from(&mut self, other: &mut DrawBuffer<T>) -> usize {
        let room = self.capacity - self.items.len();
        let moved = room.min(other.items.len());
        self.items.extend(other.items.drain(..moved));
        moved
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn order(&self) -> DrawOrder {
        self.order
    }
}

impl DrawBuffer<Item> {
    /// Number of boards held, counting every board of a stack.
    pub fn pcb_count(&self) -> usize {
        self.items.iter().map(Item::pcb_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcbs(n: u64) -> Vec<Pcb> {
        (1..=n).map(|i| Pcb::new(1, i, 0)).collect()
    }

    #[test]
    fn test_item_counts() {
        let stack: Stack = pcbs(4).into_iter().collect();
        let item = Item::Stack(stack);
        assert_eq!(item.pcb_count(), 4);
        assert_eq!(item.to_string(), "Stack[4 PCBs, serial 1..=4]");
        assert_eq!(Item::Stack(Stack::new()).pcb_count(), 0);

        let single = Item::Pcb(Pcb::new(2, 9, 0));
        assert_eq!(single.pcb_count(), 1);
        assert_eq!(single.into_pcbs()[0].serial_id, 9);
    }

    #[test]
    fn test_lifo_buffer() {
        let mut buf: DrawBuffer<Pcb> = DrawBuffer::new(3, DrawOrder::Lifo);
        for pcb in pcbs(3) {
            buf.push(pcb).unwrap();
        }
        assert!(buf.is_full());
        assert!(buf.push(Pcb::new(1, 99, 0)).is_err());
        assert_eq!(buf.pop().unwrap().serial_id, 3);
        assert_eq!(buf.pop().unwrap().serial_id, 2);
    }

    #[test]
    fn test_fifo_buffer() {
        let mut buf = DrawBuffer::new(3, DrawOrder::Fifo);
        for pcb in pcbs(3) {
            buf.push(Item::Pcb(pcb)).unwrap();
        }
        assert_eq!(buf.pcb_count(), 3);
        assert_eq!(buf.pop(), Some(Item::Pcb(Pcb::new(1, 1, 0))));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_take_all_from() {
        let mut inbound: DrawBuffer<Pcb> = DrawBuffer::new(2, DrawOrder::Lifo);
        let mut outbound: DrawBuffer<Pcb> = DrawBuffer::new(2, DrawOrder::Lifo);
        for pcb in pcbs(2) {
            inbound.push(pcb).unwrap();
        }
        assert_eq!(outbound.take_all_from(&mut inbound), 2);
        assert!(inbound.is_empty());
        assert_eq!(outbound.pop().unwrap().serial_id, 2);
    }

    #[test]
    fn test_reference_catalog() {
        let catalog = PcbCatalog::new(PcbCatalog::reference_types());
        assert!(catalog.contains(5));
        assert!(!catalog.contains(6));
        let info = catalog.get(4).unwrap();
        assert_eq!(info.num_components, 48);
        assert_eq!(info.solder_g, 5.0);
    }
}
