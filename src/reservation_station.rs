use crate::bus::Broadcast;
use crate::inst::{Inst, Operand, Pc, Tag};
use crate::rob::TagOrder;

/// One waiting ALU-bound instruction: the immutable decoded record plus its
/// two renamed source slots and the reorder buffer slot it will complete.
#[derive(Debug, Clone)]
pub struct RsEntry {
    pub tag: Tag,
    pub pc: Pc,
    pub inst: Inst,
    pub a: Operand,
    pub b: Operand,
}

impl RsEntry {
    pub fn is_ready(&self) -> bool {
        self.a.is_resolved() && self.b.is_resolved()
    }
}

/// Holds instructions until their operands are known; wakes them up by
/// snooping the bus and hands exactly one to the ALU per cycle.
#[derive(Debug)]
pub struct ReservationStation {
    entries: Vec<RsEntry>,
    capacity: usize,
}

impl ReservationStation {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// The issue stage must check `is_full` first; a full station is
    /// back-pressure, inserting past it is a model bug.
    pub fn insert(&mut self, entry: RsEntry) {
        assert!(!self.is_full(), "insert into a full reservation station");
        self.entries.push(entry);
    }

    /// Every busy entry compares its pending operand tags against the
    /// delivered set; matches capture the broadcast value.
    pub fn snoop(&mut self, bus: &[Broadcast]) {
        for entry in &mut self.entries {
            entry.a.snoop(bus);
            entry.b.snoop(bus);
        }
    }

    /// Picks the single instruction to dispatch this cycle: both operands
    /// resolved, oldest in program order first (wraparound-aware) so runs
    /// are deterministic. Frees the slot.
    pub fn select_ready(&mut self, order: &TagOrder) -> Option<RsEntry> {
        let pos = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_ready())
            .min_by_key(|(_, e)| order.age(e.tag))
            .map(|(i, _)| i)?;

        Some(self.entries.swap_remove(pos))
    }

    /// Discards every entry strictly younger than `tag`.
    pub fn flush_after(&mut self, tag: Tag, order: &TagOrder) {
        self.entries.retain(|e| !order.is_younger(e.tag, tag));
    }
}
