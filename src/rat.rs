use strum::EnumCount;

use crate::inst::{ArchReg, Tag};
use crate::rob::TagOrder;

/// Rename table: one slot per architectural register, naming the in-flight
/// producer of that register's next value, or nothing when the committed
/// register file is authoritative. Register zero is never renamed.
#[derive(Debug, Clone)]
pub struct RenameTable {
    slots: [Option<Tag>; ArchReg::COUNT],
}

impl Default for RenameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RenameTable {
    pub fn new() -> Self {
        Self {
            slots: [None; ArchReg::COUNT],
        }
    }

    pub fn producer(&self, reg: ArchReg) -> Option<Tag> {
        if reg == ArchReg::Zero {
            return None;
        }
        self.slots[reg.index()]
    }

    /// Issue-time rename of a destination. Unconditional overwrite: the
    /// newest writer wins, which is what resolves WAW without stalling.
    pub fn set_producer(&mut self, reg: ArchReg, tag: Tag) {
        if reg == ArchReg::Zero {
            return;
        }
        self.slots[reg.index()] = Some(tag);
    }

    /// Commit-time reconciliation. The slot is cleared only if it still
    /// names the retiring tag; a newer tag means a later instruction
    /// overwrote the register and the slot must be left alone.
    pub fn reconcile(&mut self, reg: ArchReg, tag: Tag) {
        if reg == ArchReg::Zero {
            return;
        }
        let slot = &mut self.slots[reg.index()];
        if *slot == Some(tag) {
            *slot = None;
        }
    }

    /// Clears every slot naming a producer younger than `tag`; those entries
    /// are gone and the committed register file holds the right values.
    pub fn flush_after(&mut self, tag: Tag, order: &TagOrder) {
        for slot in &mut self.slots {
            if let Some(t) = *slot {
                if order.is_younger(t, tag) {
                    *slot = None;
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
