use crate::bus::Broadcast;
use crate::inst::{ArchReg, Pc, Tag};
use crate::mem::MemWidth;
use crate::util::Addr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RobState {
    Issued,
    Executing,
    Completed,
}

#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub predicted_next: Pc,
    /// Valid once the entry is Completed.
    pub actual_next: Pc,
    pub mispredict: bool,
}

#[derive(Debug, Clone)]
pub struct StoreInfo {
    pub addr: Addr,
    pub width: MemWidth,
    pub value: u32,
}

#[derive(Debug, Clone)]
pub struct RobEntry {
    pub tag: Tag,
    pub pc: Pc,
    pub state: RobState,
    pub dest: Option<ArchReg>,
    pub result: u32,
    pub branch: Option<BranchInfo>,
    pub is_store: bool,
    /// Filled by the load/store buffer when the store's operands resolve.
    pub store: Option<StoreInfo>,
    pub halt: bool,
}

impl RobEntry {
    fn blank(pc: Pc) -> Self {
        Self {
            tag: Tag::new(0),
            pc,
            state: RobState::Issued,
            dest: None,
            result: 0,
            branch: None,
            is_store: false,
            store: None,
            halt: false,
        }
    }

    /// An ALU op or a load: result arrives over the bus.
    pub fn compute(pc: Pc, dest: Option<ArchReg>) -> Self {
        Self {
            dest,
            ..Self::blank(pc)
        }
    }

    /// A branch-class op: carries the fetch-time prediction for judgement.
    pub fn branch(pc: Pc, dest: Option<ArchReg>, predicted_next: Pc) -> Self {
        Self {
            dest,
            branch: Some(BranchInfo {
                predicted_next,
                actual_next: 0,
                mispredict: false,
            }),
            ..Self::blank(pc)
        }
    }

    pub fn store(pc: Pc) -> Self {
        Self {
            is_store: true,
            ..Self::blank(pc)
        }
    }

    /// Outcome known at issue (li/lui/j/jal): born Completed.
    pub fn direct(pc: Pc, dest: Option<ArchReg>, result: u32) -> Self {
        Self {
            dest,
            result,
            state: RobState::Completed,
            ..Self::blank(pc)
        }
    }

    pub fn halt(pc: Pc) -> Self {
        Self {
            halt: true,
            state: RobState::Completed,
            ..Self::blank(pc)
        }
    }
}

/// Wraparound-aware ordering of live tags, anchored at the current head.
/// Tags are slot indices and wrap; ages do not. All oldest-first selection
/// and flush comparisons must go through this, never raw indices.
#[derive(Debug, Copy, Clone)]
pub struct TagOrder {
    head: usize,
    mask: usize,
}

impl TagOrder {
    /// Position of `tag` behind the oldest live entry (0 = oldest).
    pub fn age(&self, tag: Tag) -> usize {
        tag.index().wrapping_sub(self.head) & self.mask
    }

    pub fn is_younger(&self, a: Tag, b: Tag) -> bool {
        self.age(a) > self.age(b)
    }
}

/// In-order ledger of in-flight instructions: a ring of `capacity` slots
/// (power of two) indexed by tag. Allocation and commit move tail and head;
/// a flush moves the tail back over every entry younger than the branch.
#[derive(Debug)]
pub struct ReorderBuffer {
    slots: Vec<Option<RobEntry>>,
    head: usize,
    len: usize,
    mask: usize,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "reorder buffer capacity must be a power of two"
        );
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
            mask: capacity - 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn order(&self) -> TagOrder {
        TagOrder {
            head: self.head,
            mask: self.mask,
        }
    }

    /// Claims the next slot in program order. The issue stage must check
    /// `is_full` first; allocating into a full buffer is a model bug, not
    /// back-pressure.
    pub fn allocate(&mut self, mut entry: RobEntry) -> Tag {
        assert!(!self.is_full(), "allocate on a full reorder buffer");

        let index = (self.head + self.len) & self.mask;
        debug_assert!(self.slots[index].is_none(), "slot {index} double-allocated");

        let tag = Tag::new(index);
        entry.tag = tag;
        self.slots[index] = Some(entry);
        self.len += 1;
        tag
    }

    pub fn get(&self, tag: Tag) -> &RobEntry {
        self.slots[tag.index() & self.mask]
            .as_ref()
            .filter(|e| e.tag == tag)
            .expect("no live entry for tag")
    }

    fn get_mut(&mut self, tag: Tag) -> &mut RobEntry {
        self.slots[tag.index() & self.mask]
            .as_mut()
            .filter(|e| e.tag == tag)
            .expect("no live entry for tag")
    }

    /// Completed result of a live entry, if already known. Lets the rename
    /// stage read a value that has been computed but not yet committed.
    pub fn result_of(&self, tag: Tag) -> Option<u32> {
        let entry = self.get(tag);
        (entry.state == RobState::Completed).then(|| entry.result)
    }

    pub fn mark_executing(&mut self, tag: Tag) {
        let entry = self.get_mut(tag);
        debug_assert_eq!(entry.state, RobState::Issued);
        entry.state = RobState::Executing;
    }

    /// Applies one bus broadcast. Completing an already-Completed entry
    /// means two producers claimed one tag: a model bug.
    pub fn update(&mut self, b: &Broadcast) {
        let entry = self.get_mut(b.tag);
        assert!(
            entry.state != RobState::Completed,
            "{} completed twice",
            b.tag
        );

        entry.result = b.value;
        if let Some(outcome) = b.outcome {
            let branch = entry
                .branch
                .as_mut()
                .expect("control outcome for a non-branch entry");
            branch.actual_next = outcome.next_pc;
            branch.mispredict = outcome.next_pc != branch.predicted_next;
        } else {
            debug_assert!(entry.branch.is_none(), "branch completed without outcome");
        }
        entry.state = RobState::Completed;
    }

    /// Store completion, reported by the load/store buffer once address and
    /// data are known. Stores produce no register value and never occupy a
    /// bus path.
    pub fn update_store(&mut self, tag: Tag, addr: Addr, width: MemWidth, value: u32) {
        let entry = self.get_mut(tag);
        assert!(entry.is_store, "store completion for a non-store entry");
        assert!(
            entry.state != RobState::Completed,
            "{} completed twice",
            tag
        );

        entry.store = Some(StoreInfo { addr, width, value });
        entry.state = RobState::Completed;
    }

    pub fn head_entry(&self) -> Option<&RobEntry> {
        if self.is_empty() {
            return None;
        }
        Some(
            self.slots[self.head]
                .as_ref()
                .expect("head slot empty in a non-empty buffer"),
        )
    }

    /// Retires the oldest entry. Committing a non-Completed head is a model
    /// bug; the caller gates on `head_entry().state`.
    pub fn pop_head(&mut self) -> RobEntry {
        let entry = self.slots[self.head]
            .take()
            .expect("commit on an empty reorder buffer");
        assert_eq!(
            entry.state,
            RobState::Completed,
            "commit of a non-completed entry at pc {}",
            entry.pc
        );

        self.head = (self.head + 1) & self.mask;
        self.len -= 1;
        entry
    }

    /// Discards every entry strictly younger than `tag`, wraparound-aware.
    pub fn flush_after(&mut self, tag: Tag) {
        let keep = self.order().age(tag) + 1;
        debug_assert!(keep <= self.len, "flush from a dead tag");

        while self.len > keep {
            let index = (self.head + self.len - 1) & self.mask;
            let _ = self.slots[index].take().expect("flush of an empty slot");
            self.len -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BranchOutcome;

    fn completed(rob: &mut ReorderBuffer, tag: Tag, value: u32) {
        rob.update(&Broadcast {
            tag,
            value,
            outcome: None,
        });
    }

    #[test]
    fn test_commit_follows_allocation_order() {
        let mut rob = ReorderBuffer::new(4);
        let t0 = rob.allocate(RobEntry::compute(0, Some(ArchReg::A0)));
        let t1 = rob.allocate(RobEntry::compute(1, Some(ArchReg::A1)));

        // Complete out of order; commit must still be in order.
        completed(&mut rob, t1, 20);
        assert!(rob.head_entry().unwrap().state != RobState::Completed);

        completed(&mut rob, t0, 10);
        assert_eq!(rob.pop_head().result, 10);
        assert_eq!(rob.pop_head().result, 20);
        assert!(rob.is_empty());
    }

    #[test]
    fn test_tags_unique_and_reused_after_commit() {
        let mut rob = ReorderBuffer::new(2);
        let t0 = rob.allocate(RobEntry::compute(0, None));
        let t1 = rob.allocate(RobEntry::compute(1, None));
        assert_ne!(t0, t1);
        assert!(rob.is_full());

        completed(&mut rob, t0, 0);
        let _ = rob.pop_head();
        let t2 = rob.allocate(RobEntry::compute(2, None));
        // Slot index wraps around; the freed slot is reused.
        assert_eq!(t2.index(), t0.index());
    }

    #[test]
    #[should_panic(expected = "completed twice")]
    fn test_double_completion_faults() {
        let mut rob = ReorderBuffer::new(4);
        let t0 = rob.allocate(RobEntry::compute(0, None));
        completed(&mut rob, t0, 1);
        completed(&mut rob, t0, 2);
    }

    #[test]
    #[should_panic(expected = "full reorder buffer")]
    fn test_allocate_when_full_faults() {
        let mut rob = ReorderBuffer::new(2);
        let _ = rob.allocate(RobEntry::compute(0, None));
        let _ = rob.allocate(RobEntry::compute(1, None));
        let _ = rob.allocate(RobEntry::compute(2, None));
    }

    #[test]
    fn test_mispredict_judged_at_update() {
        let mut rob = ReorderBuffer::new(4);
        let t0 = rob.allocate(RobEntry::branch(5, None, 6));
        rob.update(&Broadcast {
            tag: t0,
            value: 0,
            outcome: Some(BranchOutcome { next_pc: 9 }),
        });

        let branch = rob.head_entry().unwrap().branch.as_ref().unwrap();
        assert!(branch.mispredict);
        assert_eq!(branch.actual_next, 9);
    }

    #[test]
    fn test_flush_after_with_wraparound() {
        let mut rob = ReorderBuffer::new(4);

        // Move head forward so allocation wraps.
        for pc in 0..3 {
            let t = rob.allocate(RobEntry::compute(pc, None));
            completed(&mut rob, t, 0);
            let _ = rob.pop_head();
        }

        let t3 = rob.allocate(RobEntry::compute(3, None));
        let t4 = rob.allocate(RobEntry::compute(4, None)); // wraps to slot 0
        let t5 = rob.allocate(RobEntry::compute(5, None));
        assert!(t4.index() < t3.index());

        let order = rob.order();
        assert!(order.is_younger(t4, t3));
        assert!(order.is_younger(t5, t4));

        rob.flush_after(t4);
        assert_eq!(rob.len(), 2);
        assert_eq!(rob.head_entry().unwrap().tag, t3);
        completed(&mut rob, t3, 0);
        let _ = rob.pop_head();
        assert_eq!(rob.head_entry().unwrap().tag, t4);
    }
}
