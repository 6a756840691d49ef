use crate::inst::{Pc, Tag};

/// Actual control-flow outcome of a branch-class instruction, carried on the
/// bus so the reorder buffer can judge the fetch-time prediction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub next_pc: Pc,
}

/// One computed result, valid for exactly one cycle.
#[derive(Debug, Copy, Clone)]
pub struct Broadcast {
    pub tag: Tag,
    pub value: u32,
    pub outcome: Option<BranchOutcome>,
}

/// The result bus: at most one completion per functional path per cycle.
/// Results latched during tick N are delivered atomically at the start of
/// tick N+1, memory path first, so no consumer ever observes a partial set.
#[derive(Debug, Default)]
pub struct BroadcastBus {
    mem: Option<Broadcast>,
    alu: Option<Broadcast>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mem_free(&self) -> bool {
        self.mem.is_none()
    }

    pub fn latch_mem(&mut self, b: Broadcast) {
        assert!(self.mem.is_none(), "memory path latched twice in one tick");
        debug_assert!(
            self.alu.map(|a| a.tag != b.tag).unwrap_or(true),
            "two broadcasts share {}",
            b.tag
        );
        self.mem = Some(b);
    }

    pub fn latch_alu(&mut self, b: Broadcast) {
        assert!(self.alu.is_none(), "ALU path latched twice in one tick");
        debug_assert!(
            self.mem.map(|m| m.tag != b.tag).unwrap_or(true),
            "two broadcasts share {}",
            b.tag
        );
        self.alu = Some(b);
    }

    /// Takes the full delivery set for this tick, leaving the bus free.
    pub fn take(&mut self) -> Vec<Broadcast> {
        self.mem.take().into_iter().chain(self.alu.take()).collect()
    }
}
