use crate::bus::Broadcast;
use crate::inst::{Operand, Pc, Tag};
use crate::mem::{sign_extend, MemDir, MemWidth};
use crate::queue::Queue;
use crate::rob::TagOrder;
use crate::util::Addr;

/// One in-flight memory operation. Entries sit in the buffer in issue order,
/// which is what all the ordering rules below lean on.
#[derive(Debug, Clone)]
pub struct LsbEntry {
    pub tag: Tag,
    pub pc: Pc,
    pub dir: MemDir,
    pub width: MemWidth,
    pub sign_ext: bool,
    pub base: Operand,
    pub offset: u32,
    /// Store data; loads carry a resolved dummy.
    pub data: Operand,
    pub addr: Option<Addr>,
    /// Load request handed to the memory port.
    pub requested: bool,
    /// Store completion already reported to the reorder buffer.
    pub reported: bool,
}

impl LsbEntry {
    pub fn load(
        tag: Tag,
        pc: Pc,
        width: MemWidth,
        sign_ext: bool,
        base: Operand,
        offset: u32,
    ) -> Self {
        Self {
            tag,
            pc,
            dir: MemDir::Load,
            width,
            sign_ext,
            base,
            offset,
            data: Operand::Value(0),
            addr: None,
            requested: false,
            reported: false,
        }
    }

    pub fn store(tag: Tag, pc: Pc, width: MemWidth, base: Operand, offset: u32, data: Operand) -> Self {
        Self {
            tag,
            pc,
            dir: MemDir::Store,
            width,
            sign_ext: false,
            base,
            offset,
            data,
            addr: None,
            requested: false,
            reported: false,
        }
    }

    fn try_resolve_addr(&mut self) {
        if self.addr.is_none() {
            if let Some(base) = self.base.value() {
                self.addr = Some(Addr(base.wrapping_add(self.offset)));
            }
        }
    }
}

/// What the buffer wants to do with its one memory-path slot this cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadAction {
    /// Satisfied from an older pending store; no memory request.
    Forward { tag: Tag, value: u32 },
    /// Clear to read memory.
    Request {
        tag: Tag,
        addr: Addr,
        width: MemWidth,
        sign_ext: bool,
    },
}

/// FIFO of memory operations in issue order. Resolves addresses from the
/// bus, decides when a load may legally reach memory, forwards from pending
/// stores, and holds each store's effect until the reorder buffer commits it.
#[derive(Debug)]
pub struct LoadStoreBuffer {
    queue: Queue<LsbEntry>,
}

fn overlap(a: Addr, aw: MemWidth, b: Addr, bw: MemWidth) -> bool {
    let (a, b) = (a.0 as u64, b.0 as u64);
    a < b + bw.size() as u64 && b < a + aw.size() as u64
}

impl LoadStoreBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Queue::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// The issue stage must check `is_full` first.
    pub fn insert(&mut self, mut entry: LsbEntry) {
        entry.try_resolve_addr();
        let res = self.queue.try_push(entry);
        assert!(res.is_none(), "insert into a full load/store buffer");
    }

    /// Resolves base and data operands against the delivered broadcast set
    /// and computes effective addresses as bases arrive.
    pub fn snoop(&mut self, bus: &[Broadcast]) {
        for entry in self.queue.iter_mut() {
            entry.base.snoop(bus);
            entry.data.snoop(bus);
            entry.try_resolve_addr();
        }
    }

    /// Stores whose address and data both became known since the last call.
    /// Reported once, straight to the reorder buffer.
    pub fn collect_ready_stores(&mut self) -> Vec<(Tag, Addr, MemWidth, u32)> {
        let mut ready = Vec::new();
        for entry in self.queue.iter_mut() {
            if entry.dir != MemDir::Store || entry.reported {
                continue;
            }
            if let (Some(addr), Some(value)) = (entry.addr, entry.data.value()) {
                entry.reported = true;
                ready.push((entry.tag, addr, entry.width, value));
            }
        }
        ready
    }

    /// Picks at most one load to act on this cycle, oldest first.
    ///
    /// A load is eligible once its address is resolved and every older store
    /// has a resolved address; an older store with an unknown address could
    /// alias anything, so it blocks the load and everything younger. An
    /// older store whose pending write exactly matches the load's address
    /// and width satisfies the load by forwarding (the youngest such store
    /// wins); any other overlap parks the load until that store commits.
    pub fn select_load(&self, allow_forward: bool, allow_request: bool) -> Option<LoadAction> {
        let mut older_stores: Vec<(Addr, MemWidth, Option<u32>)> = Vec::new();

        for entry in self.queue.iter() {
            match entry.dir {
                MemDir::Store => match entry.addr {
                    // Ambiguous older store: nothing younger may pass it.
                    None => break,
                    Some(addr) => older_stores.push((addr, entry.width, entry.data.value())),
                },
                MemDir::Load => {
                    if entry.requested {
                        continue;
                    }
                    let addr = match entry.addr {
                        Some(addr) => addr,
                        None => continue,
                    };

                    // Program order: the youngest interfering store decides.
                    let hit = older_stores
                        .iter()
                        .rev()
                        .find(|(sa, sw, _)| overlap(*sa, *sw, addr, entry.width));

                    match hit {
                        None => {
                            if allow_request {
                                return Some(LoadAction::Request {
                                    tag: entry.tag,
                                    addr,
                                    width: entry.width,
                                    sign_ext: entry.sign_ext,
                                });
                            }
                        }
                        Some(&(sa, sw, Some(value))) if sa == addr && sw == entry.width => {
                            if allow_forward {
                                let raw = match entry.width {
                                    MemWidth::Byte => value & 0xff,
                                    MemWidth::Half => value & 0xffff,
                                    MemWidth::Word => value,
                                };
                                let value = if entry.sign_ext {
                                    sign_extend(raw, entry.width)
                                } else {
                                    raw
                                };
                                return Some(LoadAction::Forward {
                                    tag: entry.tag,
                                    value,
                                });
                            }
                        }
                        // Partial overlap, or matching store data still
                        // pending: wait.
                        Some(_) => {}
                    }
                }
            }
        }

        None
    }

    pub fn mark_requested(&mut self, tag: Tag) {
        let entry = self
            .queue
            .iter_mut()
            .find(|e| e.tag == tag)
            .expect("requested load not in the buffer");
        debug_assert!(entry.dir == MemDir::Load && !entry.requested);
        entry.requested = true;
    }

    /// Removes a load whose value is on the bus this cycle (response or
    /// forward).
    pub fn complete_load(&mut self, tag: Tag) {
        let before = self.queue.len();
        self.queue.retain(|e| e.tag != tag);
        debug_assert_eq!(before, self.queue.len() + 1, "completed load not in the buffer");
    }

    /// Drops the store the reorder buffer just committed; its write is being
    /// applied to memory in the same tick. All older memory operations have
    /// already retired, so it must be the oldest entry.
    pub fn retire_store(&mut self, tag: Tag) {
        let front = self.queue.front().expect("store commit with an empty buffer");
        debug_assert!(
            front.dir == MemDir::Store && front.tag == tag,
            "committing store is not the oldest memory operation"
        );
        let _ = self.queue.try_pop();
    }

    /// Discards every entry strictly younger than `tag`.
    pub fn flush_after(&mut self, tag: Tag, order: &TagOrder) {
        self.queue.retain(|e| !order.is_younger(e.tag, tag));
    }
}
