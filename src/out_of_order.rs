use crate::alu;
use crate::branch::{BranchPredictor, StaticPredictor};
use crate::bus::{BranchOutcome, Broadcast, BroadcastBus};
use crate::config::CpuConfig;
use crate::cpu::{Commit, Cpu, ExecResult, Stats};
use crate::inst::{ArchReg, DecodedInst, Inst, IssueClass, Operand, SrcSlot};
use crate::lsb::{LoadAction, LoadStoreBuffer, LsbEntry};
use crate::mem::{sign_extend, DataPort, MainMemory, MemDir};
use crate::program::Program;
use crate::rat::RenameTable;
use crate::regs::RegSet;
use crate::reservation_station::{ReservationStation, RsEntry};
use crate::rob::{ReorderBuffer, RobEntry, RobState};

/// The out-of-order scheduling core: single issue, out-of-order execution
/// over a broadcast bus, single in-order commit per tick.
///
/// Each `step` advances one logical clock tick. Results latched onto the bus
/// during tick N are delivered to every consumer at the start of tick N+1,
/// so within a tick each structure only ever sees the previous tick's
/// results. The stage order below makes the remaining same-tick interactions
/// one-directional: a flush at commit removes younger entries before they
/// can dispatch, and a newly issued instruction cannot dispatch before its
/// next tick.
#[derive(Debug)]
pub struct OutOfOrder {
    cfg: CpuConfig,
    prog: Program,
    mem: MainMemory,
    port: DataPort,
    regs: RegSet,
    rat: RenameTable,
    rob: ReorderBuffer,
    rs: ReservationStation,
    lsb: LoadStoreBuffer,
    predictor: Box<dyn BranchPredictor>,
    bus: BroadcastBus,
    /// Fetch → issue latch; occupied means the decode collaborator is
    /// stalled (ready/valid handshake).
    decode: Option<DecodedInst>,
    fetch_pc: u32,
    halted: bool,
    stats: Stats,
}

impl Cpu for OutOfOrder {
    fn new(prog: Program, regs: RegSet, mem: MainMemory) -> Self {
        Self::with_config(CpuConfig::default(), prog, regs, mem)
    }

    fn exec_all(mut self) -> ExecResult {
        while !self.halted {
            self.step();
            self.stats.cycles += 1;

            debug_assert!(self.stats.cycles < 500_000_000, "infinite loop detected");
        }

        ExecResult {
            regs: self.regs,
            mem: self.mem,
            stats: self.stats,
        }
    }
}

impl OutOfOrder {
    pub fn with_config(cfg: CpuConfig, prog: Program, regs: RegSet, mem: MainMemory) -> Self {
        cfg.validate().expect("invalid cpu config");

        Self {
            port: DataPort::new(cfg.mem_latency),
            rob: ReorderBuffer::new(cfg.rob_slots),
            rs: ReservationStation::new(cfg.rs_slots),
            lsb: LoadStoreBuffer::new(cfg.lsb_slots),
            rat: RenameTable::new(),
            predictor: Box::new(StaticPredictor::new()),
            bus: BroadcastBus::new(),
            decode: None,
            fetch_pc: 0,
            halted: false,
            stats: Stats::default(),
            cfg,
            prog,
            mem,
            regs,
        }
    }

    /// Swaps in a different fetch-time direction oracle.
    pub fn with_predictor(mut self, predictor: Box<dyn BranchPredictor>) -> Self {
        self.predictor = predictor;
        self
    }

    fn step(&mut self) {
        let delivery = self.bus.take();
        self.deliver(&delivery);
        self.stage_commit();
        self.stage_memory();
        self.stage_dispatch();
        self.stage_issue();
        self.stage_fetch();
    }

    /// Delivers last tick's broadcast set to every listener at once.
    fn deliver(&mut self, delivery: &[Broadcast]) {
        for b in delivery {
            log::trace!("broadcast {} = {:#x}", b.tag, b.value);
            self.rob.update(b);
        }
        self.rs.snoop(delivery);
        self.lsb.snoop(delivery);
    }

    /// Retires the oldest instruction if it has completed. A mispredicted
    /// branch additionally flushes all younger state in this same tick and
    /// re-steers fetch.
    fn stage_commit(&mut self) {
        let (tag, redirect) = match self.rob.head_entry() {
            Some(e) if e.state == RobState::Completed => (
                e.tag,
                e.branch
                    .as_ref()
                    .filter(|b| b.mispredict)
                    .map(|b| b.actual_next),
            ),
            _ => return,
        };

        if let Some(target) = redirect {
            let order = self.rob.order();
            self.rs.flush_after(tag, &order);
            self.lsb.flush_after(tag, &order);
            self.port.flush_after(tag, &order);
            self.rat.flush_after(tag, &order);
            self.rob.flush_after(tag);
            self.decode = None;
            self.fetch_pc = target;
            self.stats.mispredicts += 1;
            log::debug!("flush at {}, redirect to pc {}", tag, target);
        }

        let entry = self.rob.pop_head();
        if entry.halt {
            self.halted = true;
            return;
        }

        let mut write = None;
        if let Some(dst) = entry.dest {
            if dst != ArchReg::Zero {
                self.regs.set(dst, entry.result);
                write = Some((dst, entry.result));
            }
            self.rat.reconcile(dst, entry.tag);
        }

        // A store touches externally visible memory only here.
        if entry.is_store {
            let store = entry
                .store
                .as_ref()
                .expect("store committed while incomplete");
            self.mem.write(store.width, store.addr, store.value);
            self.lsb.retire_store(entry.tag);
        }

        self.stats.insts_retired += 1;
        if self.cfg.record_commits {
            self.stats.commit_log.push(Commit {
                pc: entry.pc,
                write,
            });
        }
        log::trace!("commit {} pc {}", entry.tag, entry.pc);
    }

    /// Memory tick: collect the port's response, report resolved stores to
    /// the reorder buffer, and start or forward at most one load.
    fn stage_memory(&mut self) {
        if let Some((tag, value)) = self.port.tick() {
            self.lsb.complete_load(tag);
            self.bus.latch_mem(Broadcast {
                tag,
                value,
                outcome: None,
            });
        }

        for (tag, addr, width, value) in self.lsb.collect_ready_stores() {
            self.rob.update_store(tag, addr, width, value);
        }

        match self.lsb.select_load(self.bus.mem_free(), self.port.is_idle()) {
            Some(LoadAction::Forward { tag, value }) => {
                self.lsb.complete_load(tag);
                self.bus.latch_mem(Broadcast {
                    tag,
                    value,
                    outcome: None,
                });
                self.stats.forwarded_loads += 1;
                log::trace!("forward {} = {:#x}", tag, value);
            }
            Some(LoadAction::Request {
                tag,
                addr,
                width,
                sign_ext,
            }) => {
                let raw = self.mem.read(width, addr);
                let value = if sign_ext { sign_extend(raw, width) } else { raw };
                self.rob.mark_executing(tag);
                self.port.request(tag, addr, width, value);
                self.lsb.mark_requested(tag);
            }
            None => {}
        }
    }

    /// Hands the single oldest ready reservation-station entry to the ALU;
    /// the result lands on the bus for next tick.
    fn stage_dispatch(&mut self) {
        let order = self.rob.order();
        let entry = match self.rs.select_ready(&order) {
            Some(entry) => entry,
            None => return,
        };

        let a = entry.a.value().expect("dispatched with unresolved operand");
        let b = entry.b.value().expect("dispatched with unresolved operand");
        let out = alu::evaluate(&entry.inst, a, b, entry.pc);

        self.rob.mark_executing(entry.tag);
        self.bus.latch_alu(Broadcast {
            tag: entry.tag,
            value: out.value,
            outcome: out.next_pc.map(|next_pc| BranchOutcome { next_pc }),
        });
        log::trace!("dispatch {} pc {} {:?}", entry.tag, entry.pc, entry.inst);
    }

    /// Renamed source of one architectural register: committed value,
    /// already-computed in-flight value, or the producer's tag.
    fn rename(&self, reg: ArchReg) -> Operand {
        if reg == ArchReg::Zero {
            return Operand::Value(0);
        }

        match self.rat.producer(reg) {
            None => Operand::Value(self.regs.get(reg)),
            Some(tag) => match self.rob.result_of(tag) {
                Some(value) => Operand::Value(value),
                None => Operand::Pending(tag),
            },
        }
    }

    fn rename_slot(&self, slot: SrcSlot) -> Operand {
        match slot {
            SrcSlot::Reg(reg) => self.rename(reg),
            SrcSlot::Imm(value) => Operand::Value(value),
            SrcSlot::None => Operand::Value(0),
        }
    }

    /// Accepts at most one decoded record per tick: allocates its reorder
    /// buffer slot, renames sources, inserts into the reservation station or
    /// the load/store buffer, and claims the destination in the rename
    /// table. A full structure withholds the handshake instead.
    fn stage_issue(&mut self) {
        let dec = match self.decode.take() {
            Some(dec) => dec,
            None => return,
        };

        let has_room = !self.rob.is_full()
            && match dec.inst.class() {
                IssueClass::Direct => true,
                IssueClass::Compute => !self.rs.is_full(),
                IssueClass::Memory => !self.lsb.is_full(),
            };
        if !has_room {
            // Structural stall: keep the record latched and retry next tick.
            self.decode = Some(dec);
            return;
        }

        let pc = dec.pc;
        let tag = match dec.inst.class() {
            IssueClass::Direct => {
                let entry = match dec.inst {
                    Inst::Jump(_) => RobEntry::direct(pc, None, 0),
                    Inst::JumpAndLink(rd, _) => RobEntry::direct(pc, Some(rd), pc + 1),
                    Inst::LoadImm(rd, imm) => RobEntry::direct(pc, Some(rd), imm.0),
                    Inst::LoadUpperImm(rd, imm) => RobEntry::direct(pc, Some(rd), imm.0 << 12),
                    Inst::Halt => RobEntry::halt(pc),
                    ref other => unreachable!("not a direct instruction: {:?}", other),
                };
                self.rob.allocate(entry)
            }
            IssueClass::Compute => {
                let (sa, sb) = dec.inst.src_slots();
                let a = self.rename_slot(sa);
                let b = self.rename_slot(sb);

                let entry = if dec.inst.may_mispredict() {
                    RobEntry::branch(pc, dec.inst.dest(), dec.predicted_next)
                } else {
                    RobEntry::compute(pc, dec.inst.dest())
                };
                let tag = self.rob.allocate(entry);
                self.rs.insert(RsEntry {
                    tag,
                    pc,
                    inst: dec.inst.clone(),
                    a,
                    b,
                });
                tag
            }
            IssueClass::Memory => {
                let access = dec.inst.mem_access().expect("memory class without access");
                let base = self.rename(access.mem.base);
                match access.dir {
                    MemDir::Load => {
                        let tag = self.rob.allocate(RobEntry::compute(pc, Some(access.reg)));
                        self.lsb.insert(LsbEntry::load(
                            tag,
                            pc,
                            access.width,
                            access.sign_extend,
                            base,
                            access.mem.offset.0,
                        ));
                        tag
                    }
                    MemDir::Store => {
                        let data = self.rename(access.reg);
                        let tag = self.rob.allocate(RobEntry::store(pc));
                        self.lsb.insert(LsbEntry::store(
                            tag,
                            pc,
                            access.width,
                            base,
                            access.mem.offset.0,
                            data,
                        ));
                        tag
                    }
                }
            }
        };

        if let Some(dst) = dec.inst.dest() {
            self.rat.set_producer(dst, tag);
        }
        log::trace!("issue {} pc {} {:?}", tag, pc, dec.inst);
    }

    /// Refills the decode latch along the predicted stream. Running past the
    /// end of the program fetches halts.
    fn stage_fetch(&mut self) {
        if self.decode.is_some() || self.halted {
            return;
        }

        let pc = self.fetch_pc;
        let inst = self.prog.fetch(pc).cloned().unwrap_or(Inst::Halt);

        let predicted_next = match inst {
            Inst::BranchIfEqual(_, _, target)
            | Inst::BranchIfNotEqual(_, _, target)
            | Inst::BranchIfLess(_, _, target)
            | Inst::BranchIfGreaterEqual(_, _, target)
            | Inst::BranchIfLessU(_, _, target)
            | Inst::BranchIfGreaterEqualU(_, _, target) => {
                if self.predictor.predict_taken(pc, target) {
                    target
                } else {
                    pc + 1
                }
            }
            Inst::Jump(target) | Inst::JumpAndLink(_, target) => target,
            // An indirect jump's target is unknown at fetch; predict the
            // fall-through and let the commit-time flush correct it.
            _ => pc + 1,
        };

        self.decode = Some(DecodedInst {
            inst,
            pc,
            predicted_next,
        });
        self.fetch_pc = predicted_next;
    }
}
