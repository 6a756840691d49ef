use crate::alu;
use crate::cpu::{Commit, Cpu, ExecResult, Stats};
use crate::inst::{ArchReg, Inst, Pc, SrcSlot};
use crate::mem::{sign_extend, MainMemory, MemDir};
use crate::program::Program;
use crate::regs::RegSet;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum CpuState {
    Running,
    Stopped,
}

/// In-order reference interpreter of the same instruction subset: one
/// instruction per tick, no speculation. The out-of-order core must produce
/// identical architectural state and an identical commit sequence.
#[derive(Debug, Clone)]
pub struct Emulated {
    regs: RegSet,
    mem: MainMemory,
    prog: Program,
    pc: Pc,
    stats: Stats,
}

impl Cpu for Emulated {
    fn new(prog: Program, regs: RegSet, mem: MainMemory) -> Self {
        Self {
            regs,
            mem,
            prog,
            pc: 0,
            stats: Stats::default(),
        }
    }

    fn exec_all(mut self) -> ExecResult {
        while self.exec_one() == CpuState::Running {}

        ExecResult {
            regs: self.regs,
            mem: self.mem,
            stats: self.stats,
        }
    }
}

impl Emulated {
    fn src_value(&self, slot: SrcSlot) -> u32 {
        match slot {
            SrcSlot::Reg(reg) => self.regs.get(reg),
            SrcSlot::Imm(value) => value,
            SrcSlot::None => 0,
        }
    }

    /// Records one retirement. A write to register zero is architecturally
    /// invisible and logs as no write, matching the out-of-order commit log.
    fn retire(&mut self, pc: Pc, write: Option<(ArchReg, u32)>) {
        let write = write.filter(|(dst, _)| *dst != ArchReg::Zero);
        if let Some((dst, value)) = write {
            self.regs.set(dst, value);
        }
        self.stats.insts_retired += 1;
        self.stats.commit_log.push(Commit { pc, write });
    }

    fn exec_one(&mut self) -> CpuState {
        let inst = match self.prog.fetch(self.pc) {
            Some(inst) => inst.clone(),
            None => return CpuState::Stopped,
        };

        let pc = self.pc;
        self.stats.cycles += 1;

        match inst {
            Inst::Halt => return CpuState::Stopped,
            Inst::LoadImm(dst, imm) => {
                self.retire(pc, Some((dst, imm.0)));
                self.pc = pc + 1;
            }
            Inst::LoadUpperImm(dst, imm) => {
                self.retire(pc, Some((dst, imm.0 << 12)));
                self.pc = pc + 1;
            }
            Inst::Jump(target) => {
                self.retire(pc, None);
                self.pc = target;
            }
            Inst::JumpAndLink(dst, target) => {
                self.retire(pc, Some((dst, pc + 1)));
                self.pc = target;
            }
            _ => {
                if let Some(access) = inst.mem_access() {
                    let addr = self.regs.ref_to_addr(access.mem);
                    match access.dir {
                        MemDir::Load => {
                            let raw = self.mem.read(access.width, addr);
                            let value = if access.sign_extend {
                                sign_extend(raw, access.width)
                            } else {
                                raw
                            };
                            self.retire(pc, Some((access.reg, value)));
                        }
                        MemDir::Store => {
                            self.mem.write(access.width, addr, self.regs.get(access.reg));
                            self.retire(pc, None);
                        }
                    }
                    self.pc = pc + 1;
                } else {
                    // Compute class: the same operand packing and evaluator
                    // the out-of-order core dispatches with.
                    let (sa, sb) = inst.src_slots();
                    let (a, b) = (self.src_value(sa), self.src_value(sb));
                    let out = alu::evaluate(&inst, a, b, pc);

                    self.retire(pc, inst.dest().map(|dst| (dst, out.value)));
                    self.pc = out.next_pc.unwrap_or(pc + 1);
                }
            }
        }

        CpuState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::ArchReg;
    use std::str::FromStr;

    fn run(src: &str, regs: RegSet) -> ExecResult {
        let prog = Program::from_str(src).expect("parse failed");
        Emulated::new(prog, regs, MainMemory::new()).exec_all()
    }

    #[test]
    fn test_straight_line() {
        let res = run(
            "li a0, 5\n\
             addi a1, a0, 3\n\
             add a2, a0, a1\n\
             halt",
            RegSet::new(),
        );
        assert_eq!(res.regs.get(ArchReg::A2), 13);
        assert_eq!(res.stats.insts_retired, 3);
    }

    #[test]
    fn test_loop_and_branches() {
        // Sum 1..=5 with a backward branch.
        let res = run(
            "li t0, 0\n\
             li t1, 5\n\
             loop:\n\
             add t0, t0, t1\n\
             addi t1, t1, -1\n\
             bne t1, zero, loop\n\
             halt",
            RegSet::new(),
        );
        assert_eq!(res.regs.get(ArchReg::T0), 15);
    }

    #[test]
    fn test_memory_roundtrip() {
        let res = run(
            "li t0, 0x1234\n\
             sh t0, [zero + 8]\n\
             lh t1, [zero + 8]\n\
             lbu t2, [zero + 9]\n\
             halt",
            RegSet::new(),
        );
        assert_eq!(res.regs.get(ArchReg::T1), 0x1234);
        assert_eq!(res.regs.get(ArchReg::T2), 0x12);
    }

    #[test]
    fn test_call_and_return() {
        let res = run(
            "jal ra, fn\n\
             halt\n\
             fn:\n\
             li a0, 99\n\
             jalr zero, ra, 0",
            RegSet::new(),
        );
        assert_eq!(res.regs.get(ArchReg::A0), 99);
        assert_eq!(res.stats.insts_retired, 3);
    }
}
