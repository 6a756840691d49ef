use crate::inst::{ArchReg, Pc};
use crate::mem::MainMemory;
use crate::program::Program;
use crate::regs::RegSet;

/// One retired instruction, as seen by an external observer at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub pc: Pc,
    pub write: Option<(ArchReg, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub cycles: u64,
    pub insts_retired: u64,
    pub mispredicts: u64,
    pub forwarded_loads: u64,
    /// Populated only when commit recording is enabled.
    pub commit_log: Vec<Commit>,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub regs: RegSet,
    pub mem: MainMemory,
    pub stats: Stats,
}

pub trait Cpu {
    fn new(prog: Program, regs: RegSet, mem: MainMemory) -> Self;

    fn exec_all(self) -> ExecResult;
}
