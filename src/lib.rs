use std::path::Path;

use cpu::{Cpu, ExecResult};
use error::{SimError, SimResult};
use mem::MainMemory;
use program::Program;
use regs::RegSet;

pub mod alu;
pub mod branch;
pub mod bus;
pub mod config;
pub mod cpu;
pub mod emulated;
pub mod error;
pub mod inst;
pub mod lsb;
pub mod mem;
pub mod out_of_order;
pub mod program;
pub mod queue;
pub mod rat;
pub mod regs;
pub mod reservation_station;
pub mod rob;
pub mod util;

pub fn load_program<P: AsRef<Path>>(path: P) -> SimResult<Program> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| SimError::FileRead(path.as_ref().to_path_buf(), e))?;
    contents.parse::<Program>()
}

/// Test/bench harness entry: loads `asm/<name>.asm` and runs it to
/// completion on the given engine.
pub fn parse_and_exec<C: Cpu>(name: &'static str, regs: RegSet, mem: MainMemory) -> ExecResult {
    let contents = std::fs::read_to_string(format!("asm/{}.asm", name)).unwrap();
    let prog = contents
        .parse::<Program>()
        .expect("failed to parse assembly");
    C::new(prog, regs, mem).exec_all()
}
