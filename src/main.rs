use std::path::PathBuf;
use std::process::exit;
use std::time::Instant;

use structopt::StructOpt;

use tomasim::config::{load_cpu_config, CpuConfig};
use tomasim::cpu::Cpu;
use tomasim::inst::ArchReg;
use tomasim::mem::MainMemory;
use tomasim::out_of_order::OutOfOrder;
use tomasim::regs::RegSet;

#[derive(StructOpt, Debug)]
#[structopt(name = "tomasim")]
struct Opt {
    /// Path of the assembly program to run
    #[structopt(parse(from_os_str))]
    file: PathBuf,

    /// Machine configuration (YAML); defaults are used when absent
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Initial value of register a0
    #[structopt(long, default_value = "0")]
    a0: u32,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    let start = Instant::now();

    let cfg = match opt.config {
        Some(path) => match load_cpu_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load {}: {}", path.display(), e);
                exit(1);
            }
        },
        None => CpuConfig::default(),
    };

    let prog = match tomasim::load_program(&opt.file) {
        Ok(prog) => prog,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    let initial_regs = RegSet::from([(ArchReg::A0, opt.a0)]);
    let res = OutOfOrder::with_config(cfg, prog, initial_regs, MainMemory::new()).exec_all();

    println!("    EXECUTION COMPLETED");
    println!("    =====================");
    println!("    Instructions retired: {}", res.stats.insts_retired);
    println!("            Cycles taken: {}", res.stats.cycles);
    println!(
        "  Instructions per clock: {:.2}",
        res.stats.insts_retired as f32 / res.stats.cycles as f32
    );
    println!("          Mispredictions: {}", res.stats.mispredicts);
    println!("         Forwarded loads: {}", res.stats.forwarded_loads);
    println!(
        "  Simulator time elapsed: {:.2}s",
        start.elapsed().as_secs_f32()
    );
    println!("            Register a0: {}", res.regs.get(ArchReg::A0));
}
