use tomasim::{
    config::CpuConfig, cpu::Cpu, emulated::Emulated, inst::ArchReg, mem::MainMemory,
    out_of_order::OutOfOrder, parse_and_exec, regs::RegSet, util::Addr,
};

#[generic_tests::define]
mod t {
    use super::*;

    #[test]
    fn test_gcd<C: Cpu>() {
        let run = |a, b| {
            parse_and_exec::<C>(
                "gcd",
                RegSet::from([(ArchReg::A0, a), (ArchReg::A1, b)]),
                MainMemory::new(),
            )
            .regs
            .get(ArchReg::A0)
        };

        assert_eq!(run(12, 18), 6);
        assert_eq!(run(18, 12), 6);
        assert_eq!(run(7, 13), 1);
        assert_eq!(run(0, 5), 5);
        assert_eq!(run(5, 0), 5);
        assert_eq!(run(270, 192), 6);
    }

    #[test]
    fn test_sum<C: Cpu>() {
        let mut mem = MainMemory::new();
        for i in 0..10 {
            mem.writew(Addr(40 + i * 4), i + 1);
        }

        let res = parse_and_exec::<C>(
            "sum",
            RegSet::from([(ArchReg::A0, 40), (ArchReg::A1, 10)]),
            mem,
        );
        assert_eq!(res.regs.get(ArchReg::A0), 55);
    }

    #[test]
    fn test_sort<C: Cpu>() {
        let vals: [u32; 10] = [9, 3, 7, 1, 8, 2, 2, 0x7fff_ffff, 5, 4];
        let mut mem = MainMemory::new();
        for (i, v) in vals.iter().enumerate() {
            mem.writew(Addr(i as u32 * 4), *v);
        }

        let res = parse_and_exec::<C>(
            "sort",
            RegSet::from([(ArchReg::A0, 0), (ArchReg::A1, vals.len() as u32)]),
            mem,
        );

        let mut expect = vals;
        expect.sort_unstable();
        for (i, v) in expect.iter().enumerate() {
            assert_eq!(res.mem.readw(Addr(i as u32 * 4)), *v);
        }
    }

    #[test]
    fn test_fib<C: Cpu>() {
        let run = |n| {
            parse_and_exec::<C>(
                "fib",
                RegSet::from([(ArchReg::A0, n), (ArchReg::Sp, 4096)]),
                MainMemory::new(),
            )
            .regs
            .get(ArchReg::A0)
        };

        assert_eq!(run(0), 0);
        assert_eq!(run(1), 1);
        assert_eq!(run(2), 1);
        assert_eq!(run(10), 55);
    }

    #[test]
    fn test_forward<C: Cpu>() {
        let res = parse_and_exec::<C>("forward", RegSet::new(), MainMemory::new());
        assert_eq!(res.regs.get(ArchReg::A0), 7);
        assert_eq!(res.mem.readw(Addr(16)), 7);
        assert_eq!(res.mem.readw(Addr(32)), 7);
    }

    #[test]
    fn test_wrong_path<C: Cpu>() {
        let res = parse_and_exec::<C>("wrong_path", RegSet::new(), MainMemory::new());
        assert_eq!(res.regs.get(ArchReg::A1), 0);
        assert_eq!(res.regs.get(ArchReg::A2), 0);
        assert_eq!(res.regs.get(ArchReg::A3), 42);
        assert_eq!(res.mem.readw(Addr(0)), 0);
    }

    #[test]
    fn test_hazard_waw<C: Cpu>() {
        let res = parse_and_exec::<C>("waw", RegSet::new(), MainMemory::new());
        assert_eq!(res.regs.get(ArchReg::A0), 2);
        assert_eq!(res.regs.get(ArchReg::A1), 2);
    }

    #[test]
    fn test_hazard_war<C: Cpu>() {
        let res = parse_and_exec::<C>(
            "war",
            RegSet::from([(ArchReg::A0, 5)]),
            MainMemory::new(),
        );
        assert_eq!(res.regs.get(ArchReg::A1), 5);
        assert_eq!(res.regs.get(ArchReg::A0), 9);
        assert_eq!(res.regs.get(ArchReg::A2), 4);
    }

    #[instantiate_tests(<Emulated>)]
    mod emulated {}

    #[instantiate_tests(<OutOfOrder>)]
    mod out_of_order {}
}

/// Properties specific to the scheduling engine: the in-order interpreter is
/// the oracle, and commit must replay it exactly.
mod scheduling {
    use super::*;
    use tomasim::cpu::ExecResult;

    fn run_both(name: &str, regs: RegSet, mem: MainMemory) -> (ExecResult, ExecResult) {
        let prog = tomasim::load_program(format!("asm/{name}.asm")).unwrap();
        let emu = Emulated::new(prog.clone(), regs.clone(), mem.clone()).exec_all();
        let cfg = CpuConfig {
            record_commits: true,
            ..Default::default()
        };
        let ooo = OutOfOrder::with_config(cfg, prog, regs, mem).exec_all();
        (emu, ooo)
    }

    fn assert_equivalent(name: &str, regs: RegSet, mem: MainMemory) {
        let (emu, ooo) = run_both(name, regs, mem);
        assert_eq!(emu.regs, ooo.regs, "final registers diverge on {name}");
        assert_eq!(emu.mem, ooo.mem, "final memory diverges on {name}");
        assert_eq!(
            emu.stats.insts_retired, ooo.stats.insts_retired,
            "retired count diverges on {name}"
        );
        // Commit order equals program order restricted to the non-flushed
        // path, with identical register writes.
        assert_eq!(
            emu.stats.commit_log, ooo.stats.commit_log,
            "commit sequence diverges on {name}"
        );
    }

    #[test]
    fn test_commit_stream_matches_reference() {
        assert_equivalent(
            "gcd",
            RegSet::from([(ArchReg::A0, 270), (ArchReg::A1, 192)]),
            MainMemory::new(),
        );
        assert_equivalent(
            "fib",
            RegSet::from([(ArchReg::A0, 9), (ArchReg::Sp, 4096)]),
            MainMemory::new(),
        );
        assert_equivalent("forward", RegSet::new(), MainMemory::new());
        assert_equivalent("wrong_path", RegSet::new(), MainMemory::new());

        let mut mem = MainMemory::new();
        for i in 0..8 {
            mem.writew(Addr(i * 4), 100 - i);
        }
        assert_equivalent(
            "sort",
            RegSet::from([(ArchReg::A0, 0), (ArchReg::A1, 8)]),
            mem,
        );
    }

    #[test]
    fn test_wrong_path_speculation_is_contained() {
        let (_, ooo) = run_both("wrong_path", RegSet::new(), MainMemory::new());
        assert!(ooo.stats.mispredicts >= 1);
        // The wrong-path store never reached memory.
        assert_eq!(ooo.mem.readw(Addr(0)), 0);
    }

    #[test]
    fn test_forwarding_happens() {
        let (_, ooo) = run_both("forward", RegSet::new(), MainMemory::new());
        assert!(
            ooo.stats.forwarded_loads >= 1,
            "expected at least one forwarded load, stats: {:?}",
            ooo.stats
        );
    }

    #[test]
    fn test_correct_under_minimal_capacities() {
        // Every structure at its smallest: progress relies purely on
        // back-pressure, never on capacity.
        let cfg = CpuConfig {
            rob_slots: 2,
            rs_slots: 1,
            lsb_slots: 1,
            mem_latency: 4,
            record_commits: false,
        };

        let prog = tomasim::load_program("asm/fib.asm").unwrap();
        let regs = RegSet::from([(ArchReg::A0, 7), (ArchReg::Sp, 4096)]);
        let res = OutOfOrder::with_config(cfg, prog, regs, MainMemory::new()).exec_all();
        assert_eq!(res.regs.get(ArchReg::A0), 13);
    }
}
