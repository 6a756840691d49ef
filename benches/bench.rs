use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tomasim::{
    cpu::Cpu, inst::ArchReg, mem::MainMemory, out_of_order::OutOfOrder, parse_and_exec,
    regs::RegSet,
};

fn fib(n: u32) -> u32 {
    parse_and_exec::<OutOfOrder>(
        "fib",
        RegSet::from([(ArchReg::A0, n), (ArchReg::Sp, 4096)]),
        MainMemory::new(),
    )
    .regs
    .get(ArchReg::A0)
}

fn fib_recursive(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive");
    group.sample_size(10);
    group.bench_function("fib 18", |b| b.iter(|| fib(black_box(18))));
    group.finish();
}

criterion_group!(benches, fib_recursive);
criterion_main!(benches);
