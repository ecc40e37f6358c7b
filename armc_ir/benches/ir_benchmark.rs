use armc_ir::function::FuncKind;
use armc_ir::ids::{BlockId, FunctionId};
use armc_ir::instruction::{BinaryOp, InstKind, ResultRole};
use armc_ir::liveness;
use armc_ir::module::Module;
use armc_ir::regalloc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A chain of `n` values each live across its neighbors — enough mutual
/// interference to exercise conflict-graph construction without needing a
/// full front-end pipeline.
fn build_chain_function(n: usize) -> (Module, FunctionId) {
    let mut m = Module::new();
    let f = m.new_function("F*0_0$bench", FuncKind::Int, BlockId(0));
    let entry = m.new_block(f, 1, true);
    m.function_mut(f).blocks = vec![entry];

    let one = m.intern_number(1);
    let mut prev = one;
    for i in 0..n {
        let id = m.create_instruction(
            InstKind::Binary { op: BinaryOp::Add, lhs: prev, rhs: one },
            entry,
            ResultRole::LValue(format!("v{i}")),
        );
        m.push_instruction_to_block(entry, id);
        prev = id;
    }
    let ret = m.create_instruction(InstKind::Return { value: Some(prev) }, entry, ResultRole::NoResult);
    m.push_instruction_to_block(entry, ret);

    (m, f)
}

fn bench_liveness_and_regalloc(c: &mut Criterion, label: &str, n: usize) {
    c.bench_function(label, |b| {
        b.iter_batched(
            || build_chain_function(black_box(n)),
            |(mut m, f)| {
                liveness::compute_variable_weights(&mut m, f);
                liveness::propagate_liveness(&mut m, f);
                regalloc::allocate_function(&mut m, f);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_chain_64(c: &mut Criterion) {
    bench_liveness_and_regalloc(c, "liveness_and_regalloc_chain_64", 64);
}

fn bench_chain_512(c: &mut Criterion) {
    bench_liveness_and_regalloc(c, "liveness_and_regalloc_chain_512", 512);
}

criterion_group!(benches, bench_chain_64, bench_chain_512);
criterion_main!(benches);
