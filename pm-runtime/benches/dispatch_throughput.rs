use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pm_events::{EventData, EventHandle, EventKind};
use pm_model::JoinOp;
use pm_runtime::StateMachine;
use pm_table::{compile_join_op, JoinMember, OptimizeOptions, ProgramTable};

fn term(idx: u32) -> EventHandle {
    EventHandle::new(EventKind::Term, idx).unwrap()
}

fn expr(idx: u32) -> EventHandle {
    EventHandle::new(EventKind::Expression, idx).unwrap()
}

/// A table with a mix of join kinds over a shared vocabulary of 32 terms,
/// approximating the branching factor a real pattern set presents to the
/// dispatcher.
fn build_table() -> ProgramTable {
    let mut table = ProgramTable::new();
    for base in 0..32u32 {
        let a = term(base + 1);
        let b = term(((base + 5) % 32) + 1);
        let c = term(((base + 11) % 32) + 1);

        let seq = compile_join_op(
            JoinOp::Sequence,
            &[JoinMember::new(a, 0), JoinMember::new(b, 0)],
            20,
            0,
            expr(base + 1),
            base + 1,
        )
        .unwrap();
        table.install_join(seq).unwrap();

        let within = compile_join_op(
            JoinOp::Within,
            &[JoinMember::new(a, 0), JoinMember::new(b, 0), JoinMember::new(c, 0)],
            8,
            0,
            expr(base + 100),
            base + 100,
        )
        .unwrap();
        table.install_join(within).unwrap();
    }
    table.optimize(OptimizeOptions::default()).unwrap();
    table
}

fn dispatch_throughput(c: &mut Criterion) {
    let table = build_table();

    c.bench_function("dispatch_10k_terms", |bencher| {
        bencher.iter(|| {
            let mut sm = StateMachine::new(&table);
            for pos in 1..10_000u32 {
                let handle = term((pos % 32) + 1);
                let data = EventData::single(handle, pos, 0, pos);
                sm.set_current_pos(pos).unwrap();
                sm.do_transition(handle, data).unwrap();
            }
            black_box(sm.results().len())
        });
    });
}

criterion_group!(benches, dispatch_throughput);
criterion_main!(benches);
