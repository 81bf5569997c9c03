use criterion::{black_box, criterion_group, criterion_main, Criterion};

use trellis_core::reactive::Runtime;
use trellis_core::session::Session;
use trellis_core::view::text;

fn signal_propagation(c: &mut Criterion) {
    let rt = Runtime::new();
    let source = rt.signal(0u64);
    let effects: Vec<_> = (0..100)
        .map(|_| {
            let source = source.clone();
            rt.effect(move || {
                black_box(source.get());
            })
        })
        .collect();

    let mut next = 0u64;
    c.bench_function("set with 100 effects", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
        })
    });

    c.bench_function("batched set with 100 effects", |b| {
        b.iter(|| {
            rt.batch(|| {
                for _ in 0..10 {
                    next += 1;
                    source.set(next);
                }
            })
        })
    });

    drop(effects);
}

fn computed_chain(c: &mut Criterion) {
    let rt = Runtime::new();
    let source = rt.signal(1i64);
    let mut tip = {
        let source = source.clone();
        rt.computed(move || source.get())
    };
    for _ in 0..50 {
        let prev = tip.clone();
        tip = rt.computed(move || prev.get().unwrap_or_default() + 1);
    }

    let mut next = 1i64;
    c.bench_function("computed chain of 50", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
            black_box(tip.get())
        })
    });
}

fn reconcile_islands(c: &mut Criterion) {
    let session = Session::ephemeral();
    let count = session.runtime().signal(0u32);
    for i in 0..50 {
        let count = count.clone();
        session.register_island(&format!("island-{i}"), move || {
            text(if i % 2 == 0 { count.get() } else { i })
        });
    }

    c.bench_function("reconcile 50 islands", |b| {
        b.iter(|| {
            count.update(|n| *n += 1);
            black_box(session.reconcile())
        })
    });
}

criterion_group!(benches, signal_propagation, computed_chain, reconcile_islands);
criterion_main!(benches);
