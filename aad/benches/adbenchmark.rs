use aad::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn ad_benchmark(c: &mut Criterion) {
    c.bench_function("record 100k multiplications", |b| {
        b.iter(|| {
            let cp = Tape::set_mark();
            let a = Number::new(1.0);
            let b = Number::new(1.000001);
            let mut c = a * b;
            for _ in 0..100000 {
                c = c * b;
            }
            black_box(c.value());
            Tape::rewind_active_to(cp);
        })
    });

    c.bench_function("record and propagate 100k multiplications", |b| {
        b.iter(|| {
            let cp = Tape::set_mark();
            let a = Number::new(1.0);
            let b = Number::new(1.000001);
            let mut c = a * b;
            for _ in 0..100000 {
                c *= b;
            }
            c.propagate_to_mark().unwrap();
            black_box(b.adjoint().unwrap());
            Tape::rewind_active_to(cp);
        })
    });

    c.bench_function("newton step on a cubic", |b| {
        b.iter(|| {
            let cp = Tape::set_mark();
            let x = Number::new(black_box(-20.0));
            let y = x * x * x - x * x + 2.0;
            y.propagate_to_mark().unwrap();
            black_box(y.value() / x.adjoint().unwrap());
            Tape::rewind_active_to(cp);
        })
    });
}

criterion_group!(benches, ad_benchmark);
criterion_main!(benches);
