use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dualbuf_core::{containers::DualDomainBuffer, nalgebra::Vector2};

fn bench(c: &mut Criterion) {
    let mut host_only = DualDomainBuffer::<f32>::with_dims(Vector2::new(640, 480), false);
    let mut dual = DualDomainBuffer::<f32>::with_dims(Vector2::new(640, 480), true);

    c.bench_function("clear_host_only_640x480", |b| {
        b.iter(|| host_only.clear(black_box(0)));
    });
    c.bench_function("clear_dual_domain_640x480", |b| {
        b.iter(|| dual.clear(black_box(0)));
    });
    c.bench_function("change_dims_alternating", |b| {
        let mut buffer = DualDomainBuffer::<f32>::new(true);
        let mut large = false;
        b.iter(|| {
            large = !large;
            let dims = if large {
                Vector2::new(640, 480)
            } else {
                Vector2::new(320, 240)
            };
            buffer.change_dims(dims);
        });
    });
}

criterion_group! {
    name = clear;
    config = Criterion::default().sample_size(40);
    targets = bench
}
criterion_main!(clear);
