use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dualbuf_core::{
    containers::DualDomainBuffer,
    memory::{AllocationMode, SimulatedAccelerator},
    nalgebra::{Vector2, Vector4},
};
use rand::{thread_rng, Rng};

fn gen_random_colors(count: usize) -> Vec<Vector4<f32>> {
    let mut rng = thread_rng();
    (0..count)
        .map(|_| Vector4::new(rng.gen(), rng.gen(), rng.gen(), 1.0))
        .collect()
}

fn bench(c: &mut Criterion) {
    let mode = AllocationMode::DualDomain(Arc::new(SimulatedAccelerator::default()));
    let mut buffer =
        DualDomainBuffer::<Vector4<f32>>::with_dims_and_mode(Vector2::new(640, 480), mode.clone());
    buffer
        .host_data_mut()
        .copy_from_slice(&gen_random_colors(640 * 480));
    let mut target =
        DualDomainBuffer::<Vector4<f32>>::with_dims_and_mode(Vector2::new(640, 480), mode);

    c.bench_function("update_device_from_host_640x480", |b| {
        b.iter(|| buffer.update_device_from_host());
    });
    c.bench_function("update_host_from_device_640x480", |b| {
        b.iter(|| buffer.update_host_from_device());
    });
    c.bench_function("set_from_host_640x480", |b| {
        b.iter(|| {
            target.set_from(&buffer, true, false);
            black_box(target.host_data());
        });
    });
    c.bench_function("set_from_device_640x480", |b| {
        b.iter(|| target.set_from(&buffer, false, true));
    });
}

criterion_group! {
    name = transfer;
    config = Criterion::default().sample_size(40);
    targets = bench
}
criterion_main!(transfer);
