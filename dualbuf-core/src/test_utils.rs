use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use nalgebra::Vector4;
use rand::{prelude::Distribution, thread_rng, Rng};

use crate::{
    containers::DualDomainBuffer,
    memory::{AllocationMode, SimulatedAccelerator},
    util::view_raw_bytes_mut,
};

#[derive(Default, Copy, Clone, PartialEq, Eq, Debug, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

pub(crate) struct DefaultPixelDistribution;

impl Distribution<Rgba8> for DefaultPixelDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Rgba8 {
        Rgba8 {
            r: rng.gen(),
            g: rng.gen(),
            b: rng.gen(),
            a: rng.gen(),
        }
    }
}

impl Distribution<Vector4<f32>> for DefaultPixelDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector4<f32> {
        Vector4::new(rng.gen(), rng.gen(), rng.gen(), rng.gen())
    }
}

impl Distribution<u32> for DefaultPixelDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen()
    }
}

pub(crate) fn random_pattern<T>(count: usize) -> Vec<T>
where
    DefaultPixelDistribution: Distribution<T>,
{
    thread_rng()
        .sample_iter(DefaultPixelDistribution)
        .take(count)
        .collect()
}

/// A fresh simulated accelerator, so that its counters only reflect the calling test
pub(crate) fn simulated_mode() -> (Arc<SimulatedAccelerator>, AllocationMode) {
    let accelerator = Arc::new(SimulatedAccelerator::default());
    let mode = AllocationMode::DualDomain(accelerator.clone());
    (accelerator, mode)
}

/// Reads the device block of `buffer` without going through a counted transfer
pub(crate) fn read_device<T: Pod>(
    accelerator: &SimulatedAccelerator,
    buffer: &DualDomainBuffer<T>,
) -> Vec<T> {
    let device_ptr = buffer
        .device_ptr()
        .expect("Buffer has no device block");
    let bytes = accelerator
        .inspect_device(device_ptr)
        .expect("Could not inspect device block");
    let mut values = vec![T::zeroed(); buffer.len()];
    view_raw_bytes_mut(&mut values).copy_from_slice(&bytes);
    values
}
