use std::sync::Arc;

use dualbuf_core::{
    containers::DualDomainBuffer,
    memory::{AllocationMode, SimulatedAccelerator, SimulatedAcceleratorOptions},
    nalgebra::{Vector2, Vector4},
};

fn main() {
    // A host-only buffer behaves like a fixed-size 2D array. Creating it with dimensions allocates and zero-fills it
    let mut depth = DualDomainBuffer::<f32>::with_dims(Vector2::new(4, 3), false);
    if let Some(pixel) = depth.pixel_mut(1, 2) {
        *pixel = 2.5;
    }
    println!("Depth buffer: {:?}", depth);
    println!("Depth row 2: {:?}", &depth.host_data()[8..12]);

    // Dual-domain buffers also own accelerator memory. Here we use a simulated accelerator, but any type that
    // implements `Accelerator` works
    let accelerator = Arc::new(SimulatedAccelerator::new(SimulatedAcceleratorOptions {
        poison_byte: Some(0xCD),
        capacity_in_bytes: Some(64 * 1024 * 1024),
    }));
    let mode = AllocationMode::DualDomain(accelerator.clone());
    let mut colors = DualDomainBuffer::<Vector4<f32>>::with_dims_and_mode(Vector2::new(8, 8), mode);

    // Host and device memory are independent. Writing to the host does not change the device...
    colors.host_data_mut().fill(Vector4::new(1.0, 0.5, 0.25, 1.0));
    // ...until we explicitly transfer
    colors.update_device_from_host();

    // Corrupt the host copy and restore it from the device
    colors.host_data_mut().fill(Vector4::zeros());
    colors.update_host_from_device();
    println!("Restored color: {:?}", colors.pixel(0, 0));

    // `allocate` on an allocated buffer is ignored, even with different dimensions
    colors.allocate(Vector2::new(1024, 1024));
    println!("Dimensions after second allocate: {:?}", colors.dims());

    // `change_dims` reallocates and loses all content
    colors.change_dims(Vector2::new(16, 16));
    colors.clear(0);
    println!("Dimensions after change_dims: {:?}", colors.dims());

    drop(colors);
    println!("Accelerator after dropping the buffer: {:?}", accelerator.stats());
}
