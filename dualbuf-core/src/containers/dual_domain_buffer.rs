use std::fmt::{Debug, Formatter};

use bytemuck::Pod;
use log::{debug, trace, warn};
use nalgebra::Vector2;
use static_assertions::{assert_impl_all, assert_not_impl_any};

use super::storage::Storage;
use crate::memory::{
    accelerator_call, fatal_error, Accelerator, AllocationMode, DevicePtr, MemoryDomain,
};

/// A dense, row-major 2D array of `T` that owns host memory and, in dual-domain mode, a matching block of
/// accelerator memory
///
/// # Domains and coherence
///
/// The host block and the device block are independent copies. Nothing keeps them equal: writing to the
/// host block through [host_data_mut](DualDomainBuffer::host_data_mut) does not touch the device block, and
/// kernels writing device memory do not touch the host block. Only [update_device_from_host] and
/// [update_host_from_device] copy data between the domains, each in one direction.
///
/// # Allocation policy
///
/// [allocate] only has an effect on an unallocated buffer. Once allocated, further calls are ignored, even
/// with different dimensions. Resizing goes through [change_dims], which discards all content.
///
/// # Ownership
///
/// Each buffer exclusively owns its memory blocks. The type can be moved but not cloned; use [set_from] to
/// copy content between two buffers of the same size.
///
/// # Preconditions
///
/// Several operations expect an allocated buffer of a specific size. Violating these preconditions is a
/// caller error that is not reported. The buffer never accesses memory out of bounds though: host-side
/// size mismatches panic, device-side mismatches are rejected by the accelerator and abort the process, and
/// device copies between buffers on different accelerators are skipped.
///
/// ```
/// # use dualbuf_core::containers::DualDomainBuffer;
/// # use dualbuf_core::nalgebra::Vector2;
/// let mut depth = DualDomainBuffer::<f32>::with_dims(Vector2::new(4, 3), true);
/// depth.host_data_mut()[0] = 1.5;
/// depth.update_device_from_host();
/// depth.host_data_mut()[0] = 0.0;
/// depth.update_host_from_device();
/// assert_eq!(depth.host_data()[0], 1.5);
/// ```
///
/// [update_device_from_host]: DualDomainBuffer::update_device_from_host
/// [update_host_from_device]: DualDomainBuffer::update_host_from_device
/// [allocate]: DualDomainBuffer::allocate
/// [change_dims]: DualDomainBuffer::change_dims
/// [set_from]: DualDomainBuffer::set_from
pub struct DualDomainBuffer<T: Pod> {
    dims: Vector2<usize>,
    len: usize,
    mode: AllocationMode,
    storage: Option<Storage<T>>,
}

// SAFETY: the buffer exclusively owns its blocks, so moving it to another thread moves the only access
// path to them. It is deliberately not `Sync`.
unsafe impl<T: Pod + Send> Send for DualDomainBuffer<T> {}

assert_impl_all!(DualDomainBuffer<u8>: Send);
assert_not_impl_any!(DualDomainBuffer<u8>: Clone, Copy, Sync);

impl<T: Pod> DualDomainBuffer<T> {
    /// Creates an unallocated buffer with dimensions 0x0. If `dual_domain` is true, the buffer allocates
    /// device memory on the [default accelerator](crate::memory::default_accelerator) once it is allocated.
    pub fn new(dual_domain: bool) -> Self {
        Self::with_mode(AllocationMode::from_flag(dual_domain))
    }

    /// Creates an unallocated buffer with dimensions 0x0 that will use the given `mode` for its entire lifetime
    pub fn with_mode(mode: AllocationMode) -> Self {
        Self {
            dims: Vector2::zeros(),
            len: 0,
            mode,
            storage: None,
        }
    }

    /// Creates a buffer with the given `dims` and sets all of its bytes to zero, in both domains
    pub fn with_dims(dims: Vector2<usize>, dual_domain: bool) -> Self {
        Self::with_dims_and_mode(dims, AllocationMode::from_flag(dual_domain))
    }

    /// Like [with_dims](DualDomainBuffer::with_dims), but with an explicit allocation `mode`
    pub fn with_dims_and_mode(dims: Vector2<usize>, mode: AllocationMode) -> Self {
        let mut buffer = Self::with_mode(mode);
        buffer.allocate(dims);
        buffer.clear(0);
        buffer
    }

    /// Allocates storage for `dims` if this buffer is not allocated yet. On an allocated buffer this does
    /// nothing, irrespective of `dims`.
    ///
    /// The content of the new storage is unspecified. Allocation failure in either domain aborts the process.
    pub fn allocate(&mut self, dims: Vector2<usize>) {
        if self.storage.is_some() {
            trace!(
                "Ignoring allocation of {}x{} on a buffer that is already allocated with {}x{}",
                dims.x,
                dims.y,
                self.dims.x,
                self.dims.y
            );
            return;
        }

        let len = match dims.x.checked_mul(dims.y) {
            Some(len) => len,
            None => fatal_error(format_args!(
                "Buffer dimensions {}x{} overflow the element count",
                dims.x, dims.y
            )),
        };
        let storage = Storage::allocate(len, &self.mode);
        debug!(
            "Allocated {}x{} buffer ({} bytes per domain, {})",
            dims.x,
            dims.y,
            storage.size_in_bytes(),
            if self.mode.is_dual_domain() {
                "dual-domain"
            } else {
                "host only"
            }
        );
        self.dims = dims;
        self.len = len;
        self.storage = Some(storage);
    }

    /// Sets every byte of the buffer to `value`. In dual-domain mode the device block is filled through the
    /// accelerator, independently of the host block.
    pub fn clear(&mut self, value: u8) {
        let Self { mode, storage, .. } = self;
        let storage = match storage {
            Some(storage) => storage,
            None => {
                warn!("clear() called on an unallocated buffer");
                return;
            }
        };

        storage.host.as_bytes_mut().fill(value);
        if let (Some(device), Some(accelerator)) = (storage.device, mode.accelerator()) {
            accelerator_call!(
                accelerator,
                memset_device(device.ptr, value, device.size_in_bytes)
            );
        }
    }

    /// Resizes the buffer to `dims`, discarding all content. If the buffer is already allocated with exactly
    /// `dims`, nothing happens and the content is preserved.
    ///
    /// New storage is not cleared. Call [clear](DualDomainBuffer::clear) afterwards if defined content is
    /// required.
    pub fn change_dims(&mut self, dims: Vector2<usize>) {
        if self.storage.is_none() || dims != self.dims {
            self.release();
            self.allocate(dims);
        }
    }

    /// Copies the host block over the device block. Does nothing on a host-only buffer.
    pub fn update_device_from_host(&mut self) {
        let accelerator = match self.mode.accelerator() {
            Some(accelerator) => accelerator,
            None => return,
        };
        match &self.storage {
            Some(Storage {
                host,
                device: Some(device),
            }) => {
                trace!(
                    "Transferring {} bytes {} -> {}",
                    device.size_in_bytes,
                    MemoryDomain::Host,
                    MemoryDomain::Device
                );
                accelerator_call!(
                    accelerator,
                    copy_host_to_device(device.ptr, host.as_bytes())
                );
            }
            _ => warn!("update_device_from_host() called on an unallocated buffer"),
        }
    }

    /// Copies the device block over the host block. Does nothing on a host-only buffer.
    pub fn update_host_from_device(&mut self) {
        let Self { mode, storage, .. } = self;
        let accelerator = match mode.accelerator() {
            Some(accelerator) => accelerator,
            None => return,
        };
        match storage {
            Some(Storage {
                host,
                device: Some(device),
            }) => {
                trace!(
                    "Transferring {} bytes {} -> {}",
                    device.size_in_bytes,
                    MemoryDomain::Device,
                    MemoryDomain::Host
                );
                accelerator_call!(
                    accelerator,
                    copy_device_to_host(host.as_bytes_mut(), device.ptr)
                );
            }
            _ => warn!("update_host_from_device() called on an unallocated buffer"),
        }
    }

    /// Copies the content of `source` into this buffer, without resizing. `copy_host` copies the host
    /// blocks, `copy_device` copies the device blocks (only if both buffers are dual-domain). Any combination
    /// of the two flags is valid.
    ///
    /// Both buffers must have the same number of elements. The device copy is issued on the accelerator of
    /// this buffer. If `source` allocates its device memory on a different accelerator, the device copy is
    /// skipped and a warning is logged.
    ///
    /// # Panics
    ///
    /// If `copy_host` is set and the host blocks differ in size
    pub fn set_from(&mut self, source: &DualDomainBuffer<T>, copy_host: bool, copy_device: bool) {
        debug_assert_eq!(
            self.len, source.len,
            "set_from() requires buffers with equal element counts"
        );
        let Self { mode, storage, .. } = self;
        let (target, source_storage) = match (storage, &source.storage) {
            (Some(target), Some(source_storage)) => (target, source_storage),
            _ => {
                warn!("set_from() called with an unallocated buffer");
                return;
            }
        };

        if copy_host {
            target
                .host
                .as_mut_slice()
                .copy_from_slice(source_storage.host.as_slice());
        }
        if copy_device {
            if let (Some(accelerator), Some(target_device), Some(source_device)) =
                (mode.accelerator(), target.device, source_storage.device)
            {
                // Device handles are only meaningful to the accelerator that issued them
                if !mode.shares_accelerator_with(&source.mode) {
                    warn!(
                        "set_from() skips the device copy: source lives on accelerator '{}', this buffer on '{}'",
                        source.accelerator().map(|acc| acc.name()).unwrap_or("none"),
                        accelerator.name()
                    );
                    return;
                }
                accelerator_call!(
                    accelerator,
                    copy_device_to_device(
                        target_device.ptr,
                        source_device.ptr,
                        source_device.size_in_bytes
                    )
                );
            }
        }
    }

    /// Frees all memory of this buffer in both domains. Calling this on an unallocated buffer does nothing.
    /// The dimensions are kept but become meaningless until the next allocation.
    pub fn release(&mut self) {
        if let Some(storage) = self.storage.take() {
            debug!("Releasing {}x{} buffer", self.dims.x, self.dims.y);
            storage.free(&self.mode);
        }
    }

    /// The dimensions of this buffer (`x` is the width, `y` the height)
    pub fn dims(&self) -> Vector2<usize> {
        self.dims
    }

    pub fn width(&self) -> usize {
        self.dims.x
    }

    pub fn height(&self) -> usize {
        self.dims.y
    }

    /// Number of elements (`width * height`) of the last allocation
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of one domain's block in bytes, or zero if the buffer is unallocated
    pub fn size_in_bytes(&self) -> usize {
        self.storage
            .as_ref()
            .map(|storage| storage.size_in_bytes())
            .unwrap_or(0)
    }

    pub fn is_allocated(&self) -> bool {
        self.storage.is_some()
    }

    pub fn is_dual_domain(&self) -> bool {
        self.mode.is_dual_domain()
    }

    pub fn mode(&self) -> &AllocationMode {
        &self.mode
    }

    /// The accelerator this buffer allocates device memory on, if it is dual-domain
    pub fn accelerator(&self) -> Option<&dyn Accelerator> {
        self.mode.accelerator()
    }

    /// The host block as a slice. Empty if the buffer is unallocated.
    pub fn host_data(&self) -> &[T] {
        match &self.storage {
            Some(storage) => storage.host.as_slice(),
            None => &[],
        }
    }

    /// The host block as a mutable slice. Empty if the buffer is unallocated.
    pub fn host_data_mut(&mut self) -> &mut [T] {
        match &mut self.storage {
            Some(storage) => storage.host.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Handle to the device block, present only if the buffer is dual-domain and allocated
    pub fn device_ptr(&self) -> Option<DevicePtr> {
        self.storage
            .as_ref()
            .and_then(|storage| storage.device)
            .map(|device| device.ptr)
    }

    /// Whether this buffer currently holds memory in `domain`
    pub fn has_domain(&self, domain: MemoryDomain) -> bool {
        match domain {
            MemoryDomain::Host => self.storage.is_some(),
            MemoryDomain::Device => self.device_ptr().is_some(),
        }
    }

    /// The host element at column `x` and row `y`, or `None` if the position is outside of the buffer
    pub fn pixel(&self, x: usize, y: usize) -> Option<&T> {
        if x >= self.dims.x || y >= self.dims.y {
            return None;
        }
        self.host_data().get(y * self.dims.x + x)
    }

    /// Mutable version of [pixel](DualDomainBuffer::pixel)
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if x >= self.dims.x || y >= self.dims.y {
            return None;
        }
        let index = y * self.dims.x + x;
        self.host_data_mut().get_mut(index)
    }
}

impl<T: Pod> Default for DualDomainBuffer<T> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<T: Pod> Drop for DualDomainBuffer<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Pod> Debug for DualDomainBuffer<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualDomainBuffer")
            .field("width", &self.dims.x)
            .field("height", &self.dims.y)
            .field("len", &self.len)
            .field("allocated", &self.is_allocated())
            .field("mode", &self.mode)
            .finish()
    }
}
