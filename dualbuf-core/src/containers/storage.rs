use std::{
    alloc::{self, Layout},
    marker::PhantomData,
    mem,
    ptr::NonNull,
};

use bytemuck::Pod;

use crate::{
    memory::{accelerator_call, fatal_error, Accelerator, AllocationMode, DevicePtr},
    util::{size_in_bytes_of, view_raw_bytes, view_raw_bytes_mut},
};

/// Where the memory of a [HostBlock] came from, which decides how it has to be freed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostOrigin {
    /// Zero bytes, nothing was allocated
    Empty,
    Heap(Layout),
    Pinned,
}

/// Owned host memory for `len` elements of type `T`
pub(crate) struct HostBlock<T> {
    ptr: NonNull<T>,
    len: usize,
    origin: HostOrigin,
    _marker: PhantomData<T>,
}

impl<T: Pod> HostBlock<T> {
    fn allocate(len: usize, size_in_bytes: usize, accelerator: Option<&dyn Accelerator>) -> Self {
        if size_in_bytes == 0 {
            return Self {
                ptr: NonNull::dangling(),
                len,
                origin: HostOrigin::Empty,
                _marker: PhantomData,
            };
        }

        match accelerator {
            None => {
                let layout = match Layout::array::<T>(len) {
                    Ok(layout) => layout,
                    Err(_) => fatal_error(format_args!(
                        "Host allocation of {} elements exceeds the address space",
                        len
                    )),
                };
                // Zeroed so that reading a freshly resized buffer is defined, even though callers must not rely
                // on the content
                // SAFETY: `layout` has a non-zero size
                let raw = unsafe { alloc::alloc_zeroed(layout) };
                let ptr = match NonNull::new(raw as *mut T) {
                    Some(ptr) => ptr,
                    None => alloc::handle_alloc_error(layout),
                };
                Self {
                    ptr,
                    len,
                    origin: HostOrigin::Heap(layout),
                    _marker: PhantomData,
                }
            }
            Some(accelerator) => {
                let raw = accelerator_call!(accelerator, malloc_host(size_in_bytes));
                if raw.as_ptr() as usize % mem::align_of::<T>() != 0 {
                    fatal_error(format_args!(
                        "{} returned pinned memory that is not aligned to {} bytes",
                        accelerator.name(),
                        mem::align_of::<T>()
                    ));
                }
                Self {
                    ptr: raw.cast(),
                    len,
                    origin: HostOrigin::Pinned,
                    _marker: PhantomData,
                }
            }
        }
    }

    fn free(self, accelerator: Option<&dyn Accelerator>) {
        match (self.origin, accelerator) {
            (HostOrigin::Empty, _) => {}
            (HostOrigin::Heap(layout), _) => {
                // SAFETY: allocated in `allocate` with exactly this layout; `self` is consumed
                unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, layout) }
            }
            (HostOrigin::Pinned, Some(accelerator)) => {
                let size_in_bytes = mem::size_of::<T>() * self.len;
                // SAFETY: allocated through `malloc_host` of the same accelerator with this size; `self` is
                // consumed, so no slice into the block survives
                unsafe {
                    accelerator_call!(accelerator, free_host(self.ptr.cast(), size_in_bytes))
                }
            }
            (HostOrigin::Pinned, None) => fatal_error(format_args!(
                "Pinned host block freed without its accelerator"
            )),
        }
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        // SAFETY: `ptr` points to `len` initialized elements owned by this block (or is dangling with a
        // byte size of zero)
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: see `as_slice`; `&mut self` guarantees exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        view_raw_bytes(self.as_slice())
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        view_raw_bytes_mut(self.as_mut_slice())
    }
}

/// Owned block of accelerator memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeviceBlock {
    pub(crate) ptr: DevicePtr,
    pub(crate) size_in_bytes: usize,
}

/// The storage of an allocated buffer: always a host block, plus a device block in dual-domain mode
///
/// `Storage` does not free itself on drop, since freeing needs the accelerator that the blocks came
/// from. The owning buffer calls [Storage::free] with its mode.
pub(crate) struct Storage<T> {
    pub(crate) host: HostBlock<T>,
    pub(crate) device: Option<DeviceBlock>,
}

impl<T: Pod> Storage<T> {
    pub(crate) fn allocate(len: usize, mode: &AllocationMode) -> Self {
        let size_in_bytes = match size_in_bytes_of::<T>(len) {
            Some(size) if size <= isize::MAX as usize => size,
            _ => fatal_error(format_args!(
                "Buffer of {} elements of {} bytes each exceeds the address space",
                len,
                mem::size_of::<T>()
            )),
        };

        let accelerator = mode.accelerator();
        let host = HostBlock::allocate(len, size_in_bytes, accelerator);
        let device = accelerator.map(|accelerator| DeviceBlock {
            ptr: accelerator_call!(accelerator, malloc_device(size_in_bytes)),
            size_in_bytes,
        });
        Self { host, device }
    }

    pub(crate) fn free(self, mode: &AllocationMode) {
        let accelerator = mode.accelerator();
        if let (Some(device), Some(accelerator)) = (self.device, accelerator) {
            accelerator_call!(accelerator, free_device(device.ptr));
        }
        self.host.free(accelerator);
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        mem::size_of::<T>() * self.host.len
    }
}
