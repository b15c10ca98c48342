use std::{fmt::Debug, ptr::NonNull};

use anyhow::Result;

use super::DevicePtr;

/// Minimum alignment of pinned host memory returned by [Accelerator::malloc_host]. Accelerator runtimes
/// hand out page-locked memory at much coarser granularity, so this covers every element type a buffer
/// can hold.
pub const PINNED_HOST_ALIGNMENT: usize = 256;

/// The primitives of an accelerator runtime that a dual-domain buffer relies on
///
/// Implementations may queue device operations asynchronously. Callers that need a completed transfer
/// before reading host memory have to synchronize with the runtime themselves.
pub trait Accelerator: Debug + Send + Sync {
    /// Human-readable name of this accelerator, used in log output
    fn name(&self) -> &str;

    /// Allocates `size_in_bytes` bytes of device memory. The content of the new block is unspecified.
    fn malloc_device(&self, size_in_bytes: usize) -> Result<DevicePtr>;

    /// Frees a block previously returned by [malloc_device](Accelerator::malloc_device)
    fn free_device(&self, ptr: DevicePtr) -> Result<()>;

    /// Allocates `size_in_bytes` bytes of page-locked host memory, aligned to at least
    /// [PINNED_HOST_ALIGNMENT]. The returned memory is initialized, but its content is unspecified.
    fn malloc_host(&self, size_in_bytes: usize) -> Result<NonNull<u8>>;

    /// Frees a block previously returned by [malloc_host](Accelerator::malloc_host)
    ///
    /// # Safety
    ///
    /// `ptr` must come from `malloc_host` on this accelerator with the same `size_in_bytes`, and no
    /// reference into the block may outlive this call.
    unsafe fn free_host(&self, ptr: NonNull<u8>, size_in_bytes: usize) -> Result<()>;

    /// Sets the first `size_in_bytes` bytes of the device block at `ptr` to `value`
    fn memset_device(&self, ptr: DevicePtr, value: u8, size_in_bytes: usize) -> Result<()>;

    /// Overwrites the start of the device block `dst` with `src`
    fn copy_host_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()>;

    /// Overwrites `dst` with the start of the device block `src`
    fn copy_device_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()>;

    /// Copies `size_in_bytes` bytes from the device block `src` to the device block `dst`
    fn copy_device_to_device(
        &self,
        dst: DevicePtr,
        src: DevicePtr,
        size_in_bytes: usize,
    ) -> Result<()>;
}
