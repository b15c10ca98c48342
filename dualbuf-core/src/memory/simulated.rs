use std::{
    alloc::{self, Layout},
    collections::HashMap,
    fmt::{Debug, Formatter},
    ptr::NonNull,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, bail, Context, Result};
use log::{trace, warn};

use super::{Accelerator, DevicePtr, PINNED_HOST_ALIGNMENT};

/// Configuration of a [SimulatedAccelerator]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulatedAcceleratorOptions {
    /// Byte written into every freshly allocated device or pinned host block, standing in for the
    /// unspecified content of real uninitialized memory. `None` writes zeros.
    pub poison_byte: Option<u8>,
    /// Upper limit for live device memory. `None` means unlimited.
    pub capacity_in_bytes: Option<usize>,
}

impl Default for SimulatedAcceleratorOptions {
    fn default() -> Self {
        Self {
            poison_byte: Some(0xCD),
            capacity_in_bytes: None,
        }
    }
}

/// Counters of a [SimulatedAccelerator]. `live_*` values describe memory that is currently allocated, all
/// other values are totals since the accelerator was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulatedAcceleratorStats {
    pub live_device_allocations: usize,
    pub live_device_bytes: usize,
    pub live_pinned_allocations: usize,
    pub live_pinned_bytes: usize,
    pub device_allocations: usize,
    pub pinned_allocations: usize,
    pub device_fills: usize,
    pub host_to_device_copies: usize,
    pub device_to_host_copies: usize,
    pub device_to_device_copies: usize,
}

#[derive(Default)]
struct SimulatedState {
    next_handle: u64,
    device_blocks: HashMap<u64, Box<[u8]>>,
    /// Pinned host blocks by address, together with the size that was requested for them
    pinned_blocks: HashMap<usize, (Layout, usize)>,
    stats: SimulatedAcceleratorStats,
}

impl SimulatedState {
    fn device_block(&self, ptr: DevicePtr) -> Result<&[u8]> {
        self.device_blocks
            .get(&ptr.as_raw())
            .map(|block| &block[..])
            .ok_or_else(|| anyhow!("Unknown device pointer {}", ptr))
    }

    fn device_block_mut(&mut self, ptr: DevicePtr) -> Result<&mut [u8]> {
        self.device_blocks
            .get_mut(&ptr.as_raw())
            .map(|block| &mut block[..])
            .ok_or_else(|| anyhow!("Unknown device pointer {}", ptr))
    }
}

fn check_range(ptr: DevicePtr, block_size: usize, requested_size: usize) -> Result<()> {
    if requested_size > block_size {
        bail!(
            "Access of {} bytes exceeds device block {} of {} bytes",
            requested_size,
            ptr,
            block_size
        );
    }
    Ok(())
}

/// An [Accelerator] that emulates device memory inside the host process
///
/// Device blocks live in a private arena that is disjoint from any buffer's host storage, so the content of
/// the two domains diverges exactly as it would with real accelerator memory. Every operation completes
/// before it returns. Misuse that a real runtime would report (unknown or double frees, out-of-range
/// copies, exhausted memory) is reported as an error.
pub struct SimulatedAccelerator {
    options: SimulatedAcceleratorOptions,
    state: Mutex<SimulatedState>,
}

impl SimulatedAccelerator {
    pub fn new(options: SimulatedAcceleratorOptions) -> Self {
        Self {
            options,
            state: Mutex::new(SimulatedState {
                next_handle: 1,
                ..Default::default()
            }),
        }
    }

    pub fn options(&self) -> &SimulatedAcceleratorOptions {
        &self.options
    }

    /// Returns a snapshot of the counters of this accelerator
    pub fn stats(&self) -> SimulatedAcceleratorStats {
        match self.state.lock() {
            Ok(state) => state.stats,
            Err(poisoned) => poisoned.into_inner().stats,
        }
    }

    /// Returns a copy of the full content of the device block at `ptr`. Unlike
    /// [copy_device_to_host](Accelerator::copy_device_to_host) this is not counted as a transfer.
    pub fn inspect_device(&self, ptr: DevicePtr) -> Result<Vec<u8>> {
        let state = self.lock()?;
        Ok(state.device_block(ptr)?.to_vec())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimulatedState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("SimulatedAccelerator state is poisoned"))
    }

    fn fresh_byte(&self) -> u8 {
        self.options.poison_byte.unwrap_or(0)
    }
}

impl Default for SimulatedAccelerator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl Debug for SimulatedAccelerator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedAccelerator")
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Accelerator for SimulatedAccelerator {
    fn name(&self) -> &str {
        "simulated"
    }

    fn malloc_device(&self, size_in_bytes: usize) -> Result<DevicePtr> {
        let mut state = self.lock()?;
        if let Some(capacity) = self.options.capacity_in_bytes {
            let in_use = state.stats.live_device_bytes;
            if in_use.saturating_add(size_in_bytes) > capacity {
                bail!(
                    "Out of device memory: requested {} bytes with {} of {} bytes in use",
                    size_in_bytes,
                    in_use,
                    capacity
                );
            }
        }

        let handle = state.next_handle;
        state.next_handle += 1;
        state.device_blocks.insert(
            handle,
            vec![self.fresh_byte(); size_in_bytes].into_boxed_slice(),
        );
        state.stats.device_allocations += 1;
        state.stats.live_device_allocations += 1;
        state.stats.live_device_bytes += size_in_bytes;

        let ptr = DevicePtr::from_raw(handle);
        trace!("malloc_device: {} bytes at {}", size_in_bytes, ptr);
        Ok(ptr)
    }

    fn free_device(&self, ptr: DevicePtr) -> Result<()> {
        let mut state = self.lock()?;
        let block = state
            .device_blocks
            .remove(&ptr.as_raw())
            .ok_or_else(|| anyhow!("Free of unknown device pointer {}", ptr))?;
        state.stats.live_device_allocations -= 1;
        state.stats.live_device_bytes -= block.len();
        trace!("free_device: {} bytes at {}", block.len(), ptr);
        Ok(())
    }

    fn malloc_host(&self, size_in_bytes: usize) -> Result<NonNull<u8>> {
        let layout = Layout::from_size_align(size_in_bytes.max(1), PINNED_HOST_ALIGNMENT)
            .with_context(|| format!("Invalid pinned allocation of {} bytes", size_in_bytes))?;
        // SAFETY: `layout` has a non-zero size
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| anyhow!("Pinned allocation of {} bytes failed", size_in_bytes))?;
        // SAFETY: the block was just allocated with at least `layout.size()` bytes
        unsafe {
            ptr.as_ptr().write_bytes(self.fresh_byte(), layout.size());
        }

        let mut state = match self.lock() {
            Ok(state) => state,
            Err(err) => {
                // SAFETY: allocated above with the same layout and not handed out
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
                return Err(err);
            }
        };
        state
            .pinned_blocks
            .insert(ptr.as_ptr() as usize, (layout, size_in_bytes));
        state.stats.pinned_allocations += 1;
        state.stats.live_pinned_allocations += 1;
        state.stats.live_pinned_bytes += size_in_bytes;
        trace!("malloc_host: {} pinned bytes", size_in_bytes);
        Ok(ptr)
    }

    unsafe fn free_host(&self, ptr: NonNull<u8>, size_in_bytes: usize) -> Result<()> {
        let mut state = self.lock()?;
        let address = ptr.as_ptr() as usize;
        let (layout, allocated_size) = *state
            .pinned_blocks
            .get(&address)
            .ok_or_else(|| anyhow!("Free of unknown pinned host pointer {:#x}", address))?;
        if allocated_size != size_in_bytes {
            bail!(
                "Pinned host block {:#x} has {} bytes but was freed with a size of {} bytes",
                address,
                allocated_size,
                size_in_bytes
            );
        }
        state.pinned_blocks.remove(&address);
        alloc::dealloc(ptr.as_ptr(), layout);
        state.stats.live_pinned_allocations -= 1;
        state.stats.live_pinned_bytes -= size_in_bytes;
        trace!("free_host: {} pinned bytes", size_in_bytes);
        Ok(())
    }

    fn memset_device(&self, ptr: DevicePtr, value: u8, size_in_bytes: usize) -> Result<()> {
        let mut state = self.lock()?;
        let block = state.device_block_mut(ptr)?;
        check_range(ptr, block.len(), size_in_bytes)?;
        block[..size_in_bytes].fill(value);
        state.stats.device_fills += 1;
        Ok(())
    }

    fn copy_host_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        let block = state.device_block_mut(dst)?;
        check_range(dst, block.len(), src.len())?;
        block[..src.len()].copy_from_slice(src);
        state.stats.host_to_device_copies += 1;
        Ok(())
    }

    fn copy_device_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let mut state = self.lock()?;
        let block = state.device_block(src)?;
        check_range(src, block.len(), dst.len())?;
        dst.copy_from_slice(&block[..dst.len()]);
        state.stats.device_to_host_copies += 1;
        Ok(())
    }

    fn copy_device_to_device(
        &self,
        dst: DevicePtr,
        src: DevicePtr,
        size_in_bytes: usize,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let source = state.device_block(src)?;
        check_range(src, source.len(), size_in_bytes)?;
        let staged = source[..size_in_bytes].to_vec();

        let target = state.device_block_mut(dst)?;
        check_range(dst, target.len(), size_in_bytes)?;
        target[..size_in_bytes].copy_from_slice(&staged);
        state.stats.device_to_device_copies += 1;
        Ok(())
    }
}

impl Drop for SimulatedAccelerator {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.pinned_blocks.is_empty() {
            warn!(
                "SimulatedAccelerator dropped with {} pinned host blocks still allocated",
                state.pinned_blocks.len()
            );
        }
        for (address, (layout, _)) in state.pinned_blocks.drain() {
            // SAFETY: every entry was allocated in `malloc_host` with exactly this layout
            unsafe { alloc::dealloc(address as *mut u8, layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_allocation_is_poisoned() -> Result<()> {
        let accelerator = SimulatedAccelerator::default();
        let ptr = accelerator.malloc_device(16)?;
        assert_eq!(vec![0xCD; 16], accelerator.inspect_device(ptr)?);

        let stats = accelerator.stats();
        assert_eq!(1, stats.live_device_allocations);
        assert_eq!(16, stats.live_device_bytes);

        accelerator.free_device(ptr)?;
        assert_eq!(0, accelerator.stats().live_device_allocations);
        assert_eq!(0, accelerator.stats().live_device_bytes);
        Ok(())
    }

    #[test]
    fn test_device_allocation_without_poison_is_zeroed() -> Result<()> {
        let accelerator = SimulatedAccelerator::new(SimulatedAcceleratorOptions {
            poison_byte: None,
            ..Default::default()
        });
        let ptr = accelerator.malloc_device(8)?;
        assert_eq!(vec![0; 8], accelerator.inspect_device(ptr)?);
        accelerator.free_device(ptr)
    }

    #[test]
    fn test_double_free_is_an_error() -> Result<()> {
        let accelerator = SimulatedAccelerator::default();
        let ptr = accelerator.malloc_device(4)?;
        accelerator.free_device(ptr)?;
        assert!(accelerator.free_device(ptr).is_err());
        assert!(accelerator.free_device(DevicePtr::from_raw(9999)).is_err());
        Ok(())
    }

    #[test]
    fn test_capacity_limit() -> Result<()> {
        let accelerator = SimulatedAccelerator::new(SimulatedAcceleratorOptions {
            capacity_in_bytes: Some(64),
            ..Default::default()
        });
        let first = accelerator.malloc_device(48)?;
        assert!(accelerator.malloc_device(17).is_err());
        let second = accelerator.malloc_device(16)?;
        accelerator.free_device(first)?;
        accelerator.free_device(second)
    }

    #[test]
    fn test_transfers() -> Result<()> {
        let accelerator = SimulatedAccelerator::default();
        let a = accelerator.malloc_device(4)?;
        let b = accelerator.malloc_device(4)?;

        accelerator.copy_host_to_device(a, &[1, 2, 3, 4])?;
        accelerator.copy_device_to_device(b, a, 4)?;
        accelerator.memset_device(a, 7, 2)?;

        let mut host = [0u8; 4];
        accelerator.copy_device_to_host(&mut host, b)?;
        assert_eq!([1, 2, 3, 4], host);
        assert_eq!(vec![7, 7, 3, 4], accelerator.inspect_device(a)?);

        let stats = accelerator.stats();
        assert_eq!(1, stats.host_to_device_copies);
        assert_eq!(1, stats.device_to_host_copies);
        assert_eq!(1, stats.device_to_device_copies);
        assert_eq!(1, stats.device_fills);

        accelerator.free_device(a)?;
        accelerator.free_device(b)
    }

    #[test]
    fn test_out_of_range_access_is_an_error() -> Result<()> {
        let accelerator = SimulatedAccelerator::default();
        let small = accelerator.malloc_device(2)?;
        let large = accelerator.malloc_device(8)?;

        assert!(accelerator.copy_host_to_device(small, &[0; 3]).is_err());
        assert!(accelerator.copy_device_to_host(&mut [0; 3], small).is_err());
        assert!(accelerator.memset_device(small, 0, 3).is_err());
        assert!(accelerator.copy_device_to_device(small, large, 8).is_err());
        assert!(accelerator.copy_device_to_device(large, small, 8).is_err());
        // Failed copies leave the target untouched
        assert_eq!(vec![0xCD; 8], accelerator.inspect_device(large)?);

        accelerator.free_device(small)?;
        accelerator.free_device(large)
    }

    #[test]
    fn test_pinned_host_memory() -> Result<()> {
        let accelerator = SimulatedAccelerator::default();
        let ptr = accelerator.malloc_host(100)?;
        assert_eq!(0, ptr.as_ptr() as usize % PINNED_HOST_ALIGNMENT);
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 100) };
        assert!(bytes.iter().all(|byte| *byte == 0xCD));
        assert_eq!(1, accelerator.stats().live_pinned_allocations);
        assert_eq!(100, accelerator.stats().live_pinned_bytes);

        unsafe {
            assert!(accelerator.free_host(ptr, 99).is_err());
            accelerator.free_host(ptr, 100)?;
            assert!(accelerator.free_host(ptr, 100).is_err());
        }
        assert_eq!(0, accelerator.stats().live_pinned_allocations);
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_options() -> Result<()> {
        let options = SimulatedAcceleratorOptions {
            poison_byte: Some(0xAB),
            capacity_in_bytes: Some(1024),
        };
        let json = serde_json::to_string(&options)?;
        let parsed: SimulatedAcceleratorOptions = serde_json::from_str(&json)?;
        assert_eq!(options, parsed);
        Ok(())
    }
}
