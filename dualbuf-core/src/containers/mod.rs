//! Containers for two-dimensional data that can live in host memory, accelerator memory, or both.
//!
//! [`DualDomainBuffer`] is the only container right now. It owns up to two memory blocks, one per
//! [domain](crate::memory::MemoryDomain), and never synchronizes them on its own. A typical frame in a
//! reconstruction pipeline looks like this:
//!
//! 1) The buffer is allocated once with [`DualDomainBuffer::with_dims`] or [`DualDomainBuffer::allocate`]
//!    and reused for every frame
//! 2) New sensor data is written to the host block
//! 3) [`DualDomainBuffer::update_device_from_host`] makes the data available to accelerator kernels
//! 4) Kernel results are brought back with [`DualDomainBuffer::update_host_from_device`] when the host needs them
//!
//! If the input resolution changes, [`DualDomainBuffer::change_dims`] reallocates the buffer. All content is
//! lost in that case.

mod dual_domain_buffer;
pub use self::dual_domain_buffer::*;

mod storage;
