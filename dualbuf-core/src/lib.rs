#![warn(clippy::all)]

//! Core data structures for two-dimensional buffers that live in host memory, accelerator memory, or both
//!
//! The central type is [DualDomainBuffer](crate::containers::DualDomainBuffer), a dense row-major 2D array
//! that owns a host block and, if constructed in dual-domain mode, a matching block of accelerator memory.
//! The two blocks are never kept coherent automatically: every transfer between them is an explicit call,
//! so the cost of crossing domains stays visible at the call site.
//!
//! The accelerator runtime itself is abstracted through the [Accelerator](crate::memory::Accelerator) trait.
//! For builds and tests without accelerator hardware, [SimulatedAccelerator](crate::memory::SimulatedAccelerator)
//! emulates device memory in a separate host arena.

pub extern crate nalgebra;

pub mod containers;
/// Memory domains, the accelerator abstraction and allocation strategies
pub mod memory;
/// Utilities
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;
