//! A buffer can own memory in two domains: the host domain, which the CPU addresses directly, and the
//! device domain of a compute accelerator, which can only be reached through the accelerator runtime.
//!
//! The runtime is abstracted by the [Accelerator] trait. Its primitives (allocation, fill and the three
//! copy directions) return `anyhow::Result`, but a buffer never hands such an error to its caller: every
//! failure is routed into [fatal_on_error], which logs and aborts the process.
//!
//! Which storage strategy a buffer uses is decided once, at construction, through [AllocationMode].

use std::fmt::{Display, Formatter};

mod accelerator;
pub use self::accelerator::*;

mod fatal;
pub use self::fatal::*;
pub(crate) use self::fatal::accelerator_call;

mod mode;
pub use self::mode::*;

mod simulated;
pub use self::simulated::*;

/// The two memory domains a buffer can hold data in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemoryDomain {
    /// Memory addressable by the main processing unit
    Host,
    /// Memory of a separate compute accelerator, only reachable through explicit transfers
    Device,
}

impl Display for MemoryDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryDomain::Host => write!(f, "host"),
            MemoryDomain::Device => write!(f, "device"),
        }
    }
}

/// Opaque handle to a block of accelerator memory. It is never dereferenced on the host; all access
/// goes through the [Accelerator] that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(u64);

impl DevicePtr {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl Display for DevicePtr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "device:{:#x}", self.0)
    }
}
