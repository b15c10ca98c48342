use std::sync::Arc;

use lazy_static::lazy_static;

use super::{Accelerator, SimulatedAccelerator};

lazy_static! {
    static ref DEFAULT_ACCELERATOR: Arc<dyn Accelerator> =
        Arc::new(SimulatedAccelerator::default());
}

/// Returns the process-wide accelerator context that dual-domain buffers use when they are created
/// from a plain `dual_domain` flag. Buffers share the context, never their storage blocks.
pub fn default_accelerator() -> Arc<dyn Accelerator> {
    DEFAULT_ACCELERATOR.clone()
}

/// The storage strategy of a buffer, fixed for its entire lifetime
#[derive(Debug, Clone)]
pub enum AllocationMode {
    /// Storage only in the host domain, allocated from the global heap
    HostOnly,
    /// Storage in both domains. The host block is pinned memory from the accelerator and the device block
    /// lives in accelerator memory; both are freed through the same accelerator.
    DualDomain(Arc<dyn Accelerator>),
}

impl AllocationMode {
    /// `DualDomain` with the [default_accelerator] if `dual_domain` is true, `HostOnly` otherwise
    pub fn from_flag(dual_domain: bool) -> Self {
        if dual_domain {
            Self::DualDomain(default_accelerator())
        } else {
            Self::HostOnly
        }
    }

    pub fn is_dual_domain(&self) -> bool {
        matches!(self, Self::DualDomain(_))
    }

    /// The accelerator of a dual-domain mode, `None` for `HostOnly`
    pub fn accelerator(&self) -> Option<&dyn Accelerator> {
        match self {
            Self::HostOnly => None,
            Self::DualDomain(accelerator) => Some(accelerator.as_ref()),
        }
    }

    /// Whether both modes are dual-domain on the same accelerator context. Device pointers can only be
    /// exchanged between buffers for which this holds.
    pub fn shares_accelerator_with(&self, other: &AllocationMode) -> bool {
        match (self, other) {
            (Self::DualDomain(lhs), Self::DualDomain(rhs)) => {
                Arc::as_ptr(lhs) as *const () == Arc::as_ptr(rhs) as *const ()
            }
            _ => false,
        }
    }
}

impl Default for AllocationMode {
    /// Default is [AllocationMode::HostOnly]
    fn default() -> Self {
        Self::HostOnly
    }
}
