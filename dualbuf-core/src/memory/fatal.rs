use std::fmt::Arguments;

use log::error;

/// Unwraps the result of an accelerator primitive. An error is logged together with `operation` and
/// the process is aborted; nothing is retried or propagated to the caller.
pub fn fatal_on_error<R>(result: anyhow::Result<R>, operation: Arguments<'_>) -> R {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!("{} failed: {:?}", operation, err);
            std::process::abort()
        }
    }
}

/// Logs `message` and aborts the process
pub fn fatal_error(message: Arguments<'_>) -> ! {
    error!("{}", message);
    std::process::abort()
}

/// Invokes a primitive on an [Accelerator](super::Accelerator) and aborts the process if it fails
macro_rules! accelerator_call {
    ($accelerator:expr, $call:ident ( $($arg:expr),* $(,)? )) => {{
        let accelerator = $accelerator;
        $crate::memory::fatal_on_error(
            accelerator.$call($($arg),*),
            format_args!("{}::{}", accelerator.name(), stringify!($call)),
        )
    }};
}
pub(crate) use accelerator_call;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Accelerator, SimulatedAccelerator};

    #[test]
    fn test_fatal_on_error_passes_values_through() {
        let value = fatal_on_error(Ok::<_, anyhow::Error>(42), format_args!("answer"));
        assert_eq!(42, value);
    }

    #[test]
    fn test_accelerator_call_evaluates_accelerator_once() {
        let accelerator = SimulatedAccelerator::default();
        let mut evaluations = 0;
        let ptr = accelerator_call!(
            {
                evaluations += 1;
                &accelerator
            },
            malloc_device(16)
        );
        assert_eq!(1, evaluations);
        accelerator_call!(&accelerator, free_device(ptr));
        assert_eq!(0, accelerator.stats().live_device_allocations);
    }
}
