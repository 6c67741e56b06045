//! Global V8 Platform Management
//!
//! The V8 platform must be initialized once per process before any isolate
//! exists and stays alive until the process exits. [`Context::new`] calls
//! [`initialize_v8_platform`] itself, so hosts only need to call it when they
//! want initialization to happen at a well-defined point (e.g. startup).
//!
//! # Thread Safety
//!
//! `OnceCell` makes the one-time initialization thread-safe; repeated calls
//! are no-ops.
//!
//! [`Context::new`]: crate::Context::new

#![warn(clippy::all, rust_2018_idioms)]

use log::{info, warn};
use once_cell::sync::OnceCell;

use crate::error::Result;

static GLOBAL_V8_PLATFORM: OnceCell<v8::SharedRef<v8::Platform>> = OnceCell::new();

/// Initialize the V8 platform.
///
/// The platform is created with the default worker thread pool
/// (sized from the CPU count) and without idle task support.
///
/// # Example
///
/// ```no_run
/// v8glue::initialize_v8_platform().expect("V8 initialization failed");
/// ```
pub fn initialize_v8_platform() -> Result<()> {
    GLOBAL_V8_PLATFORM
        .get_or_try_init(|| -> Result<_> {
            let platform = v8::new_default_platform(0, false).make_shared();

            v8::V8::initialize_platform(platform.clone());
            v8::V8::initialize();

            info!("V8 {} platform initialized", v8::V8::get_version());

            Ok(platform)
        })
        .map(|_| ())
}

/// Returns `true` once [`initialize_v8_platform`] has succeeded.
pub fn is_v8_initialized() -> bool {
    GLOBAL_V8_PLATFORM.get().is_some()
}

pub(crate) fn v8_platform() -> Option<&'static v8::SharedRef<v8::Platform>> {
    GLOBAL_V8_PLATFORM.get()
}

/// Shut the V8 platform down.
///
/// Optional: the process exit cleans up as well.
///
/// # Safety
///
/// No isolate (and therefore no [`Context`](crate::Context), script or object
/// wrapper) may exist when this runs, and V8 cannot be re-initialized in the
/// same process afterwards.
pub unsafe fn dispose_v8_platform() {
    if GLOBAL_V8_PLATFORM.get().is_some() {
        v8::V8::dispose();
        info!("V8 platform disposed");
    } else {
        warn!("Attempted to dispose V8 platform that was never initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v8_platform_initialization() {
        let result = initialize_v8_platform();
        assert!(result.is_ok(), "V8 platform initialization failed");
        assert!(is_v8_initialized(), "V8 platform not marked as initialized");
    }

    #[test]
    fn test_v8_double_initialization() {
        let result1 = initialize_v8_platform();
        let result2 = initialize_v8_platform();

        assert!(result1.is_ok(), "First initialization failed");
        assert!(result2.is_ok(), "Second initialization failed");
        assert!(is_v8_initialized());
    }
}
