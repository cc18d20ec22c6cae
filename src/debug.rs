//! Process-wide debug flag.
//!
//! A single flag gates all timing instrumentation. It is read once from the
//! `GPU_TENSOR_DEBUG` environment variable and cached for the lifetime of the
//! process; embedders that manage their own configuration can bypass it with
//! [`crate::GpuContext::with_debug`].

use std::sync::OnceLock;

static DEBUG: OnceLock<bool> = OnceLock::new();

/// Whether debug instrumentation (GPU pass timing) is enabled for this process.
pub fn debug_enabled() -> bool {
    *DEBUG.get_or_init(|| {
        std::env::var("GPU_TENSOR_DEBUG")
            .map(|value| matches!(value.as_str(), "1" | "true" | "on"))
            .unwrap_or(false)
    })
}
