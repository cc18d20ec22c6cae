//! Error types for the tensor-compute framework.
//!
//! This module contains specific error types used throughout the library,
//! avoiding generic error wrappers like `anyhow` or `Box<dyn Error>` for better
//! error handling and debugging.

mod context_error;
mod op_error;

pub use context_error::{GpuContextError, GpuContextResult};
pub use op_error::{TensorOpError, TensorOpResult};
