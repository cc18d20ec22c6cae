//! Error types for GPU device acquisition.

use thiserror::Error;

/// Errors raised while acquiring the adapter and device. All of these are
/// fatal at initialization; nothing in the crate works without a device.
#[derive(Error, Debug)]
pub enum GpuContextError {
    #[error("No suitable GPU adapter found")]
    AdapterNotFound,

    #[error("Failed to create GPU device: {message}")]
    DeviceRequestFailed { message: String },

    #[error("Timestamp queries are not supported by this adapter")]
    TimestampQueryUnsupported,
}

pub type GpuContextResult<T> = std::result::Result<T, GpuContextError>;
