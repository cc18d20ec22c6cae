//! Error types for tensor operations.

use thiserror::Error;

/// Errors raised on the dispatch path, always before any GPU work is recorded.
#[derive(Error, Debug)]
pub enum TensorOpError {
    #[error(
        "Tensor shapes do not match: left is {left_width}x{left_height}, right is {right_width}x{right_height}"
    )]
    ShapeMismatch {
        left_width: usize,
        left_height: usize,
        right_width: usize,
        right_height: usize,
    },

    #[error(
        "Matrix multiplication requires the first operand's width to match the second operand's height: {a_width} != {b_height}"
    )]
    InnerDimensionMismatch { a_width: usize, b_height: usize },

    #[error(
        "Requested buffer of {requested_bytes} bytes exceeds the device limit {limit_name} of {limit_bytes} bytes"
    )]
    CapacityExceeded {
        requested_bytes: u64,
        limit_bytes: u64,
        limit_name: String,
    },

    #[error("No uniform named {name} in this operation's parameter block")]
    UnknownUniform { name: String },

    #[error("Buffer read-back failed: {message}")]
    ReadBack { message: String },
}

pub type TensorOpResult<T> = std::result::Result<T, TensorOpError>;
