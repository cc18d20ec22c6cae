//! Minimal GPU tensor-compute micro-framework on wgpu.
//!
//! The crate turns small typed uniform values into packed GPU-resident
//! parameter blocks, synthesizes WGSL compute kernels bound to numbered
//! buffer slots, computes dispatch grids that exactly cover a 1/2/3-D
//! problem, and instruments every pass with a pool of reusable timestamp
//! queries. On top of that sits a small 2-D tensor surface: fill, scalar and
//! element-wise arithmetic, matrix multiply and seeded uniform random fills,
//! each recorded and submitted synchronously through a single command
//! submitter.
//!
//! ```ignore
//! use gpu_tensor::{GpuContext, OperationManager};
//!
//! let context = pollster::block_on(GpuContext::new())?;
//! let mut opm = OperationManager::new(&context);
//!
//! let a = opm.create(2, 2)?;
//! let b = opm.create(2, 2)?;
//! let c = opm.create(2, 2)?;
//! a.upload(&opm, &[1.0, 2.0, 3.0, 4.0]);
//! b.upload(&opm, &[5.0, 6.0, 7.0, 8.0]);
//! a.dot(&mut opm, &b, &c)?;
//! assert_eq!(opm.read_back(&c)?, vec![19.0, 22.0, 43.0, 50.0]);
//! ```

pub mod context;
pub mod debug;
pub mod encoder;
pub mod errors;
pub mod shaders;
pub mod stats;
pub mod tensor;
pub mod timing;
pub mod uniforms;

pub use context::GpuContext;
pub use encoder::{ComputePassGuard, Encoder, RenderPassGuard};
pub use errors::{GpuContextError, GpuContextResult, TensorOpError, TensorOpResult};
pub use stats::{GpuStats, GpuTimeSink};
pub use tensor::{Operation, OperationManager, Tensor};
pub use timing::{TimingQueryPool, TimingState};
pub use uniforms::{UniformBlock, UniformTable, UniformValue};
