//! Tensors and the operations that drive them.
//!
//! A [`Tensor`] is a thin handle over one GPU storage buffer; every
//! operation on it delegates to the [`OperationManager`], which owns the
//! compiled kernels. The fluent methods return `Result<&Self>` so calls
//! chain with `?`:
//!
//! ```ignore
//! let t = manager.create(8, 8)?;
//! t.fill(&mut manager, 1.0)?
//!     .add_scalar(&mut manager, 2.0)?
//!     .mul_scalar(&mut manager, 0.5)?;
//! ```

mod manager;
mod operation;

pub use manager::OperationManager;
pub use operation::Operation;

use crate::errors::TensorOpResult;

/// A `width x height` tensor of `f32`s resident on the GPU. The backing
/// buffer is rounded up to the workgroup width, so edge threads of a 1-D
/// dispatch land in allocated padding rather than out of bounds. Construct
/// through [`OperationManager::create`] and friends.
pub struct Tensor {
    width: usize,
    height: usize,
    len: usize,
    padded_len: usize,
    byte_size: u64,
    buffer: wgpu::Buffer,
}

impl Tensor {
    pub(crate) fn new(width: usize, height: usize, padded_len: usize, buffer: wgpu::Buffer) -> Self {
        let len = width * height;
        let byte_size = (padded_len * std::mem::size_of::<f32>()) as u64;
        Self {
            width,
            height,
            len,
            padded_len,
            byte_size,
            buffer,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Logical element count, `width * height`.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated element count, rounded up to the workgroup width.
    pub fn padded_len(&self) -> usize {
        self.padded_len
    }

    /// Allocated size in bytes, `padded_len * 4`.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    // ---- fluent operation surface -----------------------------------------

    pub fn upload<'a>(&'a self, opm: &OperationManager, data: &[f32]) -> &'a Self {
        opm.upload(self, data);
        self
    }

    /// Copies `src` into this tensor.
    pub fn copy<'a>(&'a self, opm: &mut OperationManager, src: &Tensor) -> TensorOpResult<&'a Self> {
        opm.copy(self, src)?;
        Ok(self)
    }

    pub fn fill<'a>(&'a self, opm: &mut OperationManager, value: f32) -> TensorOpResult<&'a Self> {
        opm.fill(self, value)?;
        Ok(self)
    }

    pub fn add_scalar<'a>(
        &'a self,
        opm: &mut OperationManager,
        value: f32,
    ) -> TensorOpResult<&'a Self> {
        opm.add_scalar(self, value)?;
        Ok(self)
    }

    pub fn sub_scalar<'a>(
        &'a self,
        opm: &mut OperationManager,
        value: f32,
    ) -> TensorOpResult<&'a Self> {
        opm.sub_scalar(self, value)?;
        Ok(self)
    }

    pub fn mul_scalar<'a>(
        &'a self,
        opm: &mut OperationManager,
        value: f32,
    ) -> TensorOpResult<&'a Self> {
        opm.mul_scalar(self, value)?;
        Ok(self)
    }

    pub fn div_scalar<'a>(
        &'a self,
        opm: &mut OperationManager,
        value: f32,
    ) -> TensorOpResult<&'a Self> {
        opm.div_scalar(self, value)?;
        Ok(self)
    }

    pub fn negate<'a>(&'a self, opm: &mut OperationManager) -> TensorOpResult<&'a Self> {
        opm.negate(self)?;
        Ok(self)
    }

    /// Element-wise `self += other`.
    pub fn add<'a>(&'a self, opm: &mut OperationManager, other: &Tensor) -> TensorOpResult<&'a Self> {
        opm.add(self, other)?;
        Ok(self)
    }

    /// Element-wise `self -= other`.
    pub fn sub<'a>(&'a self, opm: &mut OperationManager, other: &Tensor) -> TensorOpResult<&'a Self> {
        opm.sub(self, other)?;
        Ok(self)
    }

    /// Element-wise `self *= other`.
    pub fn mul<'a>(&'a self, opm: &mut OperationManager, other: &Tensor) -> TensorOpResult<&'a Self> {
        opm.mul(self, other)?;
        Ok(self)
    }

    /// Element-wise `self /= other`.
    pub fn div<'a>(&'a self, opm: &mut OperationManager, other: &Tensor) -> TensorOpResult<&'a Self> {
        opm.div(self, other)?;
        Ok(self)
    }

    /// Matrix multiply `out = self x other`; returns `out` for chaining.
    pub fn dot<'a>(
        &self,
        opm: &mut OperationManager,
        other: &Tensor,
        out: &'a Tensor,
    ) -> TensorOpResult<&'a Tensor> {
        opm.dot(self, other, out)?;
        Ok(out)
    }

    pub fn random_float_uniform<'a>(
        &'a self,
        opm: &mut OperationManager,
        seed: u32,
        min: f32,
        max: f32,
    ) -> TensorOpResult<&'a Self> {
        opm.random_float_uniform(self, seed, min, max)?;
        Ok(self)
    }

    pub fn random_int_uniform<'a>(
        &'a self,
        opm: &mut OperationManager,
        seed: u32,
        min: f32,
        max: f32,
    ) -> TensorOpResult<&'a Self> {
        opm.random_int_uniform(self, seed, min, max)?;
        Ok(self)
    }

    // this is the most performance inefficient call in this type. only use
    // for debugging.
    pub fn print(&self, opm: &OperationManager) -> TensorOpResult<Vec<f32>> {
        opm.print(self)
    }
}
