//! The operation registry and dispatch orchestrator.
//!
//! All built-in kernels are compiled once at construction and reused for
//! every dispatch of their kind. A manager-level operation call is
//! synchronous from the caller's perspective: it validates shapes, populates
//! the operation's uniform block, records exactly one dispatch and submits
//! it before returning.

use std::sync::mpsc;

use crate::context::GpuContext;
use crate::encoder::Encoder;
use crate::errors::{TensorOpError, TensorOpResult};
use crate::shaders::{dispatch_grid, WorkgroupDimension, OPTIMAL_WORKGROUP_SIZE};
use crate::tensor::{Operation, Tensor};
use crate::uniforms::UniformValue;

const SCALAR_PARAMS_STRUCT: &str = "struct Params {
    number: f32,
}";

const RANDOM_PARAMS_STRUCT: &str = "struct Params {
    seed: f32,
    min_value: f32,
    max_value: f32,
    pad: f32,
}";

const MATMUL_BODY: &str = r#"
fn execute(pos: vec3<u32>) {
    let col = pos.x;
    let row = pos.y;

    let width = u32(uniforms.shapes.x);
    let height = u32(uniforms.shapes.y);

    if (row >= width || col >= height) {
        return;
    }

    var sum = 0.0;
    for (var k: u32 = 0u; k < width; k++) {
        let index_a = row * width + k;
        let index_b = k * height + col;
        sum += read_buffer_a[index_a] * read_buffer_b[index_b];
    }

    write_buffer[row * height + col] = sum;
}
"#;

fn scalar_op_body(op: &str) -> String {
    format!(
        r#"
fn get_index(pos: vec3<u32>) -> u32 {{
    return pos.x;
}}

fn execute(pos: vec3<u32>) {{
    let index = get_index(pos);
    write_buffer[index] {op} uniforms.params.number;
}}
"#
    )
}

fn tensor_op_body(op: &str) -> String {
    format!(
        r#"
fn get_first_index(pos: vec3<u32>, shape: vec2<u32>) -> u32 {{
    return pos.x + pos.y * shape.x;
}}

fn get_second_index(pos: vec3<u32>, shape: vec2<u32>) -> u32 {{
    return (pos.x % shape.x) + shape.x * (pos.y % shape.y);
}}

fn execute(pos: vec3<u32>) {{
    let shape = vec2<u32>(uniforms.shapes.xy);
    if (pos.x >= shape.x || pos.y >= shape.y) {{
        return;
    }}
    let first_index = get_first_index(pos, shape);
    let second_index = get_second_index(pos, vec2<u32>(uniforms.shapes.zw));
    write_buffer[first_index] {op} read_buffer[second_index];
}}
"#
    )
}

fn random_op_body(cast: &str) -> String {
    format!(
        r#"
fn hash(value: u32) -> u32 {{
    var x = value;
    x ^= x >> 16u;
    x *= 0x85ebca6bu;
    x ^= x >> 13u;
    x *= 0xc2b2ae35u;
    x ^= x >> 16u;
    return x;
}}

fn random_between(min_value: f32, max_value: f32, seed: u32, index: u32) -> f32 {{
    let combined_seed = hash(seed ^ index);
    let random_value = f32(combined_seed) / f32(0xFFFFFFFFu);
    return min_value + random_value * (max_value - min_value);
}}

fn random_uniform(pos: vec3<u32>) {{
    let index = pos.x;
    let value = {cast}(random_between(uniforms.params.min_value,
                                      uniforms.params.max_value,
                                      u32(uniforms.params.seed),
                                      index));
    write_buffer[index] = f32(value);
}}
"#
    )
}

fn shapes_field() -> (String, UniformValue) {
    ("shapes".to_string(), UniformValue::Vec4([0.0; 4]))
}

fn scalar_operation(device: &wgpu::Device, label: &str, op: &str) -> Operation {
    let fields = vec![
        shapes_field(),
        (
            "params".to_string(),
            UniformValue::record(vec![("number", UniformValue::Scalar(0.0))]),
        ),
    ];
    Operation::new(
        device,
        label,
        &[],
        &["write_buffer"],
        WorkgroupDimension::One,
        &scalar_op_body(op),
        "execute",
        &fields,
        Some(SCALAR_PARAMS_STRUCT),
    )
}

fn tensor_operation(device: &wgpu::Device, label: &str, op: &str) -> Operation {
    let fields = vec![shapes_field()];
    Operation::new(
        device,
        label,
        &["read_buffer"],
        &["write_buffer"],
        WorkgroupDimension::Two,
        &tensor_op_body(op),
        "execute",
        &fields,
        None,
    )
}

fn matmul_operation(device: &wgpu::Device) -> Operation {
    let fields = vec![shapes_field()];
    Operation::new(
        device,
        "dot",
        &["read_buffer_a", "read_buffer_b"],
        &["write_buffer"],
        WorkgroupDimension::Two,
        MATMUL_BODY,
        "execute",
        &fields,
        None,
    )
}

fn random_operation(device: &wgpu::Device, label: &str, cast: &str) -> Operation {
    let fields = vec![
        shapes_field(),
        (
            "params".to_string(),
            UniformValue::record(vec![
                ("seed", UniformValue::Scalar(0.0)),
                ("min_value", UniformValue::Scalar(0.0)),
                ("max_value", UniformValue::Scalar(0.0)),
                ("pad", UniformValue::Scalar(0.0)),
            ]),
        ),
    ];
    Operation::new(
        device,
        label,
        &[],
        &["write_buffer"],
        WorkgroupDimension::One,
        &random_op_body(cast),
        "random_uniform",
        &fields,
        Some(RANDOM_PARAMS_STRUCT),
    )
}

fn shapes_of(first: &Tensor, second: &Tensor) -> [f32; 4] {
    [
        first.width() as f32,
        first.height() as f32,
        second.width() as f32,
        second.height() as f32,
    ]
}

fn run_scalar(
    op: &mut Operation,
    encoder: &mut Encoder,
    tensor: &Tensor,
    value: f32,
) -> TensorOpResult<()> {
    let uniforms = op.uniforms_mut();
    uniforms.set_vec4("shapes", shapes_of(tensor, tensor))?;
    uniforms.set_scalar("params.number", value)?;

    let grid = dispatch_grid(&[tensor.len() as u32]);
    op.encode(encoder, &[tensor.buffer()], grid, true);
    encoder.submit(None);
    Ok(())
}

fn run_tensor(
    op: &mut Operation,
    encoder: &mut Encoder,
    first: &Tensor,
    second: &Tensor,
) -> TensorOpResult<()> {
    if first.width() != second.width() || first.height() != second.height() {
        return Err(TensorOpError::ShapeMismatch {
            left_width: first.width(),
            left_height: first.height(),
            right_width: second.width(),
            right_height: second.height(),
        });
    }
    op.uniforms_mut()
        .set_vec4("shapes", shapes_of(first, second))?;

    let grid = dispatch_grid(&[first.width() as u32, first.height() as u32]);
    op.encode(encoder, &[second.buffer(), first.buffer()], grid, true);
    encoder.submit(None);
    Ok(())
}

fn run_matmul(
    op: &mut Operation,
    encoder: &mut Encoder,
    a: &Tensor,
    b: &Tensor,
    out: &Tensor,
) -> TensorOpResult<()> {
    if a.width() != b.height() {
        return Err(TensorOpError::InnerDimensionMismatch {
            a_width: a.width(),
            b_height: b.height(),
        });
    }
    op.uniforms_mut().set_vec4("shapes", shapes_of(out, out))?;

    // pos.x is the column index, bounded by the output height.
    let grid = dispatch_grid(&[out.height() as u32, out.width() as u32]);
    op.encode(
        encoder,
        &[a.buffer(), b.buffer(), out.buffer()],
        grid,
        true,
    );
    encoder.submit(None);
    Ok(())
}

fn run_random(
    op: &mut Operation,
    encoder: &mut Encoder,
    tensor: &Tensor,
    seed: u32,
    min: f32,
    max: f32,
) -> TensorOpResult<()> {
    let uniforms = op.uniforms_mut();
    uniforms.set_vec4("shapes", shapes_of(tensor, tensor))?;
    uniforms.set_scalar("params.seed", seed as f32)?;
    uniforms.set_scalar("params.min_value", min)?;
    uniforms.set_scalar("params.max_value", max)?;

    let grid = dispatch_grid(&[tensor.len() as u32]);
    op.encode(encoder, &[tensor.buffer()], grid, true);
    encoder.submit(None);
    Ok(())
}

/// Registry of the built-in operations plus tensor lifecycle and dispatch
/// orchestration. Create one per [`GpuContext`] and route every tensor call
/// through it.
pub struct OperationManager {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: Encoder,
    max_buffer_size: u64,
    max_storage_binding_size: u64,
    fill_op: Operation,
    add_scalar_op: Operation,
    sub_scalar_op: Operation,
    mul_scalar_op: Operation,
    div_scalar_op: Operation,
    add_op: Operation,
    sub_op: Operation,
    mul_op: Operation,
    div_op: Operation,
    dot_op: Operation,
    random_float_op: Operation,
    random_int_op: Operation,
}

impl OperationManager {
    pub fn new(context: &GpuContext) -> Self {
        let device = context.device().clone();
        let queue = context.queue().clone();
        let encoder = Encoder::new(device.clone(), queue.clone(), context.debug());

        Self {
            fill_op: scalar_operation(&device, "fill", "="),
            add_scalar_op: scalar_operation(&device, "add_scalar", "+="),
            sub_scalar_op: scalar_operation(&device, "sub_scalar", "-="),
            mul_scalar_op: scalar_operation(&device, "mul_scalar", "*="),
            div_scalar_op: scalar_operation(&device, "div_scalar", "/="),
            add_op: tensor_operation(&device, "add", "+="),
            sub_op: tensor_operation(&device, "sub", "-="),
            mul_op: tensor_operation(&device, "mul", "*="),
            div_op: tensor_operation(&device, "div", "/="),
            dot_op: matmul_operation(&device),
            random_float_op: random_operation(&device, "random_float_uniform", "f32"),
            random_int_op: random_operation(&device, "random_int_uniform", "i32"),
            max_buffer_size: context.max_buffer_size(),
            max_storage_binding_size: context.max_storage_binding_size(),
            device,
            queue,
            encoder,
        }
    }

    /// The command submitter, exposed so collaborators outside the tensor
    /// surface (a display pass, for example) can share its timing pools and
    /// its submission cycle.
    pub fn encoder_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    // ---- tensor lifecycle -------------------------------------------------

    /// Allocates a `width x height` tensor. The element count is rounded up
    /// to the workgroup width so buffer sizing stays consistent with
    /// dispatch granularity; the buffer starts zeroed.
    pub fn create(&self, width: usize, height: usize) -> TensorOpResult<Tensor> {
        let (buffer, padded_len) = self.create_storage_buffer(width * height)?;
        Ok(Tensor::new(width, height, padded_len, buffer))
    }

    pub fn zeros(&self, width: usize, height: usize) -> TensorOpResult<Tensor> {
        self.create(width, height)
    }

    pub fn ones(&mut self, width: usize, height: usize) -> TensorOpResult<Tensor> {
        let tensor = self.create(width, height)?;
        self.fill(&tensor, 1.0)?;
        Ok(tensor)
    }

    pub fn clone_tensor(&mut self, source: &Tensor) -> TensorOpResult<Tensor> {
        let tensor = self.create(source.width(), source.height())?;
        self.copy(&tensor, source)?;
        Ok(tensor)
    }

    fn create_storage_buffer(&self, len: usize) -> TensorOpResult<(wgpu::Buffer, usize)> {
        let workgroup = OPTIMAL_WORKGROUP_SIZE as usize;
        let padded_len = len.div_ceil(workgroup) * workgroup;
        let byte_size = (padded_len * std::mem::size_of::<f32>()) as u64;

        if byte_size > self.max_buffer_size {
            return Err(TensorOpError::CapacityExceeded {
                requested_bytes: byte_size,
                limit_bytes: self.max_buffer_size,
                limit_name: "max_buffer_size".to_string(),
            });
        }
        if byte_size > self.max_storage_binding_size {
            return Err(TensorOpError::CapacityExceeded {
                requested_bytes: byte_size,
                limit_bytes: self.max_storage_binding_size,
                limit_name: "max_storage_buffer_binding_size".to_string(),
            });
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tensor storage"),
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok((buffer, padded_len))
    }

    /// Uploads host data into the tensor's buffer, starting at element 0.
    pub fn upload(&self, tensor: &Tensor, data: &[f32]) {
        assert!(
            data.len() <= tensor.padded_len(),
            "uploading {} elements into a tensor of capacity {}",
            data.len(),
            tensor.padded_len()
        );
        self.queue
            .write_buffer(tensor.buffer(), 0, bytemuck::cast_slice(data));
    }

    /// Copies `src` into `dst` on the GPU. Shapes must match.
    pub fn copy(&mut self, dst: &Tensor, src: &Tensor) -> TensorOpResult<()> {
        if dst.width() != src.width() || dst.height() != src.height() {
            return Err(TensorOpError::ShapeMismatch {
                left_width: dst.width(),
                left_height: dst.height(),
                right_width: src.width(),
                right_height: src.height(),
            });
        }
        self.encoder.command_encoder().copy_buffer_to_buffer(
            src.buffer(),
            0,
            dst.buffer(),
            0,
            src.byte_size(),
        );
        self.encoder.submit(None);
        Ok(())
    }

    /// Copies the tensor back to the host through a staging buffer and a
    /// dedicated one-off command stream, blocking until the mapping
    /// completes. This is the slow path; it has no place in a compute loop.
    pub fn read_back(&self, tensor: &Tensor) -> TensorOpResult<Vec<f32>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tensor read-back staging"),
            size: tensor.byte_size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tensor read-back"),
            });
        encoder.copy_buffer_to_buffer(tensor.buffer(), 0, &staging, 0, tensor.byte_size());
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                return Err(TensorOpError::ReadBack {
                    message: error.to_string(),
                })
            }
            Err(_) => {
                return Err(TensorOpError::ReadBack {
                    message: "map callback was dropped".to_string(),
                })
            }
        }

        let data = {
            let view = slice.get_mapped_range();
            let elements: &[f32] = bytemuck::cast_slice(&view);
            elements[..tensor.len()].to_vec()
        };
        staging.unmap();
        Ok(data)
    }

    /// Reads the tensor back and logs it. Debug helper on top of
    /// [`Self::read_back`], with the same cost.
    pub fn print(&self, tensor: &Tensor) -> TensorOpResult<Vec<f32>> {
        let data = self.read_back(tensor)?;
        log::debug!("tensor {}x{}: {data:?}", tensor.width(), tensor.height());
        Ok(data)
    }

    // ---- scalar operations ------------------------------------------------

    pub fn fill(&mut self, tensor: &Tensor, value: f32) -> TensorOpResult<()> {
        run_scalar(&mut self.fill_op, &mut self.encoder, tensor, value)
    }

    pub fn add_scalar(&mut self, tensor: &Tensor, value: f32) -> TensorOpResult<()> {
        run_scalar(&mut self.add_scalar_op, &mut self.encoder, tensor, value)
    }

    pub fn sub_scalar(&mut self, tensor: &Tensor, value: f32) -> TensorOpResult<()> {
        run_scalar(&mut self.sub_scalar_op, &mut self.encoder, tensor, value)
    }

    pub fn mul_scalar(&mut self, tensor: &Tensor, value: f32) -> TensorOpResult<()> {
        run_scalar(&mut self.mul_scalar_op, &mut self.encoder, tensor, value)
    }

    pub fn div_scalar(&mut self, tensor: &Tensor, value: f32) -> TensorOpResult<()> {
        run_scalar(&mut self.div_scalar_op, &mut self.encoder, tensor, value)
    }

    pub fn negate(&mut self, tensor: &Tensor) -> TensorOpResult<()> {
        self.mul_scalar(tensor, -1.0)
    }

    // ---- element-wise tensor operations -----------------------------------

    /// `first += second`, element-wise. Both dimensions must match.
    pub fn add(&mut self, first: &Tensor, second: &Tensor) -> TensorOpResult<()> {
        run_tensor(&mut self.add_op, &mut self.encoder, first, second)
    }

    /// `first -= second`, element-wise.
    pub fn sub(&mut self, first: &Tensor, second: &Tensor) -> TensorOpResult<()> {
        run_tensor(&mut self.sub_op, &mut self.encoder, first, second)
    }

    /// `first *= second`, element-wise.
    pub fn mul(&mut self, first: &Tensor, second: &Tensor) -> TensorOpResult<()> {
        run_tensor(&mut self.mul_op, &mut self.encoder, first, second)
    }

    /// `first /= second`, element-wise.
    pub fn div(&mut self, first: &Tensor, second: &Tensor) -> TensorOpResult<()> {
        run_tensor(&mut self.div_op, &mut self.encoder, first, second)
    }

    // ---- matrix multiply --------------------------------------------------

    /// `out = a x b`. Requires `a.width == b.height`; the dispatch is sized
    /// to the output shape.
    pub fn dot(&mut self, a: &Tensor, b: &Tensor, out: &Tensor) -> TensorOpResult<()> {
        run_matmul(&mut self.dot_op, &mut self.encoder, a, b, out)
    }

    // ---- random fills -----------------------------------------------------

    /// Fills with deterministic pseudo-random floats in `[min, max)`. The
    /// same seed and shape always produce the same contents.
    pub fn random_float_uniform(
        &mut self,
        tensor: &Tensor,
        seed: u32,
        min: f32,
        max: f32,
    ) -> TensorOpResult<()> {
        run_random(
            &mut self.random_float_op,
            &mut self.encoder,
            tensor,
            seed,
            min,
            max,
        )
    }

    /// Fills with deterministic pseudo-random integers (stored as floats),
    /// scaled into `[min, max)` and truncated toward zero.
    pub fn random_int_uniform(
        &mut self,
        tensor: &Tensor,
        seed: u32,
        min: f32,
        max: f32,
    ) -> TensorOpResult<()> {
        run_random(
            &mut self.random_int_op,
            &mut self.encoder,
            tensor,
            seed,
            min,
            max,
        )
    }
}
