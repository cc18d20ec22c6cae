//! A single reusable compute operation.

use crate::encoder::Encoder;
use crate::shaders::{generate_kernel_source, WorkgroupDimension};
use crate::uniforms::{UniformBlock, UniformValue};

/// One compiled kernel with its binding layout, pipeline and its own uniform
/// parameter block. Immutable after construction apart from the uniform
/// values; a single instance serves every dispatch of its kind.
pub struct Operation {
    device: wgpu::Device,
    label: String,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    uniforms: UniformBlock,
    source: String,
}

impl Operation {
    /// Builds the kernel source, pipeline and uniform block. Binding slot 0
    /// is the uniform block; read-only buffers follow in the order of
    /// `read_names`, then read-write buffers in the order of `write_names`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        read_names: &[&str],
        write_names: &[&str],
        dims: WorkgroupDimension,
        body: &str,
        entry_point: &str,
        uniform_fields: &[(String, UniformValue)],
        params_struct: Option<&str>,
    ) -> Self {
        let source =
            generate_kernel_source(read_names, write_names, dims, body, entry_point, params_struct);

        let layout = create_bind_group_layout(device, label, read_names.len(), write_names.len());

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.clone().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniforms = UniformBlock::new(device, label, uniform_fields);

        Self {
            device: device.clone(),
            label: label.to_string(),
            layout,
            pipeline,
            uniforms,
            source,
        }
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformBlock {
        &mut self.uniforms
    }

    /// The generated WGSL.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Uploads the uniform block and records one dispatch. `buffers` are the
    /// operand buffers in binding order (reads first, then writes), bound
    /// starting at slot 1.
    pub fn encode(&mut self, encoder: &mut Encoder, buffers: &[&wgpu::Buffer], grid: [u32; 3], timed: bool) {
        self.uniforms.write(encoder.queue());

        let mut entries = Vec::with_capacity(1 + buffers.len());
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: self.uniforms.buffer().as_entire_binding(),
        });
        for (i, buffer) in buffers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i + 1) as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &self.layout,
            entries: &entries,
        });

        let mut pass = encoder.compute_pass(&self.label, timed);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(grid[0], grid[1], grid[2]);
    }
}

fn create_bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    reads: usize,
    writes: usize,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(1 + reads + writes);
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    let mut binding = 1;
    for _ in 0..reads {
        entries.push(storage_entry(binding, true));
        binding += 1;
    }
    for _ in 0..writes {
        entries.push(storage_entry(binding, false));
        binding += 1;
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
