//! Command recording and submission.
//!
//! An [`Encoder`] owns at most one open command-recording context at a time.
//! Passes are handed out as scoped guards; dropping a guard ends the pass
//! and, for timed passes, records the timestamp-query resolution into the
//! same command stream. [`Encoder::submit`] finalizes the recording, pushes
//! it onto the queue, collects any finished timing readbacks, and leaves the
//! encoder idle until the next pass request implicitly reopens it.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use crate::stats::GpuTimeSink;
use crate::timing::TimingQueryPool;

pub struct Encoder {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    pools: HashMap<String, TimingQueryPool>,
    timestamp_period: f32,
    debug: bool,
}

impl Encoder {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, debug: bool) -> Self {
        // Only meaningful (and only guaranteed available) with timestamp
        // queries enabled, which `debug` implies.
        let timestamp_period = if debug {
            queue.get_timestamp_period()
        } else {
            1.0
        };
        Self {
            device,
            queue,
            encoder: None,
            pools: HashMap::new(),
            timestamp_period,
            debug,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Whether a recording context is currently open.
    pub fn is_recording(&self) -> bool {
        self.encoder.is_some()
    }

    /// The raw recording context, for plain copies and other non-pass
    /// commands. Reopens the context if the encoder is idle.
    pub fn command_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let Self {
            device, encoder, ..
        } = self;
        encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu-tensor commands"),
            })
        })
    }

    /// Begins a compute pass. With `timed` set and debug instrumentation
    /// enabled, the pass is bracketed by timestamps from the pool registered
    /// under `label`; the resolution is recorded when the guard drops.
    pub fn compute_pass(&mut self, label: &str, timed: bool) -> ComputePassGuard<'_> {
        let timed = timed && self.debug;
        let Self {
            device,
            encoder,
            pools,
            ..
        } = self;
        let encoder = encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu-tensor commands"),
            })
        });

        if timed {
            let pool = pools
                .entry(label.to_string())
                .or_insert_with(|| TimingQueryPool::new(device.clone(), label));
            let slot = pool.acquire();
            pool.begin(slot);
            let pass = encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(label),
                    timestamp_writes: Some(pool.compute_timestamp_writes(slot)),
                })
                .forget_lifetime();
            ComputePassGuard {
                pass: Some(pass),
                encoder,
                timing: Some((pool, slot)),
            }
        } else {
            let pass = encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(label),
                    timestamp_writes: None,
                })
                .forget_lifetime();
            ComputePassGuard {
                pass: Some(pass),
                encoder,
                timing: None,
            }
        }
    }

    /// Begins a render pass described by `descriptor`, optionally timed
    /// through the same pools as compute passes so collaborators outside
    /// this crate share the instrumentation. Any timestamp writes already
    /// present in the descriptor are replaced.
    pub fn render_pass<'a>(
        &'a mut self,
        label: &str,
        descriptor: &wgpu::RenderPassDescriptor<'_>,
        timed: bool,
    ) -> RenderPassGuard<'a> {
        let timed = timed && self.debug;
        let Self {
            device,
            encoder,
            pools,
            ..
        } = self;
        let encoder = encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gpu-tensor commands"),
            })
        });

        if timed {
            let pool = pools
                .entry(label.to_string())
                .or_insert_with(|| TimingQueryPool::new(device.clone(), label));
            let slot = pool.acquire();
            pool.begin(slot);
            let pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(label),
                    color_attachments: descriptor.color_attachments,
                    depth_stencil_attachment: descriptor.depth_stencil_attachment.clone(),
                    timestamp_writes: Some(pool.render_timestamp_writes(slot)),
                    occlusion_query_set: descriptor.occlusion_query_set,
                })
                .forget_lifetime();
            RenderPassGuard {
                pass: Some(pass),
                encoder,
                timing: Some((pool, slot)),
            }
        } else {
            let pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(label),
                    color_attachments: descriptor.color_attachments,
                    depth_stencil_attachment: descriptor.depth_stencil_attachment.clone(),
                    timestamp_writes: None,
                    occlusion_query_set: descriptor.occlusion_query_set,
                })
                .forget_lifetime();
            RenderPassGuard {
                pass: Some(pass),
                encoder,
                timing: None,
            }
        }
    }

    /// Finalizes the current recording and enqueues it. In debug mode this
    /// also collects every timing pool, best effort, and reports the summed
    /// duration to `stats`. The encoder is idle afterwards; the next pass
    /// request reopens it.
    pub fn submit(&mut self, stats: Option<&mut dyn GpuTimeSink>) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }

        if self.debug {
            let mut total_ms = 0.0;
            for pool in self.pools.values_mut() {
                total_ms += pool.collect(self.timestamp_period);
            }
            if let Some(sink) = stats {
                sink.record_gpu_time(total_ms);
            }
        }
    }
}

/// Scoped compute pass. Dereferences to the underlying [`wgpu::ComputePass`];
/// dropping it ends the pass and records the timing resolution.
pub struct ComputePassGuard<'a> {
    pass: Option<wgpu::ComputePass<'static>>,
    encoder: &'a mut wgpu::CommandEncoder,
    timing: Option<(&'a mut TimingQueryPool, usize)>,
}

impl Deref for ComputePassGuard<'_> {
    type Target = wgpu::ComputePass<'static>;

    fn deref(&self) -> &Self::Target {
        self.pass.as_ref().expect("pass already ended")
    }
}

impl DerefMut for ComputePassGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.pass.as_mut().expect("pass already ended")
    }
}

impl Drop for ComputePassGuard<'_> {
    fn drop(&mut self) {
        // Ending the pass must precede recording the resolve.
        self.pass.take();
        if let Some((pool, slot)) = self.timing.take() {
            pool.resolve(slot, self.encoder);
        }
    }
}

/// Scoped render pass, with the same drop behavior as [`ComputePassGuard`].
pub struct RenderPassGuard<'a> {
    pass: Option<wgpu::RenderPass<'static>>,
    encoder: &'a mut wgpu::CommandEncoder,
    timing: Option<(&'a mut TimingQueryPool, usize)>,
}

impl Deref for RenderPassGuard<'_> {
    type Target = wgpu::RenderPass<'static>;

    fn deref(&self) -> &Self::Target {
        self.pass.as_ref().expect("pass already ended")
    }
}

impl DerefMut for RenderPassGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.pass.as_mut().expect("pass already ended")
    }
}

impl Drop for RenderPassGuard<'_> {
    fn drop(&mut self) {
        self.pass.take();
        if let Some((pool, slot)) = self.timing.take() {
            pool.resolve(slot, self.encoder);
        }
    }
}
