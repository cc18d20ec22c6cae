//! GPU device acquisition.

use crate::debug::debug_enabled;
use crate::errors::{GpuContextError, GpuContextResult};

/// The device, its queue, and the handful of facts the rest of the crate
/// needs about them. Acquiring it is the only asynchronous startup step;
/// call sites typically wrap it with `pollster::block_on`.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    debug: bool,
}

impl GpuContext {
    /// Acquires an adapter and device, with timing instrumentation gated on
    /// the process-wide debug flag.
    pub async fn new() -> GpuContextResult<Self> {
        Self::with_debug(debug_enabled()).await
    }

    /// Acquires an adapter and device with an explicit debug choice. In
    /// debug mode the device is created with timestamp queries enabled;
    /// an adapter without that capability is rejected outright.
    pub async fn with_debug(debug: bool) -> GpuContextResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(GpuContextError::AdapterNotFound)?;

        let mut required_features = wgpu::Features::empty();
        if debug {
            if !adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
                return Err(GpuContextError::TimestampQueryUnsupported);
            }
            required_features |= wgpu::Features::TIMESTAMP_QUERY;
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gpu-tensor device"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| GpuContextError::DeviceRequestFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            device,
            queue,
            debug,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Largest buffer the device will create at all.
    pub fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }

    /// Largest buffer the device will bind as a storage buffer.
    pub fn max_storage_binding_size(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }
}
