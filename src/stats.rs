//! Measured GPU time reporting.

/// Consumer of measured GPU durations, fed by [`crate::Encoder::submit`]
/// when debug instrumentation is enabled.
pub trait GpuTimeSink {
    /// Receives the summed duration of all timed passes, in milliseconds.
    fn record_gpu_time(&mut self, duration_ms: f64);
}

/// Smallest useful [`GpuTimeSink`]: remembers the last reported duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpuStats {
    pub gpu_time_ms: f64,
}

impl GpuTimeSink for GpuStats {
    fn record_gpu_time(&mut self, duration_ms: f64) {
        self.gpu_time_ms = duration_ms;
    }
}
