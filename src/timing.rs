//! Pooled GPU timestamp queries.
//!
//! Each timed pass brackets itself with a pair of timestamps written into a
//! query set. Query sets, their resolve buffers and their mappable result
//! buffers are pooled per pass label so that back-to-back passes never wait
//! on each other's readbacks. A slot walks a strict state machine:
//!
//! `Free` -> (pass begins) -> `NeedResolve` -> (resolve recorded) ->
//! `WaitForResult` -> (readback consumed) -> `Free`
//!
//! Out-of-order transitions are programming errors and assert. Running out
//! of free slots is not an error; the pool grows and logs a warning.

use std::sync::mpsc;

use log::warn;

const TIMESTAMPS_PER_PASS: u32 = 2;
const TIMESTAMP_BYTES: u64 = TIMESTAMPS_PER_PASS as u64 * std::mem::size_of::<u64>() as u64;
const INITIAL_POOL_SLOTS: usize = 10;

/// Lifecycle state of one query-set slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingState {
    Free,
    NeedResolve,
    WaitForResult,
}

/// One timestamp-query slot: a two-entry query set, the buffer its results
/// resolve into, and the host-visible buffer they are copied to for reading.
struct QuerySetSlot {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    result_buffer: wgpu::Buffer,
    state: TimingState,
    map_pending: Option<mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>>,
}

impl QuerySetSlot {
    fn new(device: &wgpu::Device, label: &str, index: usize) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some(&format!("{label} timestamps {index}")),
            ty: wgpu::QueryType::Timestamp,
            count: TIMESTAMPS_PER_PASS,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} timestamp resolve {index}")),
            size: TIMESTAMP_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let result_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} timestamp result {index}")),
            size: TIMESTAMP_BYTES,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            query_set,
            resolve_buffer,
            result_buffer,
            state: TimingState::Free,
            map_pending: None,
        }
    }
}

/// A pool of timestamp-query slots for one pass label.
pub struct TimingQueryPool {
    device: wgpu::Device,
    label: String,
    slots: Vec<QuerySetSlot>,
    duration_ms: f64,
}

impl TimingQueryPool {
    pub fn new(device: wgpu::Device, label: &str) -> Self {
        let slots = (0..INITIAL_POOL_SLOTS)
            .map(|i| QuerySetSlot::new(&device, label, i))
            .collect();
        Self {
            device,
            label: label.to_string(),
            slots,
            duration_ms: 0.0,
        }
    }

    /// Returns the index of a free slot, growing the pool when none is
    /// available. Exhaustion is a recoverable slow path, not an error.
    pub fn acquire(&mut self) -> usize {
        if let Some(index) = self
            .slots
            .iter()
            .position(|s| s.state == TimingState::Free)
        {
            return index;
        }
        warn!(
            "timing pool '{}' has no free slots, allocating slot {}",
            self.label,
            self.slots.len()
        );
        self.slots
            .push(QuerySetSlot::new(&self.device, &self.label, self.slots.len()));
        self.slots.len() - 1
    }

    /// Marks the slot as carrying an in-flight pass.
    pub fn begin(&mut self, slot: usize) {
        let slot = &mut self.slots[slot];
        assert_eq!(
            slot.state,
            TimingState::Free,
            "timing slot reused before its previous result was consumed"
        );
        slot.state = TimingState::NeedResolve;
    }

    pub fn state(&self, slot: usize) -> TimingState {
        self.slots[slot].state
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Timestamp attachment for a compute pass bracketed by this slot.
    pub fn compute_timestamp_writes(&self, slot: usize) -> wgpu::ComputePassTimestampWrites<'_> {
        wgpu::ComputePassTimestampWrites {
            query_set: &self.slots[slot].query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        }
    }

    /// Timestamp attachment for a render pass bracketed by this slot.
    pub fn render_timestamp_writes(&self, slot: usize) -> wgpu::RenderPassTimestampWrites<'_> {
        wgpu::RenderPassTimestampWrites {
            query_set: &self.slots[slot].query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        }
    }

    /// Records the query resolution and the copy into the readable buffer.
    /// Must run after the slot's pass has ended and before submission.
    pub fn resolve(&mut self, slot: usize, encoder: &mut wgpu::CommandEncoder) {
        let slot = &mut self.slots[slot];
        assert_eq!(
            slot.state,
            TimingState::NeedResolve,
            "timing slot resolved before its pass began"
        );
        slot.state = TimingState::WaitForResult;
        encoder.resolve_query_set(
            &slot.query_set,
            0..TIMESTAMPS_PER_PASS,
            &slot.resolve_buffer,
            0,
        );
        encoder.copy_buffer_to_buffer(&slot.resolve_buffer, 0, &slot.result_buffer, 0, TIMESTAMP_BYTES);
    }

    /// Consumes every finished readback, best effort: slots whose mapping has
    /// not completed yet are skipped and picked up on a later call. Returns
    /// the pool's current measured duration in milliseconds, refreshed with
    /// the sum of the sessions that landed on this call. `timestamp_period`
    /// is the queue's nanoseconds-per-tick conversion factor.
    pub fn collect(&mut self, timestamp_period: f32) -> f64 {
        for slot in &mut self.slots {
            if slot.state == TimingState::WaitForResult && slot.map_pending.is_none() {
                let (sender, receiver) = mpsc::channel();
                slot.result_buffer
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = sender.send(result);
                    });
                slot.map_pending = Some(receiver);
            }
        }

        // Non-blocking: drive mappings forward without waiting for them.
        self.device.poll(wgpu::Maintain::Poll);

        let mut landed_ms = 0.0f64;
        let mut any_landed = false;
        for slot in &mut self.slots {
            let Some(receiver) = &slot.map_pending else {
                continue;
            };
            match receiver.try_recv() {
                Ok(Ok(())) => {
                    {
                        let view = slot.result_buffer.slice(..).get_mapped_range();
                        let timestamps: &[u64] = bytemuck::cast_slice(&view);
                        let ticks = timestamps[1].wrapping_sub(timestamps[0]);
                        landed_ms += ticks as f64 * timestamp_period as f64 / 1_000_000.0;
                    }
                    slot.result_buffer.unmap();
                    slot.map_pending = None;
                    slot.state = TimingState::Free;
                    any_landed = true;
                }
                Ok(Err(error)) => {
                    warn!(
                        "timing pool '{}' failed to map a result buffer: {error}",
                        self.label
                    );
                    slot.map_pending = None;
                    slot.state = TimingState::Free;
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => {
                    slot.map_pending = None;
                    slot.state = TimingState::Free;
                }
            }
        }

        if any_landed {
            self.duration_ms = landed_ms;
        }
        self.duration_ms
    }
}
