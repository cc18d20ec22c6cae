//! GPU integration tests for the timestamp-query pool and timed submission.
//!
//! These need an adapter with `TIMESTAMP_QUERY`; without one they skip.

use std::collections::HashSet;
use std::time::Duration;

use gpu_tensor::{GpuContext, GpuStats, OperationManager, TimingQueryPool, TimingState};
use pollster::FutureExt;

fn create_context() -> Option<GpuContext> {
    match GpuContext::with_debug(true).block_on() {
        Ok(context) => Some(context),
        Err(error) => {
            eprintln!("skipping timing test: {error}");
            None
        }
    }
}

#[test]
fn busy_slots_are_never_handed_out_twice() {
    let Some(context) = create_context() else {
        return;
    };
    let mut pool = TimingQueryPool::new(context.device().clone(), "test");

    let initial_capacity = pool.slot_count();
    let mut seen = HashSet::new();
    // Push past the initial capacity; exhaustion must grow the pool, not
    // recycle an in-flight slot.
    for _ in 0..initial_capacity + 5 {
        let slot = pool.acquire();
        pool.begin(slot);
        assert!(seen.insert(slot), "slot {slot} handed out while busy");
    }
    assert!(pool.slot_count() > initial_capacity);
}

#[test]
fn slot_walks_the_full_state_machine() {
    let Some(context) = create_context() else {
        return;
    };
    let device = context.device();
    let queue = context.queue();
    let mut pool = TimingQueryPool::new(device.clone(), "state-machine");

    let slot = pool.acquire();
    assert_eq!(pool.state(slot), TimingState::Free);
    pool.begin(slot);
    assert_eq!(pool.state(slot), TimingState::NeedResolve);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("timing test"),
    });
    {
        let _pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("timed pass"),
            timestamp_writes: Some(pool.compute_timestamp_writes(slot)),
        });
    }
    pool.resolve(slot, &mut encoder);
    assert_eq!(pool.state(slot), TimingState::WaitForResult);

    queue.submit(Some(encoder.finish()));

    // The readback is consumed best effort; poll until it lands.
    let period = queue.get_timestamp_period();
    for _ in 0..500 {
        pool.collect(period);
        if pool.state(slot) == TimingState::Free {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timing result never landed");
}

#[test]
fn collect_skips_slots_that_are_not_ready() {
    let Some(context) = create_context() else {
        return;
    };
    let mut pool = TimingQueryPool::new(context.device().clone(), "pending");

    let slot = pool.acquire();
    pool.begin(slot);
    // Nothing resolved or submitted: collect must leave the slot alone.
    pool.collect(context.queue().get_timestamp_period());
    assert_eq!(pool.state(slot), TimingState::NeedResolve);
}

#[test]
fn timed_submission_reports_a_duration() {
    let Some(context) = create_context() else {
        return;
    };
    let mut opm = OperationManager::new(&context);
    let t = opm.create(64, 64).expect("tensor creation failed");

    let mut stats = GpuStats::default();
    for _ in 0..200 {
        opm.fill(&t, 1.0).expect("fill failed");
        opm.encoder_mut().submit(Some(&mut stats));
        if stats.gpu_time_ms > 0.0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    // Some drivers legitimately report a zero-tick pass; the assertion is
    // that collection completed without tripping the state machine.
    assert!(stats.gpu_time_ms >= 0.0);
    assert!(stats.gpu_time_ms.is_finite());
}
