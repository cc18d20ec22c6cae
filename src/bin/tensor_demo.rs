//! End-to-end demo of the tensor-compute surface.
//!
//! Creates a device, runs chained scalar arithmetic, an element-wise
//! combination, a matrix multiply and a seeded random fill, then reads the
//! results back and reports the measured GPU time when timestamp queries are
//! available. Run with `RUST_LOG=info` to see the output.

use gpu_tensor::{GpuContext, GpuContextError, GpuStats, OperationManager};
use log::{info, warn};
use pollster::FutureExt;

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        log::error!("demo failed: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let context = match GpuContext::with_debug(true).block_on() {
        Ok(context) => context,
        Err(GpuContextError::TimestampQueryUnsupported) => {
            warn!("adapter has no timestamp queries, running without timing");
            GpuContext::with_debug(false).block_on()?
        }
        Err(error) => return Err(error.into()),
    };
    let mut opm = OperationManager::new(&context);

    // Chained scalar arithmetic: ((1 + 2) * 3) on every element.
    let t = opm.ones(8, 8)?;
    t.add_scalar(&mut opm, 2.0)?.mul_scalar(&mut opm, 3.0)?;
    info!("scalar chain: {:?}", &opm.read_back(&t)?[..4]);

    // Element-wise combination of two random tensors.
    let x = opm.create(8, 8)?;
    let y = opm.create(8, 8)?;
    x.random_float_uniform(&mut opm, 1, 0.0, 1.0)?;
    y.random_float_uniform(&mut opm, 2, 0.0, 1.0)?;
    x.add(&mut opm, &y)?;
    info!("element-wise sum: {:?}", &opm.read_back(&x)?[..4]);

    // 2x2 matrix multiply.
    let a = opm.create(2, 2)?;
    let b = opm.create(2, 2)?;
    let c = opm.create(2, 2)?;
    a.upload(&opm, &[1.0, 2.0, 3.0, 4.0]);
    b.upload(&opm, &[5.0, 6.0, 7.0, 8.0]);
    a.dot(&mut opm, &b, &c)?;
    info!("dot product: {:?}", opm.read_back(&c)?);

    // Seeded integer fill is reproducible run to run.
    let r = opm.create(4, 4)?;
    r.random_int_uniform(&mut opm, 42, 1.0, 4.0)?;
    info!("seeded ints: {:?}", opm.read_back(&r)?);

    if context.debug() {
        // Timing results land asynchronously; give them a few submits.
        let mut stats = GpuStats::default();
        for _ in 0..10 {
            opm.fill(&t, 0.0)?;
            opm.encoder_mut().submit(Some(&mut stats));
            if stats.gpu_time_ms > 0.0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        info!("measured gpu time: {:.4} ms", stats.gpu_time_ms);
    }

    Ok(())
}
