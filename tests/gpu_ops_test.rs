//! GPU integration tests for the tensor operation surface.
//!
//! Every test acquires its own device and skips gracefully when the machine
//! has no usable adapter, so the suite still passes on GPU-less CI.

use gpu_tensor::{GpuContext, OperationManager, TensorOpError};
use pollster::FutureExt;

fn create_manager() -> Option<OperationManager> {
    match GpuContext::with_debug(false).block_on() {
        Ok(context) => Some(OperationManager::new(&context)),
        Err(error) => {
            eprintln!("skipping GPU test: {error}");
            None
        }
    }
}

#[test]
fn fill_covers_every_element() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t = opm.create(4, 3).expect("tensor creation failed");
    opm.fill(&t, 2.5).expect("fill failed");

    let data = opm.read_back(&t).expect("read-back failed");
    assert_eq!(data, vec![2.5; 12]);
}

#[test]
fn tensors_start_zeroed() {
    let Some(opm) = create_manager() else {
        return;
    };
    let t = opm.zeros(5, 5).expect("tensor creation failed");
    assert_eq!(opm.read_back(&t).expect("read-back failed"), vec![0.0; 25]);
}

#[test]
fn scalar_operations_chain() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t = opm.create(2, 2).expect("tensor creation failed");
    t.upload(&opm, &[1.0, 2.0, 3.0, 4.0]);

    t.add_scalar(&mut opm, 1.0)
        .and_then(|t| t.mul_scalar(&mut opm, 2.0))
        .expect("scalar chain failed");

    let data = opm.read_back(&t).expect("read-back failed");
    assert_eq!(data, vec![4.0, 6.0, 8.0, 10.0]);
}

#[test]
fn sub_and_div_scalar() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t = opm.create(2, 2).expect("tensor creation failed");
    t.upload(&opm, &[10.0, 20.0, 30.0, 40.0]);

    opm.sub_scalar(&t, 10.0).expect("sub_scalar failed");
    opm.div_scalar(&t, 10.0).expect("div_scalar failed");

    let data = opm.read_back(&t).expect("read-back failed");
    assert_eq!(data, vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn negate_flips_signs() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t = opm.create(2, 1).expect("tensor creation failed");
    t.upload(&opm, &[1.5, -2.5]);

    opm.negate(&t).expect("negate failed");
    assert_eq!(opm.read_back(&t).expect("read-back failed"), vec![-1.5, 2.5]);
}

#[test]
fn element_wise_add_is_exact() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t1 = opm.create(2, 2).expect("tensor creation failed");
    let t2 = opm.create(2, 2).expect("tensor creation failed");
    t1.upload(&opm, &[1.0, 2.0, 3.0, 4.0]);
    t2.upload(&opm, &[10.0, 20.0, 30.0, 40.0]);

    opm.add(&t1, &t2).expect("add failed");

    assert_eq!(
        opm.read_back(&t1).expect("read-back failed"),
        vec![11.0, 22.0, 33.0, 44.0]
    );
    // The right-hand operand is read-only.
    assert_eq!(
        opm.read_back(&t2).expect("read-back failed"),
        vec![10.0, 20.0, 30.0, 40.0]
    );
}

#[test]
fn element_wise_ops_on_an_odd_shape() {
    // 3x3 does not divide the 8x8 workgroup; edge threads must stay idle.
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t1 = opm.create(3, 3).expect("tensor creation failed");
    let t2 = opm.create(3, 3).expect("tensor creation failed");
    let ones: Vec<f32> = vec![1.0; 9];
    let steps: Vec<f32> = (0..9).map(|i| i as f32).collect();
    t1.upload(&opm, &ones);
    t2.upload(&opm, &steps);

    opm.add(&t1, &t2).expect("add failed");

    let expected: Vec<f32> = (0..9).map(|i| 1.0 + i as f32).collect();
    assert_eq!(opm.read_back(&t1).expect("read-back failed"), expected);
}

#[test]
fn element_wise_add_on_a_non_square_shape() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t1 = opm.create(4, 2).expect("tensor creation failed");
    let t2 = opm.create(4, 2).expect("tensor creation failed");
    let base: Vec<f32> = (0..8).map(|i| i as f32).collect();
    let delta: Vec<f32> = (0..8).map(|i| (i * 100) as f32).collect();
    t1.upload(&opm, &base);
    t2.upload(&opm, &delta);

    opm.add(&t1, &t2).expect("add failed");

    let expected: Vec<f32> = (0..8).map(|i| (i + i * 100) as f32).collect();
    assert_eq!(opm.read_back(&t1).expect("read-back failed"), expected);
}

#[test]
fn element_wise_mul_and_div() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t1 = opm.create(2, 2).expect("tensor creation failed");
    let t2 = opm.create(2, 2).expect("tensor creation failed");
    t1.upload(&opm, &[2.0, 4.0, 6.0, 8.0]);
    t2.upload(&opm, &[2.0, 2.0, 3.0, 4.0]);

    opm.mul(&t1, &t2).expect("mul failed");
    assert_eq!(
        opm.read_back(&t1).expect("read-back failed"),
        vec![4.0, 8.0, 18.0, 32.0]
    );

    opm.div(&t1, &t2).expect("div failed");
    assert_eq!(
        opm.read_back(&t1).expect("read-back failed"),
        vec![2.0, 4.0, 6.0, 8.0]
    );
}

#[test]
fn shape_mismatch_fails_and_leaves_contents_unchanged() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t1 = opm.create(3, 3).expect("tensor creation failed");
    let t2 = opm.create(2, 2).expect("tensor creation failed");
    opm.fill(&t1, 1.0).expect("fill failed");
    opm.fill(&t2, 2.0).expect("fill failed");

    let result = opm.add(&t1, &t2);
    assert!(matches!(result, Err(TensorOpError::ShapeMismatch { .. })));

    assert_eq!(opm.read_back(&t1).expect("read-back failed"), vec![1.0; 9]);
    assert_eq!(opm.read_back(&t2).expect("read-back failed"), vec![2.0; 4]);
}

#[test]
fn shape_mismatch_on_a_single_matching_dimension() {
    // Matching only width (or only height) is not enough.
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t1 = opm.create(3, 3).expect("tensor creation failed");
    let t2 = opm.create(3, 2).expect("tensor creation failed");

    let result = opm.add(&t1, &t2);
    assert!(matches!(result, Err(TensorOpError::ShapeMismatch { .. })));
}

#[test]
fn dot_product_of_two_by_two_matrices() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let a = opm.create(2, 2).expect("tensor creation failed");
    let b = opm.create(2, 2).expect("tensor creation failed");
    let c = opm.create(2, 2).expect("tensor creation failed");
    a.upload(&opm, &[1.0, 2.0, 3.0, 4.0]);
    b.upload(&opm, &[5.0, 6.0, 7.0, 8.0]);

    a.dot(&mut opm, &b, &c).expect("dot failed");

    // [[1, 2], [3, 4]] x [[5, 6], [7, 8]] = [[19, 22], [43, 50]]
    assert_eq!(
        opm.read_back(&c).expect("read-back failed"),
        vec![19.0, 22.0, 43.0, 50.0]
    );
}

#[test]
fn dot_with_identity_preserves_the_operand() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let a = opm.create(3, 3).expect("tensor creation failed");
    let identity = opm.create(3, 3).expect("tensor creation failed");
    let out = opm.create(3, 3).expect("tensor creation failed");
    let values: Vec<f32> = (1..=9).map(|i| i as f32).collect();
    a.upload(&opm, &values);
    identity.upload(&opm, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    opm.dot(&a, &identity, &out).expect("dot failed");

    assert_eq!(opm.read_back(&out).expect("read-back failed"), values);
}

#[test]
fn dot_rejects_mismatched_inner_dimensions() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let a = opm.create(3, 2).expect("tensor creation failed");
    let b = opm.create(2, 2).expect("tensor creation failed");
    let c = opm.create(2, 2).expect("tensor creation failed");

    let result = opm.dot(&a, &b, &c);
    assert!(matches!(
        result,
        Err(TensorOpError::InnerDimensionMismatch {
            a_width: 3,
            b_height: 2
        })
    ));
}

#[test]
fn seeded_int_fill_is_reproducible() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let first = opm.create(4, 4).expect("tensor creation failed");
    let second = opm.create(4, 4).expect("tensor creation failed");

    opm.random_int_uniform(&first, 42, 1.0, 4.0)
        .expect("random fill failed");
    opm.random_int_uniform(&second, 42, 1.0, 4.0)
        .expect("random fill failed");

    let a = opm.read_back(&first).expect("read-back failed");
    let b = opm.read_back(&second).expect("read-back failed");
    assert_eq!(a, b);
    for value in &a {
        assert!(
            [1.0, 2.0, 3.0].contains(value),
            "value {value} outside [1, 4) after truncation"
        );
    }
}

#[test]
fn seeded_float_fill_is_reproducible_and_in_range() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let first = opm.create(8, 8).expect("tensor creation failed");
    let second = opm.create(8, 8).expect("tensor creation failed");

    opm.random_float_uniform(&first, 7, 0.0, 1.0)
        .expect("random fill failed");
    opm.random_float_uniform(&second, 7, 0.0, 1.0)
        .expect("random fill failed");

    let a = opm.read_back(&first).expect("read-back failed");
    let b = opm.read_back(&second).expect("read-back failed");
    assert_eq!(a, b);
    for value in &a {
        assert!((0.0..1.0).contains(value), "value {value} outside [0, 1)");
    }
    // A uniform fill that produced a constant would be a broken hash.
    assert!(a.iter().any(|v| (v - a[0]).abs() > 1e-6));
}

#[test]
fn different_seeds_produce_different_fills() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let first = opm.create(8, 8).expect("tensor creation failed");
    let second = opm.create(8, 8).expect("tensor creation failed");

    opm.random_float_uniform(&first, 1, 0.0, 1.0)
        .expect("random fill failed");
    opm.random_float_uniform(&second, 2, 0.0, 1.0)
        .expect("random fill failed");

    let a = opm.read_back(&first).expect("read-back failed");
    let b = opm.read_back(&second).expect("read-back failed");
    assert_ne!(a, b);
}

#[test]
fn copy_and_clone_preserve_contents() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let src = opm.create(4, 2).expect("tensor creation failed");
    let values: Vec<f32> = (0..8).map(|i| i as f32 * 0.5).collect();
    src.upload(&opm, &values);

    let dst = opm.create(4, 2).expect("tensor creation failed");
    dst.copy(&mut opm, &src).expect("copy failed");
    assert_eq!(opm.read_back(&dst).expect("read-back failed"), values);

    let cloned = opm.clone_tensor(&src).expect("clone failed");
    assert_eq!(opm.read_back(&cloned).expect("read-back failed"), values);
}

#[test]
fn copy_rejects_mismatched_shapes() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let src = opm.create(2, 2).expect("tensor creation failed");
    let dst = opm.create(4, 1).expect("tensor creation failed");

    let result = opm.copy(&dst, &src);
    assert!(matches!(result, Err(TensorOpError::ShapeMismatch { .. })));
}

#[test]
fn read_back_returns_the_logical_length() {
    // 5x3 = 15 elements, allocated as 64; read-back must not leak padding.
    let Some(opm) = create_manager() else {
        return;
    };
    let t = opm.create(5, 3).expect("tensor creation failed");
    assert_eq!(t.len(), 15);
    assert_eq!(t.padded_len(), 64);
    assert_eq!(t.byte_size(), 256);

    let values: Vec<f32> = (0..15).map(|i| i as f32).collect();
    t.upload(&opm, &values);
    assert_eq!(opm.read_back(&t).expect("read-back failed"), values);
}

#[test]
fn oversized_tensor_is_rejected_before_allocation() {
    let Some(opm) = create_manager() else {
        return;
    };
    // Far beyond the default storage-binding limit.
    let result = opm.create(1 << 16, 1 << 16);
    assert!(matches!(
        result,
        Err(TensorOpError::CapacityExceeded { .. })
    ));
}

#[test]
fn ones_fills_with_one() {
    let Some(mut opm) = create_manager() else {
        return;
    };
    let t = opm.ones(3, 2).expect("tensor creation failed");
    assert_eq!(opm.read_back(&t).expect("read-back failed"), vec![1.0; 6]);
}
