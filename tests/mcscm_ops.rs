//! Integration tests for the dense x CSC product

mod common;

use common::{
    Csc, assert_allclose_f32, assert_allclose_f64, create_handle, create_handle_with_mode, dense_gemm,
    random_csc, random_values, rng, to_f32,
};
use sparsekit::prelude::*;
use sparsekit::sparse::check_compressed;

const NT: Operation = Operation::NonTranspose;

/// Reference result of `alpha * A * B + beta * C` for a CSC `B`
#[allow(clippy::too_many_arguments)]
fn reference(
    m: usize,
    alpha: f64,
    a: &[f64],
    lda: usize,
    b: &Csc,
    beta: f64,
    c: &[f64],
    ldc: usize,
) -> Vec<f64> {
    let mut out = c.to_vec();
    dense_gemm(m, b.cols, b.rows, alpha, a, lda, &b.to_dense(), beta, &mut out, ldc);
    out
}

#[test]
fn test_mcscm_f32_overwrites_poisoned_c() {
    let handle = create_handle();
    let (m, n, k, nnz) = (128, 64, 32, 200);
    let mut rng = rng(7);
    let b = random_csc(&mut rng, k, n, nnz);
    let a = random_values(&mut rng, m * k);
    let alpha = 1.5;

    let mut c = vec![f32::NAN; m * n];
    handle
        .mcscm(
            NT,
            NT,
            m,
            n,
            k,
            nnz,
            &(alpha as f32),
            &to_f32(&a),
            m,
            &MatDescr::new(),
            &to_f32(&b.val),
            &b.col_ptr,
            &b.row_ind,
            &0.0f32,
            &mut c,
            m,
        )
        .unwrap();

    let expected = reference(m, alpha, &a, m, &b, 0.0, &vec![0.0; m * n], m);
    assert!(c.iter().all(|v| v.is_finite()));
    assert_allclose_f32(&c, &to_f32(&expected), 1e-5, 1e-5, "smcscm beta=0");
}

#[test]
fn test_mcscm_f64_padded_leading_dims() {
    let handle = create_handle();
    let (m, n, k, nnz) = (37, 19, 23, 90);
    let (lda, ldc) = (m + 5, m + 3);
    let mut rng = rng(8);
    let zero_based = random_csc(&mut rng, k, n, nnz);
    let b = zero_based.with_base(IndexBase::One);
    assert_eq!(check_compressed(&b.col_ptr, &b.row_ind, IndexBase::One, k).unwrap(), nnz);
    let a = random_values(&mut rng, lda * k);
    let c0 = random_values(&mut rng, ldc * n);
    let (alpha, beta) = (-0.75, 2.0);

    let mut c = c0.clone();
    handle
        .mcscm(
            NT,
            NT,
            m,
            n,
            k,
            nnz,
            &alpha,
            &a,
            lda,
            &MatDescr::new().with_base(IndexBase::One),
            &b.val,
            &b.col_ptr,
            &b.row_ind,
            &beta,
            &mut c,
            ldc,
        )
        .unwrap();

    let expected = reference(m, alpha, &a, lda, &zero_based, beta, &c0, ldc);
    assert_allclose_f64(&c, &expected, 1e-12, 1e-12, "dmcscm lda/ldc");
    for j in 0..n {
        for i in m..ldc {
            assert_eq!(c[i + j * ldc].to_bits(), c0[i + j * ldc].to_bits(), "padding ({i}, {j})");
        }
    }
}

#[test]
fn test_mcscm_identity_scalars_device_mode() {
    let handle = create_handle_with_mode(PointerMode::Device);
    let (m, n, k, nnz) = (20, 12, 9, 40);
    let mut rng = rng(9);
    let b = random_csc(&mut rng, k, n, nnz);
    let a = random_values(&mut rng, m * k);
    let c0 = random_values(&mut rng, m * n);

    let mut c = c0.clone();
    handle
        .mcscm(
            NT, NT, m, n, k, nnz, &0.0, &a, m, &MatDescr::new(), &b.val, &b.col_ptr, &b.row_ind,
            &1.0, &mut c, m,
        )
        .unwrap();

    assert_eq!(handle.stream().launch_count(), 1);
    assert!(c.iter().zip(&c0).all(|(x, y)| x.to_bits() == y.to_bits()));
}

#[test]
fn test_mcscm_identity_scalars_host_mode() {
    let handle = create_handle();
    let (m, n, k, nnz) = (20, 12, 9, 40);
    let mut rng = rng(10);
    let b = random_csc(&mut rng, k, n, nnz);
    let a = to_f32(&random_values(&mut rng, m * k));
    let c0 = to_f32(&random_values(&mut rng, m * n));

    let mut c = c0.clone();
    handle
        .mcscm(
            NT,
            NT,
            m,
            n,
            k,
            nnz,
            &0.0f32,
            &a,
            m,
            &MatDescr::new(),
            &to_f32(&b.val),
            &b.col_ptr,
            &b.row_ind,
            &1.0f32,
            &mut c,
            m,
        )
        .unwrap();

    assert_eq!(handle.stream().launch_count(), 0);
    assert_eq!(c, c0);
}

#[test]
fn test_mcscm_base_independent() {
    let handle = create_handle();
    let (m, n, k, nnz) = (33, 17, 21, 80);
    let mut rng = rng(12);
    let b = random_csc(&mut rng, k, n, nnz);
    let b1 = b.with_base(IndexBase::One);
    let a = random_values(&mut rng, m * k);
    let c0 = random_values(&mut rng, m * n);

    let run = |csc: &Csc, base: IndexBase| {
        let mut c = c0.clone();
        handle
            .mcscm(
                NT,
                NT,
                m,
                n,
                k,
                nnz,
                &0.5,
                &a,
                m,
                &MatDescr::new().with_base(base),
                &csc.val,
                &csc.col_ptr,
                &csc.row_ind,
                &-1.0,
                &mut c,
                m,
            )
            .unwrap();
        c
    };

    let zero = run(&b, IndexBase::Zero);
    let one = run(&b1, IndexBase::One);
    assert!(zero.iter().zip(&one).all(|(x, y)| x.to_bits() == y.to_bits()));
}

#[test]
fn test_mcscm_no_entries_quick_return() {
    let handle = create_handle();
    let col_ptr = [0i32; 4];
    let mut c = [3.0f64; 6];
    handle
        .mcscm(
            NT, NT, 2, 3, 2, 0, &1.0, &[], 2, &MatDescr::new(), &[], &col_ptr, &[], &0.0, &mut c, 2,
        )
        .unwrap();
    assert_eq!(c, [3.0; 6]);
    assert_eq!(handle.stream().launch_count(), 0);
}

#[test]
fn test_mcscm_validation() {
    let handle = create_handle();
    let a = [1.0f64; 4];
    let (val, col_ptr, row_ind) = ([1.0f64, 1.0], [0, 1, 2], [0, 1]);
    let mut c = [0.0f64; 4];
    let mut run = |ta: Operation, tb: Operation, lda: usize, descr: MatDescr| {
        handle
            .mcscm(ta, tb, 2, 2, 2, 2, &1.0, &a, lda, &descr, &val, &col_ptr, &row_ind, &0.0, &mut c, 2)
            .unwrap_err()
            .status()
    };

    assert_eq!(run(Operation::Transpose, NT, 2, MatDescr::new()), Status::InvalidSize);
    assert_eq!(run(NT, NT, 1, MatDescr::new()), Status::InvalidSize);
    assert_eq!(run(NT, Operation::Transpose, 2, MatDescr::new()), Status::NotImplemented);
    assert_eq!(
        run(NT, NT, 2, MatDescr::new().with_type(MatrixType::Symmetric)),
        Status::NotImplemented
    );
}

#[test]
fn test_mcscm_device_scalars_match_host() {
    let host = create_handle();
    let device = create_handle_with_mode(PointerMode::Device);
    let (m, n, k, nnz) = (45, 30, 26, 150);
    let mut rng = rng(13);
    let b = random_csc(&mut rng, k, n, nnz);
    let a = random_values(&mut rng, m * k);
    let c0 = random_values(&mut rng, m * n);

    for (alpha, beta) in [(1.5, 0.0), (-0.25, 0.75)] {
        let run = |handle: &Handle| {
            let mut c = if beta == 0.0 { vec![f64::NAN; m * n] } else { c0.clone() };
            handle
                .mcscm(
                    NT,
                    NT,
                    m,
                    n,
                    k,
                    nnz,
                    &alpha,
                    &a,
                    m,
                    &MatDescr::new(),
                    &b.val,
                    &b.col_ptr,
                    &b.row_ind,
                    &beta,
                    &mut c,
                    m,
                )
                .unwrap();
            c
        };

        let launches = device.stream().launch_count();
        let on_device = run(&device);
        let on_host = run(&host);
        assert_eq!(device.stream().launch_count(), launches + 1);

        let msg = format!("alpha {alpha}, beta {beta}");
        assert!(
            on_device.iter().zip(&on_host).all(|(x, y)| x.to_bits() == y.to_bits()),
            "{msg}: device and host scalars differ"
        );
        let prior = if beta == 0.0 { vec![0.0; m * n] } else { c0.clone() };
        let expected = reference(m, alpha, &a, m, &b, beta, &prior, m);
        assert_allclose_f64(&on_device, &expected, 1e-12, 1e-12, &msg);
    }
}

#[test]
fn test_mcscm_rows_past_grid_limit() {
    let handle = create_handle();
    // 65537 row groups of 8, two more than one grid column can address
    let m = 8 * 65_537;
    let a: Vec<f64> = (0..m).map(|i| (i % 1000) as f64 - 500.0).collect();
    let (val, col_ptr, row_ind) = ([2.0f64], [0, 1], [0]);
    let mut c = vec![f64::NAN; m];
    handle
        .mcscm(
            NT, NT, m, 1, 1, 1, &0.5, &a, m, &MatDescr::new(), &val, &col_ptr, &row_ind, &0.0, &mut c, m,
        )
        .unwrap();
    assert!(c.iter().zip(&a).all(|(x, y)| x == y));
}
