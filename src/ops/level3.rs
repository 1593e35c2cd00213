//! Sparse x dense matrix products.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::handle::{Handle, PointerMode};
use crate::logging::{Addr, ScalarArg, log_bench, log_trace, replace_x};
use crate::ops::validate::{check_general, check_len, check_leading_dim, dense_len, is_degenerate};
use crate::runtime::simt::kernels::mcscm::{McscmArgs, McscmnnDevice, McscmnnHost, launch_mcscmnn};
use crate::runtime::simt::{DeviceSlice, DeviceSliceMut};
use crate::sparse::{MatDescr, Operation};

/// `C = alpha * op(A) * op(B) + beta * C` with `B` in CSC
///
/// `alpha` and `beta` are read on the host in host pointer mode and by the
/// kernel in device pointer mode.
#[allow(clippy::too_many_arguments)]
pub(crate) fn mcscm_template<T: Element>(
    handle: &Handle,
    trans_a: Operation,
    trans_b: Operation,
    m: usize,
    n: usize,
    k: usize,
    nnz: usize,
    alpha: DeviceSlice<'_, T>,
    a: DeviceSlice<'_, T>,
    lda: usize,
    descr: &MatDescr,
    csc_val: DeviceSlice<'_, T>,
    csc_col_ptr: DeviceSlice<'_, i32>,
    csc_row_ind: DeviceSlice<'_, i32>,
    beta: DeviceSlice<'_, T>,
    c: DeviceSliceMut<'_, T>,
    ldc: usize,
) -> Result<()> {
    let layer = handle.layer();
    let name = replace_x::<T>("sparsekit_Xmcscm");
    let mode = handle.pointer_mode();
    let alpha_arg = ScalarArg::of(mode, alpha);
    let beta_arg = ScalarArg::of(mode, beta);
    log_trace(
        layer,
        &name,
        &[
            &trans_a,
            &trans_b,
            &m,
            &n,
            &k,
            &nnz,
            &alpha_arg,
            &Addr::of(a.as_ptr()),
            &lda,
            descr,
            &Addr::of(csc_val.as_ptr()),
            &Addr::of(csc_col_ptr.as_ptr()),
            &Addr::of(csc_row_ind.as_ptr()),
            &beta_arg,
            &Addr::of(c.as_ptr()),
            &ldc,
        ],
    );
    if mode == PointerMode::Host {
        log_bench(
            layer,
            "mcscm",
            T::DTYPE.prefix(),
            &format!(
                "--transposeA {trans_a} --transposeB {trans_b} -m {m} -n {n} -k {k} \
                 --alpha {alpha_arg} --beta {beta_arg} --mtx <matrix.mtx>"
            ),
        );
    }

    if trans_a != Operation::NonTranspose {
        return Err(Error::invalid_size(
            "trans_A",
            "leading dimensions are only defined for a non-transposed dense operand",
        ));
    }
    check_leading_dim("lda", lda, m)?;
    check_leading_dim("ldc", ldc, m)?;

    check_general("descr", descr)?;
    if trans_b != Operation::NonTranspose {
        return Err(Error::not_implemented("transposed sparse operand"));
    }

    if is_degenerate(&[m, n, k, nnz]) {
        return Ok(());
    }

    let args = McscmArgs {
        m,
        n,
        a,
        lda,
        csc_col_ptr,
        csc_row_ind,
        csc_val,
        c,
        ldc,
        base: descr.base(),
    };
    let cfg = launch_mcscmnn(m, n)?;
    let _serial = handle.lock_scratch();

    match mode {
        PointerMode::Host => {
            let (alpha, beta) = (alpha.load(0), beta.load(0));
            if alpha == T::zero() && beta == T::one() {
                return Ok(());
            }
            handle
                .stream()
                .launch(&cfg, &McscmnnHost { args, alpha, beta })
        }
        PointerMode::Device => handle
            .stream()
            .launch(&cfg, &McscmnnDevice { args, alpha, beta }),
    }
}

impl Handle {
    /// Dense x sparse product `C = alpha * A * B + beta * C`
    ///
    /// `A` is a dense `m x k` matrix (column-major, leading dimension `lda`),
    /// `B` a sparse `k x n` matrix in CSC with `nnz` entries described by
    /// `descr`, and `C` a dense `m x n` matrix (column-major, `ldc`). With
    /// `beta == 0` the prior contents of `C` are never read.
    ///
    /// Only `NonTranspose` is implemented for both operands.
    #[allow(clippy::too_many_arguments)]
    pub fn mcscm<T: Element>(
        &self,
        trans_a: Operation,
        trans_b: Operation,
        m: usize,
        n: usize,
        k: usize,
        nnz: usize,
        alpha: &T,
        a: &[T],
        lda: usize,
        descr: &MatDescr,
        csc_val: &[T],
        csc_col_ptr: &[i32],
        csc_row_ind: &[i32],
        beta: &T,
        c: &mut [T],
        ldc: usize,
    ) -> Result<()> {
        if !is_degenerate(&[m, n, k, nnz]) {
            check_len("A", a.len(), dense_len(lda, m, k))?;
            check_len("csc_val", csc_val.len(), nnz)?;
            check_len("csc_col_ptr", csc_col_ptr.len(), n + 1)?;
            check_len("csc_row_ind", csc_row_ind.len(), nnz)?;
            check_len("C", c.len(), dense_len(ldc, m, n))?;
        }
        mcscm_template(
            self,
            trans_a,
            trans_b,
            m,
            n,
            k,
            nnz,
            DeviceSlice::scalar(alpha),
            DeviceSlice::new(a),
            lda,
            descr,
            DeviceSlice::new(csc_val),
            DeviceSlice::new(csc_col_ptr),
            DeviceSlice::new(csc_row_ind),
            DeviceSlice::scalar(beta),
            DeviceSliceMut::new(c),
            ldc,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Status;

    fn identity_b() -> ([f64; 2], [i32; 3], [i32; 2]) {
        ([1.0, 1.0], [0, 1, 2], [0, 1])
    }

    #[test]
    fn test_validation_order() {
        let handle = Handle::with_config(Config::default()).unwrap();
        let (val, ptr, ind) = identity_b();
        let a = [1.0f64; 4];
        let mut c = [0.0f64; 4];
        let run = |ta, tb, lda, descr: MatDescr, c: &mut [f64]| {
            handle
                .mcscm(ta, tb, 2, 2, 2, 2, &1.0, &a, lda, &descr, &val, &ptr, &ind, &0.0, c, 2)
                .map_err(|e| e.status())
        };

        let nt = Operation::NonTranspose;
        let t = Operation::Transpose;
        let sym = MatDescr::new().with_type(crate::sparse::MatrixType::Symmetric);
        assert_eq!(run(t, t, 2, sym, &mut c[..]), Err(Status::InvalidSize));
        assert_eq!(run(nt, nt, 1, sym, &mut c[..]), Err(Status::InvalidSize));
        assert_eq!(run(nt, t, 2, sym, &mut c[..]), Err(Status::NotImplemented));
        assert_eq!(run(nt, t, 2, MatDescr::new(), &mut c[..]), Err(Status::NotImplemented));
        assert_eq!(run(nt, nt, 2, MatDescr::new(), &mut c[..]), Ok(()));
        assert_eq!(c, a);
    }

    #[test]
    fn test_host_identity_scalars_skip_launch() {
        let handle = Handle::with_config(Config::default()).unwrap();
        let (val, ptr, ind) = identity_b();
        let a = [1.0f64; 4];
        let mut c = [f64::NAN; 4];
        handle
            .mcscm(
                Operation::NonTranspose,
                Operation::NonTranspose,
                2,
                2,
                2,
                2,
                &0.0,
                &a,
                2,
                &MatDescr::new(),
                &val,
                &ptr,
                &ind,
                &1.0,
                &mut c,
                2,
            )
            .unwrap();
        assert!(c.iter().all(|v| v.is_nan()));
        assert_eq!(handle.stream().launch_count(), 0);
    }
}
