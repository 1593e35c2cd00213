//! Common test utilities
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparsekit::prelude::*;
use sparsekit::sparse::{ELL_PADDING, ell_index};

/// Create a handle with the default configuration
pub fn create_handle() -> Handle {
    Handle::with_config(Config::default()).expect("handle creation")
}

/// Create a handle in the given pointer mode
pub fn create_handle_with_mode(mode: PointerMode) -> Handle {
    Handle::with_config(Config::default().with_pointer_mode(mode)).expect("handle creation")
}

/// Seeded generator so failures reproduce
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are close within tolerance
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Uniform values in [-1, 1)
pub fn random_values(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Convert a slice of f64 to f32
pub fn to_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|&v| v as f32).collect()
}

// ============================================================================
// Sparse builders and dense references
// ============================================================================

/// A sparse matrix in CSC form
#[derive(Debug, Clone)]
pub struct Csc {
    pub rows: usize,
    pub cols: usize,
    pub col_ptr: Vec<i32>,
    pub row_ind: Vec<i32>,
    pub val: Vec<f64>,
}

impl Csc {
    pub fn nnz(&self) -> usize {
        self.val.len()
    }

    /// The same matrix with every index shifted to `base`
    pub fn with_base(&self, base: IndexBase) -> Csc {
        let b = base.offset();
        Csc {
            col_ptr: self.col_ptr.iter().map(|p| p + b).collect(),
            row_ind: self.row_ind.iter().map(|r| r + b).collect(),
            ..self.clone()
        }
    }

    /// Column-major dense copy
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.rows * self.cols];
        for j in 0..self.cols {
            for p in self.col_ptr[j] as usize..self.col_ptr[j + 1] as usize {
                dense[self.row_ind[p] as usize + j * self.rows] += self.val[p];
            }
        }
        dense
    }
}

/// `rows x cols` zero-based CSC matrix with `nnz` distinct random positions
pub fn random_csc(rng: &mut StdRng, rows: usize, cols: usize, nnz: usize) -> Csc {
    let mut positions = rand::seq::index::sample(rng, rows * cols, nnz).into_vec();
    positions.sort_unstable();

    let mut col_ptr = vec![0i32; cols + 1];
    let mut row_ind = Vec::with_capacity(nnz);
    for &p in &positions {
        col_ptr[p / rows + 1] += 1;
        row_ind.push((p % rows) as i32);
    }
    for j in 0..cols {
        col_ptr[j + 1] += col_ptr[j];
    }
    let val = random_values(rng, nnz);
    Csc {
        rows,
        cols,
        col_ptr,
        row_ind,
        val,
    }
}

/// Column-major `C = alpha * A * B + beta * C` on dense operands
#[allow(clippy::too_many_arguments)]
pub fn dense_gemm(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    lda: usize,
    b: &[f64],
    beta: f64,
    c: &mut [f64],
    ldc: usize,
) {
    for j in 0..n {
        for i in 0..m {
            let dot: f64 = (0..k).map(|l| a[i + l * lda] * b[l + j * k]).sum();
            let prior = if beta == 0.0 { 0.0 } else { beta * c[i + j * ldc] };
            c[i + j * ldc] = alpha * dot + prior;
        }
    }
}

/// An ELL matrix with `width` slots per row
#[derive(Debug, Clone)]
pub struct Ell {
    pub rows: usize,
    pub cols: usize,
    pub width: usize,
    pub col_ind: Vec<i32>,
    pub val: Vec<f64>,
}

/// Random ELL matrix in `base`
///
/// About half of the slots hold entries; the rest are padding or column
/// indices outside the matrix, both of which denote empty slots.
pub fn random_ell(rng: &mut StdRng, rows: usize, cols: usize, width: usize, base: IndexBase) -> Ell {
    let b = base.offset();
    let mut col_ind = vec![ELL_PADDING; rows * width];
    let mut val = vec![0.0; rows * width];
    for row in 0..rows {
        for slot in 0..width {
            let idx = ell_index(row, slot, rows);
            let roll: f64 = rng.random();
            col_ind[idx] = if roll < 0.5 {
                val[idx] = rng.random_range(-1.0..1.0);
                rng.random_range(0..cols as i32) + b
            } else if roll < 0.6 {
                cols as i32 + b
            } else {
                ELL_PADDING
            };
        }
    }
    Ell {
        rows,
        cols,
        width,
        col_ind,
        val,
    }
}

/// CSR arrays `(row_ptr, col_ind, val)` of an ELL matrix, slots in order
pub fn ell_to_csr_reference(ell: &Ell, ell_base: IndexBase, csr_base: IndexBase) -> (Vec<i32>, Vec<i32>, Vec<f64>) {
    let (eb, cb) = (ell_base.offset(), csr_base.offset());
    let mut row_ptr = vec![cb];
    let mut col_ind = Vec::new();
    let mut val = Vec::new();
    for row in 0..ell.rows {
        for slot in 0..ell.width {
            let idx = ell_index(row, slot, ell.rows);
            let col = ell.col_ind[idx] - eb;
            if col >= 0 && (col as usize) < ell.cols {
                col_ind.push(col + cb);
                val.push(ell.val[idx]);
            }
        }
        row_ptr.push(col_ind.len() as i32 + cb);
    }
    (row_ptr, col_ind, val)
}

/// Scalar im2col on host memory
pub fn im2col_reference(p: &Im2colParams, layout: Im2colLayout, im: &[f64]) -> Vec<f64> {
    let mut col = vec![0.0; p.col_len()];
    let window = p.kernel_h * p.kernel_w;
    let plane = p.output_h * p.output_w;
    for b in 0..p.batch {
        for ch in 0..p.channels {
            for ky in 0..p.kernel_h {
                for kx in 0..p.kernel_w {
                    for oy in 0..p.output_h {
                        for ox in 0..p.output_w {
                            let y = (oy * p.stride_h + ky) as isize - p.pad_h as isize;
                            let x = (ox * p.stride_w + kx) as isize - p.pad_w as isize;
                            let inside = y >= 0 && x >= 0 && (y as usize) < p.height && (x as usize) < p.width;
                            let (y, x) = (y as usize, x as usize);
                            let (src, dst) = match layout {
                                Im2colLayout::Nchw => (
                                    ((b * p.channels + ch) * p.height + y) * p.width + x,
                                    ((b * p.channels + ch) * window + ky * p.kernel_w + kx) * plane
                                        + oy * p.output_w
                                        + ox,
                                ),
                                Im2colLayout::Nhwc => (
                                    ((b * p.height + y) * p.width + x) * p.channels + ch,
                                    ((b * plane + oy * p.output_w + ox) * window + ky * p.kernel_w + kx)
                                        * p.channels
                                        + ch,
                                ),
                            };
                            col[dst] = if inside { im[src] } else { 0.0 };
                        }
                    }
                }
            }
        }
    }
    col
}
