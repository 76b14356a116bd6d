//! Sparsity-constrained drivers, depth 1 only: ED and KL with the
//! normalized-length sparsity term of Eggert and Korner, and the ED variant
//! with unit-norm basis columns.
//!
//! The sparsity weight is per element (the engine's `S` matrix); a zero
//! weight turns the constraint off at that position, so a caller can
//! restrict it to a subset of rows or columns.

use ndarray::Array2;

use crate::deconvolver::Deconvolver;
use crate::matrix::{self, DIVISOR_FLOOR};
use crate::progress::ProgressObserver;

use super::ed::{ed_h_update_matrices, ed_w_update};

/// NMF with squared Euclidean distance and a sparsity term on the
/// row-normalized activations.
pub(crate) struct NmfEdSparse {
    w_num: Array2<f64>,
    w_hht: Array2<f64>,
    w_denom: Array2<f64>,
    h_num: Array2<f64>,
    h_wtw: Array2<f64>,
    h_denom: Array2<f64>,
    cs_plus: Vec<f64>,
    cs_minus: Vec<f64>,
}

impl NmfEdSparse {
    pub(crate) fn new(d: &Deconvolver) -> Self {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        NmfEdSparse {
            w_num: Array2::zeros((m, r)),
            w_hht: Array2::zeros((r, r)),
            w_denom: Array2::zeros((m, r)),
            h_num: Array2::zeros((r, n)),
            h_wtw: Array2::zeros((r, r)),
            h_denom: Array2::zeros((r, n)),
            cs_plus: vec![0.0; r],
            cs_minus: vec![0.0; r],
        }
    }

    pub(crate) fn run(
        &mut self,
        d: &mut Deconvolver,
        max_steps: u32,
        eps: f64,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) {
        let (r, n) = d.h.dim();
        let sqrt_n = (n as f64).sqrt();

        d.num_steps = 0;
        while d.num_steps < max_steps && !d.check_convergence(eps, true) {
            ed_w_update(d, &mut self.w_num, &mut self.w_hht, &mut self.w_denom);

            ed_h_update_matrices(d, &mut self.h_num, &mut self.h_wtw, &mut self.h_denom);

            // Row-wise parts of the sparsity gradient; the normalization by
            // the row length makes the term invariant to the row scale.
            for i in 0..r {
                let row = d.h.row(i);
                let h_row_sum_sq = row.dot(&row);
                let h_row_length = h_row_sum_sq.sqrt();
                self.cs_plus[i] = sqrt_n / h_row_length;
                self.cs_minus[i] = sqrt_n * row.sum() / (h_row_sum_sq * h_row_length);
            }

            for i in 0..r {
                for j in 0..n {
                    let mut den = self.h_denom[(i, j)] + d.s[(i, j)] * self.cs_plus[i];
                    if den <= 0.0 {
                        den = DIVISOR_FLOOR;
                    }
                    let h = d.h[(i, j)];
                    d.h[(i, j)] =
                        h * (self.h_num[(i, j)] + d.s[(i, j)] * h * self.cs_minus[i]) / den;
                }
            }

            d.next_it_step(observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver), max_steps);
        }
    }
}

/// NMF with extended KL divergence and the same sparsity term.
pub(crate) struct NmfKlSparse {
    v_over_approx: Array2<f64>,
    w_num: Array2<f64>,
    h_num: Array2<f64>,
    cs_plus: Vec<f64>,
    cs_minus: Vec<f64>,
    h_row_sums: Vec<f64>,
    w_col_sums: Vec<f64>,
}

impl NmfKlSparse {
    pub(crate) fn new(d: &Deconvolver) -> Self {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        NmfKlSparse {
            v_over_approx: Array2::zeros((m, n)),
            w_num: Array2::zeros((m, r)),
            h_num: Array2::zeros((r, n)),
            cs_plus: vec![0.0; r],
            cs_minus: vec![0.0; r],
            h_row_sums: vec![0.0; r],
            w_col_sums: vec![0.0; r],
        }
    }

    pub(crate) fn run(
        &mut self,
        d: &mut Deconvolver,
        max_steps: u32,
        eps: f64,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        let sqrt_n = (n as f64).sqrt();

        d.num_steps = 0;
        while d.num_steps < max_steps {
            d.compute_approx();
            if d.check_convergence(eps, false) {
                break;
            }

            matrix::element_div_floored(&d.v, &d.approx, &mut self.v_over_approx);
            matrix::mult_bt(&self.v_over_approx, &d.h, &mut self.w_num);

            // Row sums feed both the W divisor and the sparsity gradient.
            for i in 0..r {
                self.h_row_sums[i] = d.h.row(i).sum();
            }

            if !d.w_constant {
                for j in 0..r {
                    if d.w_col_constant[j] {
                        continue;
                    }
                    let mut den = self.h_row_sums[j];
                    if den <= 0.0 {
                        den = DIVISOR_FLOOR;
                    }
                    for i in 0..m {
                        d.w[0][(i, j)] *= self.w_num[(i, j)] / den;
                    }
                }

                d.compute_approx();
                matrix::element_div_floored(&d.v, &d.approx, &mut self.v_over_approx);
            }

            for i in 0..r {
                let row = d.h.row(i);
                let h_row_sum_sq = row.dot(&row);
                let h_row_length = h_row_sum_sq.sqrt();
                self.cs_plus[i] = sqrt_n / h_row_length;
                self.cs_minus[i] =
                    sqrt_n * self.h_row_sums[i] / (h_row_sum_sq * h_row_length);
                self.w_col_sums[i] = d.w[0].column(i).sum();
            }

            matrix::mult_at(&d.w[0], &self.v_over_approx, &mut self.h_num);
            for i in 0..r {
                for j in 0..n {
                    let mut den = self.w_col_sums[i] + d.s[(i, j)] * self.cs_plus[i];
                    if den <= 0.0 {
                        den = DIVISOR_FLOOR;
                    }
                    let h = d.h[(i, j)];
                    d.h[(i, j)] =
                        h * (self.h_num[(i, j)] + d.s[(i, j)] * h * self.cs_minus[i]) / den;
                }
            }

            d.next_it_step(observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver), max_steps);
        }
    }
}

/// NMF with squared Euclidean distance, unit-norm basis columns and an L1
/// sparsity term (Eggert-Korner). The basis is re-normalized at the top of
/// every iteration; the W update then keeps the columns near unit length.
pub(crate) struct NmfEdSparseNorm {
    wtw: Array2<f64>,
    h_num: Array2<f64>,
    h_denom: Array2<f64>,
    w_num1: Array2<f64>,
    hht: Array2<f64>,
    w_denom1: Array2<f64>,
    hvt: Array2<f64>,
    w_num2: Array2<f64>,
    w_denom2: Array2<f64>,
}

impl NmfEdSparseNorm {
    pub(crate) fn new(d: &Deconvolver) -> Self {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        NmfEdSparseNorm {
            wtw: Array2::zeros((r, r)),
            h_num: Array2::zeros((r, n)),
            h_denom: Array2::zeros((r, n)),
            w_num1: Array2::zeros((m, r)),
            hht: Array2::zeros((r, r)),
            w_denom1: Array2::zeros((m, r)),
            hvt: Array2::zeros((r, m)),
            w_num2: Array2::zeros((r, r)),
            w_denom2: Array2::zeros((r, r)),
        }
    }

    pub(crate) fn run(
        &mut self,
        d: &mut Deconvolver,
        max_steps: u32,
        eps: f64,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();

        d.num_steps = 0;
        while d.num_steps < max_steps && !d.check_convergence(eps, true) {
            // Normalize each basis column to unit L2 length.
            for j in 0..r {
                let col = d.w[0].column(j);
                let mut norm = col.dot(&col).sqrt();
                if norm <= 0.0 {
                    norm = DIVISOR_FLOOR;
                }
                for i in 0..m {
                    d.w[0][(i, j)] /= norm;
                }
            }

            // H update. Wᵀ * W is kept for reuse in the W update below.
            matrix::mult_at(&d.w[0], &d.v, &mut self.h_num);
            matrix::mult_at(&d.w[0], &d.w[0], &mut self.wtw);
            matrix::mult(&self.wtw, &d.h, &mut self.h_denom);
            for i in 0..r {
                for j in 0..n {
                    let mut den = self.h_denom[(i, j)] + d.s[(i, j)];
                    if den <= 0.0 {
                        den = DIVISOR_FLOOR;
                    }
                    d.h[(i, j)] *= self.h_num[(i, j)] / den;
                }
            }

            // W update. The diagonal entries of (H*Hᵀ)*(Wᵀ*W) and
            // (H*Vᵀ)*W carry the norm-coupling terms of the gradient.
            matrix::mult_bt(&d.v, &d.h, &mut self.w_num1);
            matrix::mult_bt(&d.h, &d.h, &mut self.hht);
            matrix::mult(&d.w[0], &self.hht, &mut self.w_denom1);
            matrix::mult(&self.hht, &self.wtw, &mut self.w_num2);
            matrix::mult_bt(&d.h, &d.v, &mut self.hvt);
            matrix::mult(&self.hvt, &d.w[0], &mut self.w_denom2);
            for j in 0..r {
                if d.w_col_constant[j] {
                    continue;
                }
                for i in 0..m {
                    let w = d.w[0][(i, j)];
                    let num = self.w_num1[(i, j)] + self.w_num2[(j, j)] * w;
                    let mut den = self.w_denom1[(i, j)] + self.w_denom2[(j, j)] * w;
                    if den <= 0.0 {
                        den = DIVISOR_FLOOR;
                    }
                    d.w[0][(i, j)] = w * num / den;
                }
            }

            d.next_it_step(observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver), max_steps);
        }
    }
}
