//! Temporal-continuity-constrained KL driver, depth 1 only.
//!
//! Penalizes large column-to-column change in the activations (Virtanen's
//! temporal continuity cost), weighted per element by the engine's `C`
//! matrix.

use ndarray::Array2;

use crate::deconvolver::Deconvolver;
use crate::matrix::{self, DIVISOR_FLOOR};
use crate::progress::ProgressObserver;

pub(crate) struct NmfKlTempCont {
    v_over_approx: Array2<f64>,
    w_num: Array2<f64>,
    h_num: Array2<f64>,
    old_h: Array2<f64>,
    ct_plus: Vec<f64>,
    ct_minus1: Vec<f64>,
    ct_minus2: Vec<f64>,
    h_row_sums: Vec<f64>,
    w_col_sums: Vec<f64>,
}

impl NmfKlTempCont {
    pub(crate) fn new(d: &Deconvolver) -> Self {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        NmfKlTempCont {
            v_over_approx: Array2::zeros((m, n)),
            w_num: Array2::zeros((m, r)),
            h_num: Array2::zeros((r, n)),
            old_h: Array2::zeros((r, n)),
            ct_plus: vec![0.0; r],
            ct_minus1: vec![0.0; r],
            ct_minus2: vec![0.0; r],
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

        d.num_steps = 0;
        while d.num_steps < max_steps {
            d.compute_approx();
            if d.check_convergence(eps, false) {
                break;
            }

            // The H update runs in place left to right, so the left
            // neighbor of a column has already been overwritten by the time
            // it is needed; the gradient reads it from this snapshot.
            self.old_h.assign(&d.h);

            matrix::element_div_floored(&d.v, &d.approx, &mut self.v_over_approx);
            matrix::mult_bt(&self.v_over_approx, &d.h, &mut self.w_num);

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

            // Row-wise parts of the continuity gradient: scale-invariant
            // weights from the row energy and the summed squared
            // column-to-column deltas.
            for i in 0..r {
                let row = d.h.row(i);
                let h_row_sum_sq = row.dot(&row);
                self.w_col_sums[i] = d.w[0].column(i).sum();

                let mut h_delta_sum_sq = 0.0;
                for j in 1..n {
                    let h_delta = d.h[(i, j)] - d.h[(i, j - 1)];
                    h_delta_sum_sq += h_delta * h_delta;
                }

                self.ct_plus[i] = 4.0 * n as f64 / h_row_sum_sq;
                self.ct_minus1[i] = 2.0 * n as f64 / h_row_sum_sq;
                self.ct_minus2[i] =
                    2.0 * n as f64 * h_delta_sum_sq / (h_row_sum_sq * h_row_sum_sq);
            }

            matrix::mult_at(&d.w[0], &self.v_over_approx, &mut self.h_num);

            for i in 0..r {
                for j in 0..n {
                    let h = d.h[(i, j)];
                    let mut den = self.w_col_sums[i] + d.c[(i, j)] * h * self.ct_plus[i];
                    if den <= 0.0 {
                        den = DIVISOR_FLOOR;
                    }
                    let left = if j == 0 { 0.0 } else { self.old_h[(i, j - 1)] };
                    let right = if j == n - 1 { 0.0 } else { d.h[(i, j + 1)] };
                    d.h[(i, j)] = h
                        * (self.h_num[(i, j)]
                            + d.c[(i, j)]
                                * ((left + right) * self.ct_minus1[i] + h * self.ct_minus2[i]))
                        / den;
                }
            }

            d.next_it_step(observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver), max_steps);
        }
    }
}
