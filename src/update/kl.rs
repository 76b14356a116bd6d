//! Extended-KL-divergence driver, handling any convolutive depth.

use ndarray::Array2;

use crate::deconvolver::Deconvolver;
use crate::matrix::{self, DIVISOR_FLOOR};
use crate::progress::ProgressObserver;

/// NMD with extended KL divergence. For a depth of 1 this reduces to the
/// standard Lee-Seung KL update.
pub(crate) struct NmdKl {
    v_over_approx: Array2<f64>,
    h_shifted: Array2<f64>,
    w_num: Array2<f64>,
    h_update: Array2<f64>,
    h_num: Array2<f64>,
    wp_col_sums: Vec<f64>,
    wp_h: Array2<f64>,
}

impl NmdKl {
    pub(crate) fn new(d: &Deconvolver) -> Self {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        NmdKl {
            v_over_approx: Array2::zeros((m, n)),
            h_shifted: Array2::zeros((r, n)),
            w_num: Array2::zeros((m, r)),
            h_update: Array2::zeros((r, n)),
            h_num: Array2::zeros((r, n)),
            wp_col_sums: vec![0.0; r],
            wp_h: Array2::zeros((m, n)),
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
        let t = d.t;

        d.num_steps = 0;
        while d.num_steps < max_steps {
            d.compute_approx();
            if d.check_convergence(eps, false) {
                break;
            }

            matrix::element_div_floored(&d.v, &d.approx, &mut self.v_over_approx);

            if !d.w_constant {
                // A local copy of H is shifted one column right between
                // p-steps. Summing columns 0..n-p of H directly would give
                // the same row sums; the explicit shift keeps the product
                // below walking contiguous memory.
                self.h_shifted.assign(&d.h);
                for p in 0..t {
                    if t > 1 {
                        // Difference-based reconstruction update, as in the
                        // ED driver.
                        d.compute_wp_h(p, &mut self.wp_h);
                        d.approx -= &self.wp_h;
                    }

                    matrix::mult_bt(&self.v_over_approx, &self.h_shifted, &mut self.w_num);
                    for j in 0..r {
                        if d.w_col_constant[j] {
                            continue;
                        }
                        let mut h_row_sum = self.h_shifted.row(j).sum();
                        if h_row_sum <= 0.0 {
                            h_row_sum = DIVISOR_FLOOR;
                        }
                        for i in 0..m {
                            d.w[p][(i, j)] *= self.w_num[(i, j)] / h_row_sum;
                        }
                    }

                    if t > 1 {
                        d.compute_wp_h(p, &mut self.wp_h);
                        d.approx += &self.wp_h;
                        matrix::ensure_nonnegativity(&mut d.approx, f64::EPSILON);
                        matrix::shift_columns_right(&mut self.h_shifted);
                    }
                }
            }

            // For a depth of 1 the incremental path was skipped above;
            // a single product rebuild is cheaper anyway.
            if t == 1 {
                d.compute_approx();
            }
            matrix::element_div_floored(&d.v, &d.approx, &mut self.v_over_approx);

            // Average the H updates over all p.
            self.h_update.fill(0.0);
            for p in 0..t {
                for i in 0..r {
                    let col_sum = d.w[p].column(i).sum();
                    self.wp_col_sums[i] = if col_sum <= 0.0 { DIVISOR_FLOOR } else { col_sum };
                }

                // The jth column of V/Λ shifted p left is the (j+p)th
                // column of V/Λ itself.
                matrix::mult_at_window(&d.w[p], &self.v_over_approx, p, &mut self.h_num);
                for i in 0..r {
                    for j in 0..n - p {
                        self.h_update[(i, j)] += self.h_num[(i, j)] / self.wp_col_sums[i];
                    }
                }
            }
            for i in 0..r {
                for j in 0..n {
                    d.h[(i, j)] *= self.h_update[(i, j)] / t as f64;
                }
            }

            d.next_it_step(observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver), max_steps);
        }
    }
}
