//! Squared-Euclidean-distance drivers: plain NMF (depth 1) and the
//! convolutive NMD variant with difference-based reconstruction updates
//! after Wang.

use ndarray::Array2;

use crate::deconvolver::Deconvolver;
use crate::matrix::{self, DIVISOR_FLOOR};
use crate::progress::ProgressObserver;

/// Lee-Seung W update, shared by the plain and the sparse ED drivers.
///
/// The denominator is grouped as `W * (H * Hᵀ)`; the `(W * H) * Hᵀ`
/// grouping would redo the full reconstruction for the same result.
pub(super) fn ed_w_update(
    d: &mut Deconvolver,
    num: &mut Array2<f64>,
    hht: &mut Array2<f64>,
    denom: &mut Array2<f64>,
) {
    if d.w_constant {
        return;
    }
    matrix::mult_bt(&d.v, &d.h, num);
    matrix::mult_bt(&d.h, &d.h, hht);
    matrix::mult(&d.w[0], hht, denom);
    let (m, r) = d.w[0].dim();
    for j in 0..r {
        if d.w_col_constant[j] {
            continue;
        }
        for i in 0..m {
            let mut den = denom[(i, j)];
            if den <= 0.0 {
                den = DIVISOR_FLOOR;
            }
            d.w[0][(i, j)] *= num[(i, j)] / den;
        }
    }
}

/// Fills the numerator `Wᵀ * V` and denominator `(Wᵀ * W) * H` of the
/// Lee-Seung H update. The same grouping note as for the W update applies.
pub(super) fn ed_h_update_matrices(
    d: &Deconvolver,
    num: &mut Array2<f64>,
    wtw: &mut Array2<f64>,
    denom: &mut Array2<f64>,
) {
    matrix::mult_at(&d.w[0], &d.v, num);
    matrix::mult_at(&d.w[0], &d.w[0], wtw);
    matrix::mult(wtw, &d.h, denom);
}

/// Standard NMF with squared Euclidean distance, depth 1.
pub(crate) struct NmfEd {
    w_num: Array2<f64>,
    w_hht: Array2<f64>,
    w_denom: Array2<f64>,
    h_num: Array2<f64>,
    h_wtw: Array2<f64>,
    h_denom: Array2<f64>,
}

impl NmfEd {
    pub(crate) fn new(d: &Deconvolver) -> Self {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        NmfEd {
            w_num: Array2::zeros((m, r)),
            w_hht: Array2::zeros((r, r)),
            w_denom: Array2::zeros((m, r)),
            h_num: Array2::zeros((r, n)),
            h_wtw: Array2::zeros((r, r)),
            h_denom: Array2::zeros((r, n)),
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

        d.num_steps = 0;
        while d.num_steps < max_steps && !d.check_convergence(eps, true) {
            ed_w_update(d, &mut self.w_num, &mut self.w_hht, &mut self.w_denom);

            ed_h_update_matrices(d, &mut self.h_num, &mut self.h_wtw, &mut self.h_denom);
            for i in 0..r {
                for j in 0..n {
                    let mut den = self.h_denom[(i, j)];
                    if den <= 0.0 {
                        den = DIVISOR_FLOOR;
                    }
                    d.h[(i, j)] *= self.h_num[(i, j)] / den;
                }
            }

            d.next_it_step(observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver), max_steps);
        }
    }
}

/// Convolutive NMD with squared Euclidean distance.
///
/// Each basis matrix `W⁽ᵖ⁾` is updated against the reconstruction with its
/// own contribution removed and re-added (difference-based update), so the
/// full reconstruction is rebuilt only once per iteration.
pub(crate) struct NmdEd {
    h_sum: Array2<f64>,
    w_num: Array2<f64>,
    w_denom: Array2<f64>,
    h_num: Array2<f64>,
    h_denom: Array2<f64>,
    wp_h: Array2<f64>,
}

impl NmdEd {
    pub(crate) fn new(d: &Deconvolver) -> Self {
        let (m, n) = d.v.dim();
        let r = d.h.nrows();
        NmdEd {
            h_sum: Array2::zeros((r, n)),
            w_num: Array2::zeros((m, r)),
            w_denom: Array2::zeros((m, r)),
            h_num: Array2::zeros((r, n)),
            h_denom: Array2::zeros((r, n)),
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
            // Rebuild at the top of the iteration; the H update below works
            // against this reconstruction.
            d.compute_approx();
            if d.check_convergence(eps, false) {
                break;
            }

            if !d.w_constant {
                for p in 0..t {
                    // V and Λ against (H shifted p right)ᵀ. The zeros the
                    // shift introduces line up with the first p columns of
                    // the left operand, so the products start at column p.
                    matrix::mult_window_bt(&d.v, &d.h, p, &mut self.w_num);
                    matrix::mult_window_bt(&d.approx, &d.h, p, &mut self.w_denom);

                    // Remove the old W⁽ᵖ⁾ contribution before overwriting it.
                    d.compute_wp_h(p, &mut self.wp_h);
                    d.approx -= &self.wp_h;

                    for j in 0..r {
                        if d.w_col_constant[j] {
                            continue;
                        }
                        for i in 0..m {
                            let mut den = self.w_denom[(i, j)];
                            if den <= 0.0 {
                                den = DIVISOR_FLOOR;
                            }
                            d.w[p][(i, j)] *= self.w_num[(i, j)] / den;
                        }
                    }

                    // Re-add the updated contribution and clamp: the
                    // subtraction can leave tiny negative residue.
                    d.compute_wp_h(p, &mut self.wp_h);
                    d.approx += &self.wp_h;
                    matrix::ensure_nonnegativity(&mut d.approx, f64::EPSILON);
                }
            }

            // Average the H updates over all p. The products ignore the
            // rightmost p columns, which a left-shift of V/Λ would zero.
            self.h_sum.fill(0.0);
            for p in 0..t {
                matrix::mult_at_window(&d.w[p], &d.v, p, &mut self.h_num);
                matrix::mult_at_window(&d.w[p], &d.approx, p, &mut self.h_denom);
                for i in 0..r {
                    for j in 0..n - p {
                        let mut den = self.h_denom[(i, j)];
                        if den <= 0.0 {
                            den = DIVISOR_FLOOR;
                        }
                        self.h_sum[(i, j)] += d.h[(i, j)] * self.h_num[(i, j)] / den;
                    }
                }
            }
            for i in 0..r {
                for j in 0..n {
                    d.h[(i, j)] = self.h_sum[(i, j)] / t as f64;
                }
            }

            d.next_it_step(observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver), max_steps);
        }
    }
}
