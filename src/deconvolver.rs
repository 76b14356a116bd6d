//! Convolutive non-negative matrix factorization engine.

use ndarray::Array2;

use crate::cost::CostFunction;
use crate::error::{Error, Result};
use crate::matrix;
use crate::progress::ProgressObserver;
use crate::update;

/// Non-negative matrix factorization / deconvolution engine.
///
/// Approximates a non-negative `M x N` input matrix `V` as
///
/// ```text
/// V  ≈  Λ  =  Σₚ  W⁽ᵖ⁾ · (H shifted p columns right)      p = 0 .. t-1
/// ```
///
/// with `t` non-negative basis matrices `W⁽ᵖ⁾` (`M x R`) and a shared
/// non-negative activation matrix `H` (`R x N`). With `t = 1` this is
/// ordinary NMF; with `t > 1` each basis column becomes a sequence of `t`
/// spectra and the model is a convolutive deconvolution (NMD) in the style
/// of Smaragdis and Wang.
///
/// Updates are multiplicative, so factors stay non-negative throughout; the
/// iteration stops after `max_steps` updates or as soon as the relative
/// change of the reconstruction falls below a tolerance.
///
/// # Example
/// ```
/// use ndarray::Array2;
/// use unmix::{CostFunction, Deconvolver};
///
/// // Exactly rank-2 non-negative input.
/// let a = Array2::from_shape_vec((4, 2), vec![1.0, 2.0, 2.0, 1.0, 1.0, 1.0, 3.0, 1.0]).unwrap();
/// let b = Array2::from_shape_vec((2, 6), vec![
///     1.0, 2.0, 1.0, 2.0, 1.0, 2.0,
///     2.0, 1.0, 2.0, 1.0, 2.0, 1.0,
/// ]).unwrap();
/// let mut v = Array2::zeros((4, 6));
/// for i in 0..4 {
///     for j in 0..6 {
///         for k in 0..2 {
///             v[(i, j)] += a[(i, k)] * b[(k, j)];
///         }
///     }
/// }
///
/// let w0 = |i: usize, j: usize| 0.6 + 0.1 * ((i + j) % 4) as f64;
/// let h0 = |i: usize, j: usize| 0.5 + 0.1 * ((2 * i + j) % 5) as f64;
/// let mut engine = Deconvolver::new(v, 2, 1, w0, h0).unwrap();
/// engine.decompose(CostFunction::EuclideanDistance, 500, 1e-9, None).unwrap();
/// engine.compute_error();
/// assert!(engine.relative_error() < 1e-2);
/// ```
#[derive(Debug)]
pub struct Deconvolver {
    pub(crate) v: Array2<f64>,
    pub(crate) approx: Array2<f64>,
    pub(crate) old_approx: Option<Array2<f64>>,
    pub(crate) w: Vec<Array2<f64>>,
    pub(crate) w_constant: bool,
    pub(crate) w_col_constant: Vec<bool>,
    pub(crate) normalize_matrices: bool,
    pub(crate) t: usize,
    pub(crate) h: Array2<f64>,
    pub(crate) s: Array2<f64>,
    pub(crate) c: Array2<f64>,
    pub(crate) num_steps: u32,
    pub(crate) absolute_error: f64,
    pub(crate) relative_error: f64,
    pub(crate) v_frob: f64,
    pub(crate) notification_delay: u32,
}

impl Deconvolver {
    /// Creates an engine for `v` with rank `r` and convolutive depth `t`.
    ///
    /// `w_gen` and `h_gen` map a (row, column) position to the initial value
    /// of the corresponding `W` / `H` element; see [`crate::generators`].
    /// All `t` basis matrices are filled from the same `w_gen`.
    ///
    /// Fails with [`Error::InvalidParameter`] unless `1 <= t <= v.ncols()`.
    pub fn new(
        v: Array2<f64>,
        r: usize,
        t: usize,
        mut w_gen: impl FnMut(usize, usize) -> f64,
        h_gen: impl FnMut(usize, usize) -> f64,
    ) -> Result<Self> {
        let (m, n) = v.dim();
        if t == 0 || t > n {
            return Err(Error::InvalidParameter {
                name: "t",
                value: t.to_string(),
                reason: format!("convolutive depth must be between 1 and {n} (matrix columns)"),
            });
        }
        let v_frob = matrix::frobenius_norm(&v);
        let mut h_gen = h_gen;
        let h = Array2::from_shape_fn((r, n), |(i, j)| h_gen(i, j));
        let w = (0..t)
            .map(|_| Array2::from_shape_fn((m, r), |(i, j)| w_gen(i, j)))
            .collect();
        Ok(Deconvolver {
            approx: Array2::zeros((m, n)),
            old_approx: None,
            w,
            w_constant: false,
            w_col_constant: vec![false; r],
            normalize_matrices: false,
            t,
            h,
            s: Array2::zeros((r, n)),
            c: Array2::zeros((r, n)),
            num_steps: 0,
            absolute_error: -1.0,
            relative_error: -1.0,
            v_frob,
            notification_delay: 25,
            v,
        })
    }

    /// Re-fills every basis matrix from `gen`.
    pub fn generate_w(&mut self, mut gen: impl FnMut(usize, usize) -> f64) {
        for w in &mut self.w {
            for ((i, j), x) in w.indexed_iter_mut() {
                *x = gen(i, j);
            }
        }
    }

    /// Re-fills the activation matrix from `gen`.
    pub fn generate_h(&mut self, mut gen: impl FnMut(usize, usize) -> f64) {
        for ((i, j), x) in self.h.indexed_iter_mut() {
            *x = gen(i, j);
        }
    }

    /// Overwrites the `p`-th basis matrix.
    ///
    /// Fails with [`Error::ShapeMismatch`] if the dimensions differ.
    /// Panics if `p >= t`.
    pub fn set_w(&mut self, p: usize, w: Array2<f64>) -> Result<()> {
        if w.dim() != self.w[p].dim() {
            return Err(Error::ShapeMismatch {
                expected: format!("{:?}", self.w[p].dim()),
                got: format!("{:?}", w.dim()),
            });
        }
        self.w[p] = w;
        Ok(())
    }

    /// Overwrites the activation matrix.
    ///
    /// Fails with [`Error::ShapeMismatch`] if the dimensions differ.
    pub fn set_h(&mut self, h: Array2<f64>) -> Result<()> {
        if h.dim() != self.h.dim() {
            return Err(Error::ShapeMismatch {
                expected: format!("{:?}", self.h.dim()),
                got: format!("{:?}", h.dim()),
            });
        }
        self.h = h;
        Ok(())
    }

    /// Sets the per-element sparsity weights (`R x N`). A zero element
    /// disables the sparsity term at that position.
    pub fn set_sparsity(&mut self, s: Array2<f64>) -> Result<()> {
        if s.dim() != self.h.dim() {
            return Err(Error::ShapeMismatch {
                expected: format!("{:?}", self.h.dim()),
                got: format!("{:?}", s.dim()),
            });
        }
        self.s = s;
        Ok(())
    }

    /// Sets the per-element continuity weights (`R x N`). A zero element
    /// disables the continuity term at that position.
    pub fn set_continuity(&mut self, c: Array2<f64>) -> Result<()> {
        if c.dim() != self.h.dim() {
            return Err(Error::ShapeMismatch {
                expected: format!("{:?}", self.h.dim()),
                got: format!("{:?}", c.dim()),
            });
        }
        self.c = c;
        Ok(())
    }

    /// If set, no basis matrix is modified during decomposition.
    pub fn set_w_constant(&mut self, constant: bool) {
        self.w_constant = constant;
    }

    /// If set, column `j` of every basis matrix is kept constant during
    /// decomposition. Panics if `j >= r`.
    pub fn set_w_col_constant(&mut self, j: usize, constant: bool) {
        self.w_col_constant[j] = constant;
    }

    /// If set, `W` and `H` are jointly rescaled after decomposition such
    /// that `H` has unit Frobenius norm while the reconstruction is
    /// preserved.
    pub fn set_normalize_matrices(&mut self, normalize: bool) {
        self.normalize_matrices = normalize;
    }

    /// Sets the progress notification stride in iterations. Values below 1
    /// are clamped to 1.
    pub fn set_notification_delay(&mut self, delay: u32) {
        self.notification_delay = delay.max(1);
    }

    /// The input matrix.
    pub fn v(&self) -> &Array2<f64> {
        &self.v
    }

    /// The `p`-th basis matrix. Panics if `p >= t`.
    pub fn w(&self, p: usize) -> &Array2<f64> {
        &self.w[p]
    }

    /// The activation matrix.
    pub fn h(&self) -> &Array2<f64> {
        &self.h
    }

    /// The current reconstruction `Λ`.
    ///
    /// Only meaningful once it has been (re)built, either by the iteration
    /// itself or by an explicit [`compute_approx`](Self::compute_approx).
    pub fn approx(&self) -> &Array2<f64> {
        &self.approx
    }

    /// Factorization rank `R`.
    pub fn rank(&self) -> usize {
        self.h.nrows()
    }

    /// Convolutive depth `t`.
    pub fn depth(&self) -> usize {
        self.t
    }

    /// Iterations performed by the last `decompose` call.
    pub fn num_steps(&self) -> u32 {
        self.num_steps
    }

    /// Absolute reconstruction error; `-1.0` until
    /// [`compute_error`](Self::compute_error) has been called.
    pub fn absolute_error(&self) -> f64 {
        self.absolute_error
    }

    /// Relative reconstruction error; `-1.0` until
    /// [`compute_error`](Self::compute_error) has been called.
    pub fn relative_error(&self) -> f64 {
        self.relative_error
    }

    /// Frobenius norm of the input matrix, cached at construction.
    pub fn v_frobenius_norm(&self) -> f64 {
        self.v_frob
    }

    /// Runs the multiplicative update iteration for `cost`.
    ///
    /// Iterates until `max_steps` steps have been performed or the relative
    /// change of the reconstruction between iterations drops below `eps`
    /// (no convergence checking if `eps <= 0`). Progress is reported to
    /// `observer` every [notification-delay](Self::set_notification_delay)
    /// iterations and once with `1.0` on completion.
    ///
    /// The sparse, continuous and normalized variants are only defined for
    /// a convolutive depth of 1 and fail with [`Error::Unsupported`] for
    /// `t > 1`, before any iteration runs.
    pub fn decompose(
        &mut self,
        cost: CostFunction,
        max_steps: u32,
        eps: f64,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) -> Result<()> {
        match cost {
            CostFunction::EuclideanDistance => {
                if self.t == 1 {
                    let mut driver = update::NmfEd::new(self);
                    driver.run(self, max_steps, eps, observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver));
                } else {
                    let mut driver = update::NmdEd::new(self);
                    driver.run(self, max_steps, eps, observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver));
                }
            }
            CostFunction::KLDivergence => {
                let mut driver = update::NmdKl::new(self);
                driver.run(self, max_steps, eps, observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver));
            }
            CostFunction::EuclideanDistanceSparse => {
                self.require_single_spectrum(cost)?;
                let mut driver = update::NmfEdSparse::new(self);
                driver.run(self, max_steps, eps, observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver));
            }
            CostFunction::KLDivergenceSparse => {
                self.require_single_spectrum(cost)?;
                let mut driver = update::NmfKlSparse::new(self);
                driver.run(self, max_steps, eps, observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver));
            }
            CostFunction::KLDivergenceContinuous => {
                self.require_single_spectrum(cost)?;
                let mut driver = update::NmfKlTempCont::new(self);
                driver.run(self, max_steps, eps, observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver));
            }
            CostFunction::EuclideanDistanceSparseNormalized => {
                self.require_single_spectrum(cost)?;
                let mut driver = update::NmfEdSparseNorm::new(self);
                driver.run(self, max_steps, eps, observer.as_mut().map(|o| &mut **o as &mut dyn ProgressObserver));
            }
        }

        if self.normalize_matrices {
            self.normalize();
        }

        if let Some(obs) = observer {
            obs.progress_changed(1.0);
        }

        // The convergence snapshot does not survive across runs.
        self.old_approx = None;
        Ok(())
    }

    /// Computes the absolute and relative reconstruction errors from the
    /// current `Λ`.
    ///
    /// `decompose` leaves `Λ` at the state of its last rebuild; call
    /// [`compute_approx`](Self::compute_approx) first for errors that
    /// reflect the final factors exactly.
    pub fn compute_error(&mut self) {
        let mut err_sq = 0.0;
        for (a, v) in self.approx.iter().zip(self.v.iter()) {
            let d = a - v;
            err_sq += d * d;
        }
        self.absolute_error = err_sq.sqrt();
        self.relative_error = self.absolute_error / self.v_frob;
    }

    /// Rebuilds the reconstruction `Λ = Σₚ W⁽ᵖ⁾ · (H shifted p right)` from
    /// the current factors.
    pub fn compute_approx(&mut self) {
        if self.t == 1 {
            // Single product, no shift arithmetic.
            matrix::mult(&self.w[0], &self.h, &mut self.approx);
        } else {
            let mut wp_h = Array2::zeros(self.approx.dim());
            self.approx.fill(0.0);
            for p in 0..self.t {
                self.compute_wp_h(p, &mut wp_h);
                self.approx += &wp_h;
            }
        }
    }

    /// Writes `W⁽ᵖ⁾ · (H shifted p columns right)` into `wp_h`.
    pub(crate) fn compute_wp_h(&self, p: usize, wp_h: &mut Array2<f64>) {
        matrix::mult_shift_right(&self.w[p], &self.h, p, wp_h);
    }

    /// Convergence test on the relative change of the reconstruction.
    ///
    /// The first call only snapshots `Λ` and reports not-converged; later
    /// calls compare against the snapshot and refresh it. With
    /// `compute_now` the reconstruction is rebuilt before the comparison.
    pub(crate) fn check_convergence(&mut self, eps: f64, compute_now: bool) -> bool {
        if eps <= 0.0 {
            return false;
        }
        if compute_now {
            self.compute_approx();
        }
        match &mut self.old_approx {
            None => {
                self.old_approx = Some(self.approx.clone());
                false
            }
            Some(old) => {
                let mut diff_sq = 0.0;
                let mut old_sq = 0.0;
                for (a, o) in self.approx.iter().zip(old.iter()) {
                    let d = a - o;
                    diff_sq += d * d;
                    old_sq += o * o;
                }
                let zeta = diff_sq.sqrt() / old_sq.sqrt();
                old.assign(&self.approx);
                zeta < eps
            }
        }
    }

    /// Advances the step counter and notifies the observer at the
    /// configured stride.
    pub(crate) fn next_it_step(
        &mut self,
        observer: Option<&mut dyn ProgressObserver>,
        max_steps: u32,
    ) {
        self.num_steps += 1;
        if let Some(obs) = observer {
            if self.num_steps % self.notification_delay == 0 {
                obs.progress_changed(self.num_steps as f32 / max_steps as f32);
            }
        }
    }

    // Joint rescaling after Wang: H gets unit Frobenius norm, and each W[p]
    // is scaled with the norm mass of H shifted p to the right, so the
    // reconstruction is preserved.
    fn normalize(&mut self) {
        let h_norm = matrix::frobenius_norm(&self.h);
        self.h.mapv_inplace(|x| x / h_norm);

        // Cumulative squared norms of the rightmost columns of the
        // (normalized) H; these are the parts a shift by p pushes out.
        let n = self.h.ncols();
        let mut h_norm_right = vec![0.0; self.t];
        for p in 1..self.t {
            let col = self.h.column(n - p);
            h_norm_right[p] = h_norm_right[p - 1] + col.dot(&col);
        }

        for p in 0..self.t {
            let scale = h_norm - h_norm_right[p];
            self.w[p].mapv_inplace(|x| x * scale);
        }
    }

    fn require_single_spectrum(&self, cost: CostFunction) -> Result<()> {
        if self.t > 1 {
            return Err(Error::Unsupported(format!(
                "{} requires a convolutive depth of 1, got {}",
                cost.name(),
                self.t
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_engine(t: usize) -> Deconvolver {
        let v = Array2::from_shape_vec(
            (3, 4),
            vec![1.0, 2.0, 3.0, 4.0, 2.0, 4.0, 6.0, 8.0, 3.0, 6.0, 9.0, 12.0],
        )
        .unwrap();
        Deconvolver::new(v, 2, t, |i, j| 0.5 + 0.1 * ((i + j) % 3) as f64, |i, j| {
            0.4 + 0.1 * ((i + 2 * j) % 4) as f64
        })
        .unwrap()
    }

    #[test]
    fn depth_larger_than_columns_is_rejected() {
        let v = Array2::from_shape_vec((2, 3), vec![1.0; 6]).unwrap();
        let err = Deconvolver::new(v, 1, 4, crate::generators::unity, crate::generators::unity)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "t", .. }));
    }

    #[test]
    fn depth_zero_is_rejected() {
        let v = Array2::from_shape_vec((2, 3), vec![1.0; 6]).unwrap();
        let err = Deconvolver::new(v, 1, 0, crate::generators::unity, crate::generators::unity)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "t", .. }));
    }

    #[test]
    fn errors_start_unset() {
        let d = small_engine(1);
        assert_eq!(d.absolute_error(), -1.0);
        assert_eq!(d.relative_error(), -1.0);
        assert_eq!(d.num_steps(), 0);
    }

    #[test]
    fn reconstruction_sums_shifted_products() {
        let mut d = small_engine(2);
        d.compute_approx();

        let (m, n) = d.v().dim();
        let mut expected = Array2::<f64>::zeros((m, n));
        let mut wp_h = Array2::<f64>::zeros((m, n));
        for p in 0..2 {
            d.compute_wp_h(p, &mut wp_h);
            expected += &wp_h;
        }
        for (a, b) in d.approx().iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn convergence_monitor_state_machine() {
        let mut d = small_engine(1);

        // eps <= 0 disables the check entirely.
        assert!(!d.check_convergence(0.0, true));
        assert!(d.old_approx.is_none());

        // First real check snapshots and reports not-converged.
        assert!(!d.check_convergence(1e-3, true));
        assert!(d.old_approx.is_some());

        // Unchanged factors: zeta is 0, which is below any positive eps.
        assert!(d.check_convergence(1e-3, true));

        // A modified H moves the reconstruction away from the snapshot.
        d.h.mapv_inplace(|x| x * 3.0);
        assert!(!d.check_convergence(1e-3, true));
    }

    #[test]
    fn normalization_preserves_reconstruction_for_depth_one() {
        let mut d = small_engine(1);
        d.compute_approx();
        let before = d.approx().clone();

        d.normalize();
        assert_relative_eq!(matrix::frobenius_norm(d.h()), 1.0, epsilon = 1e-12);

        d.compute_approx();
        for (a, b) in d.approx().iter().zip(before.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn normalization_gives_unit_activation_norm_for_any_depth() {
        let mut d = small_engine(2);
        d.normalize();
        assert_relative_eq!(matrix::frobenius_norm(d.h()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn set_w_checks_shape() {
        let mut d = small_engine(1);
        let wrong = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            d.set_w(0, wrong),
            Err(Error::ShapeMismatch { .. })
        ));
        let right = Array2::<f64>::from_elem((3, 2), 0.5);
        assert!(d.set_w(0, right).is_ok());
    }

    #[test]
    fn set_sparsity_checks_shape() {
        let mut d = small_engine(1);
        assert!(d.set_sparsity(Array2::zeros((2, 4))).is_ok());
        assert!(matches!(
            d.set_sparsity(Array2::zeros((4, 2))),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
