//! Dense matrix kernels for the factorization drivers.
//!
//! The convolutive updates multiply against `H` shifted `p` columns to the
//! right with zero fill. None of the kernels materialize that shift: a shift
//! appearing on the right of a product is a plain product over a column
//! window of the unshifted operand, written at a column offset. The
//! `*_window*` functions below implement exactly those windowed forms.

use ndarray::Array2;

/// Substituted for any non-positive denominator in a multiplicative update.
///
/// This floor is part of the public contract: exact-zero denominators (e.g.
/// from an all-zero initial row of `H`) yield finite, non-negative
/// multipliers instead of NaN.
pub const DIVISOR_FLOOR: f64 = 1e-9;

/// out = a * b
pub(crate) fn mult(a: &Array2<f64>, b: &Array2<f64>, out: &mut Array2<f64>) {
    let (m, k) = a.dim();
    let n = b.ncols();
    debug_assert_eq!(k, b.nrows());
    debug_assert_eq!(out.dim(), (m, n));
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a[(i, l)] * b[(l, j)];
            }
            out[(i, j)] = sum;
        }
    }
}

/// out = a * b^T
pub(crate) fn mult_bt(a: &Array2<f64>, b: &Array2<f64>, out: &mut Array2<f64>) {
    let (m, k) = a.dim();
    let n = b.nrows();
    debug_assert_eq!(k, b.ncols());
    debug_assert_eq!(out.dim(), (m, n));
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a[(i, l)] * b[(j, l)];
            }
            out[(i, j)] = sum;
        }
    }
}

/// out = a^T * b
pub(crate) fn mult_at(a: &Array2<f64>, b: &Array2<f64>, out: &mut Array2<f64>) {
    let (k, m) = a.dim();
    let n = b.ncols();
    debug_assert_eq!(k, b.nrows());
    debug_assert_eq!(out.dim(), (m, n));
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a[(l, i)] * b[(l, j)];
            }
            out[(i, j)] = sum;
        }
    }
}

/// out = w * (h shifted `p` columns to the right, zero-padded on the left).
///
/// Columns `0..p` of `out` are the zero pad; column `p + j` holds the
/// product of `w` with column `j` of `h`.
pub(crate) fn mult_shift_right(w: &Array2<f64>, h: &Array2<f64>, p: usize, out: &mut Array2<f64>) {
    let (m, r) = w.dim();
    let n = h.ncols();
    debug_assert_eq!(r, h.nrows());
    debug_assert_eq!(out.dim(), (m, n));
    for i in 0..m {
        for j in 0..p {
            out[(i, j)] = 0.0;
        }
    }
    for i in 0..m {
        for j in 0..n - p {
            let mut sum = 0.0;
            for l in 0..r {
                sum += w[(i, l)] * h[(l, j)];
            }
            out[(i, j + p)] = sum;
        }
    }
}

/// out = a[:, p..] * b[:, ..n-p]^T
///
/// Multiplying by a right-shifted `b` transposed would pair zeros with the
/// first `p` columns of `a`; skipping those columns of `a` gives the same
/// result without building the shift.
pub(crate) fn mult_window_bt(a: &Array2<f64>, b: &Array2<f64>, p: usize, out: &mut Array2<f64>) {
    let m = a.nrows();
    let n = a.ncols();
    let r = b.nrows();
    debug_assert_eq!(n, b.ncols());
    debug_assert_eq!(out.dim(), (m, r));
    for i in 0..m {
        for j in 0..r {
            let mut sum = 0.0;
            for l in 0..n - p {
                sum += a[(i, l + p)] * b[(j, l)];
            }
            out[(i, j)] = sum;
        }
    }
}

/// out[:, ..n-p] = a^T * b[:, p..]
///
/// Columns `n-p..` of `out` are left untouched; callers ignore them.
pub(crate) fn mult_at_window(a: &Array2<f64>, b: &Array2<f64>, p: usize, out: &mut Array2<f64>) {
    let (k, r) = a.dim();
    let n = b.ncols();
    debug_assert_eq!(k, b.nrows());
    debug_assert_eq!(out.dim(), (r, n));
    for i in 0..r {
        for j in 0..n - p {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a[(l, i)] * b[(l, j + p)];
            }
            out[(i, j)] = sum;
        }
    }
}

/// out = num / den elementwise, with non-positive divisors replaced by
/// [`DIVISOR_FLOOR`].
pub(crate) fn element_div_floored(num: &Array2<f64>, den: &Array2<f64>, out: &mut Array2<f64>) {
    debug_assert_eq!(num.dim(), den.dim());
    debug_assert_eq!(num.dim(), out.dim());
    for ((o, &a), &b) in out.iter_mut().zip(num.iter()).zip(den.iter()) {
        let d = if b <= 0.0 { DIVISOR_FLOOR } else { b };
        *o = a / d;
    }
}

/// Frobenius norm of `a`.
pub(crate) fn frobenius_norm(a: &Array2<f64>) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Shifts all columns of `m` one position to the right in place, zeroing
/// column 0. The rightmost column falls off.
pub(crate) fn shift_columns_right(m: &mut Array2<f64>) {
    let (rows, cols) = m.dim();
    for i in 0..rows {
        for j in (1..cols).rev() {
            m[(i, j)] = m[(i, j - 1)];
        }
        m[(i, 0)] = 0.0;
    }
}

/// Replaces every non-positive entry of `m` with `epsilon`.
pub(crate) fn ensure_nonnegativity(m: &mut Array2<f64>, epsilon: f64) {
    for x in m.iter_mut() {
        if *x <= 0.0 {
            *x = epsilon;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mat(rows: usize, cols: usize, data: &[f64]) -> Array2<f64> {
        Array2::from_shape_vec((rows, cols), data.to_vec()).unwrap()
    }

    #[test]
    fn plain_product() {
        let a = mat(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = mat(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let mut out = Array2::zeros((2, 2));
        mult(&a, &b, &mut out);
        assert_eq!(out, mat(2, 2, &[58.0, 64.0, 139.0, 154.0]));
    }

    #[test]
    fn transposed_products_agree_with_plain() {
        let a = mat(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = mat(2, 3, &[1.0, 0.5, 2.0, 0.0, 1.0, 3.0]);

        let mut bt = Array2::zeros((3, 2));
        for i in 0..2 {
            for j in 0..3 {
                bt[(j, i)] = b[(i, j)];
            }
        }

        let mut expected = Array2::zeros((2, 2));
        mult(&a, &bt, &mut expected);
        let mut out = Array2::zeros((2, 2));
        mult_bt(&a, &b, &mut out);
        assert_eq!(out, expected);

        let mut at = Array2::zeros((3, 2));
        for i in 0..2 {
            for j in 0..3 {
                at[(j, i)] = a[(i, j)];
            }
        }
        let mut expected2 = Array2::zeros((3, 3));
        let mut out2 = Array2::zeros((3, 3));
        mult(&at, &b, &mut expected2);
        mult_at(&a, &b, &mut out2);
        assert_eq!(out2, expected2);
    }

    #[test]
    fn shifted_product_zero_pads_left() {
        let w = mat(2, 1, &[1.0, 2.0]);
        let h = mat(1, 4, &[1.0, 2.0, 3.0, 4.0]);
        let mut out = Array2::zeros((2, 4));
        mult_shift_right(&w, &h, 2, &mut out);
        // First two columns come from the zero pad of the shift.
        assert_eq!(
            out,
            mat(2, 4, &[0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0, 4.0])
        );
    }

    #[test]
    fn shifted_product_matches_materialized_shift() {
        let w = mat(3, 2, &[1.0, 0.5, 2.0, 1.0, 0.0, 3.0]);
        let h = mat(2, 5, &[1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 4.0, 3.0, 2.0, 1.0]);
        let p = 2;

        let mut h_shifted = Array2::zeros((2, 5));
        for i in 0..2 {
            for j in p..5 {
                h_shifted[(i, j)] = h[(i, j - p)];
            }
        }
        let mut expected = Array2::zeros((3, 5));
        mult(&w, &h_shifted, &mut expected);

        let mut out = Array2::zeros((3, 5));
        mult_shift_right(&w, &h, p, &mut out);
        for (a, b) in out.iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn window_bt_matches_materialized_shift() {
        let v = mat(3, 4, &[1.0, 2.0, 3.0, 4.0, 4.0, 3.0, 2.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
        let h = mat(2, 4, &[1.0, 0.0, 2.0, 1.0, 0.5, 1.0, 0.0, 2.0]);
        let p = 1;

        // V * (h shifted right by p)^T via the materialized shift.
        let mut h_shifted = Array2::zeros((2, 4));
        for i in 0..2 {
            for j in p..4 {
                h_shifted[(i, j)] = h[(i, j - p)];
            }
        }
        let mut expected = Array2::zeros((3, 2));
        mult_bt(&v, &h_shifted, &mut expected);

        let mut out = Array2::zeros((3, 2));
        mult_window_bt(&v, &h, p, &mut out);
        for (a, b) in out.iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn at_window_writes_leading_columns_only() {
        let w = mat(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let x = mat(3, 4, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let mut out = Array2::from_elem((2, 4), -1.0);
        mult_at_window(&w, &x, 1, &mut out);
        // out[:, j] = w^T * x[:, j + 1] for j < 3
        assert_eq!(out[(0, 0)], 2.0 + 10.0);
        assert_eq!(out[(1, 0)], 6.0 + 10.0);
        assert_eq!(out[(0, 2)], 4.0 + 12.0);
        // Last column untouched.
        assert_eq!(out[(0, 3)], -1.0);
        assert_eq!(out[(1, 3)], -1.0);
    }

    #[test]
    fn division_floors_zero_divisors() {
        let num = mat(1, 2, &[1.0, 2.0]);
        let den = mat(1, 2, &[4.0, 0.0]);
        let mut out = Array2::zeros((1, 2));
        element_div_floored(&num, &den, &mut out);
        assert_eq!(out[(0, 0)], 0.25);
        assert_eq!(out[(0, 1)], 2.0 / DIVISOR_FLOOR);
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn shift_columns_right_in_place() {
        let mut m = mat(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        shift_columns_right(&mut m);
        assert_eq!(m, mat(2, 3, &[0.0, 1.0, 2.0, 0.0, 4.0, 5.0]));
    }

    #[test]
    fn frobenius() {
        let m = mat(2, 2, &[3.0, 0.0, 0.0, 4.0]);
        assert_relative_eq!(frobenius_norm(&m), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn clamp_replaces_nonpositive() {
        let mut m = mat(1, 3, &[1.0, 0.0, -2.0]);
        ensure_nonnegativity(&mut m, 1e-12);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], 1e-12);
        assert_eq!(m[(0, 2)], 1e-12);
    }
}
