//! Element generators for initializing basis and activation matrices.
//!
//! A generator is any `FnMut(usize, usize) -> f64` mapping a (row, column)
//! position to a non-negative value. [`Deconvolver::new`](crate::Deconvolver::new),
//! [`generate_w`](crate::Deconvolver::generate_w) and
//! [`generate_h`](crate::Deconvolver::generate_h) accept them directly, so
//! closures over any RNG or data-driven scheme work as well.

use rand::Rng;

/// Generator producing zero for every element.
pub fn zero(_row: usize, _col: usize) -> f64 {
    0.0
}

/// Generator producing one for every element.
pub fn unity(_row: usize, _col: usize) -> f64 {
    1.0
}

/// Returns a generator drawing uniformly from `lo..hi` using the thread RNG.
///
/// Multiplicative updates cannot leave zero entries, so factorizations are
/// typically seeded from a strictly positive range such as `uniform(0.5, 1.0)`.
///
/// # Example
/// ```
/// use unmix::generators::uniform;
///
/// let mut gen = uniform(0.5, 1.0);
/// let x = gen(0, 0);
/// assert!((0.5..1.0).contains(&x));
/// ```
pub fn uniform(lo: f64, hi: f64) -> impl FnMut(usize, usize) -> f64 {
    let mut rng = rand::thread_rng();
    move |_row, _col| rng.gen_range(lo..hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_generators() {
        assert_eq!(zero(3, 5), 0.0);
        assert_eq!(unity(0, 0), 1.0);
    }

    #[test]
    fn uniform_stays_in_range() {
        let mut gen = uniform(0.25, 0.75);
        for i in 0..32 {
            let x = gen(i, i);
            assert!((0.25..0.75).contains(&x));
        }
    }
}
