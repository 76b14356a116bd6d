//! Non-negative matrix factorization and deconvolution for Rust.
//!
//! Unmix decomposes a non-negative matrix `V` (`M x N`) into `t`
//! non-negative basis matrices `W⁰ .. Wᵗ⁻¹` (each `M x R`) and a
//! non-negative activation matrix `H` (`R x N`), such that
//!
//! ```text
//! V  ≈  Σₚ  W⁽ᵖ⁾ · (H shifted p columns to the right)
//! ```
//!
//! For `t = 1` this is plain NMF (Lee-Seung); for `t > 1` it is the
//! convolutive extension (NMD) used for decomposing spectrograms into
//! time-extended events in audio source separation.
//!
//! # Features
//!
//! - **Six cost variants** — squared Euclidean distance, extended KL
//!   divergence, both with an optional normalized-length sparsity term,
//!   KL with a temporal-continuity term, and ED with unit-norm basis
//!   columns plus L1 sparsity
//! - **Multiplicative updates** — non-negativity is preserved by
//!   construction; non-positive denominators are floored at
//!   [`DIVISOR_FLOOR`] so exact-zero states cannot produce NaN
//! - **Convolutive arithmetic** — shifted activations are never
//!   materialized; basis updates maintain the reconstruction
//!   incrementally (difference-based, after Wang)
//! - **Control** — per-column basis freezing, a constant-basis mode for
//!   supervised separation, convergence tolerance on the relative
//!   reconstruction change, progress callbacks, optional joint
//!   renormalization of the factors
//!
//! # Quick Start
//!
//! ```rust
//! use ndarray::Array2;
//! use unmix::{generators, CostFunction, Deconvolver};
//!
//! // A non-negative input matrix (e.g. a magnitude spectrogram).
//! let v = Array2::from_shape_vec((4, 6), vec![
//!     1.0, 2.0, 3.0, 4.0, 5.0, 6.0,
//!     2.0, 3.0, 4.0, 5.0, 6.0, 7.0,
//!     1.0, 1.0, 2.0, 2.0, 3.0, 3.0,
//!     3.0, 4.0, 5.0, 6.0, 7.0, 8.0,
//! ]).unwrap();
//!
//! let mut engine = Deconvolver::new(
//!     v, 2, 1,
//!     generators::uniform(0.5, 1.0),
//!     generators::uniform(0.5, 1.0),
//! ).unwrap();
//!
//! engine.decompose(CostFunction::EuclideanDistance, 200, 1e-9, None).unwrap();
//! engine.compute_error();
//!
//! assert_eq!(engine.w(0).dim(), (4, 2));
//! assert_eq!(engine.h().dim(), (2, 6));
//! assert!(engine.relative_error() < 1.0);
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`deconvolver`] | The [`Deconvolver`] engine: state, setup, `decompose` |
//! | [`cost`] | [`CostFunction`] selection and stable labels |
//! | [`progress`] | [`ProgressObserver`] callback trait |
//! | [`generators`] | Element generators for initializing `W` and `H` |
//! | [`error`] | Crate [`Error`] type and [`Result`] alias |
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`]. Misuse (a convolutive
//! depth larger than the column count, mismatched shapes, a constrained
//! variant with depth > 1) fails synchronously; numerical edge cases
//! during iteration are handled in-band and never error.
//!
//! # Safety
//!
//! This crate uses `#![forbid(unsafe_code)]` — no unsafe Rust anywhere.

#![forbid(unsafe_code)]

pub mod error;
pub use error::{Error, Result};

pub mod cost;
pub use cost::CostFunction;

pub mod deconvolver;
pub use deconvolver::Deconvolver;

pub mod generators;

pub mod progress;
pub use progress::ProgressObserver;

mod matrix;
pub use matrix::DIVISOR_FLOOR;

mod update;
